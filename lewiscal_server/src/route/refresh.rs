use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use lewiscal_core::{feed::FeedSource, listing, Event, EventField};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::state::AppState;

static INVALID_URL: &str = "Invalid calendar URL.";
static NO_SOURCE: &str = "No calendar source configured.";
static REFRESH_FAILED: &str = "Unable to refresh calendar.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    url: Option<String>,
    #[serde(default)]
    require_uid: bool,
    #[serde(default)]
    require_summary: bool,
    #[serde(default)]
    require_end: bool,
    #[serde(default)]
    require_location: bool,
}

impl From<&QueryParams> for EventField {
    fn from(value: &QueryParams) -> Self {
        let mut event_field = EventField::none();
        if value.require_uid {
            event_field |= EventField::Uid;
        }
        if value.require_summary {
            event_field |= EventField::Summary;
        }
        if value.require_end {
            event_field |= EventField::End;
        }
        if value.require_location {
            event_field |= EventField::Location;
        }
        event_field
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    updated: bool,
    events: Vec<Event>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

fn error_reply(status: StatusCode, message: &str) -> ErrorReply {
    (
        status,
        Json(ErrorResponse {
            error: String::from(message),
        }),
    )
}

/// Handle refresh requests.
///
/// The feed is given by the `url` query parameter or else the configured default source.
/// `events` always holds the events of the last successful parse, `updated` tells whether
/// this request parsed them.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Query(query_params): Query<QueryParams>,
) -> Result<Json<RefreshResponse>, ErrorReply> {
    let source = match &query_params.url {
        Some(url) => FeedSource::remote(url).map_err(|err| {
            warn!(url = %url, error = %err, "rejecting calendar URL");
            error_reply(StatusCode::BAD_REQUEST, INVALID_URL)
        })?,
        None => state
            .default_source
            .clone()
            .ok_or_else(|| error_reply(StatusCode::BAD_REQUEST, NO_SOURCE))?,
    };
    let feed = state.feed(&source).await;
    let mut cache = feed.lock().await;
    let updated = cache
        .refresh(&state.client, &source)
        .await
        .map_err(|err| {
            error!(source = %source, error = ?err, "unable to refresh calendar");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, REFRESH_FAILED)
        })?;
    let events = listing::retain_complete(
        cache.last_events.clone(),
        EventField::from(&query_params),
    );
    Ok(Json(RefreshResponse { updated, events }))
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{write, File},
        net::TcpListener,
        num::NonZeroUsize,
        path::Path,
        sync::Arc,
        time::Duration,
    };

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use lewiscal_core::{
        feed::{self, FeedSource},
        reqwest::Client,
        EventField, ExtractOptions,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app, route::refresh::QueryParams, state::AppState};

    static STANDUP: &str = "BEGIN:VEVENT\r\nUID:abc123\r\nSUMMARY:Standup\r\nDTSTART:20250301T090000Z\r\nDTEND:20250301T093000Z\r\nEND:VEVENT\r\n";
    static UNSCHEDULED: &str = "BEGIN:VEVENT\r\nUID:draft\r\nSUMMARY:Unscheduled\r\nEND:VEVENT\r\n";

    fn state(client: Client, default_source: Option<FeedSource>) -> Arc<AppState> {
        Arc::new(AppState::new(
            client,
            default_source,
            ExtractOptions::default(),
            NonZeroUsize::new(4).unwrap(),
        ))
    }

    fn local_app(path: &Path) -> Router {
        app(
            state(Client::new(), Some(FeedSource::Local(path.to_path_buf()))),
            None,
        )
    }

    /// Serve `router` on a free local port.
    fn serve(router: Router) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(router.into_make_service()),
        );
        address
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_refresh_local_feed() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("calendar.ics");
        write(&path, STANDUP).unwrap();
        let app = local_app(&path);

        let (status, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "updated": true,
                "events": [{
                    "uid": "abc123",
                    "summary": "Standup",
                    "start": "2025-03-01T09:00:00Z",
                    "end": "2025-03-01T09:30:00Z",
                }],
            })
        );

        let (status, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], json!(false));
        assert_eq!(body["events"].as_array().unwrap().len(), 1);

        write(&path, format!("{STANDUP}{UNSCHEDULED}")).unwrap();
        let (_, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(body["updated"], json!(true));
        assert_eq!(body["events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_detects_modification_time() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("calendar.ics");
        write(&path, STANDUP).unwrap();
        let app = local_app(&path);

        let (_, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(body["updated"], json!(true));

        let file = File::options().write(true).open(&path).unwrap();
        let modified = file.metadata().unwrap().modified().unwrap();
        file.set_modified(modified + Duration::from_secs(2)).unwrap();

        let (status, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], json!(true));
    }

    #[tokio::test]
    async fn test_refresh_remote_feed() {
        let address = serve(Router::new().route("/calendar.ics", get(|| async { STANDUP })));
        let app = app(state(Client::new(), None), None);

        let uri = format!("/api/refresh?url=http://{address}/calendar.ics");
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], json!(true));
        assert_eq!(body["events"][0]["summary"], json!("Standup"));

        let (_, body) = get_json(&app, &uri).await;
        assert_eq!(body["updated"], json!(false));

        let missing = format!("/api/refresh?url=http://{address}/missing.ics");
        let (status, body) = get_json(&app, &missing).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Unable to refresh calendar." }));
    }

    #[tokio::test]
    async fn test_refresh_stalled_feed_times_out() {
        let address = serve(Router::new().route(
            "/calendar.ics",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                STANDUP
            }),
        ));
        let client = feed::client(Duration::from_millis(200)).unwrap();
        let app = app(state(client, None), None);

        let uri = format!("/api/refresh?url=http://{address}/calendar.ics");
        let (status, body) =
            tokio::time::timeout(Duration::from_secs(5), get_json(&app, &uri))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Unable to refresh calendar." }));
    }

    #[tokio::test]
    async fn test_refresh_rejects_invalid_url() {
        let app = app(state(Client::new(), None), None);
        for uri in [
            "/api/refresh?url=not-a-url",
            "/api/refresh?url=ftp://calendar.lewiscal.test/team.ics",
            "/api/refresh?url=",
        ] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Invalid calendar URL." }));
        }
    }

    #[tokio::test]
    async fn test_refresh_without_source() {
        let app = app(state(Client::new(), None), None);
        let (status, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No calendar source configured." }));
    }

    #[tokio::test]
    async fn test_refresh_unreadable_feed() {
        let directory = tempfile::tempdir().unwrap();
        let app = local_app(&directory.path().join("missing.ics"));
        let (status, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Unable to refresh calendar." }));
    }

    #[tokio::test]
    async fn test_refresh_required_fields() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("calendar.ics");
        write(&path, format!("{STANDUP}{UNSCHEDULED}")).unwrap();
        let app = local_app(&path);

        let (_, body) = get_json(&app, "/api/refresh?require_end=true").await;
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["uid"], json!("abc123"));

        // the filter does not touch the cache
        let (_, body) = get_json(&app, "/api/refresh").await;
        assert_eq!(body["updated"], json!(false));
        assert_eq!(body["events"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_from_query_params_for_event_field() {
        let query_params = QueryParams::default();
        assert_eq!(EventField::from(&query_params), EventField::none());
        let query_params = QueryParams {
            require_uid: true,
            ..Default::default()
        };
        assert_eq!(EventField::from(&query_params), EventField::Uid);
        let query_params = QueryParams {
            require_summary: true,
            require_end: true,
            require_location: true,
            ..Default::default()
        };
        assert_eq!(
            EventField::from(&query_params),
            EventField::Summary
                .or(EventField::End)
                .or(EventField::Location)
        );
    }

    #[tokio::test]
    async fn test_status() {
        let response = app(state(Client::new(), None), None)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"LewisCal is running");
    }
}
