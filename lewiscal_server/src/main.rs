use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use lewiscal_core::{
    feed::{self, FeedSource},
    ExtractOptions, ReopenPolicy,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

mod route;
mod state;

#[derive(Debug, Parser)]
pub struct Arguments {
    /// the address to listen on
    #[arg(long, env = "LEWISCAL_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,
    /// the port to listen on
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,
    /// the calendar refreshed when a request names none, a URL or a file path
    #[arg(long, env = "LEWISCAL_SOURCE")]
    pub source: Option<FeedSource>,
    /// how many request-named feeds are cached at once
    #[arg(long, env = "LEWISCAL_MAX_FEEDS", default_value = "32")]
    pub max_feeds: NonZeroUsize,
    /// seconds after which a remote feed request is abandoned
    #[arg(long, env = "LEWISCAL_FETCH_TIMEOUT", default_value_t = 30)]
    pub fetch_timeout: u64,
    /// a directory of static files served under /app
    #[arg(long, env = "LEWISCAL_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    /// emit an unclosed event when the next one begins instead of dropping it
    #[arg(long)]
    pub keep_unclosed: bool,
    /// ignore properties of components nested in events
    #[arg(long)]
    pub skip_subcomponents: bool,
}

impl From<&Arguments> for ExtractOptions {
    fn from(value: &Arguments) -> Self {
        ExtractOptions {
            reopen: if value.keep_unclosed {
                ReopenPolicy::Finalize
            } else {
                ReopenPolicy::Discard
            },
            skip_subcomponents: value.skip_subcomponents,
        }
    }
}

pub fn app(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/", get(route::status))
        .route("/api/refresh", get(route::refresh::handler));
    if let Some(static_dir) = static_dir {
        router = router.nest_service("/app", ServeDir::new(static_dir));
    }
    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Arguments::parse();
    let state = AppState::new(
        feed::client(Duration::from_secs(args.fetch_timeout))?,
        args.source.clone(),
        ExtractOptions::from(&args),
        args.max_feeds,
    );
    let app = app(Arc::new(state), args.static_dir.as_deref());
    let addr = SocketAddr::new(args.bind, args.port);
    info!(%addr, source = ?args.source.as_ref().map(ToString::to_string), "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
