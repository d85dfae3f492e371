pub mod refresh;

/// Tell that the server is up.
pub async fn status() -> &'static str {
    "LewisCal is running"
}
