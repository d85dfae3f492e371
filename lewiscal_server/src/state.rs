//! State shared by all requests.

use std::{num::NonZeroUsize, sync::Arc};

use lewiscal_core::{
    feed::{FeedCache, FeedSource},
    reqwest::Client,
    ExtractOptions,
};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

pub struct AppState {
    pub client: Client,
    /// The feed refreshed when a request names none.
    pub default_source: Option<FeedSource>,
    options: ExtractOptions,
    default_feed: Arc<Mutex<FeedCache>>,
    /// Feeds named by requests, least recently used evicted first.
    feeds: Mutex<LruCache<FeedSource, Arc<Mutex<FeedCache>>>>,
}

impl AppState {
    pub fn new(
        client: Client,
        default_source: Option<FeedSource>,
        options: ExtractOptions,
        max_feeds: NonZeroUsize,
    ) -> Self {
        AppState {
            client,
            default_source,
            options,
            default_feed: Arc::new(Mutex::new(FeedCache::new(options))),
            feeds: Mutex::new(LruCache::new(max_feeds)),
        }
    }

    /// The cache of `source`, created on first use.
    ///
    /// Each feed has its own lock, so refreshes of one feed run one after another while
    /// other feeds are not held up. The default source is never evicted.
    pub async fn feed(&self, source: &FeedSource) -> Arc<Mutex<FeedCache>> {
        if self.default_source.as_ref() == Some(source) {
            return self.default_feed.clone();
        }
        let mut feeds = self.feeds.lock().await;
        if let Some(feed) = feeds.get(source) {
            return feed.clone();
        }
        let feed = Arc::new(Mutex::new(FeedCache::new(self.options)));
        if let Some((evicted, _)) = feeds.push(source.clone(), feed.clone()) {
            debug!(source = %evicted, "evicting feed cache");
        }
        feed
    }
}
