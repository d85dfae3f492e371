//! This client fetches calendar feeds and tells whether they changed since the last parse.

use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
    time::{Duration, SystemTime},
};

use anyhow::{bail, Context, Result};
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{event::Event, extract::ExtractOptions};

/// Where a calendar feed is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// An `http` or `https` URL.
    Remote(Url),
    /// A file on the local file system.
    Local(PathBuf),
}

impl FeedSource {
    /// Parse a URL, rejecting anything that is not an absolute `http`/`https` URL.
    pub fn remote(url: &str) -> Result<Self> {
        let url = Url::parse(url.trim()).with_context(|| format!("invalid calendar URL {url}"))?;
        match url.scheme() {
            "http" | "https" => Ok(FeedSource::Remote(url)),
            scheme => bail!("unsupported calendar URL scheme {scheme}"),
        }
    }
}

impl FromStr for FeedSource {
    type Err = anyhow::Error;

    /// Anything that looks like a URL must be a remote source, everything else is a path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("://") {
            FeedSource::remote(s)
        } else {
            Ok(FeedSource::Local(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Remote(url) => write!(f, "{url}"),
            FeedSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The text of a feed at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
    /// The modification time, for sources that have one.
    pub modified: Option<SystemTime>,
}

/// Build the HTTP client used for remote feeds. Requests fail after `timeout`.
pub fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Fetch the current text of a feed.
///
/// Invalid UTF-8 is replaced rather than rejected, for files as for HTTP responses.
pub async fn fetch(client: &Client, source: &FeedSource) -> Result<Snapshot> {
    match source {
        FeedSource::Remote(url) => {
            let response = client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("failed to request {url}"))?
                .error_for_status()?;
            let text = response.text().await?;
            Ok(Snapshot {
                text,
                modified: None,
            })
        }
        FeedSource::Local(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let modified = tokio::fs::metadata(path)
                .await
                .and_then(|metadata| metadata.modified())
                .ok();
            Ok(Snapshot { text, modified })
        }
    }
}

/// Hex encoded SHA-256 of the feed text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// What is remembered about a feed between two refreshes.
#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    pub last_content_hash: Option<String>,
    pub last_modified: Option<SystemTime>,
    /// The events of the last parse.
    pub last_events: Vec<Event>,
    options: ExtractOptions,
}

impl FeedCache {
    pub fn new(options: ExtractOptions) -> Self {
        FeedCache {
            options,
            ..Default::default()
        }
    }

    /// Whether `snapshot` differs from what was parsed last.
    ///
    /// A feed changed when its content hash differs, or when it reports a modification time
    /// that differs from the remembered one.
    pub fn is_changed(&self, snapshot: &Snapshot, content_hash: &str) -> bool {
        self.last_content_hash.as_deref() != Some(content_hash)
            || (snapshot.modified.is_some() && snapshot.modified != self.last_modified)
    }

    /// Re-parse `snapshot` if it changed. Returns whether it did.
    pub fn apply(&mut self, snapshot: Snapshot) -> bool {
        let hash = content_hash(&snapshot.text);
        if !self.is_changed(&snapshot, &hash) {
            debug!(hash = %hash, "feed unchanged");
            return false;
        }
        self.last_events = crate::parse_with(&snapshot.text, self.options);
        info!(hash = %hash, events = self.last_events.len(), "feed changed, parsed events");
        self.last_content_hash = Some(hash);
        self.last_modified = snapshot.modified;
        true
    }

    /// Fetch `source` and apply the result. On error the cache is left untouched.
    pub async fn refresh(&mut self, client: &Client, source: &FeedSource) -> Result<bool> {
        let snapshot = fetch(client, source).await?;
        Ok(self.apply(snapshot))
    }
}
