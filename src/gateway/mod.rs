//! Raw source gateway: the capability the hierarchy cache and the search
//! engine consume to reach the Notion workspace.
//!
//! The [`SourceGateway`] trait covers the three remote operations the core
//! needs. [`notion::NotionGateway`] talks to the real REST API;
//! [`memory::InMemoryGateway`] serves fixtures for tests and offline use.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod notion;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::models::{Block, ObjectKind, RawRecord};

/// Failure of a single gateway round-trip.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited by the API")]
    RateLimited,
    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Parameters of one `search` request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free-text query. `None` lists everything the integration can see.
    pub query: Option<String>,
    /// Restrict results to one object kind.
    pub filter: Option<ObjectKind>,
    pub page_size: u32,
    pub cursor: Option<String>,
}

/// One page of raw search results.
///
/// Records are kept as JSON values so that a malformed record can be dropped
/// on its own during ingestion instead of failing the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Remote operations against the document workspace.
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// Run one page of a search, optionally filtered by object kind.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, GatewayError>;

    /// Fetch the top-level content blocks of a page.
    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>, GatewayError>;

    /// Fetch a single page record.
    async fn retrieve_page(&self, page_id: &str) -> Result<RawRecord, GatewayError>;
}

/// Pause applied between paginated requests to stay under rate limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacing {
    delay: Duration,
}

impl Pacing {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// No pause at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Result of a paginated sweep. `error` is set when a request failed and the
/// sweep stopped early; `records` still holds everything gathered before it.
#[derive(Debug, Default)]
pub struct Sweep {
    pub records: Vec<Value>,
    pub requests: usize,
    pub error: Option<GatewayError>,
}

/// Follow `has_more` / `next_cursor` until exhausted, a request fails, or
/// `cap` records have been gathered. The cap is checked before each request
/// only, so the page that crosses it is kept whole.
pub async fn paginate(
    gateway: &dyn SourceGateway,
    template: SearchRequest,
    cap: Option<usize>,
    pacing: Pacing,
) -> Sweep {
    let mut sweep = Sweep::default();
    let mut request = template;
    request.cursor = None;

    loop {
        if cap.is_some_and(|c| sweep.records.len() >= c) {
            break;
        }

        let page = match gateway.search(&request).await {
            Ok(page) => page,
            Err(e) => {
                sweep.error = Some(e);
                break;
            }
        };
        sweep.requests += 1;
        sweep.records.extend(page.results);

        pacing.pause().await;

        match (page.has_more, page.next_cursor) {
            (true, Some(cursor)) => request.cursor = Some(cursor),
            _ => break,
        }
    }

    sweep
}
