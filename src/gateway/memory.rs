//! In-memory [`SourceGateway`] implementation for tests and offline use.
//!
//! Records are served in insertion order with offset cursors. Search
//! queries match case-insensitively against record titles. Failures can be
//! injected per page id or after a number of search pages.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Block, ObjectKind, RawRecord};

use super::{GatewayError, SearchPage, SearchRequest, SourceGateway};

/// In-memory gateway backed by fixture records and blocks.
#[derive(Default)]
pub struct InMemoryGateway {
    records: RwLock<Vec<Value>>,
    blocks: RwLock<HashMap<String, Vec<Block>>>,
    failing_pages: HashSet<String>,
    fail_search_after: Option<usize>,
    search_calls: AtomicUsize,
    block_calls: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record: Value) -> Self {
        self.records.write().unwrap().push(record);
        self
    }

    pub fn with_records(self, records: impl IntoIterator<Item = Value>) -> Self {
        self.records.write().unwrap().extend(records);
        self
    }

    pub fn with_blocks(self, page_id: &str, blocks: Vec<Block>) -> Self {
        self.blocks
            .write()
            .unwrap()
            .insert(page_id.to_string(), blocks);
        self
    }

    /// Make `list_blocks` and `retrieve_page` fail for this id.
    pub fn with_failing_page(mut self, page_id: &str) -> Self {
        self.failing_pages.insert(page_id.to_string());
        self
    }

    /// Serve `pages` search pages successfully, then fail with
    /// [`GatewayError::RateLimited`].
    pub fn fail_search_after(mut self, pages: usize) -> Self {
        self.fail_search_after = Some(pages);
        self
    }

    /// Replace the record set, e.g. to simulate workspace edits between rebuilds.
    pub fn set_records(&self, records: Vec<Value>) {
        *self.records.write().unwrap() = records;
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    fn matches(record: &Value, request: &SearchRequest) -> bool {
        if let Some(kind) = request.filter {
            let object = record.get("object").and_then(Value::as_str).unwrap_or("page");
            if ObjectKind::from_wire(object) != kind {
                return false;
            }
        }
        match request.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => serde_json::from_value::<RawRecord>(record.clone())
                .map(|r| r.display_title().to_lowercase().contains(&q.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl SourceGateway for InMemoryGateway {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, GatewayError> {
        let call = self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search_after.is_some_and(|n| call >= n) {
            return Err(GatewayError::RateLimited);
        }

        let offset: usize = match request.cursor.as_deref() {
            Some(c) => c
                .parse()
                .map_err(|_| GatewayError::Decode(format!("bad cursor: {c}")))?,
            None => 0,
        };
        let page_size = request.page_size.max(1) as usize;

        let records = self.records.read().unwrap();
        let matching: Vec<&Value> = records
            .iter()
            .filter(|r| Self::matches(r, request))
            .collect();

        let end = (offset + page_size).min(matching.len());
        let results = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        let has_more = end < matching.len();

        Ok(SearchPage {
            results,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>, GatewayError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.contains(page_id) {
            return Err(GatewayError::Status {
                status: 500,
                body: format!("injected failure for {page_id}"),
            });
        }
        Ok(self
            .blocks
            .read()
            .unwrap()
            .get(page_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<RawRecord, GatewayError> {
        if self.failing_pages.contains(page_id) {
            return Err(GatewayError::NotFound(page_id.to_string()));
        }
        let records = self.records.read().unwrap();
        let value = records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(page_id))
            .ok_or_else(|| GatewayError::NotFound(page_id.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
