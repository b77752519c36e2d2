//! Multi-strategy relevance search.
//!
//! Every query runs three strategies and merges their output into one ranked
//! list with at most one result per page id:
//!
//! | Strategy | Source | Score | Overwrites |
//! |----------|--------|-------|------------|
//! | A remote | API full-text search, capped | `0.6 × rank decay + 0.4 × title` | only if higher |
//! | B metadata | cached titles and paths | `0.7 × title + 0.3 × path` | only if higher |
//! | C content | block text of the first cached pages, specific queries only | `min(1, content + 0.3)` | always |
//!
//! Results are ordered by descending score. Equal scores keep merge
//! insertion order.
//!
//! Page text is read through a [`ContentFetcher`], so scoring never touches
//! the network directly.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::Config;
use crate::gateway::{paginate, GatewayError, Pacing, SearchRequest, SourceGateway};
use crate::hierarchy::{HierarchyCache, Snapshot};
use crate::models::{
    page_url, DocumentNode, ObjectKind, ParentKind, RawRecord, SearchResult, UNTITLED,
};
use crate::scoring::{
    content_matches_query, content_relevance, extract_text, is_specific_query, leading_preview,
    path_relevance, snippet, title_relevance, token_set, tokenize,
};

pub const REASON_REMOTE: &str = "API search match";
pub const REASON_TITLE: &str = "Title match";
pub const REASON_PATH: &str = "Path match";
pub const REASON_CONTENT: &str = "Content match";

/// Reads the plain text of a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_text(&self, page_id: &str) -> Result<String, GatewayError>;
}

/// [`ContentFetcher`] over a gateway's block listing.
pub struct BlockTextFetcher {
    gateway: Arc<dyn SourceGateway>,
}

impl BlockTextFetcher {
    pub fn new(gateway: Arc<dyn SourceGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ContentFetcher for BlockTextFetcher {
    async fn fetch_text(&self, page_id: &str) -> Result<String, GatewayError> {
        let blocks = self.gateway.list_blocks(page_id).await?;
        Ok(extract_text(&blocks))
    }
}

/// Tunables of the search engine.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub api_hit_cap: usize,
    pub content_candidates: usize,
    pub preview_chars: usize,
    pub snippet_half_width: usize,
    pub snippet_max_len: usize,
    pub page_size: u32,
    pub pacing: Pacing,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_hit_cap: 50,
            content_candidates: 20,
            preview_chars: 300,
            snippet_half_width: 100,
            snippet_max_len: 200,
            page_size: 100,
            pacing: Pacing::none(),
        }
    }
}

impl SearchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_hit_cap: config.search.api_hit_cap,
            content_candidates: config.search.content_candidates,
            preview_chars: config.search.preview_chars,
            snippet_half_width: config.search.snippet_half_width,
            snippet_max_len: config.search.snippet_max_len,
            page_size: config.notion.page_size,
            pacing: Pacing::from_millis(config.search.request_delay_ms),
        }
    }
}

/// Keyed result set implementing the two overwrite rules.
#[derive(Debug, Default)]
pub struct Merger {
    entries: IndexMap<String, SearchResult>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a result with `score` for `id` would be accepted by [`offer`](Self::offer).
    pub fn would_accept(&self, id: &str, score: f64) -> bool {
        self.entries.get(id).map_or(true, |r| score > r.score)
    }

    /// Insert unless an existing entry for the same id scores at least as high.
    pub fn offer(&mut self, result: SearchResult) -> bool {
        if !self.would_accept(&result.node.id, result.score) {
            return false;
        }
        self.entries.insert(result.node.id.clone(), result);
        true
    }

    /// Insert unconditionally.
    pub fn force(&mut self, result: SearchResult) {
        self.entries.insert(result.node.id.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descending score, ties in insertion order, truncated.
    pub fn finish(self, max_results: usize) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self.entries.into_values().collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(max_results);
        results
    }
}

/// `max(0.5, 1 - 0.1 × position)`.
pub fn rank_decay(position: usize) -> f64 {
    (1.0 - 0.1 * position as f64).max(0.5)
}

/// Node for a remote hit that is not in the cache. The title is read from
/// the page title property only.
pub fn synthesize_node(record: &RawRecord) -> DocumentNode {
    DocumentNode {
        id: record.id.clone(),
        title: record
            .property_title()
            .unwrap_or_else(|| UNTITLED.to_string()),
        url: page_url(&record.id),
        parent_type: ParentKind::Unknown,
        parent_id: None,
        object_type: ObjectKind::from_wire(&record.object),
        created_time: record.created_time.clone(),
        last_edited_time: record.last_edited_time.clone(),
        archived: record.archived,
        children: Vec::new(),
        path: Vec::new(),
        depth: 0,
    }
}

/// Nodes whose title or path tokens intersect the query tokens.
pub fn metadata_candidates<'a>(snapshot: &'a Snapshot, query_tokens: &[String]) -> Vec<&'a DocumentNode> {
    if query_tokens.is_empty() {
        return Vec::new();
    }
    snapshot
        .nodes()
        .filter(|n| !n.archived)
        .filter(|n| {
            let title = token_set(&n.title);
            let path = token_set(&n.path.join(" "));
            query_tokens
                .iter()
                .any(|t| title.contains(t) || path.contains(t))
        })
        .collect()
}

/// Strategy B score and reason tags for one node.
pub fn metadata_score(query_tokens: &[String], node: &DocumentNode) -> (f64, Vec<String>) {
    let title = title_relevance(query_tokens, &node.title);
    let path = path_relevance(query_tokens, &node.path);
    let mut reasons = Vec::new();
    if title > 0.3 {
        reasons.push(REASON_TITLE.to_string());
    }
    if path > 0.3 {
        reasons.push(REASON_PATH.to_string());
    }
    (0.7 * title + 0.3 * path, reasons)
}

/// Ranked search over the workspace.
pub struct SearchEngine {
    cache: Arc<HierarchyCache>,
    gateway: Arc<dyn SourceGateway>,
    fetcher: Arc<dyn ContentFetcher>,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(
        cache: Arc<HierarchyCache>,
        gateway: Arc<dyn SourceGateway>,
        settings: SearchSettings,
    ) -> Self {
        let fetcher = Arc::new(BlockTextFetcher::new(gateway.clone()));
        Self {
            cache,
            gateway,
            fetcher,
            settings,
        }
    }

    /// Replace the content source used for previews and strategy C.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn cache(&self) -> &Arc<HierarchyCache> {
        &self.cache
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Leading preview of a page, empty on any failure.
    async fn preview(&self, page_id: &str) -> String {
        match self.fetcher.fetch_text(page_id).await {
            Ok(text) => leading_preview(&text, self.settings.preview_chars),
            Err(e) => {
                tracing::debug!(page_id, error = %e, "preview unavailable");
                String::new()
            }
        }
    }

    /// Strategy A: raw hits from the remote full-text search.
    async fn remote_hits(&self, query: &str) -> Vec<Value> {
        let request = SearchRequest {
            query: Some(query.to_string()),
            filter: None,
            page_size: self.settings.page_size,
            cursor: None,
        };
        let sweep = paginate(
            self.gateway.as_ref(),
            request,
            Some(self.settings.api_hit_cap),
            self.settings.pacing,
        )
        .await;
        if let Some(ref e) = sweep.error {
            tracing::warn!(query, kept = sweep.records.len(), error = %e, "remote search aborted");
        }
        sweep.records
    }

    /// Strategy C: cached pages whose text matches a specific query.
    async fn content_hits(&self, snapshot: &Snapshot, query: &str) -> Vec<(DocumentNode, String)> {
        if !is_specific_query(query) {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for node in snapshot
            .nodes()
            .filter(|n| !n.archived)
            .take(self.settings.content_candidates)
        {
            match self.fetcher.fetch_text(&node.id).await {
                Ok(text) if content_matches_query(query, &text) => hits.push((node.clone(), text)),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(page_id = %node.id, error = %e, "skipping page in content scan");
                }
            }
        }
        hits
    }

    /// Run all strategies and return up to `max_results` ranked results.
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let snapshot = self.cache.get_all(false).await;
        let tokens = tokenize(query);

        let remote = self.remote_hits(query).await;
        let metadata = metadata_candidates(&snapshot, &tokens);
        let content = self.content_hits(&snapshot, query).await;

        tracing::debug!(
            query,
            remote = remote.len(),
            metadata = metadata.len(),
            content = content.len(),
            "strategy candidates"
        );

        let mut merger = Merger::new();

        for (position, raw) in remote.iter().enumerate() {
            let record: RawRecord = match serde_json::from_value(raw.clone()) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed search hit");
                    continue;
                }
            };
            let node = snapshot
                .get(&record.id)
                .cloned()
                .unwrap_or_else(|| synthesize_node(&record));

            let score = 0.6 * rank_decay(position) + 0.4 * title_relevance(&tokens, &node.title);
            if !merger.would_accept(&node.id, score) {
                continue;
            }
            let preview = self.preview(&node.id).await;
            merger.offer(SearchResult {
                node,
                score,
                reasons: vec![REASON_REMOTE.to_string()],
                preview,
            });
        }

        for node in metadata {
            let (score, reasons) = metadata_score(&tokens, node);
            if !merger.would_accept(&node.id, score) {
                continue;
            }
            let preview = self.preview(&node.id).await;
            merger.offer(SearchResult {
                node: node.clone(),
                score,
                reasons,
                preview,
            });
        }

        for (node, text) in content {
            let score = (content_relevance(query, &text) + 0.3).min(1.0);
            let preview = snippet(
                query,
                &text,
                self.settings.snippet_half_width,
                self.settings.snippet_max_len,
            );
            merger.force(SearchResult {
                node,
                score,
                reasons: vec![REASON_CONTENT.to_string()],
                preview,
            });
        }

        merger.finish(max_results)
    }
}

/// Print results for the CLI.
pub fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.node.title);
        if !result.node.path.is_empty() {
            println!("    path: {}", result.node.path_display());
        }
        println!("    url: {}", result.node.url);
        println!("    why: {}", result.reasons.join(", "));
        if !result.preview.is_empty() {
            println!(
                "    excerpt: \"{}\"",
                result.preview.replace('\n', " ").trim()
            );
        }
        println!("    id: {}", result.node.id);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, title: &str, path: &[&str]) -> DocumentNode {
        DocumentNode {
            id: id.to_string(),
            title: title.to_string(),
            url: page_url(id),
            parent_type: ParentKind::Workspace,
            parent_id: None,
            object_type: ObjectKind::Page,
            created_time: String::new(),
            last_edited_time: String::new(),
            archived: false,
            children: vec![],
            path: path.iter().map(|s| s.to_string()).collect(),
            depth: path.len().saturating_sub(1),
        }
    }

    fn result(id: &str, score: f64, reason: &str) -> SearchResult {
        SearchResult {
            node: node(id, id, &[id]),
            score,
            reasons: vec![reason.to_string()],
            preview: String::new(),
        }
    }

    #[test]
    fn rank_decay_floors_at_half() {
        assert_eq!(rank_decay(0), 1.0);
        assert!((rank_decay(3) - 0.7).abs() < 1e-9);
        assert_eq!(rank_decay(5), 0.5);
        assert_eq!(rank_decay(40), 0.5);
    }

    #[test]
    fn offer_keeps_strictly_higher_scores_only() {
        let mut m = Merger::new();
        assert!(m.offer(result("a", 0.6, REASON_REMOTE)));
        assert!(!m.offer(result("a", 0.6, REASON_TITLE)));
        assert!(!m.offer(result("a", 0.4, REASON_TITLE)));
        assert!(m.offer(result("a", 0.8, REASON_TITLE)));
        let out = m.finish(10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reasons, vec![REASON_TITLE]);
    }

    #[test]
    fn content_result_always_wins() {
        let mut m = Merger::new();
        m.offer(result("a", 0.98, REASON_REMOTE));
        m.force(result("a", 0.5, REASON_CONTENT));
        let out = m.finish(10);
        assert_eq!(out[0].score, 0.5);
        assert_eq!(out[0].reasons, vec![REASON_CONTENT]);
    }

    #[test]
    fn finish_sorts_descending_and_keeps_tie_order() {
        let mut m = Merger::new();
        m.offer(result("first", 0.5, REASON_TITLE));
        m.offer(result("top", 0.9, REASON_TITLE));
        m.offer(result("second", 0.5, REASON_TITLE));
        m.offer(result("third", 0.5, REASON_TITLE));
        let ids: Vec<String> = m.finish(3).into_iter().map(|r| r.node.id).collect();
        assert_eq!(ids, vec!["top", "first", "second"]);
    }

    #[test]
    fn metadata_score_tags_reasons() {
        let tokens = tokenize("alpha launch");
        let n = node("x", "Alpha Launch Plan", &["Engineering", "Alpha Launch Plan"]);
        let (score, reasons) = metadata_score(&tokens, &n);
        assert!((score - (0.7 + 0.3 * 0.8)).abs() < 1e-9);
        assert_eq!(reasons, vec![REASON_TITLE, REASON_PATH]);

        let deep = node("y", "Notes", &["Alpha", "Notes"]);
        let (score, reasons) = metadata_score(&tokens, &deep);
        assert!((score - 0.3 * 0.4).abs() < 1e-9);
        assert_eq!(reasons, vec![REASON_PATH]);
    }

    #[test]
    fn synthesized_node_has_unknown_parent_and_empty_path() {
        let record: RawRecord = serde_json::from_value(serde_json::json!({
            "id": "ab-cd",
            "object": "page",
            "archived": true,
            "properties": {"Name": {"type": "title", "title": [{"plain_text": "Remote Only"}]}}
        }))
        .unwrap();
        let n = synthesize_node(&record);
        assert_eq!(n.title, "Remote Only");
        assert_eq!(n.parent_type, ParentKind::Unknown);
        assert!(n.path.is_empty());
        assert_eq!(n.depth, 0);
        assert!(n.archived);
        assert_eq!(n.url, "https://www.notion.so/abcd");
    }

    #[test]
    fn synthesized_database_ignores_root_title() {
        let record: RawRecord = serde_json::from_value(serde_json::json!({
            "id": "db-1",
            "object": "database",
            "title": [{"plain_text": "Tasks"}],
            "properties": {"Name": {"type": "title"}}
        }))
        .unwrap();
        let n = synthesize_node(&record);
        assert_eq!(n.title, UNTITLED);
        assert_eq!(n.object_type, ObjectKind::Database);
    }
}
