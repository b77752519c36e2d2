//! Fixture workspace shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use notion_harness::config::Config;
use notion_harness::gateway::memory::InMemoryGateway;
use notion_harness::gateway::SourceGateway;
use notion_harness::hierarchy::{CacheSettings, HierarchyCache};
use notion_harness::models::Block;
use notion_harness::search::{SearchEngine, SearchSettings};
use notion_harness::traits::ToolContext;
use serde_json::{json, Value};

pub const HOUR: Duration = Duration::from_secs(3600);

pub fn page(id: &str, title: &str, parent: Option<&str>) -> Value {
    let parent = match parent {
        Some(p) => json!({"type": "page_id", "page_id": p}),
        None => json!({"type": "workspace", "workspace": true}),
    };
    json!({
        "id": id,
        "object": "page",
        "parent": parent,
        "archived": false,
        "created_time": "2024-01-01T00:00:00.000Z",
        "last_edited_time": "2024-02-01T00:00:00.000Z",
        "properties": {"title": {"type": "title", "title": [{"plain_text": title}]}}
    })
}

pub fn archived(mut record: Value) -> Value {
    record["archived"] = json!(true);
    record
}

/// ```text
/// Engineering
/// ├── Database Setup Guide
/// └── Projects
///     └── Alpha
/// Operations
/// ├── Database Password Rotation Policy
/// └── Team Notes
/// Old Database (archived)
/// Lost (parent missing)
/// ```
pub fn workspace() -> InMemoryGateway {
    InMemoryGateway::new()
        .with_records(vec![
            page("eng", "Engineering", None),
            page("ops", "Operations", None),
            archived(page("old", "Old Database", None)),
            page("db-guide", "Database Setup Guide", Some("eng")),
            page("projects", "Projects", Some("eng")),
            page("alpha", "Alpha", Some("projects")),
            page("rotation", "Database Password Rotation Policy", Some("ops")),
            page("notes", "Team Notes", Some("ops")),
            page("lost", "Lost", Some("ghost")),
        ])
        .with_blocks(
            "eng",
            vec![
                Block::text("heading_1", "Engineering"),
                Block::text("paragraph", "Meeting notes live elsewhere."),
            ],
        )
        .with_blocks(
            "db-guide",
            vec![Block::text("paragraph", "Install Postgres and run migrations.")],
        )
        .with_blocks(
            "rotation",
            vec![
                Block::text("paragraph", "The rotation of the database password happens quarterly."),
                Block::text("bulleted_list_item", "Notify the on-call team first."),
            ],
        )
        .with_blocks(
            "notes",
            vec![Block::text("paragraph", "The database password is abc123")],
        )
}

pub fn engine_over(gw: Arc<InMemoryGateway>) -> SearchEngine {
    engine_with(gw, SearchSettings::default())
}

pub fn engine_with(gw: Arc<InMemoryGateway>, settings: SearchSettings) -> SearchEngine {
    let gateway: Arc<dyn SourceGateway> = gw;
    let cache = Arc::new(HierarchyCache::new(
        gateway.clone(),
        CacheSettings::ephemeral(HOUR),
    ));
    SearchEngine::new(cache, gateway, settings)
}

/// Tool context over the gateway with an in-memory cache and no pacing.
pub fn context_over(gw: Arc<InMemoryGateway>) -> ToolContext {
    let gateway: Arc<dyn SourceGateway> = gw;
    let cache = Arc::new(HierarchyCache::new(
        gateway.clone(),
        CacheSettings::ephemeral(HOUR),
    ));
    let engine = Arc::new(SearchEngine::new(
        cache.clone(),
        gateway.clone(),
        SearchSettings::default(),
    ));
    ToolContext::from_parts(Arc::new(Config::minimal()), gateway, cache, engine)
}
