//! Hierarchy snapshot and its on-disk form.
//!
//! The persisted file is JSON:
//!
//! ```json
//! { "timestamp": "2025-01-01T12:00:00Z", "pages": [ { "id": "...", "title": "...", ... } ] }
//! ```
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! concurrent reader sees either the old or the new snapshot. Any problem
//! reading the file is a cache miss.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::build::{NodeMap, TitleIndex};
use crate::models::DocumentNode;

/// Immutable view of the workspace hierarchy at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: NodeMap,
    titles: TitleIndex,
    updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// A snapshot that has never been built. Never fresh.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(nodes: NodeMap, titles: TitleIndex, updated_at: DateTime<Utc>) -> Self {
        Self {
            nodes,
            titles,
            updated_at: Some(updated_at),
        }
    }

    /// Rebuild a snapshot from already-structured nodes, re-deriving the
    /// title index in order.
    pub fn from_nodes(pages: Vec<DocumentNode>, updated_at: DateTime<Utc>) -> Self {
        let mut nodes = NodeMap::new();
        let mut titles = TitleIndex::new();
        for page in pages {
            titles.insert(page.title.clone(), page.id.clone());
            nodes.insert(page.id.clone(), page);
        }
        Self::new(nodes, titles, updated_at)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// True iff `now - updated_at < ttl`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (self.updated_at, chrono::Duration::from_std(ttl)) {
            (Some(at), Ok(ttl)) => now.signed_duration_since(at) < ttl,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DocumentNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Exact title lookup through the reverse index.
    pub fn by_title(&self, title: &str) -> Option<&DocumentNode> {
        self.titles.get(title).and_then(|id| self.nodes.get(id))
    }

    /// Nodes in ingestion order.
    pub fn nodes(&self) -> impl Iterator<Item = &DocumentNode> {
        self.nodes.values()
    }

    /// `(title, id)` pairs of the reverse index in insertion order.
    pub fn titles(&self) -> impl Iterator<Item = (&String, &String)> {
        self.titles.iter()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    timestamp: DateTime<Utc>,
    pages: Vec<DocumentNode>,
}

/// Write the snapshot to `path` atomically.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let timestamp = snapshot.updated_at.unwrap_or_else(Utc::now);
    let file = SnapshotFile {
        timestamp,
        pages: snapshot.nodes.values().cloned().collect(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(&file).context("Failed to serialize snapshot")?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// Load a snapshot if the file exists, parses, and is younger than `ttl`
/// at `now`. Every failure is reported as `None`.
pub fn load(path: &Path, now: DateTime<Utc>, ttl: Duration) -> Option<Snapshot> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable page cache");
            return None;
        }
    };

    let file: SnapshotFile = match serde_json::from_str(&content) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt page cache ignored");
            return None;
        }
    };

    let snapshot = Snapshot::from_nodes(file.pages, file.timestamp);
    if !snapshot.is_fresh_at(now, ttl) {
        tracing::debug!(path = %path.display(), timestamp = %file.timestamp, "page cache is stale");
        return None;
    }

    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectKind, ParentKind};
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn node(id: &str, title: &str, path: &[&str]) -> DocumentNode {
        DocumentNode {
            id: id.to_string(),
            title: title.to_string(),
            url: crate::models::page_url(id),
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

    #[test]
    fn freshness_follows_ttl() {
        let t = Utc::now();
        let snap = Snapshot::from_nodes(vec![node("a", "A", &["A"])], t);
        assert!(snap.is_fresh_at(t + chrono::Duration::minutes(59), HOUR));
        assert!(!snap.is_fresh_at(t + chrono::Duration::minutes(61), HOUR));
        assert!(!Snapshot::empty().is_fresh_at(t, HOUR));
    }

    #[test]
    fn save_then_load_preserves_order_and_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache").join("pages.json");
        let t = Utc::now();
        let snap = Snapshot::from_nodes(
            vec![node("z", "Zed", &["Zed"]), node("a", "Ay", &["Ay"])],
            t,
        );
        save(&snap, &path).unwrap();

        let loaded = load(&path, t, HOUR).expect("fresh snapshot");
        let ids: Vec<&str> = loaded.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
        assert_eq!(loaded.get("z"), snap.get("z"));
        assert_eq!(loaded.by_title("Ay").map(|n| n.id.as_str()), Some("a"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn stale_file_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pages.json");
        let t = Utc::now();
        save(&Snapshot::from_nodes(vec![node("a", "A", &["A"])], t), &path).unwrap();
        assert!(load(&path, t + chrono::Duration::minutes(61), HOUR).is_none());
        assert!(load(&path, t + chrono::Duration::minutes(59), HOUR).is_some());
    }

    #[test]
    fn corrupt_or_missing_file_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pages.json");
        assert!(load(&path, Utc::now(), HOUR).is_none());
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(&path, Utc::now(), HOUR).is_none());
    }

    #[test]
    fn persisted_field_names_are_stable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pages.json");
        save(&Snapshot::from_nodes(vec![node("a", "A", &["A"])], Utc::now()), &path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["timestamp"].is_string());
        let page = &raw["pages"][0];
        for key in [
            "id",
            "title",
            "url",
            "parent_type",
            "parent_id",
            "object_type",
            "created_time",
            "last_edited_time",
            "archived",
            "children",
            "path",
            "depth",
        ] {
            assert!(page.get(key).is_some(), "missing {key}");
        }
        assert_eq!(page["parent_type"], "workspace");
    }
}
