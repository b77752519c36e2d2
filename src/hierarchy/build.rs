//! Hierarchy construction from raw records.
//!
//! # Algorithm
//!
//! 1. Ingest: decode each record into a [`DocumentNode`] with empty
//!    hierarchy fields. Records that fail to decode are dropped.
//! 2. Link: append every node whose parent is present to that parent's
//!    `children`.
//! 3. Walk: breadth-first from every workspace-parented node, assigning
//!    `path = parent.path + [title]` and `depth = parent.depth + 1`.
//! 4. Reclassify: any unvisited workspace-parented node without a parent id
//!    becomes a root.
//! 5. Prune: every node still unvisited is an orphan; it is removed together
//!    with everything reachable through its `children`.

use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::Value;

use crate::models::{page_url, DocumentNode, ObjectKind, ParentKind, RawParent, RawRecord};

/// Id → node mapping in ingestion order.
pub type NodeMap = IndexMap<String, DocumentNode>;
/// Title → id reverse index. Later titles overwrite earlier ones.
pub type TitleIndex = IndexMap<String, String>;

/// Counts reported by [`build_hierarchy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub roots: usize,
    pub reclassified_roots: usize,
    pub orphans: usize,
    pub pruned: usize,
}

fn parent_of(parent: Option<&RawParent>) -> (ParentKind, Option<String>) {
    match parent {
        Some(p) if p.kind == "page_id" => (ParentKind::Page, p.page_id.clone()),
        Some(p) if p.kind == "database_id" => (ParentKind::Database, p.database_id.clone()),
        _ => (ParentKind::Workspace, None),
    }
}

/// Convert one raw search record into a node with empty hierarchy fields.
pub fn record_to_node(value: &Value) -> Result<DocumentNode> {
    let record: RawRecord =
        serde_json::from_value(value.clone()).context("record does not match page schema")?;
    if record.id.is_empty() {
        anyhow::bail!("record has an empty id");
    }

    let (parent_type, parent_id) = parent_of(record.parent.as_ref());

    Ok(DocumentNode {
        url: page_url(&record.id),
        title: record.display_title(),
        parent_type,
        parent_id,
        object_type: ObjectKind::from_wire(&record.object),
        created_time: record.created_time,
        last_edited_time: record.last_edited_time,
        archived: record.archived,
        children: Vec::new(),
        path: Vec::new(),
        depth: 0,
        id: record.id,
    })
}

/// Decode a batch of records into the node map and title index.
pub fn ingest(records: &[Value]) -> (NodeMap, TitleIndex) {
    let mut nodes = NodeMap::new();
    let mut titles = TitleIndex::new();

    for value in records {
        match record_to_node(value) {
            Ok(node) => {
                titles.insert(node.title.clone(), node.id.clone());
                nodes.insert(node.id.clone(), node);
            }
            Err(e) => {
                let id = value.get("id").and_then(Value::as_str).unwrap_or("?");
                tracing::warn!(id, error = %e, "dropping malformed record");
            }
        }
    }

    (nodes, titles)
}

/// Populate `children`, `path` and `depth`, then prune orphaned subtrees
/// from both maps.
pub fn build_hierarchy(nodes: &mut NodeMap, titles: &mut TitleIndex) -> BuildReport {
    let mut report = BuildReport::default();

    for node in nodes.values_mut() {
        node.children.clear();
    }

    let links: Vec<(String, String)> = nodes
        .values()
        .filter_map(|n| {
            n.parent_id
                .as_ref()
                .filter(|pid| nodes.contains_key(*pid))
                .map(|pid| (pid.clone(), n.id.clone()))
        })
        .collect();
    for (parent_id, child_id) in links {
        if let Some(parent) = nodes.get_mut(&parent_id) {
            parent.children.push(child_id);
        }
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for node in nodes.values_mut() {
        if node.parent_type == ParentKind::Workspace {
            node.path = vec![node.title.clone()];
            node.depth = 0;
            visited.insert(node.id.clone());
            queue.push_back(node.id.clone());
            report.roots += 1;
        }
    }

    while let Some(current_id) = queue.pop_front() {
        let Some(current) = nodes.get(&current_id) else {
            continue;
        };
        let parent_path = current.path.clone();
        let parent_depth = current.depth;
        let children = current.children.clone();

        for child_id in children {
            if visited.contains(&child_id) {
                continue;
            }
            if let Some(child) = nodes.get_mut(&child_id) {
                let mut path = parent_path.clone();
                path.push(child.title.clone());
                child.path = path;
                child.depth = parent_depth + 1;
                visited.insert(child_id.clone());
                queue.push_back(child_id);
            }
        }
    }

    let mut orphans = Vec::new();
    for node in nodes.values_mut() {
        if visited.contains(&node.id) {
            continue;
        }
        if node.parent_type == ParentKind::Workspace && node.parent_id.is_none() {
            node.path = vec![node.title.clone()];
            node.depth = 0;
            visited.insert(node.id.clone());
            report.reclassified_roots += 1;
        } else {
            orphans.push(node.id.clone());
        }
    }
    report.orphans = orphans.len();

    let doomed = orphan_closure(nodes, &orphans);
    for id in &doomed {
        if let Some(node) = nodes.shift_remove(id) {
            if titles.get(&node.title) == Some(id) {
                titles.shift_remove(&node.title);
            }
        }
    }
    report.pruned = doomed.len();

    report
}

/// Every id reachable from `orphans` through child links, orphans included.
/// Iterative with a visited set, so cyclic child graphs terminate.
fn orphan_closure(nodes: &NodeMap, orphans: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<&str> = orphans.iter().map(String::as_str).collect();

    while let Some(id) = stack.pop() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        out.push(id.to_string());
        stack.extend(node.children.iter().map(String::as_str));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(id: &str, title: &str, parent: Value) -> Value {
        json!({
            "id": id,
            "object": "page",
            "parent": parent,
            "properties": {"title": {"type": "title", "title": [{"plain_text": title}]}},
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-01-02T00:00:00.000Z",
            "archived": false
        })
    }

    fn root(id: &str, title: &str) -> Value {
        page(id, title, json!({"type": "workspace", "workspace": true}))
    }

    fn under(id: &str, title: &str, parent: &str) -> Value {
        page(id, title, json!({"type": "page_id", "page_id": parent}))
    }

    fn built(records: &[Value]) -> (NodeMap, TitleIndex, BuildReport) {
        let (mut nodes, mut titles) = ingest(records);
        let report = build_hierarchy(&mut nodes, &mut titles);
        (nodes, titles, report)
    }

    #[test]
    fn child_path_extends_parent_path() {
        let (nodes, _, report) = built(&[root("a", "Projects"), under("b", "Alpha", "a")]);
        let b = &nodes["b"];
        assert_eq!(b.path, vec!["Projects", "Alpha"]);
        assert_eq!(b.depth, 1);
        assert_eq!(nodes["a"].children, vec!["b"]);
        assert_eq!(report.roots, 1);
        assert_eq!(report.pruned, 0);
    }

    #[test]
    fn child_listed_before_parent_still_resolves() {
        let (nodes, _, _) = built(&[
            under("c", "Gamma", "b"),
            under("b", "Beta", "a"),
            root("a", "Root"),
        ]);
        assert_eq!(nodes["c"].path, vec!["Root", "Beta", "Gamma"]);
        assert_eq!(nodes["c"].depth, 2);
    }

    #[test]
    fn database_parent_links_rows() {
        let db = json!({
            "id": "db",
            "object": "database",
            "title": [{"plain_text": "Tasks"}],
            "parent": {"type": "page_id", "page_id": "a"}
        });
        let row = page("r1", "Write docs", json!({"type": "database_id", "database_id": "db"}));
        let (nodes, _, _) = built(&[root("a", "Home"), db, row]);
        assert_eq!(nodes["db"].object_type, ObjectKind::Database);
        assert_eq!(nodes["r1"].parent_type, ParentKind::Database);
        assert_eq!(nodes["r1"].path, vec!["Home", "Tasks", "Write docs"]);
    }

    #[test]
    fn orphan_and_its_subtree_are_pruned() {
        let (nodes, titles, report) = built(&[
            root("a", "Home"),
            under("c", "Lost", "missing"),
            under("d", "Lost Child", "c"),
            under("e", "Lost Grandchild", "d"),
        ]);
        assert!(nodes.contains_key("a"));
        for id in ["c", "d", "e"] {
            assert!(!nodes.contains_key(id), "{id} should be pruned");
        }
        assert!(!titles.contains_key("Lost"));
        assert!(!titles.contains_key("Lost Child"));
        assert_eq!(report.orphans, 3);
        assert_eq!(report.pruned, 3);
    }

    #[test]
    fn pruning_keeps_title_owned_by_surviving_node() {
        let (nodes, titles, _) = built(&[
            under("x", "Shared", "missing"),
            root("y", "Shared"),
        ]);
        assert!(!nodes.contains_key("x"));
        assert_eq!(titles.get("Shared").map(String::as_str), Some("y"));
    }

    #[test]
    fn duplicate_titles_alias_to_last_write() {
        let (_, titles, _) = built(&[root("a", "Notes"), root("b", "Notes")]);
        assert_eq!(titles.get("Notes").map(String::as_str), Some("b"));
    }

    #[test]
    fn parent_cycle_is_pruned_without_looping() {
        let (nodes, _, report) = built(&[
            root("r", "Root"),
            under("p", "P", "q"),
            under("q", "Q", "p"),
        ]);
        assert_eq!(nodes.len(), 1);
        assert_eq!(report.pruned, 2);
    }

    #[test]
    fn malformed_records_are_dropped() {
        let (nodes, _, _) = built(&[
            root("a", "Home"),
            json!({"object": "page"}),
            json!({"id": 42}),
            json!("garbage"),
        ]);
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let records = vec![
            root("a", "Home"),
            under("b", "Docs", "a"),
            under("c", "Guide", "b"),
            under("z", "Stray", "nowhere"),
        ];
        let (first, _, _) = built(&records);
        let (mut again, mut titles) = ingest(&records);
        build_hierarchy(&mut again, &mut titles);
        build_hierarchy(&mut again, &mut titles);
        for (id, node) in &first {
            assert_eq!(node.path, again[id].path);
            assert_eq!(node.depth, again[id].depth);
            assert_eq!(node.children, again[id].children);
        }
        assert_eq!(first.len(), again.len());
    }

    #[test]
    fn structural_invariants_hold() {
        let records = vec![
            root("a", "A"),
            root("b", "B"),
            under("a1", "A1", "a"),
            under("a2", "A2", "a"),
            under("a1x", "A1x", "a1"),
            under("b1", "B1", "b"),
            under("o", "Orphan", "ghost"),
            under("o1", "Orphan child", "o"),
        ];
        let (nodes, _, _) = built(&records);

        for node in nodes.values() {
            assert_eq!(node.depth + 1, node.path.len());
            match node.parent_id.as_ref() {
                Some(pid) => {
                    let parent = nodes.get(pid).expect("parent must survive");
                    assert_eq!(node.depth, parent.depth + 1);
                    let mut expected = parent.path.clone();
                    expected.push(node.title.clone());
                    assert_eq!(node.path, expected);
                }
                None => assert_eq!(node.parent_type, ParentKind::Workspace),
            }
            for child in &node.children {
                assert!(nodes.contains_key(child), "dangling child {child}");
            }
        }
    }
}
