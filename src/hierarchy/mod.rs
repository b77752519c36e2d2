//! Page hierarchy cache.
//!
//! [`HierarchyCache`] owns the current [`Snapshot`] and decides when to
//! rebuild it. Consumers receive `Arc<Snapshot>` views and never mutate them.
//!
//! # Lookup order for [`HierarchyCache::get_all`]
//!
//! 1. The in-memory snapshot, when fresh and not forced.
//! 2. The on-disk snapshot, when fresh and non-empty.
//! 3. A full rebuild: page sweep, database sweep, build, persist, swap.
//!
//! Rebuilds are single-flight. A caller that queued behind a rebuild reuses
//! its result instead of sweeping the workspace again.

pub mod build;
pub mod snapshot;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::gateway::{paginate, Pacing, SearchRequest, SourceGateway};
use crate::models::{DocumentNode, ObjectKind};

pub use snapshot::Snapshot;

/// Deepest level sampled by [`HierarchyCache::stats`].
const SAMPLE_MAX_DEPTH: usize = 3;

/// Knobs for the cache, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Snapshot file. `None` keeps the cache in memory only.
    pub path: Option<PathBuf>,
    pub ttl: Duration,
    pub page_size: u32,
    pub pacing: Pacing,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: Some(config.cache.path.clone()),
            ttl: config.cache.ttl(),
            page_size: config.notion.page_size,
            pacing: Pacing::from_millis(config.search.request_delay_ms),
        }
    }

    /// In-memory settings with no pacing, for tests and one-shot tools.
    pub fn ephemeral(ttl: Duration) -> Self {
        Self {
            path: None,
            ttl,
            page_size: 100,
            pacing: Pacing::none(),
        }
    }
}

/// One sample node per depth, as reported by [`HierarchyStats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SamplePath {
    pub depth: usize,
    pub title: String,
    pub path: String,
    pub id: String,
}

/// Aggregate shape of the hierarchy.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HierarchyStats {
    pub total_pages: usize,
    pub top_level_pages: usize,
    pub max_depth: usize,
    pub archived_pages: usize,
    pub pages_by_depth: BTreeMap<usize, usize>,
    pub sample_paths: Vec<SamplePath>,
}

impl HierarchyStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut pages_by_depth = BTreeMap::new();
        let mut top_level_pages = 0;
        let mut archived_pages = 0;
        let mut max_depth = 0;

        for node in snapshot.nodes() {
            *pages_by_depth.entry(node.depth).or_insert(0) += 1;
            if node.is_root() {
                top_level_pages += 1;
            }
            if node.archived {
                archived_pages += 1;
            }
            max_depth = max_depth.max(node.depth);
        }

        let sample_paths = (0..=max_depth.min(SAMPLE_MAX_DEPTH))
            .filter_map(|depth| {
                snapshot
                    .nodes()
                    .find(|n| n.depth == depth && !n.archived)
                    .map(|n| SamplePath {
                        depth,
                        title: n.title.clone(),
                        path: n.path_display(),
                        id: n.id.clone(),
                    })
            })
            .collect();

        Self {
            total_pages: snapshot.len(),
            top_level_pages,
            max_depth,
            archived_pages,
            pages_by_depth,
            sample_paths,
        }
    }
}

/// Owner of the workspace hierarchy.
pub struct HierarchyCache {
    gateway: Arc<dyn SourceGateway>,
    settings: CacheSettings,
    current: RwLock<Arc<Snapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl HierarchyCache {
    pub fn new(gateway: Arc<dyn SourceGateway>, settings: CacheSettings) -> Self {
        Self {
            gateway,
            settings,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            rebuild_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(gateway: Arc<dyn SourceGateway>, config: &Config) -> Self {
        Self::new(gateway, CacheSettings::from_config(config))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The current snapshot without any freshness check.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().unwrap().clone()
    }

    /// Number of completed rebuilds.
    pub fn rebuilds(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn fresh_in_memory(&self) -> Option<Arc<Snapshot>> {
        let snap = self.snapshot();
        snap.is_fresh_at(Utc::now(), self.settings.ttl).then_some(snap)
    }

    fn install(&self, snapshot: Arc<Snapshot>) {
        *self.current.write().unwrap() = snapshot;
    }

    fn load_persisted(&self) -> Option<Arc<Snapshot>> {
        let path = self.settings.path.as_ref()?;
        let snap = snapshot::load(path, Utc::now(), self.settings.ttl)?;
        if snap.is_empty() {
            return None;
        }
        tracing::debug!(path = %path.display(), pages = snap.len(), "loaded page cache");
        Some(Arc::new(snap))
    }

    /// Return a valid snapshot, rebuilding if needed or if `force_refresh`.
    pub async fn get_all(&self, force_refresh: bool) -> Arc<Snapshot> {
        if !force_refresh {
            if let Some(snap) = self.fresh_in_memory() {
                return snap;
            }
        }

        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = self.rebuild_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != seen {
            // Someone rebuilt while we waited.
            return self.snapshot();
        }

        if !force_refresh {
            if let Some(snap) = self.fresh_in_memory() {
                return snap;
            }
            if let Some(snap) = self.load_persisted() {
                self.install(snap.clone());
                return snap;
            }
        }

        self.rebuild().await
    }

    /// Force a rebuild.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        self.get_all(true).await
    }

    /// Caller must hold `rebuild_lock`.
    async fn rebuild(&self) -> Arc<Snapshot> {
        let started = Instant::now();
        let mut records = Vec::new();
        let mut failed_sweeps = 0;

        for kind in [ObjectKind::Page, ObjectKind::Database] {
            let request = SearchRequest {
                query: None,
                filter: Some(kind),
                page_size: self.settings.page_size,
                cursor: None,
            };
            let sweep = paginate(self.gateway.as_ref(), request, None, self.settings.pacing).await;
            if let Some(ref e) = sweep.error {
                failed_sweeps += 1;
                tracing::warn!(
                    kind = kind.as_str(),
                    fetched = sweep.records.len(),
                    error = %e,
                    "sweep aborted, keeping partial results"
                );
            }
            records.extend(sweep.records);
        }

        let (mut nodes, mut titles) = build::ingest(&records);
        let report = build::build_hierarchy(&mut nodes, &mut titles);
        let snap = Arc::new(Snapshot::new(nodes, titles, Utc::now()));

        tracing::info!(
            records = records.len(),
            pages = snap.len(),
            roots = report.roots + report.reclassified_roots,
            pruned = report.pruned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hierarchy rebuilt"
        );

        if let Some(ref path) = self.settings.path {
            if snap.is_empty() && failed_sweeps > 0 {
                tracing::warn!("not persisting empty hierarchy after failed sweeps");
            } else if let Err(e) = snapshot::save(&snap, path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist page cache");
            }
        }

        self.install(snap.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        snap
    }

    /// Exact lookup through the title index, or the first case-insensitive
    /// substring match in title-index order when `exact` is false.
    pub async fn find_by_title(&self, title: &str, exact: bool) -> Option<DocumentNode> {
        let snap = self.get_all(false).await;
        if exact {
            return snap.by_title(title).cloned();
        }
        let needle = title.to_lowercase();
        let found = snap
            .titles()
            .find(|(t, _)| t.to_lowercase().contains(&needle))
            .and_then(|(_, id)| snap.get(id).cloned());
        found
    }

    /// Nodes whose first `parts.len()` path elements each contain the
    /// corresponding part, case-insensitively.
    pub async fn find_by_path(&self, parts: &[String]) -> Vec<DocumentNode> {
        let snap = self.get_all(false).await;
        let wanted: Vec<String> = parts.iter().map(|p| p.to_lowercase()).collect();
        snap.nodes()
            .filter(|n| n.path.len() >= wanted.len())
            .filter(|n| {
                wanted
                    .iter()
                    .zip(&n.path)
                    .all(|(part, elem)| elem.to_lowercase().contains(part.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Non-archived workspace roots.
    pub async fn top_level(&self) -> Vec<DocumentNode> {
        let snap = self.get_all(false).await;
        snap.nodes()
            .filter(|n| n.is_root() && !n.archived)
            .cloned()
            .collect()
    }

    /// Direct children of `id` in link order. Unknown ids have none.
    pub async fn children(&self, id: &str) -> Vec<DocumentNode> {
        let snap = self.get_all(false).await;
        let Some(parent) = snap.get(id) else {
            return Vec::new();
        };
        parent
            .children
            .iter()
            .filter_map(|c| snap.get(c).cloned())
            .collect()
    }

    pub async fn stats(&self) -> HierarchyStats {
        let snap = self.get_all(false).await;
        HierarchyStats::from_snapshot(&snap)
    }

    /// Lookup in the current snapshot without refreshing.
    pub fn get_by_id(&self, id: &str) -> Option<DocumentNode> {
        self.snapshot().get(id).cloned()
    }

    /// Non-archived nodes whose title contains `query`, case-insensitively,
    /// from the current snapshot without refreshing.
    pub fn search_titles(&self, query: &str, limit: usize) -> Vec<DocumentNode> {
        let needle = query.to_lowercase();
        self.snapshot()
            .nodes()
            .filter(|n| !n.archived && n.title.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }
}
