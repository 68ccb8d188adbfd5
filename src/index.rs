//! Task snapshots and the providers that serve them.
//!
//! A snapshot is immutable. Refreshing the index publishes a new snapshot
//! with a higher version; searches holding the old one are unaffected.

use std::sync::{Arc, Mutex, RwLock};

use crate::db::Database;
use crate::models::Task;

/// Immutable view of the task set at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub tasks: Arc<Vec<Arc<Task>>>,
}

impl Snapshot {
    pub fn new(version: u64, tasks: Vec<Task>) -> Self {
        Self {
            version,
            tasks: Arc::new(tasks.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Whether a snapshot can be served right now.
#[derive(Debug, Clone)]
pub enum IndexState {
    Ready(Snapshot),
    /// Still loading or never populated. Not an error.
    NotReady { reason: String },
    /// The backing store failed; no snapshot could be read.
    Unavailable { reason: String },
}

impl IndexState {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }
}

/// Source of task snapshots.
///
/// This trait lets the search service run over an in-memory set in tests
/// and over the SQLite store in the binary.
pub trait TaskIndex: Send + Sync {
    fn snapshot(&self) -> IndexState;
}

/// Task index held entirely in memory.
#[derive(Debug)]
pub struct MemoryTaskIndex {
    current: RwLock<Option<Snapshot>>,
}

impl Default for MemoryTaskIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskIndex {
    /// Creates an index that reports not ready until tasks are published.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Creates a ready index at version 1.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            current: RwLock::new(Some(Snapshot::new(1, tasks))),
        }
    }

    /// Publishes a new task set and returns its version.
    pub fn replace(&self, tasks: Vec<Task>) -> u64 {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let version = current.as_ref().map_or(1, |s| s.version + 1);
        *current = Some(Snapshot::new(version, tasks));
        version
    }
}

impl TaskIndex for MemoryTaskIndex {
    fn snapshot(&self) -> IndexState {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(snapshot) => IndexState::Ready(snapshot.clone()),
            None => IndexState::not_ready("task index is still loading"),
        }
    }
}

/// Task index backed by the SQLite store.
///
/// The store is re-read only when its index version changes.
pub struct StoreTaskIndex {
    inner: Mutex<StoreState>,
}

struct StoreState {
    db: Database,
    cached: Option<Snapshot>,
}

impl StoreTaskIndex {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Mutex::new(StoreState { db, cached: None }),
        }
    }
}

impl StoreState {
    fn load(&mut self) -> anyhow::Result<Option<Snapshot>> {
        let version = self.db.index_version()?;
        if version == 0 {
            return Ok(None);
        }
        if let Some(cached) = &self.cached
            && cached.version == version
        {
            return Ok(Some(cached.clone()));
        }
        let snapshot = Snapshot::new(version, self.db.load_all()?);
        tracing::debug!(version, tasks = snapshot.len(), "loaded task snapshot");
        self.cached = Some(snapshot.clone());
        Ok(Some(snapshot))
    }
}

impl TaskIndex for StoreTaskIndex {
    fn snapshot(&self) -> IndexState {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match state.load() {
            Ok(Some(snapshot)) => IndexState::Ready(snapshot),
            Ok(None) => IndexState::not_ready("no tasks imported yet; run `tasklens import <DIR>`"),
            Err(e) => {
                tracing::warn!(error = %e, "task store unavailable");
                IndexState::Unavailable {
                    reason: format!("{e:#}"),
                }
            }
        }
    }
}
