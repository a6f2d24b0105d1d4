//! Run storage.
//!
//! The store owns the persisted Runs. Status writes are compare-and-swap on
//! `resource_version`, so a pass computed from a stale snapshot is rejected
//! instead of overwriting newer state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use runrelay_reconcile::{Run, RunKey, RunStatus};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of the change feed before slow subscribers lag.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Errors returned by a [`RunStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No Run with this key.
    #[error("run not found: {0}")]
    NotFound(RunKey),

    /// A Run with this key already exists.
    #[error("run already exists: {0}")]
    AlreadyExists(RunKey),

    /// The Run changed since it was read.
    #[error("conflict updating {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: RunKey,
        expected: u64,
        actual: u64,
    },

    /// The backing store is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    StatusChanged,
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: RunKey,
    pub kind: ChangeKind,
}

/// Persisted Run state.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Fetch the current snapshot of a Run.
    async fn get(&self, key: &RunKey) -> Result<Option<Run>, StoreError>;

    /// List all Runs in key order.
    async fn list(&self) -> Result<Vec<Run>, StoreError>;

    /// Persist a new Run. Its status is reset and its version set to 1.
    async fn create(&self, run: Run) -> Result<Run, StoreError>;

    /// Replace a Run's status if its version still equals `expected_version`.
    async fn update_status(
        &self,
        key: &RunKey,
        expected_version: u64,
        status: RunStatus,
    ) -> Result<Run, StoreError>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory [`RunStore`].
pub struct MemoryRunStore {
    runs: RwLock<BTreeMap<RunKey, Run>>,
    changes: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRunStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            runs: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    fn publish(&self, key: RunKey, kind: ChangeKind) {
        // No subscribers is fine.
        let _ = self.changes.send(StoreEvent { key, kind });
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn get(&self, key: &RunKey) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        Ok(self.runs.read().await.values().cloned().collect())
    }

    async fn create(&self, mut run: Run) -> Result<Run, StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.key) {
            return Err(StoreError::AlreadyExists(run.key));
        }

        run.resource_version = 1;
        run.status = RunStatus::default();
        runs.insert(run.key.clone(), run.clone());
        drop(runs);

        debug!(run = %run.key, "Run created");
        self.publish(run.key.clone(), ChangeKind::Created);
        Ok(run)
    }

    async fn update_status(
        &self,
        key: &RunKey,
        expected_version: u64,
        status: RunStatus,
    ) -> Result<Run, StoreError> {
        let mut runs = self.runs.write().await;
        let Some(current) = runs.get_mut(key) else {
            return Err(StoreError::NotFound(key.clone()));
        };

        if current.resource_version != expected_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: expected_version,
                actual: current.resource_version,
            });
        }

        current.status = status;
        current.resource_version += 1;
        let updated = current.clone();
        drop(runs);

        debug!(
            run = %key,
            resource_version = updated.resource_version,
            "Run status updated"
        );
        self.publish(key.clone(), ChangeKind::StatusChanged);
        Ok(updated)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runrelay_reconcile::{Condition, RunSpec, RunState};

    fn run(name: &str) -> Run {
        Run::new(RunKey::new("default", name).unwrap(), RunSpec::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryRunStore::new();
        let mut feed = store.subscribe();

        let mut input = run("r1");
        input.status.condition.state = RunState::Succeeded;
        let created = store.create(input).await.unwrap();
        assert_eq!(created.resource_version, 1);
        assert_eq!(created.status, RunStatus::default());

        let fetched = store.get(&created.key).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let event = feed.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.key, created.key);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let store = MemoryRunStore::new();
        store.create(run("r1")).await.unwrap();
        let err = store.create(run("r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_status_cas() {
        let store = MemoryRunStore::new();
        let created = store.create(run("r1")).await.unwrap();

        let status = RunStatus {
            condition: Condition::failed("MissingURL", "url param was not passed", chrono::Utc::now()),
            ..Default::default()
        };
        let updated = store
            .update_status(&created.key, 1, status.clone())
            .await
            .unwrap();
        assert_eq!(updated.resource_version, 2);
        assert_eq!(updated.status, status);

        // Stale writer loses.
        let err = store
            .update_status(&created.key, 1, RunStatus::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                key: created.key.clone(),
                expected: 1,
                actual: 2,
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryRunStore::new();
        let key = RunKey::new("default", "ghost").unwrap();
        let err = store
            .update_status(&key, 1, RunStatus::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(key));
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let store = MemoryRunStore::new();
        store.create(run("b")).await.unwrap();
        store.create(run("a")).await.unwrap();
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
