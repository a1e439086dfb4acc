//! Generic immutable snapshot with an atomically swapped slot.
//!
//! A [`Snapshot`] is built off-lock from a full primary-store read and then
//! published by swapping one `Arc` under a short write lock. Readers clone
//! the `Arc` and drop the lock immediately, so they always see one
//! complete version.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sqlward_state::{Record, StateResult};
use tracing::{debug, warn};

/// One published version of an entity collection.
#[derive(Debug)]
pub struct Snapshot<T> {
    rows: Vec<T>,
    by_id: HashMap<u64, usize>,
    by_key: HashMap<String, usize>,
    generation: u64,
}

impl<T: Record> Snapshot<T> {
    fn build(rows: Vec<T>) -> Self {
        let mut by_id = HashMap::with_capacity(rows.len());
        let mut by_key = HashMap::new();
        for (pos, row) in rows.iter().enumerate() {
            if let Some(id) = row.id() {
                by_id.insert(id, pos);
            }
            if let Some(key) = row.lookup_key() {
                by_key.insert(key.to_string(), pos);
            }
        }
        Self {
            rows,
            by_id,
            by_key,
            generation: 0,
        }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Number of successful swaps that led to this version; `0` is the
    /// empty startup snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.by_id.get(&id).map(|&pos| &self.rows[pos])
    }

    pub fn lookup(&self, key: &str) -> Option<&T> {
        self.by_key.get(key).map(|&pos| &self.rows[pos])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { rows: usize, generation: u64 },
    /// The previous snapshot is still published.
    Failed,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

/// Holder of the current snapshot for one entity type.
pub struct SnapshotSlot<T> {
    name: &'static str,
    current: RwLock<Arc<Snapshot<T>>>,
}

impl<T: Record> SnapshotSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: RwLock::new(Arc::new(Snapshot::build(Vec::new()))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Index `rows` and swap them in. Returns the new generation.
    pub fn publish(&self, rows: Vec<T>) -> u64 {
        let mut next = Snapshot::build(rows);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        next.generation = current.generation + 1;
        let generation = next.generation;
        *current = Arc::new(next);
        generation
    }

    /// Run `load` on the blocking pool under `deadline` and publish its
    /// rows. Any failure (error, panic, deadline) keeps the previous
    /// snapshot and is only logged.
    pub async fn refresh<F>(&self, deadline: Duration, load: F) -> RefreshOutcome
    where
        F: FnOnce() -> StateResult<Vec<T>> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(load);
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(rows))) => {
                let count = rows.len();
                let generation = self.publish(rows);
                debug!(entity = self.name, rows = count, generation, "snapshot refreshed");
                RefreshOutcome::Refreshed {
                    rows: count,
                    generation,
                }
            }
            Ok(Ok(Err(e))) => {
                warn!(entity = self.name, error = %e, "snapshot refresh failed, keeping previous");
                RefreshOutcome::Failed
            }
            Ok(Err(e)) => {
                warn!(entity = self.name, error = %e, "snapshot loader panicked, keeping previous");
                RefreshOutcome::Failed
            }
            Err(_) => {
                warn!(
                    entity = self.name,
                    deadline_ms = deadline.as_millis() as u64,
                    "snapshot refresh timed out, keeping previous"
                );
                RefreshOutcome::Failed
            }
        }
    }

    /// The current version. Cheap: one `Arc` clone under a read lock.
    pub fn read_all(&self) -> Arc<Snapshot<T>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.read_all().rows.iter().find(|row| pred(row)).cloned()
    }

    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.read_all()
            .rows
            .iter()
            .filter(|row| pred(row))
            .cloned()
            .collect()
    }

    pub fn page(&self, offset: usize, limit: usize) -> Vec<T> {
        self.read_all()
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<T> {
        self.read_all().get(id).cloned()
    }

    pub fn lookup(&self, key: &str) -> Option<T> {
        self.read_all().lookup(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_all().is_empty()
    }

    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.read_all().rows.iter().any(pred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlward_state::StateError;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u64,
        key: String,
        version: u64,
    }

    impl Record for Row {
        fn id(&self) -> Option<u64> {
            Some(self.id)
        }

        fn lookup_key(&self) -> Option<&str> {
            Some(&self.key)
        }
    }

    fn rows(version: u64, count: u64) -> Vec<Row> {
        (1..=count)
            .map(|id| Row {
                id,
                key: format!("k{id}"),
                version,
            })
            .collect()
    }

    const DEADLINE: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn refresh_publishes_exactly_the_loaded_rows() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        assert!(slot.is_empty());
        assert_eq!(slot.read_all().generation(), 0);

        let outcome = slot.refresh(DEADLINE, || Ok(rows(1, 3))).await;
        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed {
                rows: 3,
                generation: 1
            }
        );
        assert_eq!(slot.read_all().rows(), rows(1, 3).as_slice());
        assert_eq!(slot.get(2).unwrap().key, "k2");
        assert_eq!(slot.lookup("k3").unwrap().id, 3);
        assert!(slot.get(9).is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        slot.publish(rows(1, 2));

        let outcome = slot
            .refresh(DEADLINE, || Err(StateError::Read("disk gone".into())))
            .await;
        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(slot.read_all().rows(), rows(1, 2).as_slice());
        assert_eq!(slot.read_all().generation(), 1);
    }

    #[tokio::test]
    async fn panicking_loader_keeps_previous_snapshot() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        slot.publish(rows(1, 2));

        let outcome = slot
            .refresh(DEADLINE, || -> StateResult<Vec<Row>> { panic!("loader bug") })
            .await;
        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(slot.len(), 2);
    }

    #[tokio::test]
    async fn slow_loader_hits_deadline() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        slot.publish(rows(1, 1));

        let outcome = slot
            .refresh(Duration::from_millis(20), || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(rows(2, 5))
            })
            .await;
        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(slot.read_all().rows(), rows(1, 1).as_slice());
    }

    #[test]
    fn query_helpers() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        slot.publish(rows(1, 10));

        assert_eq!(slot.find(|r| r.id > 4).unwrap().id, 5);
        assert_eq!(slot.filter(|r| r.id % 2 == 0).len(), 5);
        let page: Vec<u64> = slot.page(8, 5).iter().map(|r| r.id).collect();
        assert_eq!(page, vec![9, 10]);
        assert!(slot.page(20, 5).is_empty());
        assert!(slot.any(|r| r.key == "k7"));
        assert!(!slot.any(|r| r.key == "k70"));
    }

    #[test]
    fn held_snapshot_is_not_affected_by_swap() {
        let slot: SnapshotSlot<Row> = SnapshotSlot::new("rows");
        slot.publish(rows(1, 2));
        let held = slot.read_all();

        slot.publish(rows(2, 4));
        assert_eq!(held.len(), 2);
        assert!(held.rows().iter().all(|r| r.version == 1));
        assert_eq!(slot.read_all().generation(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_mixed_versions() {
        let slot: Arc<SnapshotSlot<Row>> = Arc::new(SnapshotSlot::new("rows"));
        slot.publish(rows(0, 50));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let slot = Arc::clone(&slot);
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = slot.read_all();
                    let first = snapshot.rows()[0].version;
                    assert!(snapshot.rows().iter().all(|r| r.version == first));
                    assert_eq!(snapshot.len(), 50);
                    tokio::task::yield_now().await;
                }
            }));
        }

        for version in 1..=200 {
            slot.publish(rows(version, 50));
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(slot.read_all().generation(), 201);
    }
}
