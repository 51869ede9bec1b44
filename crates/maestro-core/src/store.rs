//! In-memory run registry

use dashmap::DashMap;
use uuid::Uuid;

use crate::run::PipelineRunResult;

/// Thread-safe registry of pipeline run records, keyed by run id.
///
/// The pipeline inserts every finished run; callers fetch, enumerate and
/// evict records concurrently without holding a lock across the map.
#[derive(Default)]
pub struct RunStore {
    runs: DashMap<Uuid, PipelineRunResult>,
}

impl RunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a run record, replacing any previous record with the same id.
    pub fn insert(&self, result: PipelineRunResult) {
        self.runs.insert(result.run_id, result);
    }

    /// Fetches a copy of a run record.
    #[must_use]
    pub fn get(&self, run_id: &Uuid) -> Option<PipelineRunResult> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    /// Ids of all stored runs, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<Uuid> {
        self.runs.iter().map(|entry| *entry.key()).collect()
    }

    /// Removes a run record, returning it if it was present.
    pub fn remove(&self, run_id: &Uuid) -> Option<PipelineRunResult> {
        self.runs.remove(run_id).map(|(_, result)| result)
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove_round_trip() {
        let store = RunStore::new();
        let result = PipelineRunResult::new("task-board");
        let run_id = result.run_id;

        store.insert(result);
        assert_eq!(store.len(), 1);

        let fetched = store.get(&run_id).unwrap();
        assert_eq!(fetched.feature_name, "task-board");

        let removed = store.remove(&run_id).unwrap();
        assert_eq!(removed.run_id, run_id);
        assert!(store.is_empty());
        assert!(store.get(&run_id).is_none());
    }

    #[test]
    fn test_list_returns_all_ids() {
        let store = RunStore::new();
        let first = PipelineRunResult::new("a");
        let second = PipelineRunResult::new("b");
        let ids = [first.run_id, second.run_id];
        store.insert(first);
        store.insert(second);

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert!(ids.iter().all(|id| listed.contains(id)));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let store = RunStore::new();
        let mut result = PipelineRunResult::new("a");
        store.insert(result.clone());
        result.add_warning("second write");
        store.insert(result.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&result.run_id).unwrap().warnings.len(), 1);
    }
}
