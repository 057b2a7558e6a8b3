//! In-memory graph store.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use culprit_core::{Action, GraphExtension, JobId, TaskGraph};
use tokio::sync::Mutex;
use tracing::debug;
use super::{GraphStore, Result, StoreError};

/// Graph store that keeps every job in process memory.
///
/// Clones share the same jobs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    jobs: Arc<Mutex<HashMap<JobId, TaskGraph>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn populate(&self, job: JobId, extension: GraphExtension) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job) {
            return Err(StoreError::AlreadyExists(job));
        }
        let graph = TaskGraph::from_extension(extension)?;
        debug!("Populated job {} with {} tasks", job, graph.len());
        jobs.insert(job, graph);
        Ok(())
    }

    async fn load(&self, job: JobId) -> Result<TaskGraph> {
        self.jobs
            .lock()
            .await
            .get(&job)
            .cloned()
            .ok_or(StoreError::NotFound(job))
    }

    async fn apply(&self, job: JobId, action: Action) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let graph = jobs.get_mut(&job).ok_or(StoreError::NotFound(job))?;
        graph.apply(action)?;
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<JobId>> {
        let mut jobs: Vec<JobId> = self.jobs.lock().await.keys().copied().collect();
        jobs.sort();
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culprit_core::{Payload, TaskId, TaskState, TaskType, TaskVertex};

    fn extension() -> GraphExtension {
        GraphExtension {
            vertices: vec![TaskVertex::new("a", TaskType::RunTest, Payload::Empty)],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn test_populate_and_load() {
        let store = InMemoryStore::new();
        let job = JobId::new();
        store.populate(job, extension()).await.unwrap();

        let graph = store.load(job).await.unwrap();
        assert!(graph.contains(&TaskId::new("a")));

        let err = store.populate(job, extension()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.list_jobs().await.unwrap(), vec![job]);
    }

    #[tokio::test]
    async fn test_apply_conflict_is_amendment() {
        let store = InMemoryStore::new();
        let job = JobId::new();
        store.populate(job, extension()).await.unwrap();
        let id = TaskId::new("a");

        store
            .apply(job, Action::update_state(&id, 0, TaskState::Ongoing))
            .await
            .unwrap();
        let err = store
            .apply(job, Action::update_state(&id, 0, TaskState::Completed))
            .await
            .unwrap_err();
        assert!(err.is_amendment());
        assert_eq!(
            store.load(job).await.unwrap().get(&id).unwrap().state,
            TaskState::Ongoing
        );
    }

    #[tokio::test]
    async fn test_missing_job() {
        let store = InMemoryStore::new();
        let err = store.load(JobId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_amendment());
    }
}
