//! Graph store abstraction.

use async_trait::async_trait;
use culprit_core::{Action, GraphError, GraphExtension, JobId, TaskGraph};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Job already populated
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    /// The action was rejected by the graph
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl StoreError {
    /// Whether the error is a rejected amendment or version conflict.
    /// Such errors leave the stored graph untouched and are not fatal.
    pub fn is_amendment(&self) -> bool {
        matches!(self, Self::Graph(e) if e.is_amendment())
    }
}

/// Persistence for per-job task graphs.
///
/// Every `apply` is its own transaction: it either fully applies one action
/// to the stored graph or leaves it unchanged and reports why.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create a job's graph from its initial vertices and edges.
    async fn populate(&self, job: JobId, extension: GraphExtension) -> Result<()>;

    /// Load a snapshot of a job's graph.
    async fn load(&self, job: JobId) -> Result<TaskGraph>;

    /// Apply one action to a job's graph.
    async fn apply(&self, job: JobId, action: Action) -> Result<()>;

    /// List all known jobs.
    async fn list_jobs(&self) -> Result<Vec<JobId>>;
}
