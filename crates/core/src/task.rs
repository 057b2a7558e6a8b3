//! Task model - a vertex of the bisection task graph.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::payload::Payload;
use crate::Time;

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Bisection orchestrator
    FindCulprit,
    /// Metric extraction from one test run
    ReadValue,
    /// One test run
    RunTest,
    /// Build of one change
    FindIsolate,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FindCulprit => "find_culprit",
            Self::ReadValue => "read_value",
            Self::RunTest => "run_test",
            Self::FindIsolate => "find_isolate",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not started
    Pending,
    /// Started, waiting on external work
    Ongoing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Skipped by the runtime from now on
    Cancelled,
}

impl TaskState {
    /// Whether the owning evaluator will never touch the task again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A task-level error record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Stable machine-readable reason, e.g. `BisectionFailed`
    pub reason: String,

    /// Human-readable message
    pub message: String,
}

impl ErrorMessage {
    /// Create a new error record.
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// A vertex proposed for addition to a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskVertex {
    /// Vertex id
    pub id: TaskId,

    /// Vertex type
    pub task_type: TaskType,

    /// Initial payload
    pub payload: Payload,
}

impl TaskVertex {
    /// Create a new vertex.
    pub fn new(id: impl Into<TaskId>, task_type: TaskType, payload: Payload) -> Self {
        Self {
            id: id.into(),
            task_type,
            payload,
        }
    }
}

/// A dependency edge: `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    /// Dependent task
    pub from: TaskId,

    /// Task depended upon
    pub to: TaskId,
}

impl Dependency {
    /// Create a new edge.
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A task in a job's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the job
    pub id: TaskId,

    /// Task type
    pub task_type: TaskType,

    /// Current state
    pub state: TaskState,

    /// Typed payload
    pub payload: Payload,

    /// Tasks this one depends on
    pub dependencies: Vec<TaskId>,

    /// Errors recorded against this task
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,

    /// Bumped on every state or payload update
    pub version: u64,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Materialize a vertex as a fresh pending task.
    pub fn from_vertex(vertex: TaskVertex) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: vertex.id,
            task_type: vertex.task_type,
            state: TaskState::Pending,
            payload: vertex.payload,
            dependencies: Vec::new(),
            errors: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any error with the given reason was recorded.
    pub fn has_error(&self, reason: &str) -> bool {
        self.errors.iter().any(|e| e.reason == reason)
    }
}
