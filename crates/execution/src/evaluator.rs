//! The evaluator contract.

use culprit_core::{Action, Event, Task, TaskGraph, TaskId, TaskType};

/// Invariant violations raised by evaluators.
///
/// The runtime fails the offending task with reason `AssertionError`; these
/// are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// Task carries a payload of the wrong type
    #[error("task {task} does not carry a {expected} payload")]
    PayloadMismatch {
        /// Offending task
        task: TaskId,
        /// Payload type the evaluator expected
        expected: TaskType,
    },

    /// A dependency the evaluator relies on is absent
    #[error("task {task} is missing its {expected} dependency")]
    MissingDependency {
        /// Offending task
        task: TaskId,
        /// Dependency type the evaluator expected
        expected: TaskType,
    },

    /// Any other broken invariant
    #[error("invariant violated on {task}: {message}")]
    Invariant {
        /// Offending task
        task: TaskId,
        /// What went wrong
        message: String,
    },
}

impl EvaluationError {
    /// Build an [`EvaluationError::Invariant`].
    pub fn invariant(task: &Task, message: impl Into<String>) -> Self {
        Self::Invariant {
            task: task.id.clone(),
            message: message.into(),
        }
    }
}

/// Result of evaluating one task.
pub type EvalResult = Result<Vec<Action>, EvaluationError>;

/// Type-specific logic invoked by the runtime for every task of a pass.
///
/// Evaluators are pure with respect to the graph: they read the snapshot
/// and return the actions they want applied.
pub trait Evaluator: Send + Sync {
    /// Decide what to do with `task` given the triggering event and the
    /// graph snapshot of this pass.
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult;
}

impl<F> Evaluator for F
where
    F: Fn(&Task, &Event, &TaskGraph) -> EvalResult + Send + Sync,
{
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult {
        self(task, event, graph)
    }
}
