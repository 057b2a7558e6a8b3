//! Mutations evaluators ask the runtime to apply.

use serde::{Deserialize, Serialize};
use crate::graph::GraphExtension;
use crate::id::TaskId;
use crate::payload::Payload;
use crate::task::{ErrorMessage, Task, TaskState};

/// A single graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Replace a task's state and/or payload, optionally recording an
    /// error in the same transaction.
    UpdateTask {
        /// Task to update
        id: TaskId,
        /// Version observed by the evaluator
        expected_version: u64,
        /// New state, if changing
        state: Option<TaskState>,
        /// New payload, if changing
        payload: Option<Payload>,
        /// Error recorded along with the update
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorMessage>,
    },

    /// Add vertices and edges.
    ExtendGraph(GraphExtension),

    /// Record an error on a task without changing its state.
    AppendError {
        /// Task to annotate
        id: TaskId,
        /// The error
        error: ErrorMessage,
    },
}

impl Action {
    /// Change only the state.
    pub fn update_state(id: &TaskId, expected_version: u64, state: TaskState) -> Self {
        Self::UpdateTask {
            id: id.clone(),
            expected_version,
            state: Some(state),
            payload: None,
            error: None,
        }
    }

    /// Change only the payload of an observed task.
    pub fn update_payload(task: &Task, payload: Payload) -> Self {
        Self::UpdateTask {
            id: task.id.clone(),
            expected_version: task.version,
            state: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Change state and payload of an observed task.
    pub fn update(task: &Task, state: TaskState, payload: Payload) -> Self {
        Self::UpdateTask {
            id: task.id.clone(),
            expected_version: task.version,
            state: Some(state),
            payload: Some(payload),
            error: None,
        }
    }

    /// Fail the task and record why. The error is only kept if the update
    /// itself applies.
    pub fn fail(
        task: &Task,
        reason: impl Into<String>,
        message: impl Into<String>,
        payload: Option<Payload>,
    ) -> Vec<Self> {
        vec![Self::UpdateTask {
            id: task.id.clone(),
            expected_version: task.version,
            state: Some(TaskState::Failed),
            payload,
            error: Some(ErrorMessage::new(reason, message)),
        }]
    }

    /// Error the action records, if any.
    pub fn error(&self) -> Option<&ErrorMessage> {
        match self {
            Self::UpdateTask { error, .. } => error.as_ref(),
            Self::AppendError { error, .. } => Some(error),
            Self::ExtendGraph(_) => None,
        }
    }

    /// Task the action targets, if it targets exactly one.
    pub fn target(&self) -> Option<&TaskId> {
        match self {
            Self::UpdateTask { id, .. } | Self::AppendError { id, .. } => Some(id),
            Self::ExtendGraph(_) => None,
        }
    }
}
