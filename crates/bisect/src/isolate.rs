//! The find_isolate evaluator: builds a change.

use culprit_core::{
    Action, BuildStatus, Event, EventPayload, FindIsolatePayload, Payload, Task, TaskGraph,
    TaskState, TaskType,
};
use culprit_execution::predicates::{all, task_state_in, task_type_eq};
use culprit_execution::{EvalResult, EvaluationError, Evaluator, FilteringEvaluator};
use tracing::{debug, warn};
use crate::collaborators::BuildService;

/// Reason recorded when the build failed.
pub const BUILD_FAILED: &str = "BuildFailed";
/// Reason recorded when a service refused a request.
pub const COLLABORATOR_ERROR: &str = "CollaboratorError";

/// Requests builds and records their outcome.
pub struct FindIsolateEvaluator<B> {
    builds: B,
}

impl<B: BuildService> FindIsolateEvaluator<B> {
    /// Create an evaluator requesting builds from `builds`.
    pub fn new(builds: B) -> Self {
        Self { builds }
    }
}

fn apply_status(task: &Task, mut payload: FindIsolatePayload, status: BuildStatus) -> Vec<Action> {
    match status {
        BuildStatus::Scheduled { build_id } => {
            if task.state == TaskState::Ongoing {
                return Vec::new();
            }
            payload.output.build_id = Some(build_id);
            vec![Action::update(task, TaskState::Ongoing, Payload::FindIsolate(payload))]
        }
        BuildStatus::Completed { artifact } => {
            debug!("Build for {} completed: {}", task.id, artifact.hash);
            payload.output.artifact = Some(artifact);
            vec![Action::update(task, TaskState::Completed, Payload::FindIsolate(payload))]
        }
        BuildStatus::Failed { reason } => {
            warn!("Build for {} failed: {}", task.id, reason);
            Action::fail(task, BUILD_FAILED, reason, Some(Payload::FindIsolate(payload)))
        }
    }
}

impl<B: BuildService> Evaluator for FindIsolateEvaluator<B> {
    fn evaluate(&self, task: &Task, event: &Event, _graph: &TaskGraph) -> EvalResult {
        let Payload::FindIsolate(payload) = &task.payload else {
            return Err(EvaluationError::PayloadMismatch {
                task: task.id.clone(),
                expected: TaskType::FindIsolate,
            });
        };

        match task.state {
            TaskState::Pending => {
                match self
                    .builds
                    .request_build(&payload.input.build_options, &payload.input.change)
                {
                    Ok(status) => Ok(apply_status(task, payload.clone(), status)),
                    Err(e) => Ok(Action::fail(task, COLLABORATOR_ERROR, e.to_string(), None)),
                }
            }
            TaskState::Ongoing if event.is_update_for(&task.id) => match &event.payload {
                EventPayload::BuildUpdate(status) => Ok(apply_status(task, payload.clone(), status.clone())),
                _ => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }
}

/// The find_isolate evaluator, limited to live find_isolate tasks.
pub fn find_isolate_evaluator(builds: impl BuildService + 'static) -> FilteringEvaluator {
    FilteringEvaluator::new(
        all(vec![
            task_type_eq(TaskType::FindIsolate),
            task_state_in([TaskState::Pending, TaskState::Ongoing]),
        ]),
        FindIsolateEvaluator::new(builds),
    )
}
