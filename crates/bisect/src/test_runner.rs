//! The run_test evaluator: runs one test attempt against a build.

use culprit_core::{
    Action, Event, EventPayload, Payload, RunTestPayload, Task, TaskGraph, TaskState, TaskType,
    TestStatus,
};
use culprit_execution::predicates::{all, task_state_in, task_type_eq};
use culprit_execution::{EvalResult, EvaluationError, Evaluator, FilteringEvaluator};
use tracing::{debug, warn};
use crate::collaborators::TestService;
use crate::isolate::COLLABORATOR_ERROR;

/// Reason recorded when the build this test needs failed.
pub const BUILD_ISOLATE_NOT_FOUND: &str = "BuildIsolateNotFound";
/// Reason recorded when the test itself failed.
pub const TEST_FAILED: &str = "TestFailed";

/// Schedules tests once their build is available.
pub struct RunTestEvaluator<T> {
    tests: T,
}

impl<T: TestService> RunTestEvaluator<T> {
    /// Create an evaluator scheduling tests on `tests`.
    pub fn new(tests: T) -> Self {
        Self { tests }
    }
}

fn apply_status(task: &Task, mut payload: RunTestPayload, status: TestStatus) -> Vec<Action> {
    match status {
        TestStatus::Scheduled { test_id } => {
            if task.state == TaskState::Ongoing {
                return Vec::new();
            }
            payload.output.test_id = Some(test_id);
            vec![Action::update(task, TaskState::Ongoing, Payload::RunTest(payload))]
        }
        TestStatus::Completed { output_location } => {
            debug!("Test {} wrote {}", task.id, output_location);
            payload.output.output_location = Some(output_location);
            vec![Action::update(task, TaskState::Completed, Payload::RunTest(payload))]
        }
        TestStatus::Failed { reason } => {
            warn!("Test {} failed: {}", task.id, reason);
            Action::fail(task, TEST_FAILED, reason, Some(Payload::RunTest(payload)))
        }
    }
}

impl<T: TestService> Evaluator for RunTestEvaluator<T> {
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult {
        let Payload::RunTest(payload) = &task.payload else {
            return Err(EvaluationError::PayloadMismatch {
                task: task.id.clone(),
                expected: TaskType::RunTest,
            });
        };

        if task.state == TaskState::Ongoing {
            if !event.is_update_for(&task.id) {
                return Ok(Vec::new());
            }
            return match &event.payload {
                EventPayload::TestUpdate(status) => Ok(apply_status(task, payload.clone(), status.clone())),
                _ => Ok(Vec::new()),
            };
        }

        let isolate = graph
            .dependencies_of(task)
            .find(|d| d.task_type == TaskType::FindIsolate)
            .ok_or_else(|| EvaluationError::MissingDependency {
                task: task.id.clone(),
                expected: TaskType::FindIsolate,
            })?;

        match isolate.state {
            TaskState::Completed => {}
            TaskState::Failed | TaskState::Cancelled => {
                return Ok(Action::fail(
                    task,
                    BUILD_ISOLATE_NOT_FOUND,
                    format!("Task dependency \"{}\" ended in {} state.", isolate.id, isolate.state),
                    None,
                ));
            }
            _ => return Ok(Vec::new()),
        }

        let artifact = isolate
            .payload
            .as_find_isolate()
            .and_then(|p| p.output.artifact.as_ref())
            .ok_or_else(|| EvaluationError::invariant(task, format!("{} completed without an artifact", isolate.id)))?;

        match self.tests.schedule_test(
            &payload.input.test_options,
            artifact,
            &payload.input.change,
            payload.input.index,
        ) {
            Ok(status) => Ok(apply_status(task, payload.clone(), status)),
            Err(e) => Ok(Action::fail(task, COLLABORATOR_ERROR, e.to_string(), None)),
        }
    }
}

/// The run_test evaluator, limited to live run_test tasks.
pub fn run_test_evaluator(tests: impl TestService + 'static) -> FilteringEvaluator {
    FilteringEvaluator::new(
        all(vec![
            task_type_eq(TaskType::RunTest),
            task_state_in([TaskState::Pending, TaskState::Ongoing]),
        ]),
        RunTestEvaluator::new(tests),
    )
}
