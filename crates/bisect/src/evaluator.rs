//! The complete bisection evaluator.

use culprit_core::TaskType;
use culprit_execution::DispatchByTaskType;
use culprit_reader::{read_value_evaluator, ArtifactSource};
use crate::collaborators::{BuildService, CommitHistory, TestService};
use crate::config::BisectConfig;
use crate::find_culprit::find_culprit_evaluator;
use crate::isolate::find_isolate_evaluator;
use crate::test_runner::run_test_evaluator;

/// Evaluator handling every task type of a bisection job.
pub fn bisection_evaluator(
    history: impl CommitHistory + 'static,
    builds: impl BuildService + 'static,
    tests: impl TestService + 'static,
    artifacts: impl ArtifactSource + 'static,
    config: &BisectConfig,
) -> DispatchByTaskType {
    DispatchByTaskType::new()
        .with(TaskType::FindIsolate, find_isolate_evaluator(builds))
        .with(TaskType::RunTest, run_test_evaluator(tests))
        .with(TaskType::ReadValue, read_value_evaluator(artifacts))
        .with(
            TaskType::FindCulprit,
            find_culprit_evaluator(history, config.speculation_levels),
        )
}
