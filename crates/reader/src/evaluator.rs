//! The read_value evaluator.

use culprit_core::{
    Action, Event, Payload, ReadMode, ReadValueInput, ReadValueOutput, Task, TaskGraph, TaskState,
    TaskType,
};
use culprit_execution::predicates::{all, task_state_in, task_type_eq};
use culprit_execution::{EvalResult, EvaluationError, Evaluator, FilteringEvaluator};
use tracing::{debug, warn};
use crate::artifact::ArtifactSource;
use crate::error::{ReadValueError, Result};
use crate::extract::{read_graph_json, read_histogram_sets};

/// Reason recorded when the upstream test failed.
pub const DEPENDENCY_FAILED: &str = "DependencyFailed";

/// Reads metric values once the run_test a read_value depends on is done.
pub struct ReadValueEvaluator<A> {
    artifacts: A,
}

impl<A: ArtifactSource> ReadValueEvaluator<A> {
    /// Create an evaluator reading through `artifacts`.
    pub fn new(artifacts: A) -> Self {
        Self { artifacts }
    }

    fn read(&self, output_location: &str, input: &ReadValueInput) -> Result<ReadValueOutput> {
        if let ReadMode::Unsupported(mode) = &input.mode {
            return Err(ReadValueError::UnsupportedMode(mode.clone()));
        }

        let contents = self
            .artifacts
            .fetch(output_location, &input.results_path)?
            .ok_or_else(|| ReadValueError::NoFile(input.results_path.clone()))?;
        let doc: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| ReadValueError::Malformed(e.to_string()))?;

        match &input.mode {
            ReadMode::HistogramSets => {
                let extracted = read_histogram_sets(&doc, &input.histogram_options)?;
                Ok(ReadValueOutput {
                    result_values: extracted.values,
                    trace_urls: extracted.trace_urls,
                })
            }
            ReadMode::GraphJson => Ok(ReadValueOutput {
                result_values: read_graph_json(&doc, &input.graph_json_options)?,
                trace_urls: Vec::new(),
            }),
            ReadMode::Unsupported(mode) => Err(ReadValueError::UnsupportedMode(mode.clone())),
        }
    }
}

impl<A: ArtifactSource> Evaluator for ReadValueEvaluator<A> {
    fn evaluate(&self, task: &Task, _event: &Event, graph: &TaskGraph) -> EvalResult {
        let Payload::ReadValue(payload) = &task.payload else {
            return Err(EvaluationError::PayloadMismatch {
                task: task.id.clone(),
                expected: TaskType::ReadValue,
            });
        };
        let run_test = graph
            .dependencies_of(task)
            .find(|d| d.task_type == TaskType::RunTest)
            .ok_or_else(|| EvaluationError::MissingDependency {
                task: task.id.clone(),
                expected: TaskType::RunTest,
            })?;

        let mut payload = payload.clone();
        match run_test.state {
            TaskState::Completed => {}
            TaskState::Failed => {
                payload.tries += 1;
                return Ok(Action::fail(
                    task,
                    DEPENDENCY_FAILED,
                    format!("Task dependency \"{}\" ended in failed state.", run_test.id),
                    Some(Payload::ReadValue(payload)),
                ));
            }
            _ => return Ok(Vec::new()),
        }
        payload.tries += 1;

        let output_location = run_test
            .payload
            .as_run_test()
            .and_then(|p| p.output.output_location.as_deref());
        let read = match output_location {
            Some(location) => self.read(location, &payload.input),
            None => Err(ReadValueError::NoFile(payload.input.results_path.clone())),
        };

        match read {
            Ok(output) => {
                debug!("Read {} values for {}", output.result_values.len(), task.id);
                payload.output = output;
                Ok(vec![Action::update(task, TaskState::Completed, Payload::ReadValue(payload))])
            }
            Err(e) => {
                warn!("Reading values for {} failed: {}", task.id, e);
                Ok(Action::fail(task, e.reason(), e.to_string(), Some(Payload::ReadValue(payload))))
            }
        }
    }
}

/// The read_value evaluator, limited to pending read_value tasks.
pub fn read_value_evaluator(artifacts: impl ArtifactSource + 'static) -> FilteringEvaluator {
    FilteringEvaluator::new(
        all(vec![
            task_type_eq(TaskType::ReadValue),
            task_state_in([TaskState::Pending]),
        ]),
        ReadValueEvaluator::new(artifacts),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifacts;
    use culprit_core::{
        Change, Commit, Dependency, GraphExtension, HistogramOptions, ReadValuePayload,
        RunTestInput, RunTestOutput, RunTestPayload, TaskId, TaskVertex, TestOptions,
    };
    use serde_json::json;

    const RESULTS: &str = "speedometer/perf_results.json";

    fn change() -> Change {
        Change::from_commit(Commit::new("chromium", "abc"))
    }

    fn graph(mode: ReadMode, run_state: TaskState, output_location: Option<&str>) -> TaskGraph {
        let read = ReadValuePayload {
            input: ReadValueInput {
                benchmark: "speedometer".to_string(),
                mode,
                results_path: RESULTS.to_string(),
                histogram_options: HistogramOptions {
                    histogram_name: Some("Total".to_string()),
                    ..Default::default()
                },
                graph_json_options: Default::default(),
                change: change(),
            },
            index: 0,
            tries: 0,
            output: Default::default(),
        };
        let run = RunTestPayload {
            input: RunTestInput {
                test_options: TestOptions::default(),
                change: change(),
                index: 0,
            },
            output: RunTestOutput {
                test_id: Some("t0".to_string()),
                output_location: output_location.map(str::to_string),
            },
        };
        let mut graph = TaskGraph::from_extension(GraphExtension {
            vertices: vec![
                TaskVertex::new("read", TaskType::ReadValue, Payload::ReadValue(read)),
                TaskVertex::new("run", TaskType::RunTest, Payload::RunTest(run)),
            ],
            edges: vec![Dependency::new("read", "run")],
        })
        .unwrap();
        graph
            .apply(Action::update_state(&TaskId::new("run"), 0, run_state))
            .unwrap();
        graph
    }

    fn artifacts() -> InMemoryArtifacts {
        let doc = json!([{
            "name": "Total",
            "unit": "ms",
            "diagnostics": {"traceUrls": {"type": "GenericSet", "values": ["https://t/run/1.html"]}},
            "sampleValues": [101.0, 99.0]
        }]);
        InMemoryArtifacts::new().with_file("out/0", RESULTS, doc.to_string())
    }

    fn run(graph: &TaskGraph) -> Vec<Action> {
        let evaluator = read_value_evaluator(artifacts());
        let task = graph.get(&TaskId::new("read")).unwrap();
        evaluator.evaluate(task, &Event::initiate(), graph).unwrap()
    }

    fn failure_reason(actions: &[Action]) -> String {
        match actions[0].error() {
            Some(error) => error.reason.clone(),
            None => panic!("expected an error, got {:?}", actions[0]),
        }
    }

    #[test]
    fn test_reads_histogram_values() {
        let graph = graph(ReadMode::HistogramSets, TaskState::Completed, Some("out/0"));
        let actions = run(&graph);
        assert_eq!(actions.len(), 1);
        let Action::UpdateTask { state, payload: Some(Payload::ReadValue(payload)), .. } = &actions[0] else {
            panic!("expected a payload update");
        };
        assert_eq!(*state, Some(TaskState::Completed));
        assert_eq!(payload.output.result_values, vec![101.0, 99.0]);
        assert_eq!(payload.output.trace_urls[0].name, "1.html");
        assert_eq!(payload.tries, 1);
    }

    #[test]
    fn test_waits_for_test_run() {
        let graph = graph(ReadMode::HistogramSets, TaskState::Ongoing, Some("out/0"));
        assert!(run(&graph).is_empty());
    }

    #[test]
    fn test_failed_dependency_fails_task() {
        let graph = graph(ReadMode::HistogramSets, TaskState::Failed, None);
        let actions = run(&graph);
        assert_eq!(failure_reason(&actions), DEPENDENCY_FAILED);
        assert!(matches!(
            &actions[0],
            Action::UpdateTask { state: Some(TaskState::Failed), .. }
        ));
    }

    #[test]
    fn test_missing_file_and_mode() {
        let graph_a = graph(ReadMode::HistogramSets, TaskState::Completed, Some("out/9"));
        assert_eq!(failure_reason(&run(&graph_a)), "ReadValueNoFile");

        let graph_b = graph(ReadMode::Unsupported("csv".to_string()), TaskState::Completed, Some("out/0"));
        assert_eq!(failure_reason(&run(&graph_b)), "UnsupportedMode");
    }

    #[test]
    fn test_only_pending_read_values_are_evaluated() {
        let mut graph = graph(ReadMode::HistogramSets, TaskState::Completed, Some("out/0"));
        graph
            .apply(Action::update_state(&TaskId::new("read"), 0, TaskState::Completed))
            .unwrap();
        assert!(run(&graph).is_empty());
    }
}
