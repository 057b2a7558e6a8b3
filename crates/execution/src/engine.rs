//! The evaluation runtime - drives a job's graph to a fixpoint.

use anyhow::Context;
use culprit_core::{Action, Event, JobId, TaskGraph, TaskState};
use culprit_storage::GraphStore;
use tracing::{debug, error, info, warn};
use crate::dependency::DepGraph;
use crate::evaluator::Evaluator;

/// Reason recorded on a task whose evaluator broke an invariant.
pub const ASSERTION_ERROR: &str = "AssertionError";

/// Configuration for the evaluation runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max passes per `evaluate` call (None = until fixpoint)
    pub max_passes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_passes: Some(1000),
        }
    }
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Actions the evaluators emitted
    pub emitted: usize,
    /// Actions the store accepted
    pub applied: usize,
    /// Actions rejected as amendment errors or version conflicts
    pub rejected: usize,
}

/// Outcome of an `evaluate` call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Graph after the last pass
    pub graph: TaskGraph,
    /// Passes run
    pub passes: usize,
    /// Actions applied across all passes
    pub applied: usize,
    /// Actions rejected across all passes
    pub rejected: usize,
    /// Whether the last pass emitted nothing
    pub converged: bool,
}

/// The evaluation runtime.
///
/// One pass:
/// ```text
/// Load graph → Order by dependencies → Evaluate each task → Apply actions
/// ```
pub struct ExecutionEngine<S: GraphStore> {
    store: S,
    config: EngineConfig,
}

impl<S: GraphStore> ExecutionEngine<S> {
    /// Create a new engine over a store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run passes until one emits no actions or `max_passes` is reached.
    pub async fn evaluate(
        &self,
        job: JobId,
        event: &Event,
        evaluator: &dyn Evaluator,
    ) -> anyhow::Result<Evaluation> {
        info!("Evaluating job {} on {:?} event {}", job, event.kind, event.id);

        let mut passes = 0;
        let mut applied = 0;
        let mut rejected = 0;
        let mut converged = false;

        loop {
            if let Some(max) = self.config.max_passes {
                if passes >= max {
                    warn!("Job {} reached max passes ({})", job, max);
                    break;
                }
            }

            let result = self.evaluate_once(job, event, evaluator).await?;
            passes += 1;
            applied += result.applied;
            rejected += result.rejected;

            if result.emitted == 0 {
                converged = true;
                break;
            }
        }

        let graph = self
            .store
            .load(job)
            .await
            .with_context(|| format!("loading job {} after evaluation", job))?;
        info!(
            "Finished job {} after {} passes ({} applied, {} rejected)",
            job, passes, applied, rejected
        );

        Ok(Evaluation {
            graph,
            passes,
            applied,
            rejected,
            converged,
        })
    }

    /// Run exactly one pass.
    ///
    /// Every task is evaluated against the same snapshot; cancelled tasks are
    /// skipped. Actions are applied in emission order, one transaction each.
    pub async fn evaluate_once(
        &self,
        job: JobId,
        event: &Event,
        evaluator: &dyn Evaluator,
    ) -> anyhow::Result<PassResult> {
        let graph = self
            .store
            .load(job)
            .await
            .with_context(|| format!("loading job {}", job))?;

        let mut actions: Vec<Action> = Vec::new();
        for id in DepGraph::from_graph(&graph).topological_sort() {
            let Some(task) = graph.get(&id) else {
                continue;
            };
            if task.state == TaskState::Cancelled {
                continue;
            }

            match evaluator.evaluate(task, event, &graph) {
                Ok(emitted) => {
                    if !emitted.is_empty() {
                        debug!("Task {} emitted {} actions", task.id, emitted.len());
                    }
                    actions.extend(emitted);
                }
                Err(e) => {
                    error!("Evaluator failed on task {}: {}", task.id, e);
                    actions.extend(Action::fail(task, ASSERTION_ERROR, e.to_string(), None));
                }
            }
        }

        let mut result = PassResult {
            emitted: actions.len(),
            ..Default::default()
        };
        for action in actions {
            match self.store.apply(job, action).await {
                Ok(()) => result.applied += 1,
                Err(e) if e.is_amendment() => {
                    warn!("Rejected action on job {}: {}", job, e);
                    result.rejected += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("applying action to job {}", job));
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvalResult, EvaluationError};
    use culprit_core::{
        Dependency, GraphExtension, Payload, Task, TaskId, TaskType, TaskVertex,
    };
    use culprit_storage::InMemoryStore;

    async fn populated(edges: Vec<Dependency>, ids: &[&str]) -> (ExecutionEngine<InMemoryStore>, JobId) {
        let store = InMemoryStore::new();
        let job = JobId::new();
        store
            .populate(
                job,
                GraphExtension {
                    vertices: ids
                        .iter()
                        .map(|id| TaskVertex::new(*id, TaskType::RunTest, Payload::Empty))
                        .collect(),
                    edges,
                },
            )
            .await
            .unwrap();
        (ExecutionEngine::new(store), job)
    }

    /// Completes a pending task once all its dependencies are completed.
    fn complete_when_ready(task: &Task, _: &Event, graph: &TaskGraph) -> EvalResult {
        if task.state != TaskState::Pending {
            return Ok(vec![]);
        }
        if graph.dependencies_of(task).all(|d| d.state == TaskState::Completed) {
            Ok(vec![Action::update_state(&task.id, task.version, TaskState::Completed)])
        } else {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_evaluate_reaches_fixpoint() {
        let (engine, job) = populated(
            vec![Dependency::new("a", "b"), Dependency::new("b", "c")],
            &["a", "b", "c"],
        )
        .await;

        let evaluation = engine
            .evaluate(job, &Event::initiate(), &complete_when_ready)
            .await
            .unwrap();

        assert!(evaluation.converged);
        assert!(evaluation.graph.tasks().all(|t| t.state == TaskState::Completed));
        assert_eq!(evaluation.applied, 3);
        // one pass per level, plus the quiet pass
        assert_eq!(evaluation.passes, 4);
    }

    #[tokio::test]
    async fn test_evaluate_once_uses_snapshot() {
        let (engine, job) = populated(vec![Dependency::new("a", "b")], &["a", "b"]).await;
        let result = engine
            .evaluate_once(job, &Event::initiate(), &complete_when_ready)
            .await
            .unwrap();
        assert_eq!(result.applied, 1);
        let graph = engine.store().load(job).await.unwrap();
        assert_eq!(graph.get(&TaskId::new("a")).unwrap().state, TaskState::Pending);
        assert_eq!(graph.get(&TaskId::new("b")).unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_evaluator_error_fails_only_that_task() {
        let (engine, job) = populated(vec![], &["bad", "good"]).await;
        let evaluator = |task: &Task, event: &Event, graph: &TaskGraph| -> EvalResult {
            if task.id.as_str() == "bad" && task.state == TaskState::Pending {
                return Err(EvaluationError::invariant(task, "broken"));
            }
            complete_when_ready(task, event, graph)
        };

        let evaluation = engine.evaluate(job, &Event::initiate(), &evaluator).await.unwrap();
        let bad = evaluation.graph.get(&TaskId::new("bad")).unwrap();
        assert_eq!(bad.state, TaskState::Failed);
        assert!(bad.has_error(ASSERTION_ERROR));
        let good = evaluation.graph.get(&TaskId::new("good")).unwrap();
        assert_eq!(good.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_tasks_are_skipped() {
        let (engine, job) = populated(vec![], &["a"]).await;
        let id = TaskId::new("a");
        engine
            .store()
            .apply(job, Action::update_state(&id, 0, TaskState::Cancelled))
            .await
            .unwrap();

        let evaluator = |task: &Task, _: &Event, _: &TaskGraph| -> EvalResult {
            Ok(vec![Action::update_state(&task.id, task.version, TaskState::Completed)])
        };
        let evaluation = engine.evaluate(job, &Event::initiate(), &evaluator).await.unwrap();
        assert_eq!(evaluation.passes, 1);
        assert_eq!(evaluation.graph.get(&id).unwrap().state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_amendment_errors_are_not_fatal() {
        let (engine, job) = populated(vec![], &["a", "b"]).await;
        // Every pass re-proposes an existing vertex and completes pending tasks.
        let evaluator = |task: &Task, _: &Event, _: &TaskGraph| -> EvalResult {
            let mut actions = vec![Action::ExtendGraph(GraphExtension {
                vertices: vec![TaskVertex::new("b", TaskType::RunTest, Payload::Empty)],
                edges: vec![],
            })];
            if task.state == TaskState::Pending {
                actions.push(Action::update_state(&task.id, task.version, TaskState::Completed));
            }
            Ok(actions)
        };

        let engine = engine.with_config(EngineConfig { max_passes: Some(3) });
        let evaluation = engine.evaluate(job, &Event::initiate(), &evaluator).await.unwrap();
        assert!(!evaluation.converged);
        assert_eq!(evaluation.passes, 3);
        assert_eq!(evaluation.applied, 2);
        assert_eq!(evaluation.rejected, 6);
        assert!(evaluation.graph.tasks().all(|t| t.state == TaskState::Completed));
    }

    #[tokio::test]
    async fn test_missing_job_is_fatal() {
        let engine = ExecutionEngine::new(InMemoryStore::new());
        let result = engine
            .evaluate(JobId::new(), &Event::initiate(), &complete_when_ready)
            .await;
        assert!(result.is_err());
    }
}
