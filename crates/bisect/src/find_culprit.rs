//! The find_culprit evaluator: drives a bisection.
//!
//! A find_culprit task depends on every read_value task of its job. On its
//! first evaluation it expands the commit range. After that, each evaluation
//! compares the samples of neighbouring changes, asks for more samples where
//! the comparison is inconclusive, inserts midpoints where a difference shows
//! up, and records every adjacent pair that differs as a culprit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use culprit_analysis::{compare, speculate, CompareMode};
use culprit_core::{
    Action, Change, Comparison, ComparisonResult, Culprit, Dependency, Event, FindCulpritPayload,
    GraphExtension, Payload, PrevNextComparison, ResultForChange, Task, TaskGraph, TaskState,
    TaskType, TaskVertex,
};
use culprit_execution::predicates::{all, not, task_state_in, task_type_eq};
use culprit_execution::{EvalResult, EvaluationError, Evaluator, FilteringEvaluator, ASSERTION_ERROR};
use tracing::{debug, info, warn};
use crate::collaborators::CommitHistory;
use crate::graph::read_subgraph;

/// Reason recorded when a bisection has no usable data.
pub const BISECTION_FAILED: &str = "BisectionFailed";
/// Reason recorded when the commit range could not be expanded.
pub const GITILES_FETCH_ERROR: &str = "GitilesFetchError";

/// Default speculation depth per evaluation.
pub const DEFAULT_SPECULATION_LEVELS: usize = 2;

/// Read tasks of one change, by state, and the samples they produced.
#[derive(Debug, Default)]
struct ChangeSamples {
    values: Vec<f64>,
    states: BTreeMap<TaskState, usize>,
}

impl ChangeSamples {
    fn record(&mut self, state: TaskState, values: &[f64]) {
        *self.states.entry(state).or_default() += 1;
        self.values.extend(values.iter().copied().filter(|v| v.is_finite()));
    }

    /// Number of read tasks scheduled so far.
    fn attempts(&self) -> usize {
        self.states.values().sum()
    }

    fn has_outstanding_work(&self) -> bool {
        self.states.contains_key(&TaskState::Pending) || self.states.contains_key(&TaskState::Ongoing)
    }
}

/// Snapshot of the data a bisection has for its changes.
struct Exploration<'a> {
    all_changes: &'a [Change],
    index: HashMap<&'a Change, usize>,
    samples: HashMap<&'a Change, ChangeSamples>,
    magnitude: f64,
}

impl<'a> Exploration<'a> {
    fn compare(&self, a: &Change, b: &Change) -> Comparison {
        let (Some(sa), Some(sb)) = (self.samples.get(a), self.samples.get(b)) else {
            return Comparison::unknown();
        };
        if sa.has_outstanding_work() || sb.has_outstanding_work() {
            return Comparison::pending();
        }
        let attempts = (sa.values.len() + sb.values.len()) / 2;
        compare(&sa.values, &sb.values, attempts, CompareMode::Performance, self.magnitude)
    }

    /// `None` when the comparison is inconclusive.
    fn detect(&self, a: &Change, b: &Change) -> Option<bool> {
        match self.compare(a, b).result {
            ComparisonResult::Unknown => None,
            result => Some(result == ComparisonResult::Different),
        }
    }

    fn midpoint(&self, a: &Change, b: &Change) -> Option<&'a Change> {
        let (ia, ib) = (*self.index.get(a)?, *self.index.get(b)?);
        if ib <= ia {
            return None;
        }
        let subrange = &self.all_changes[ia..=ib];
        if subrange.len() <= 2 {
            None
        } else {
            Some(&subrange[subrange.len() / 2])
        }
    }

    fn attempts(&self, change: &Change) -> usize {
        self.samples.get(change).map_or(0, ChangeSamples::attempts)
    }

    fn has_outstanding_work(&self, change: &Change) -> bool {
        self.samples
            .get(change)
            .is_some_and(ChangeSamples::has_outstanding_work)
    }
}

/// Orchestrates a bisection over the commit range of its job.
pub struct FindCulpritEvaluator<H> {
    history: H,
    speculation_levels: usize,
}

impl<H: CommitHistory> FindCulpritEvaluator<H> {
    /// Create an evaluator expanding ranges through `history`.
    pub fn new(history: H) -> Self {
        Self {
            history,
            speculation_levels: DEFAULT_SPECULATION_LEVELS,
        }
    }

    /// Set the speculation depth.
    pub fn with_speculation_levels(mut self, levels: usize) -> Self {
        self.speculation_levels = levels;
        self
    }

    /// Expand the range into changes and start exploring.
    fn prepare(&self, task: &Task, payload: &FindCulpritPayload) -> EvalResult {
        let input = &payload.input;
        let (Some(start), Some(end)) = (input.start_change.base_commit(), input.end_change.base_commit()) else {
            return Err(EvaluationError::invariant(task, "start and end changes need a base commit"));
        };

        let commits = match self.history.commit_range(start, end) {
            Ok(commits) => commits,
            Err(e) => {
                warn!("Expanding {}..{} failed: {}", start.id_string(), end.id_string(), e);
                return Ok(Action::fail(task, GITILES_FETCH_ERROR, e.to_string(), None));
            }
        };

        let mut changes = Vec::with_capacity(commits.len() + 1);
        changes.push(input.start_change.clone());
        changes.extend(commits.into_iter().map(|c| input.start_change.with_base_commit(c)));
        if changes.len() > 1 {
            if let Some(last) = changes.last_mut() {
                *last = input.end_change.clone();
            }
        } else if input.end_change != input.start_change {
            changes.push(input.end_change.clone());
        }
        info!("Bisecting over {} changes", changes.len());

        let mut updated = payload.clone();
        updated.state.changes = changes;
        Ok(vec![Action::update(task, TaskState::Ongoing, Payload::FindCulprit(updated))])
    }

    /// One exploration step.
    fn explore(&self, task: &Task, payload: &FindCulpritPayload, graph: &TaskGraph) -> EvalResult {
        let all_changes = payload.state.changes.as_slice();
        if all_changes.is_empty() {
            return Ok(Action::fail(
                task,
                ASSERTION_ERROR,
                "Programming error, need commits to proceed!",
                None,
            ));
        }
        let options = payload.input.analysis_options;

        let mut samples: HashMap<&Change, ChangeSamples> = HashMap::new();
        let mut states: BTreeSet<TaskState> = BTreeSet::new();
        for dep in graph.dependencies_of(task).filter(|d| d.task_type == TaskType::ReadValue) {
            let read = dep.payload.as_read_value().ok_or_else(|| EvaluationError::PayloadMismatch {
                task: dep.id.clone(),
                expected: TaskType::ReadValue,
            })?;
            samples
                .entry(&read.input.change)
                .or_default()
                .record(dep.state, &read.output.result_values);
            states.insert(dep.state);
        }

        // All reads in one state decide the fate of the job on their own.
        if let (1, Some(state)) = (states.len(), states.first()) {
            match state {
                TaskState::Completed => {
                    if samples.values().any(|s| s.values.is_empty()) {
                        return Ok(Action::fail(
                            task,
                            BISECTION_FAILED,
                            "We did not find any results from successful test runs.",
                            None,
                        ));
                    }
                }
                TaskState::Failed => {
                    return Ok(Action::fail(
                        task,
                        BISECTION_FAILED,
                        "All attempts in all dependencies failed.",
                        None,
                    ));
                }
                _ => return Ok(Vec::new()),
            }
        }

        let exploration = Exploration {
            all_changes,
            index: all_changes.iter().enumerate().map(|(i, c)| (c, i)).collect(),
            samples,
            magnitude: options.effective_magnitude(),
        };
        let ordered: Vec<&Change> = all_changes
            .iter()
            .filter(|c| exploration.samples.contains_key(*c))
            .collect();

        let mut updated = payload.clone();
        updated.output.change_results = ordered
            .iter()
            .enumerate()
            .map(|(i, change)| ResultForChange {
                change: (*change).clone(),
                result_values: exploration
                    .samples
                    .get(*change)
                    .map(|s| s.values.clone())
                    .unwrap_or_default(),
                comparisons: PrevNextComparison {
                    prev: i.checked_sub(1).map(|p| exploration.compare(ordered[p], change)),
                    next: ordered.get(i + 1).map(|n| exploration.compare(change, n)),
                },
            })
            .collect();

        let can_complete = states
            .iter()
            .all(|s| matches!(s, TaskState::Completed | TaskState::Failed));

        // Nothing to compare: done once every read has finished.
        if ordered.len() < 2 {
            if can_complete {
                info!("Bisection finished with a single sampled change");
                return Ok(vec![Action::update(task, TaskState::Completed, Payload::FindCulprit(updated))]);
            }
            return Ok(if updated != *payload {
                vec![Action::update_payload(task, Payload::FindCulprit(updated))]
            } else {
                Vec::new()
            });
        }

        let mut unknown: Vec<(&Change, &Change)> = Vec::new();
        let proposals = speculate(
            &ordered,
            |a, b| exploration.detect(a, b),
            |a, b| unknown.push((*a, *b)),
            |a, b| exploration.midpoint(a, b),
            self.speculation_levels,
        );

        // Target attempt count per change, keyed by position in the range.
        let min_attempts = options.effective_min_attempts() as usize;
        let max_attempts = options.effective_max_attempts() as usize;
        let mut targets: BTreeMap<usize, usize> = BTreeMap::new();
        let mut request = |change: &Change, size: usize| {
            if let Some(&i) = exploration.index.get(change) {
                let target = targets.entry(i).or_default();
                *target = (*target).max(size.min(max_attempts));
            }
        };
        for (_, change) in &proposals {
            request(*change, min_attempts);
        }
        for (a, b) in unknown {
            for change in [a, b] {
                let current = exploration.attempts(change);
                let grown = ((current as f64) * 1.5).ceil() as usize;
                if grown.min(max_attempts) > current {
                    request(change, grown);
                }
            }
        }

        let mut actions = Vec::new();
        for (i, size) in targets {
            let change = &all_changes[i];
            let current = exploration.attempts(change);
            if exploration.has_outstanding_work(change) || size <= current {
                continue;
            }
            if let Some(extension) = refine(task, payload, graph, change, current, size) {
                debug!(
                    "Sampling {} up to {} attempts ({} new tasks)",
                    change,
                    size,
                    extension.vertices.len()
                );
                actions.push(Action::ExtendGraph(extension));
            }
        }

        updated.output.culprits = ordered
            .windows(2)
            .filter(|pair| exploration.detect(pair[0], pair[1]) == Some(true))
            .map(|pair| Culprit {
                from: pair[0].clone(),
                to: pair[1].clone(),
            })
            .collect();

        if actions.is_empty() && can_complete {
            info!(
                "Bisection finished with {} culprit(s)",
                updated.output.culprits.len()
            );
            return Ok(vec![Action::update(task, TaskState::Completed, Payload::FindCulprit(updated))]);
        }
        if updated != *payload {
            actions.push(Action::update_payload(task, Payload::FindCulprit(updated)));
        }
        Ok(actions)
    }
}

/// Tasks sampling `change` from attempt `from` up to `to`, minus those the
/// graph already has, wired into the find_culprit task.
fn refine(
    task: &Task,
    payload: &FindCulpritPayload,
    graph: &TaskGraph,
    change: &Change,
    from: usize,
    to: usize,
) -> Option<GraphExtension> {
    let subgraph = read_subgraph(&payload.input, change, from as u32..to as u32);
    let vertices: Vec<TaskVertex> = subgraph
        .vertices
        .into_iter()
        .filter(|v| !graph.contains(&v.id))
        .collect();
    if vertices.is_empty() {
        return None;
    }

    let mut edges: Vec<Dependency> = subgraph
        .edges
        .into_iter()
        .filter(|e| !graph.contains(&e.from))
        .collect();
    edges.extend(
        vertices
            .iter()
            .filter(|v| v.task_type == TaskType::ReadValue)
            .map(|v| Dependency::new(task.id.clone(), v.id.clone())),
    );
    Some(GraphExtension { vertices, edges })
}

impl<H: CommitHistory> Evaluator for FindCulpritEvaluator<H> {
    fn evaluate(&self, task: &Task, _event: &Event, graph: &TaskGraph) -> EvalResult {
        let Payload::FindCulprit(payload) = &task.payload else {
            return Err(EvaluationError::PayloadMismatch {
                task: task.id.clone(),
                expected: TaskType::FindCulprit,
            });
        };
        match task.state {
            TaskState::Pending => self.prepare(task, payload),
            TaskState::Ongoing => self.explore(task, payload, graph),
            _ => Ok(Vec::new()),
        }
    }
}

/// The find_culprit evaluator, limited to unfinished find_culprit tasks.
pub fn find_culprit_evaluator(history: impl CommitHistory + 'static, speculation_levels: usize) -> FilteringEvaluator {
    FilteringEvaluator::new(
        all(vec![
            task_type_eq(TaskType::FindCulprit),
            not(task_state_in([TaskState::Completed, TaskState::Failed])),
        ]),
        FindCulpritEvaluator::new(history).with_speculation_levels(speculation_levels),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryHistory;
    use crate::graph::{create_graph, find_culprit_id, read_value_id, tests::input};
    use culprit_core::{Commit, TaskId};

    fn history() -> InMemoryHistory {
        InMemoryHistory::new().with_repository("chromium", (0..6).map(|i| format!("c{}", i)))
    }

    fn change(hash: &str) -> Change {
        Change::from_commit(Commit::new("chromium", hash))
    }

    fn evaluate(graph: &TaskGraph) -> Vec<Action> {
        let evaluator = find_culprit_evaluator(history(), DEFAULT_SPECULATION_LEVELS);
        let task = graph.get(&find_culprit_id()).unwrap();
        evaluator.evaluate(task, &Event::initiate(), graph).unwrap()
    }

    fn apply_all(graph: &mut TaskGraph, actions: Vec<Action>) {
        for action in actions {
            graph.apply(action).unwrap();
        }
    }

    /// Finish a read with the given values.
    fn finish_read(graph: &mut TaskGraph, id: &TaskId, state: TaskState, values: Vec<f64>) {
        let task = graph.get(id).unwrap();
        let mut payload = task.payload.as_read_value().unwrap().clone();
        payload.output.result_values = values;
        let action = Action::update(task, state, Payload::ReadValue(payload));
        graph.apply(action).unwrap();
    }

    /// Graph for c0..c5 with 3 attempts, already expanded.
    fn prepared() -> TaskGraph {
        let mut graph = TaskGraph::from_extension(create_graph(input("c0", "c5", 3))).unwrap();
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        graph
    }

    #[test]
    fn test_prepare_expands_range() {
        let graph = prepared();
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Ongoing);
        let changes = &task.payload.as_find_culprit().unwrap().state.changes;
        let ids: Vec<String> = changes.iter().map(Change::id_string).collect();
        assert_eq!(
            ids,
            vec!["chromium@c0", "chromium@c1", "chromium@c2", "chromium@c3", "chromium@c4", "chromium@c5"]
        );
    }

    #[test]
    fn test_unknown_range_fails_job() {
        let mut graph = TaskGraph::from_extension(create_graph(input("c0", "zz", 3))).unwrap();
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.has_error(GITILES_FETCH_ERROR));
    }

    #[test]
    fn test_waits_while_everything_is_pending() {
        let graph = prepared();
        assert!(evaluate(&graph).is_empty());
    }

    #[test]
    fn test_difference_inserts_midpoints() {
        let mut graph = prepared();
        for i in 0..3 {
            finish_read(&mut graph, &read_value_id(&change("c0"), i), TaskState::Completed, vec![10.0; 5]);
            finish_read(&mut graph, &read_value_id(&change("c5"), i), TaskState::Completed, vec![20.0; 5]);
        }
        let actions = evaluate(&graph);

        // c0..c5: midpoint c3, then c2 (between c0 and c3) and c4 (between c3 and c5)
        let extended: Vec<&GraphExtension> = actions
            .iter()
            .filter_map(|a| match a {
                Action::ExtendGraph(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(extended.len(), 3);
        for hash in ["c2", "c3", "c4"] {
            let id = read_value_id(&change(hash), 2);
            assert!(extended.iter().any(|e| e.vertices.iter().any(|v| v.id == id)));
        }
        assert!(extended
            .iter()
            .all(|e| e.edges.iter().any(|d| d.from == find_culprit_id())));

        // culprit so far is the whole range
        let Some(Action::UpdateTask { payload: Some(Payload::FindCulprit(p)), state: None, .. }) = actions.last() else {
            panic!("expected a payload update");
        };
        assert_eq!(p.output.culprits.len(), 1);
        assert_eq!(p.output.change_results.len(), 2);
        assert_eq!(
            p.output.change_results[0].comparisons.next.unwrap().result,
            ComparisonResult::Different
        );

        apply_all(&mut graph, actions);
        assert_eq!(graph.get(&find_culprit_id()).unwrap().dependencies.len(), 15);
    }

    #[test]
    fn test_unknown_grows_attempts() {
        let mut graph = prepared();
        let values_a = [[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]];
        for i in 0..3u32 {
            let a = values_a[i as usize].to_vec();
            let b = a.iter().map(|v| v + 1.0).collect();
            finish_read(&mut graph, &read_value_id(&change("c0"), i), TaskState::Completed, a);
            finish_read(&mut graph, &read_value_id(&change("c5"), i), TaskState::Completed, b);
        }
        let actions = evaluate(&graph);
        let extensions: Vec<&GraphExtension> = actions
            .iter()
            .filter_map(|a| match a {
                Action::ExtendGraph(e) => Some(e),
                _ => None,
            })
            .collect();
        // ceil(3 * 1.5) = 5 attempts: two more per change, no new isolate
        assert_eq!(extensions.len(), 2);
        for extension in extensions {
            assert_eq!(extension.vertices.len(), 4);
            assert!(extension.vertices.iter().all(|v| v.task_type != TaskType::FindIsolate));
        }
    }

    #[test]
    fn test_all_failed_fails_bisection() {
        let mut graph = prepared();
        for hash in ["c0", "c5"] {
            for i in 0..3 {
                finish_read(&mut graph, &read_value_id(&change(hash), i), TaskState::Failed, vec![]);
            }
        }
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.has_error(BISECTION_FAILED));
    }

    #[test]
    fn test_no_difference_completes() {
        let mut graph = prepared();
        for hash in ["c0", "c5"] {
            for i in 0..3 {
                finish_read(&mut graph, &read_value_id(&change(hash), i), TaskState::Completed, vec![5.0; 4]);
            }
        }
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.payload.as_find_culprit().unwrap().output.culprits.is_empty());
    }

    fn culprit_hashes(graph: &TaskGraph) -> Vec<(String, String)> {
        let task = graph.get(&find_culprit_id()).unwrap();
        task.payload
            .as_find_culprit()
            .unwrap()
            .output
            .culprits
            .iter()
            .map(|c| (c.from.id_string(), c.to.id_string()))
            .collect()
    }

    #[test]
    fn test_culprit_survives_later_evaluations() {
        let mut graph = prepared();
        for i in 0..3 {
            finish_read(&mut graph, &read_value_id(&change("c0"), i), TaskState::Completed, vec![10.0; 5]);
            finish_read(&mut graph, &read_value_id(&change("c5"), i), TaskState::Completed, vec![20.0; 5]);
        }
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);

        // c2 and c3 differ while c4 is still sampling
        for i in 0..3 {
            finish_read(&mut graph, &read_value_id(&change("c2"), i), TaskState::Completed, vec![10.0; 5]);
            finish_read(&mut graph, &read_value_id(&change("c3"), i), TaskState::Completed, vec![20.0; 5]);
        }
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let expected = vec![("chromium@c2".to_string(), "chromium@c3".to_string())];
        assert_eq!(graph.get(&find_culprit_id()).unwrap().state, TaskState::Ongoing);
        assert_eq!(culprit_hashes(&graph), expected);

        for i in 0..3 {
            finish_read(&mut graph, &read_value_id(&change("c4"), i), TaskState::Completed, vec![20.0; 5]);
        }
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        assert_eq!(graph.get(&find_culprit_id()).unwrap().state, TaskState::Completed);
        assert_eq!(culprit_hashes(&graph), expected);
    }

    #[test]
    fn test_single_change_range_completes() {
        let mut graph = TaskGraph::from_extension(create_graph(input("c0", "c0", 3))).unwrap();
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Ongoing);
        assert_eq!(task.payload.as_find_culprit().unwrap().state.changes.len(), 1);

        finish_read(&mut graph, &read_value_id(&change("c0"), 0), TaskState::Completed, vec![5.0; 4]);
        finish_read(&mut graph, &read_value_id(&change("c0"), 1), TaskState::Completed, vec![5.0; 4]);
        // one read still running
        assert!(evaluate(&graph)
            .iter()
            .all(|a| !matches!(a, Action::UpdateTask { state: Some(_), .. })));

        finish_read(&mut graph, &read_value_id(&change("c0"), 2), TaskState::Failed, vec![]);
        let actions = evaluate(&graph);
        apply_all(&mut graph, actions);
        let task = graph.get(&find_culprit_id()).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.payload.as_find_culprit().unwrap().output.culprits.is_empty());
    }
}
