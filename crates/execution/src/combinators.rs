//! Evaluator combinators.

use std::collections::HashMap;
use culprit_core::{Event, Task, TaskGraph, TaskType};
use crate::evaluator::{EvalResult, Evaluator};
use crate::predicates::Predicate;

/// Runs the delegate only on tasks matching the predicate.
pub struct FilteringEvaluator {
    predicate: Predicate,
    delegate: Box<dyn Evaluator>,
}

impl FilteringEvaluator {
    /// Create a new filtering evaluator.
    pub fn new(predicate: Predicate, delegate: impl Evaluator + 'static) -> Self {
        Self {
            predicate,
            delegate: Box::new(delegate),
        }
    }
}

impl Evaluator for FilteringEvaluator {
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult {
        if (self.predicate)(task, event) {
            self.delegate.evaluate(task, event, graph)
        } else {
            Ok(Vec::new())
        }
    }
}

/// Routes each task to the evaluator registered for its type.
#[derive(Default)]
pub struct DispatchByTaskType {
    routes: HashMap<TaskType, Box<dyn Evaluator>>,
}

impl DispatchByTaskType {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the evaluator for a task type, replacing any previous one.
    pub fn with(mut self, task_type: TaskType, evaluator: impl Evaluator + 'static) -> Self {
        self.routes.insert(task_type, Box::new(evaluator));
        self
    }
}

impl Evaluator for DispatchByTaskType {
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult {
        match self.routes.get(&task.task_type) {
            Some(evaluator) => evaluator.evaluate(task, event, graph),
            None => Ok(Vec::new()),
        }
    }
}

/// Runs every evaluator in order and concatenates their actions.
///
/// Stops at the first error.
#[derive(Default)]
pub struct SequenceEvaluator {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl SequenceEvaluator {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an evaluator.
    pub fn then(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }
}

impl Evaluator for SequenceEvaluator {
    fn evaluate(&self, task: &Task, event: &Event, graph: &TaskGraph) -> EvalResult {
        let mut actions = Vec::new();
        for evaluator in &self.evaluators {
            actions.extend(evaluator.evaluate(task, event, graph)?);
        }
        Ok(actions)
    }
}
