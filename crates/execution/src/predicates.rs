//! Task predicates used to filter which tasks an evaluator sees.

use culprit_core::{Event, Task, TaskState, TaskType};

/// A boxed task predicate.
pub type Predicate = Box<dyn Fn(&Task, &Event) -> bool + Send + Sync>;

/// Matches tasks of one type.
pub fn task_type_eq(task_type: TaskType) -> Predicate {
    Box::new(move |task: &Task, _: &Event| task.task_type == task_type)
}

/// Matches tasks in any of the given states.
pub fn task_state_in(states: impl IntoIterator<Item = TaskState>) -> Predicate {
    let states: Vec<TaskState> = states.into_iter().collect();
    Box::new(move |task: &Task, _: &Event| states.contains(&task.state))
}

/// Negates a predicate.
pub fn not(predicate: Predicate) -> Predicate {
    Box::new(move |task: &Task, event: &Event| !predicate(task, event))
}

/// Matches when every predicate matches.
pub fn all(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |task: &Task, event: &Event| predicates.iter().all(|p| p(task, event)))
}
