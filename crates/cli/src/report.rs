//! Human-readable job summaries.

use std::collections::BTreeMap;
use std::fmt::Write;

use culprit_bisect::find_culprit_id;
use culprit_core::{Comparison, JobId, TaskGraph, TaskState, TaskType};

fn comparison(c: Option<Comparison>) -> String {
    match c {
        None => "-".to_string(),
        Some(c) => match c.p_value {
            Some(p) => format!("{} (p={:.4})", c.result, p),
            None => c.result.to_string(),
        },
    }
}

/// One-line status of a job.
pub fn summary(job: JobId, graph: &TaskGraph) -> String {
    let Some(task) = graph.get(&find_culprit_id()) else {
        return format!("{} | no bisection task", job);
    };
    let culprits = task
        .payload
        .as_find_culprit()
        .map(|p| p.output.culprits.len())
        .unwrap_or_default();
    format!("{} | {} | {} tasks | {} culprits", job, task.state, graph.len(), culprits)
}

/// Full report of a job: progress by task type, explored changes with their
/// comparisons, culprits and recorded errors.
pub fn details(job: JobId, graph: &TaskGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job: {}", job);

    let _ = writeln!(out, "Tasks:");
    for task_type in [
        TaskType::FindCulprit,
        TaskType::FindIsolate,
        TaskType::RunTest,
        TaskType::ReadValue,
    ] {
        let mut states: BTreeMap<TaskState, usize> = BTreeMap::new();
        for task in graph.tasks_of_type(task_type) {
            *states.entry(task.state).or_default() += 1;
        }
        if states.is_empty() {
            continue;
        }
        let states: Vec<String> = states.iter().map(|(s, n)| format!("{} {}", n, s)).collect();
        let _ = writeln!(out, "  {}: {}", task_type, states.join(", "));
    }

    let Some(task) = graph.get(&find_culprit_id()) else {
        return out;
    };
    let _ = writeln!(out, "Bisection: {}", task.state);

    if let Some(payload) = task.payload.as_find_culprit() {
        let _ = writeln!(out, "  Range: {} changes", payload.state.changes.len());
        if !payload.output.change_results.is_empty() {
            let _ = writeln!(out, "Changes:");
        }
        for result in &payload.output.change_results {
            let _ = writeln!(
                out,
                "  {} | {} samples | prev {} | next {}",
                result.change,
                result.result_values.len(),
                comparison(result.comparisons.prev),
                comparison(result.comparisons.next),
            );
        }
        if !payload.output.culprits.is_empty() {
            let _ = writeln!(out, "Culprits:");
        }
        for culprit in &payload.output.culprits {
            let _ = writeln!(out, "  {} -> {}", culprit.from, culprit.to);
        }
    }

    let failed: Vec<_> = graph.tasks().filter(|t| !t.errors.is_empty()).collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "Errors:");
    }
    for t in failed {
        for e in &t.errors {
            let _ = writeln!(out, "  {} [{}] {}", t.id, e.reason, e.message);
        }
    }
    out
}
