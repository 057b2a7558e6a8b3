//! Dependency ordering for task graphs.

use std::collections::{BTreeSet, HashMap};
use culprit_core::{TaskGraph, TaskId};

/// A dependency view over a task graph.
pub struct DepGraph {
    /// task -> [dependencies]
    graph: HashMap<TaskId, Vec<TaskId>>,
    /// task -> [dependents]
    reverse: HashMap<TaskId, Vec<TaskId>>,
    /// All task ids
    tasks: BTreeSet<TaskId>,
}

impl DepGraph {
    /// Build the dependency view of a graph.
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let mut deps: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut reverse: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut tasks = BTreeSet::new();

        for task in graph.tasks() {
            tasks.insert(task.id.clone());
            for dep in &task.dependencies {
                if !graph.contains(dep) {
                    continue;
                }
                deps.entry(task.id.clone()).or_default().push(dep.clone());
                reverse.entry(dep.clone()).or_default().push(task.id.clone());
            }
        }

        Self {
            graph: deps,
            reverse,
            tasks,
        }
    }

    /// Task ids with dependencies before their dependents.
    ///
    /// Ties are broken by id so the order is deterministic.
    pub fn topological_sort(&self) -> Vec<TaskId> {
        let mut sorted = Vec::with_capacity(self.tasks.len());
        let mut visited = BTreeSet::new();

        // Start from tasks with no dependencies
        let mut ready: BTreeSet<&TaskId> = self
            .tasks
            .iter()
            .filter(|id| !self.graph.contains_key(*id))
            .collect();

        while let Some(id) = ready.pop_first() {
            if !visited.insert(id.clone()) {
                continue;
            }
            sorted.push(id.clone());

            // Add dependents that are now ready
            if let Some(dependents) = self.reverse.get(id) {
                for dependent in dependents {
                    let deps = self.graph.get(dependent).map(|v| v.as_slice()).unwrap_or(&[]);
                    if deps.iter().all(|d| visited.contains(d)) {
                        ready.insert(dependent);
                    }
                }
            }
        }

        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culprit_core::{Dependency, GraphExtension, Payload, TaskType, TaskVertex};

    #[test]
    fn test_dependencies_come_first() {
        let vertex = |id: &str| TaskVertex::new(id, TaskType::RunTest, Payload::Empty);
        let graph = TaskGraph::from_extension(GraphExtension {
            vertices: vec![vertex("find"), vertex("read_0"), vertex("read_1"), vertex("build")],
            edges: vec![
                Dependency::new("find", "read_0"),
                Dependency::new("find", "read_1"),
                Dependency::new("read_0", "build"),
                Dependency::new("read_1", "build"),
            ],
        })
        .unwrap();

        let order = DepGraph::from_graph(&graph).topological_sort();
        let position = |id: &str| order.iter().position(|t| t.as_str() == id).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(position("build"), 0);
        assert!(position("read_0") < position("find"));
        assert!(position("read_1") < position("find"));
        assert_eq!(position("find"), 3);
    }
}
