//! Task graph - the per-job DAG of tasks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use serde::{Deserialize, Serialize};
use crate::action::Action;
use crate::id::TaskId;
use crate::task::{Dependency, Task, TaskType, TaskVertex};

/// Errors raised while mutating a task graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Referenced task does not exist
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// Vertex id already present
    #[error("task already exists: {0}")]
    DuplicateTask(TaskId),

    /// Edge endpoint does not exist
    #[error("dependency {from} -> {to} references an unknown task")]
    UnknownDependency {
        /// Dependent task
        from: TaskId,
        /// Task depended upon
        to: TaskId,
    },

    /// Extension would introduce a cycle
    #[error("dependency cycle through task {0}")]
    Cycle(TaskId),

    /// Task changed since the evaluator observed it
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Task id
        id: TaskId,
        /// Version the update was based on
        expected: u64,
        /// Version in the graph
        actual: u64,
    },
}

impl GraphError {
    /// Whether the error is a rejected amendment or a concurrent-update
    /// conflict, which callers log and move past.
    pub fn is_amendment(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTask(_)
                | Self::UnknownDependency { .. }
                | Self::Cycle(_)
                | Self::VersionConflict { .. }
        )
    }
}

/// New vertices and edges to add to a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExtension {
    /// Vertices to add
    pub vertices: Vec<TaskVertex>,

    /// Edges to add
    pub edges: Vec<Dependency>,
}

impl GraphExtension {
    /// Whether the extension adds nothing.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty()
    }

    /// Append another extension.
    pub fn merge(&mut self, other: GraphExtension) {
        self.vertices.extend(other.vertices);
        self.edges.extend(other.edges);
    }
}

/// A job's tasks and their dependencies. Always acyclic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an initial extension.
    pub fn from_extension(extension: GraphExtension) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        graph.extend(extension)?;
        Ok(graph)
    }

    /// Look up a task.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Whether a task exists.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks, ordered by id.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks of one type, ordered by id.
    pub fn tasks_of_type(&self, task_type: TaskType) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |t| t.task_type == task_type)
    }

    /// Direct dependencies of a task that exist in the graph.
    pub fn dependencies_of<'a>(&'a self, task: &'a Task) -> impl Iterator<Item = &'a Task> + 'a {
        task.dependencies.iter().filter_map(move |id| self.tasks.get(id))
    }

    /// Add vertices and edges.
    ///
    /// The whole extension is validated first; on error the graph is left
    /// untouched. Edges already present are ignored.
    pub fn extend(&mut self, extension: GraphExtension) -> Result<(), GraphError> {
        let mut new_ids = BTreeSet::new();
        for vertex in &extension.vertices {
            if self.tasks.contains_key(&vertex.id) || !new_ids.insert(vertex.id.clone()) {
                return Err(GraphError::DuplicateTask(vertex.id.clone()));
            }
        }

        for edge in &extension.edges {
            let known = |id: &TaskId| self.tasks.contains_key(id) || new_ids.contains(id);
            if !known(&edge.from) || !known(&edge.to) {
                return Err(GraphError::UnknownDependency {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }

        let mut adjacency: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
        for task in self.tasks.values() {
            adjacency
                .entry(&task.id)
                .or_default()
                .extend(task.dependencies.iter());
        }
        for edge in &extension.edges {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }
        if let Some(id) = find_cycle(&adjacency) {
            return Err(GraphError::Cycle(id.clone()));
        }

        for vertex in extension.vertices {
            self.tasks.insert(vertex.id.clone(), Task::from_vertex(vertex));
        }
        for edge in extension.edges {
            if let Some(task) = self.tasks.get_mut(&edge.from) {
                if !task.dependencies.contains(&edge.to) {
                    task.dependencies.push(edge.to);
                }
            }
        }
        Ok(())
    }

    /// Apply a single action.
    pub fn apply(&mut self, action: Action) -> Result<(), GraphError> {
        match action {
            Action::UpdateTask {
                id,
                expected_version,
                state,
                payload,
                error,
            } => {
                let task = self
                    .tasks
                    .get_mut(&id)
                    .ok_or_else(|| GraphError::UnknownTask(id.clone()))?;
                if task.version != expected_version {
                    return Err(GraphError::VersionConflict {
                        id,
                        expected: expected_version,
                        actual: task.version,
                    });
                }
                if let Some(state) = state {
                    task.state = state;
                }
                if let Some(payload) = payload {
                    task.payload = payload;
                }
                if let Some(error) = error {
                    task.errors.push(error);
                }
                task.version += 1;
                task.updated_at = chrono::Utc::now();
                Ok(())
            }
            Action::AppendError { id, error } => {
                let task = self
                    .tasks
                    .get_mut(&id)
                    .ok_or(GraphError::UnknownTask(id))?;
                task.errors.push(error);
                task.updated_at = chrono::Utc::now();
                Ok(())
            }
            Action::ExtendGraph(extension) => self.extend(extension),
        }
    }
}

/// Depth-first search for a back edge; returns a task on the cycle.
fn find_cycle<'a>(adjacency: &HashMap<&'a TaskId, Vec<&'a TaskId>>) -> Option<&'a TaskId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&TaskId, Mark> = HashMap::new();
    let mut roots: Vec<&&TaskId> = adjacency.keys().collect();
    roots.sort();

    for &root in roots {
        if marks.contains_key(root) {
            continue;
        }
        // (node, index of next child to visit)
        let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Visiting);

        while let Some((node, child)) = stack.last_mut() {
            let children = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&next) = children.get(*child) {
                *child += 1;
                match marks.get(next) {
                    Some(Mark::Visiting) => return Some(next),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        stack.push((next, 0));
                    }
                }
            } else {
                marks.insert(*node, Mark::Done);
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::task::{ErrorMessage, TaskState};

    fn vertex(id: &str) -> TaskVertex {
        TaskVertex::new(id, TaskType::RunTest, Payload::Empty)
    }

    fn chain() -> TaskGraph {
        TaskGraph::from_extension(GraphExtension {
            vertices: vec![vertex("a"), vertex("b"), vertex("c")],
            edges: vec![Dependency::new("a", "b"), Dependency::new("b", "c")],
        })
        .unwrap()
    }

    #[test]
    fn test_extend_builds_dependencies() {
        let graph = chain();
        assert_eq!(graph.len(), 3);
        let a = graph.get(&TaskId::new("a")).unwrap();
        assert_eq!(a.dependencies, vec![TaskId::new("b")]);
        let deps: Vec<_> = graph.dependencies_of(a).map(|t| t.id.as_str()).collect();
        assert_eq!(deps, vec!["b"]);
    }

    #[test]
    fn test_extend_rejects_duplicate_vertex_atomically() {
        let mut graph = chain();
        let err = graph
            .extend(GraphExtension {
                vertices: vec![vertex("d"), vertex("a")],
                edges: vec![],
            })
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask(TaskId::new("a")));
        assert!(err.is_amendment());
        assert!(!graph.contains(&TaskId::new("d")));
    }

    #[test]
    fn test_extend_rejects_unknown_endpoint() {
        let mut graph = chain();
        let err = graph
            .extend(GraphExtension {
                vertices: vec![vertex("d")],
                edges: vec![Dependency::new("d", "missing")],
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_extend_rejects_cycle() {
        let mut graph = chain();
        let err = graph
            .extend(GraphExtension {
                vertices: vec![],
                edges: vec![Dependency::new("c", "a")],
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
        assert!(graph.get(&TaskId::new("c")).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_extend_allows_edges_from_known_vertices() {
        let mut graph = chain();
        graph
            .extend(GraphExtension {
                vertices: vec![vertex("d")],
                edges: vec![Dependency::new("a", "d"), Dependency::new("a", "b")],
            })
            .unwrap();
        let a = graph.get(&TaskId::new("a")).unwrap();
        assert_eq!(a.dependencies, vec![TaskId::new("b"), TaskId::new("d")]);
    }

    #[test]
    fn test_update_checks_version() {
        let mut graph = chain();
        let id = TaskId::new("b");
        graph
            .apply(Action::update_state(&id, 0, TaskState::Ongoing))
            .unwrap();
        assert_eq!(graph.get(&id).unwrap().version, 1);

        let err = graph
            .apply(Action::update_state(&id, 0, TaskState::Completed))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::VersionConflict {
                id: id.clone(),
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(graph.get(&id).unwrap().state, TaskState::Ongoing);
    }

    #[test]
    fn test_stale_failure_records_no_error() {
        let mut graph = chain();
        let id = TaskId::new("c");
        let observed = graph.get(&id).unwrap().clone();
        graph
            .apply(Action::update_state(&id, 0, TaskState::Ongoing))
            .unwrap();

        for action in Action::fail(&observed, "TestFailed", "boom", None) {
            assert!(graph.apply(action).unwrap_err().is_amendment());
        }
        let task = graph.get(&id).unwrap();
        assert!(task.errors.is_empty());
        assert_eq!(task.state, TaskState::Ongoing);

        for action in Action::fail(task, "TestFailed", "boom", None) {
            graph.apply(action).unwrap();
        }
        let task = graph.get(&id).unwrap();
        assert_eq!(task.errors.len(), 1);
        assert_eq!(task.state, TaskState::Failed);
    }

    #[test]
    fn test_append_error_keeps_version() {
        let mut graph = chain();
        let id = TaskId::new("c");
        graph
            .apply(Action::AppendError {
                id: id.clone(),
                error: ErrorMessage::new("TestFailed", "boom"),
            })
            .unwrap();
        let task = graph.get(&id).unwrap();
        assert_eq!(task.version, 0);
        assert!(task.has_error("TestFailed"));
    }

    #[test]
    fn test_unknown_task_is_not_an_amendment() {
        let mut graph = chain();
        let err = graph
            .apply(Action::update_state(&TaskId::new("zz"), 0, TaskState::Failed))
            .unwrap_err();
        assert!(!err.is_amendment());
    }
}
