//! Task graph construction for bisection jobs.

use std::ops::Range;
use culprit_core::{
    Change, Dependency, FindCulpritInput, FindCulpritPayload, FindIsolateInput, FindIsolateOutput,
    FindIsolatePayload, GraphExtension, Payload, ReadOptions, ReadValueInput, ReadValuePayload,
    RunTestInput, RunTestOutput, RunTestPayload, TaskId, TaskType, TaskVertex, TestOptions,
};

/// Id of the find_culprit task of every job.
pub const FIND_CULPRIT_TASK_ID: &str = "performance_bisection";

/// Id of the find_culprit task.
pub fn find_culprit_id() -> TaskId {
    TaskId::new(FIND_CULPRIT_TASK_ID)
}

/// Id of the build task for a change.
pub fn find_isolate_id(change: &Change) -> TaskId {
    TaskId::new(format!("find_isolate_{}", change.id_string()))
}

/// Id of one test attempt for a change.
pub fn run_test_id(change: &Change, index: u32) -> TaskId {
    TaskId::new(format!("run_test_{}_{}", change.id_string(), index))
}

/// Id of one metric read for a change.
pub fn read_value_id(change: &Change, index: u32) -> TaskId {
    TaskId::new(format!("read_value_{}_{}", change.id_string(), index))
}

/// Location of the results file inside a test's output.
pub fn results_path(read_options: &ReadOptions, test_options: &TestOptions) -> String {
    let separator = if test_options.is_windows() { "\\" } else { "/" };
    format!("{}{}{}", read_options.benchmark, separator, read_options.results_filename)
}

/// Build, test and read tasks for attempts `indices` of `change`.
///
/// The subgraph always contains the change's find_isolate vertex; callers
/// extending an existing graph drop the vertices it already has.
pub fn read_subgraph(input: &FindCulpritInput, change: &Change, indices: Range<u32>) -> GraphExtension {
    let isolate = find_isolate_id(change);
    let mut extension = GraphExtension {
        vertices: vec![TaskVertex::new(
            isolate.clone(),
            TaskType::FindIsolate,
            Payload::FindIsolate(FindIsolatePayload {
                input: FindIsolateInput {
                    build_options: input.build_options.clone(),
                    change: change.clone(),
                },
                output: FindIsolateOutput::default(),
            }),
        )],
        edges: Vec::new(),
    };

    let path = results_path(&input.read_options, &input.test_options);
    for index in indices {
        let run_test = run_test_id(change, index);
        let read_value = read_value_id(change, index);

        extension.vertices.push(TaskVertex::new(
            run_test.clone(),
            TaskType::RunTest,
            Payload::RunTest(RunTestPayload {
                input: RunTestInput {
                    test_options: input.test_options.clone(),
                    change: change.clone(),
                    index,
                },
                output: RunTestOutput::default(),
            }),
        ));
        extension.vertices.push(TaskVertex::new(
            read_value.clone(),
            TaskType::ReadValue,
            Payload::ReadValue(ReadValuePayload {
                input: ReadValueInput {
                    benchmark: input.read_options.benchmark.clone(),
                    mode: input.read_options.mode.clone(),
                    results_path: path.clone(),
                    histogram_options: input.read_options.histogram_options.clone(),
                    graph_json_options: input.read_options.graph_json_options.clone(),
                    change: change.clone(),
                },
                index,
                tries: 0,
                output: Default::default(),
            }),
        ));
        extension.edges.push(Dependency::new(run_test.clone(), isolate.clone()));
        extension.edges.push(Dependency::new(read_value, run_test));
    }

    extension
}

/// Initial graph of a job: reads for the start and end changes and the
/// find_culprit task depending on all of them.
pub fn create_graph(input: FindCulpritInput) -> GraphExtension {
    let attempts = input.analysis_options.effective_min_attempts();
    let mut extension = read_subgraph(&input, &input.start_change, 0..attempts);
    if input.end_change != input.start_change {
        extension.merge(read_subgraph(&input, &input.end_change, 0..attempts));
    }

    let find_culprit = find_culprit_id();
    let reads: Vec<TaskId> = extension
        .vertices
        .iter()
        .filter(|v| v.task_type == TaskType::ReadValue)
        .map(|v| v.id.clone())
        .collect();
    extension
        .edges
        .extend(reads.into_iter().map(|read| Dependency::new(find_culprit.clone(), read)));
    extension.vertices.push(TaskVertex::new(
        find_culprit,
        TaskType::FindCulprit,
        Payload::FindCulprit(FindCulpritPayload::new(input)),
    ));
    extension
}
