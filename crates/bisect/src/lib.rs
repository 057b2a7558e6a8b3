//! Culprit Bisect
//!
//! Finds the commit that introduced a performance or functional change:
//! builds and tests changes across a commit range, compares their samples
//! and narrows the range by speculative bisection.

#![warn(missing_docs)]

pub mod config;
pub mod collaborators;
pub mod params;
pub mod graph;
pub mod isolate;
pub mod test_runner;
pub mod find_culprit;
pub mod evaluator;

pub use config::{BisectConfig, EngineSection};
pub use collaborators::{
    BuildService, CollaboratorError, CommitHistory, HistoryError, InMemoryHistory, TestService,
};
pub use params::{InputValidationError, JobParams};
pub use graph::{create_graph, find_culprit_id, FIND_CULPRIT_TASK_ID};
pub use isolate::{find_isolate_evaluator, FindIsolateEvaluator};
pub use test_runner::{run_test_evaluator, RunTestEvaluator};
pub use find_culprit::{find_culprit_evaluator, FindCulpritEvaluator, BISECTION_FAILED};
pub use evaluator::bisection_evaluator;
