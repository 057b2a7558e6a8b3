//! Core data model of the culprit finder.
//!
//! This crate defines changes, tasks, the per-job task graph and the
//! actions and events that drive it.

#![warn(missing_docs)]

// Identities
mod id;

// What is bisected
mod change;
mod analysis;

// Task graph
mod task;
mod payload;
mod graph;
mod action;
mod event;

// Re-exports
pub use id::*;

pub use change::{Change, Commit, GerritPatch};
pub use analysis::{
    AnalysisOptions, Comparison, ComparisonResult, Culprit, PrevNextComparison, ResultForChange,
    FALLBACK_MAX_ATTEMPTS, FALLBACK_MIN_ATTEMPTS,
};

pub use task::{Dependency, ErrorMessage, Task, TaskState, TaskType, TaskVertex};
pub use payload::{
    BuildOptions, Dimension, FindCulpritInput, FindCulpritOutput, FindCulpritPayload,
    FindCulpritState, FindIsolateInput, FindIsolateOutput, FindIsolatePayload, GraphJsonOptions,
    HistogramOptions, Payload, ReadMode, ReadOptions, ReadValueInput, ReadValueOutput,
    ReadValuePayload, RunTestInput, RunTestOutput, RunTestPayload, TestOptions, TraceUrl,
};
pub use graph::{GraphError, GraphExtension, TaskGraph};
pub use action::Action;
pub use event::{Artifact, BuildStatus, Event, EventKind, EventPayload, TestStatus};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
