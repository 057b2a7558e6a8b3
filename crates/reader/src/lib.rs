//! Culprit Reader
//!
//! Reads metric values out of test results: HistogramSet documents and the
//! legacy chart/trace graph JSON format.

#![warn(missing_docs)]

pub mod error;
pub mod histogram;
pub mod extract;
pub mod artifact;
pub mod evaluator;

pub use error::{ReadValueError, Result};
pub use histogram::{Histogram, HistogramSet, RunningStatistics};
pub use extract::{read_graph_json, read_histogram_sets, Extracted};
pub use artifact::{ArtifactSource, InMemoryArtifacts};
pub use evaluator::{read_value_evaluator, ReadValueEvaluator, DEPENDENCY_FAILED};
