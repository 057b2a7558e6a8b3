//! Typed task payloads.
//!
//! Every task carries exactly one [`Payload`] variant matching its
//! [`TaskType`](crate::TaskType). Evaluators only look at other task types'
//! payloads through the `as_*` accessors.

use serde::{Deserialize, Serialize};
use crate::analysis::{AnalysisOptions, Culprit, ResultForChange};
use crate::change::Change;
use crate::event::Artifact;

/// Closed union of per-type task payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Orchestrator payload
    FindCulprit(FindCulpritPayload),
    /// Metric extraction payload
    ReadValue(ReadValuePayload),
    /// Test execution payload
    RunTest(RunTestPayload),
    /// Build payload
    FindIsolate(FindIsolatePayload),
    /// No payload
    Empty,
}

impl Payload {
    /// Borrow as a find_culprit payload.
    pub fn as_find_culprit(&self) -> Option<&FindCulpritPayload> {
        match self {
            Self::FindCulprit(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow as a read_value payload.
    pub fn as_read_value(&self) -> Option<&ReadValuePayload> {
        match self {
            Self::ReadValue(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow as a run_test payload.
    pub fn as_run_test(&self) -> Option<&RunTestPayload> {
        match self {
            Self::RunTest(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow as a find_isolate payload.
    pub fn as_find_isolate(&self) -> Option<&FindIsolatePayload> {
        match self {
            Self::FindIsolate(p) => Some(p),
            _ => None,
        }
    }
}

// ===== Option templates =====

/// How to build a change into a testable artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Builder name
    #[serde(default)]
    pub builder: Option<String>,

    /// Build target
    pub target: String,

    /// Build bucket
    pub bucket: String,
}

/// A `key=value` swarming dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Dimension key
    pub key: String,

    /// Dimension value
    pub value: String,
}

/// How to run tests against a built artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOptions {
    /// Test server
    #[serde(default)]
    pub swarming_server: Option<String>,

    /// Worker dimensions
    #[serde(default)]
    pub dimensions: Vec<Dimension>,

    /// Extra test arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl TestOptions {
    /// Whether the dimensions select a Windows worker.
    pub fn is_windows(&self) -> bool {
        self.dimensions
            .iter()
            .any(|d| d.key == "os" && d.value.starts_with("Win"))
    }
}

/// Which artifact format to read metrics from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReadMode {
    /// HistogramSet documents
    HistogramSets,
    /// Legacy chart/trace JSON
    GraphJson,
    /// Anything else, rejected when read
    Unsupported(String),
}

impl From<String> for ReadMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "histogram_sets" => Self::HistogramSets,
            "graph_json" => Self::GraphJson,
            _ => Self::Unsupported(s),
        }
    }
}

impl From<ReadMode> for String {
    fn from(mode: ReadMode) -> Self {
        mode.to_string()
    }
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistogramSets => f.write_str("histogram_sets"),
            Self::GraphJson => f.write_str("graph_json"),
            Self::Unsupported(other) => f.write_str(other),
        }
    }
}

/// Locator for a HistogramSet metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramOptions {
    /// Grouping label
    #[serde(default)]
    pub grouping_label: Option<String>,

    /// Story name
    #[serde(default)]
    pub story: Option<String>,

    /// Statistic reducer (avg, min, max, sum, std, count)
    #[serde(default)]
    pub statistic: Option<String>,

    /// Histogram name
    #[serde(default)]
    pub histogram_name: Option<String>,
}

/// Locator for a legacy chart/trace metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphJsonOptions {
    /// Chart name
    #[serde(default)]
    pub chart: Option<String>,

    /// Trace name
    #[serde(default)]
    pub trace: Option<String>,
}

/// How to read a metric out of a test's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Benchmark name
    pub benchmark: String,

    /// Artifact format
    pub mode: ReadMode,

    /// File name of the results inside the benchmark directory
    pub results_filename: String,

    /// HistogramSet locator
    #[serde(default)]
    pub histogram_options: HistogramOptions,

    /// Chart/trace locator
    #[serde(default)]
    pub graph_json_options: GraphJsonOptions,
}

// ===== find_culprit =====

/// find_culprit task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritPayload {
    /// Job input
    pub input: FindCulpritInput,

    /// Expanded range
    #[serde(default)]
    pub state: FindCulpritState,

    /// Results so far
    #[serde(default)]
    pub output: FindCulpritOutput,
}

impl FindCulpritPayload {
    /// Fresh payload for the given input.
    pub fn new(input: FindCulpritInput) -> Self {
        Self {
            input,
            state: FindCulpritState::default(),
            output: FindCulpritOutput::default(),
        }
    }
}

/// What a bisection job was asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritInput {
    /// First change of the range (known good)
    pub start_change: Change,

    /// Last change of the range (known bad)
    pub end_change: Change,

    /// Statistical knobs
    pub analysis_options: AnalysisOptions,

    /// Build template
    pub build_options: BuildOptions,

    /// Test template
    pub test_options: TestOptions,

    /// Read template
    pub read_options: ReadOptions,
}

/// The ordered range of changes a bisection searches over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritState {
    /// Start change followed by every change up to and including the end
    pub changes: Vec<Change>,
}

/// Published findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindCulpritOutput {
    /// Per-change samples and neighbour comparisons, in range order
    pub change_results: Vec<ResultForChange>,

    /// Adjacent pairs with a significant difference
    pub culprits: Vec<Culprit>,
}

// ===== read_value =====

/// read_value task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadValuePayload {
    /// Locator and change
    pub input: ReadValueInput,

    /// Attempt index within its change
    pub index: u32,

    /// Number of evaluations so far
    #[serde(default)]
    pub tries: u32,

    /// Extracted values
    #[serde(default)]
    pub output: ReadValueOutput,
}

/// What a read_value task extracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadValueInput {
    /// Benchmark name
    pub benchmark: String,

    /// Artifact format
    pub mode: ReadMode,

    /// Path of the results file inside the test output
    pub results_path: String,

    /// HistogramSet locator
    #[serde(default)]
    pub histogram_options: HistogramOptions,

    /// Chart/trace locator
    #[serde(default)]
    pub graph_json_options: GraphJsonOptions,

    /// Change the values belong to
    pub change: Change,
}

/// A named link to a trace of the run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceUrl {
    /// Display name
    pub name: String,

    /// Link
    pub url: String,
}

/// Values extracted by a read_value task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadValueOutput {
    /// Sample values
    pub result_values: Vec<f64>,

    /// Trace links found in the results
    #[serde(default)]
    pub trace_urls: Vec<TraceUrl>,
}

// ===== run_test =====

/// run_test task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTestPayload {
    /// Test request
    pub input: RunTestInput,

    /// Test outcome
    #[serde(default)]
    pub output: RunTestOutput,
}

/// One test attempt for a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTestInput {
    /// Test template
    pub test_options: TestOptions,

    /// Change under test
    pub change: Change,

    /// Attempt index
    pub index: u32,
}

/// Result of scheduling and running a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTestOutput {
    /// Collaborator test id
    #[serde(default)]
    pub test_id: Option<String>,

    /// Where the test wrote its output
    #[serde(default)]
    pub output_location: Option<String>,
}

// ===== find_isolate =====

/// find_isolate task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindIsolatePayload {
    /// Build request
    pub input: FindIsolateInput,

    /// Build outcome
    #[serde(default)]
    pub output: FindIsolateOutput,
}

/// A build request for a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindIsolateInput {
    /// Build template
    pub build_options: BuildOptions,

    /// Change to build
    pub change: Change,
}

/// Result of a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindIsolateOutput {
    /// Collaborator build id
    #[serde(default)]
    pub build_id: Option<String>,

    /// Built artifact
    #[serde(default)]
    pub artifact: Option<Artifact>,
}
