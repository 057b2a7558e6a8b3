//! Metric extraction errors.

/// Why a read_value task could not produce values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadValueError {
    /// The test output does not contain the results file
    #[error("results file not found in test output: {0}")]
    NoFile(String),

    /// The results file is not the expected JSON document
    #[error("results file is malformed: {0}")]
    Malformed(String),

    /// No histogram matches the locator
    #[error("no histogram matches {0}")]
    NotFound(String),

    /// Histograms matched but carried no samples
    #[error("matching histograms have no sample values")]
    NoValues,

    /// Unknown statistic reducer
    #[error("unknown statistic '{0}'")]
    UnknownStat(String),

    /// Chart missing from a graph JSON document
    #[error("chart '{0}' not found")]
    ChartNotFound(String),

    /// Trace missing from a graph JSON chart
    #[error("trace '{0}' not found")]
    TraceNotFound(String),

    /// Read mode other than histogram_sets or graph_json
    #[error("unsupported read mode '{0}'; only histogram_sets and graph_json are supported")]
    UnsupportedMode(String),

    /// The artifact collaborator failed
    #[error("fetching results failed: {0}")]
    Fetch(String),
}

impl ReadValueError {
    /// Stable reason recorded on the failed task.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoFile(_) => "ReadValueNoFile",
            Self::Malformed(_) => "ReadValueMalformed",
            Self::NotFound(_) => "ReadValueNotFound",
            Self::NoValues => "ReadValueNoValues",
            Self::UnknownStat(_) => "ReadValueUnknownStat",
            Self::ChartNotFound(_) => "ReadValueChartNotFound",
            Self::TraceNotFound(_) => "ReadValueTraceNotFound",
            Self::UnsupportedMode(_) => "UnsupportedMode",
            Self::Fetch(_) => "CollaboratorError",
        }
    }
}

/// Result type for metric extraction.
pub type Result<T> = std::result::Result<T, ReadValueError>;
