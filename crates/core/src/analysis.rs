//! Analysis options and the comparison records kept on a bisection.

use serde::{Deserialize, Serialize};
use crate::change::Change;

/// Minimum attempts used when the options carry zero.
pub const FALLBACK_MIN_ATTEMPTS: u32 = 10;

/// Maximum attempts used when the options carry zero.
pub const FALLBACK_MAX_ATTEMPTS: u32 = 100;

/// Knobs of the statistical analysis for one bisection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Smallest metric shift considered significant, in metric units
    pub comparison_magnitude: f64,

    /// Attempts scheduled per change before comparing
    pub min_attempts: u32,

    /// Upper bound on attempts per change
    pub max_attempts: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            comparison_magnitude: 1.0,
            min_attempts: 10,
            max_attempts: 60,
        }
    }
}

impl AnalysisOptions {
    /// Comparison magnitude with zero treated as one.
    pub fn effective_magnitude(&self) -> f64 {
        if self.comparison_magnitude == 0.0 {
            1.0
        } else {
            self.comparison_magnitude
        }
    }

    /// Minimum attempts with zero treated as unset.
    pub fn effective_min_attempts(&self) -> u32 {
        if self.min_attempts == 0 {
            FALLBACK_MIN_ATTEMPTS
        } else {
            self.min_attempts
        }
    }

    /// Maximum attempts with zero treated as unset.
    pub fn effective_max_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            FALLBACK_MAX_ATTEMPTS
        } else {
            self.max_attempts
        }
    }
}

/// Outcome of comparing two sample sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonResult {
    /// No significant difference
    Same,
    /// Significant difference
    Different,
    /// Not enough data to decide
    Unknown,
    /// Measurements still outstanding
    Pending,
}

impl std::fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Same => "same",
            Self::Different => "different",
            Self::Unknown => "unknown",
            Self::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// A comparison together with the statistics that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Verdict
    pub result: ComparisonResult,

    /// Combined p-value, when a test was run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,

    /// p-value at or below which the sets are different
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_threshold: Option<f64>,

    /// p-value above which the sets are the same
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_threshold: Option<f64>,
}

impl Comparison {
    /// A comparison that carries only a verdict.
    pub fn verdict(result: ComparisonResult) -> Self {
        Self {
            result,
            p_value: None,
            low_threshold: None,
            high_threshold: None,
        }
    }

    /// Comparison while measurements are outstanding.
    pub fn pending() -> Self {
        Self::verdict(ComparisonResult::Pending)
    }

    /// Comparison without enough data.
    pub fn unknown() -> Self {
        Self::verdict(ComparisonResult::Unknown)
    }
}

/// Comparisons of one change against its neighbours in the ordered range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrevNextComparison {
    /// Against the previous change, absent for the first one
    pub prev: Option<Comparison>,

    /// Against the next change, absent for the last one
    pub next: Option<Comparison>,
}

/// Everything the bisection knows about one change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultForChange {
    /// The change
    pub change: Change,

    /// Flattened sample values collected so far
    pub result_values: Vec<f64>,

    /// Neighbour comparisons
    pub comparisons: PrevNextComparison,
}

/// An adjacent pair of changes with a significant shift between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Culprit {
    /// Change before the shift
    pub from: Change,

    /// Change after the shift
    pub to: Change,
}
