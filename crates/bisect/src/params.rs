//! Job parameters as submitted by users.

use serde::{Deserialize, Serialize};
use culprit_core::{
    AnalysisOptions, BuildOptions, Change, Commit, Dimension, FindCulpritInput, GerritPatch,
    GraphJsonOptions, HistogramOptions, ReadMode, ReadOptions, TestOptions,
};
use crate::config::BisectConfig;

/// Job parameters were rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputValidationError {
    /// Required parameters absent
    #[error("Missing required parameters: {0:?}")]
    Missing(Vec<&'static str>),

    /// Required parameters present but empty
    #[error("Parameters must not be empty: {0:?}")]
    Empty(Vec<&'static str>),

    /// Negative or non-finite magnitude
    #[error("invalid comparison magnitude {0}")]
    InvalidMagnitude(f64),

    /// Attempt bounds out of order
    #[error("min_attempts ({min}) exceeds max_attempts ({max})")]
    InvalidAttempts {
        /// Requested minimum
        min: u32,
        /// Requested maximum
        max: u32,
    },
}

/// Parameters of a bisection request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Known good commit
    #[serde(default)]
    pub start_git_hash: Option<String>,
    /// Known bad commit
    #[serde(default)]
    pub end_git_hash: Option<String>,
    /// Repository the hashes belong to
    #[serde(default)]
    pub repository: Option<String>,
    /// Build target
    #[serde(default)]
    pub target: Option<String>,
    /// Benchmark to run
    #[serde(default)]
    pub benchmark: Option<String>,

    /// Builder name
    #[serde(default)]
    pub builder: Option<String>,
    /// Build bucket
    #[serde(default)]
    pub bucket: Option<String>,
    /// Test server
    #[serde(default)]
    pub swarming_server: Option<String>,
    /// Worker dimensions
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    /// Extra test arguments
    #[serde(default)]
    pub extra_test_args: Vec<String>,

    /// Story filter
    #[serde(default)]
    pub story: Option<String>,
    /// Grouping label filter
    #[serde(default)]
    pub grouping_label: Option<String>,
    /// Statistic reducer
    #[serde(default)]
    pub statistic: Option<String>,
    /// Chart, also the histogram name
    #[serde(default)]
    pub chart: Option<String>,
    /// Trace within the chart
    #[serde(default)]
    pub trace: Option<String>,

    /// Smallest shift worth reporting
    #[serde(default)]
    pub comparison_magnitude: Option<f64>,
    /// Attempts per change
    #[serde(default)]
    pub min_attempts: Option<u32>,
    /// Attempt cap per change
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Patch applied to every change
    #[serde(default)]
    pub patch: Option<GerritPatch>,
}

impl JobParams {
    fn validate(&self) -> Result<(), InputValidationError> {
        let fields: [(&'static str, &Option<String>); 5] = [
            ("target", &self.target),
            ("benchmark", &self.benchmark),
            ("repository", &self.repository),
            ("start_git_hash", &self.start_git_hash),
            ("end_git_hash", &self.end_git_hash),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(InputValidationError::Missing(missing));
        }
        let empty: Vec<&'static str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().is_some_and(|s| s.trim().is_empty()))
            .map(|(k, _)| *k)
            .collect();
        if !empty.is_empty() {
            return Err(InputValidationError::Empty(empty));
        }
        Ok(())
    }

    /// Validate and turn the parameters into a job input, filling defaults
    /// from `config`.
    pub fn into_input(self, config: &BisectConfig) -> Result<FindCulpritInput, InputValidationError> {
        self.validate()?;

        let magnitude = match self.comparison_magnitude {
            None => config.default_comparison_magnitude,
            Some(m) if m == 0.0 => 1.0,
            Some(m) if m.is_finite() && m > 0.0 => m,
            Some(m) => return Err(InputValidationError::InvalidMagnitude(m)),
        };
        let min_attempts = self.min_attempts.unwrap_or(config.default_min_attempts);
        let max_attempts = self.max_attempts.unwrap_or(config.default_max_attempts);
        if min_attempts > max_attempts && max_attempts != 0 {
            return Err(InputValidationError::InvalidAttempts {
                min: min_attempts,
                max: max_attempts,
            });
        }

        let repository = self.repository.unwrap_or_default();
        let target = self.target.unwrap_or_default();
        let start_change = Change::from_commit(Commit::new(repository.clone(), self.start_git_hash.unwrap_or_default()))
            .with_patch(self.patch.clone());
        let end_change = Change::from_commit(Commit::new(repository, self.end_git_hash.unwrap_or_default()))
            .with_patch(self.patch);

        let mode = if config.reads_histogram_sets(&target) {
            ReadMode::HistogramSets
        } else {
            ReadMode::GraphJson
        };

        Ok(FindCulpritInput {
            start_change,
            end_change,
            analysis_options: AnalysisOptions {
                comparison_magnitude: magnitude,
                min_attempts,
                max_attempts,
            },
            build_options: BuildOptions {
                builder: self.builder,
                target,
                bucket: self.bucket.unwrap_or_else(|| config.default_bucket.clone()),
            },
            test_options: TestOptions {
                swarming_server: self.swarming_server,
                dimensions: self.dimensions,
                extra_args: self.extra_test_args,
            },
            read_options: ReadOptions {
                benchmark: self.benchmark.unwrap_or_default(),
                mode,
                results_filename: config.results_filename.clone(),
                histogram_options: HistogramOptions {
                    grouping_label: self.grouping_label,
                    story: self.story,
                    statistic: self.statistic,
                    histogram_name: self.chart.clone(),
                },
                graph_json_options: GraphJsonOptions {
                    chart: self.chart,
                    trace: self.trace,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParams {
        serde_json::from_value(serde_json::json!({
            "start_git_hash": "c0",
            "end_git_hash": "c9",
            "repository": "chromium",
            "target": "performance_test_suite",
            "benchmark": "speedometer2",
            "chart": "RunsPerMinute",
            "story": "Speedometer2"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let input = params().into_input(&BisectConfig::default()).unwrap();
        assert_eq!(input.analysis_options.comparison_magnitude, 1.0);
        assert_eq!(input.analysis_options.min_attempts, 10);
        assert_eq!(input.analysis_options.max_attempts, 60);
        assert_eq!(input.read_options.mode, ReadMode::HistogramSets);
        assert_eq!(input.read_options.histogram_options.histogram_name.as_deref(), Some("RunsPerMinute"));
        assert_eq!(input.build_options.bucket, "master.tryserver.chromium.perf");
        assert_eq!(input.start_change.id_string(), "chromium@c0");
    }

    #[test]
    fn test_graph_json_for_other_targets() {
        let mut p = params();
        p.target = Some("cc_perftests".to_string());
        let input = p.into_input(&BisectConfig::default()).unwrap();
        assert_eq!(input.read_options.mode, ReadMode::GraphJson);
    }

    #[test]
    fn test_missing_and_empty() {
        let mut p = params();
        p.benchmark = None;
        p.repository = None;
        assert_eq!(
            p.into_input(&BisectConfig::default()).unwrap_err(),
            InputValidationError::Missing(vec!["benchmark", "repository"])
        );

        let mut p = params();
        p.end_git_hash = Some(String::new());
        assert_eq!(
            p.into_input(&BisectConfig::default()).unwrap_err(),
            InputValidationError::Empty(vec!["end_git_hash"])
        );
    }

    #[test]
    fn test_magnitude_and_patch() {
        let mut p = params();
        p.comparison_magnitude = Some(0.0);
        p.patch = Some(GerritPatch {
            server: "https://review.example.com".to_string(),
            change: "123".to_string(),
            revision: "4".to_string(),
        });
        let input = p.into_input(&BisectConfig::default()).unwrap();
        assert_eq!(input.analysis_options.comparison_magnitude, 1.0);
        assert!(input.start_change.patch.is_some());
        assert_eq!(input.start_change.patch, input.end_change.patch);

        let mut p = params();
        p.comparison_magnitude = Some(-2.0);
        assert!(matches!(
            p.into_input(&BisectConfig::default()),
            Err(InputValidationError::InvalidMagnitude(_))
        ));
    }
}
