//! Bisection configuration.

use serde::{Deserialize, Serialize};
use culprit_execution::EngineConfig;

const HISTOGRAM_SET_SUITES: &[&str] = &["performance_test_suite", "telemetry_perf_tests"];

const SUITE_SUFFIXES: &[&str] = &[
    "",
    "_android_chrome",
    "_android_monochrome",
    "_android_monochrome_bundle",
    "_android_weblayer",
    "_android_webview",
    "_android_clank_chrome",
    "_android_clank_monochrome",
    "_android_clank_monochrome_64_32_bundle",
    "_android_clank_monochrome_bundle",
    "_android_clank_trichrome_bundle",
    "_android_clank_trichrome_webview",
    "_android_clank_trichrome_webview_bundle",
    "_android_clank_webview",
    "_android_clank_webview_bundle",
];

const HISTOGRAM_SET_TARGETS: &[&str] = &[
    "performance_webview_test_suite",
    "telemetry_perf_webview_tests",
    "vr_perf_tests",
];

/// Evaluation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Max passes per evaluation (None = until fixpoint)
    pub max_passes: Option<usize>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_passes: EngineConfig::default().max_passes,
        }
    }
}

/// Configuration for bisection jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BisectConfig {
    /// Speculation depth per evaluation
    pub speculation_levels: usize,

    /// Attempts per change when a job does not say
    pub default_min_attempts: u32,

    /// Attempt cap per change when a job does not say
    pub default_max_attempts: u32,

    /// Comparison magnitude when a job does not say
    pub default_comparison_magnitude: f64,

    /// Name of the results file a benchmark writes
    pub results_filename: String,

    /// Build bucket when a job does not say
    pub default_bucket: String,

    /// Targets whose results are HistogramSets; the rest write graph JSON
    pub histogram_set_targets: Vec<String>,

    /// Evaluation loop
    pub engine: EngineSection,
}

impl Default for BisectConfig {
    fn default() -> Self {
        let mut targets: Vec<String> = HISTOGRAM_SET_SUITES
            .iter()
            .flat_map(|suite| SUITE_SUFFIXES.iter().map(move |suffix| format!("{}{}", suite, suffix)))
            .collect();
        targets.extend(HISTOGRAM_SET_TARGETS.iter().map(|t| t.to_string()));

        Self {
            speculation_levels: 2,
            default_min_attempts: 10,
            default_max_attempts: 60,
            default_comparison_magnitude: 1.0,
            results_filename: "perf_results.json".to_string(),
            default_bucket: "master.tryserver.chromium.perf".to_string(),
            histogram_set_targets: targets,
            engine: EngineSection::default(),
        }
    }
}

impl BisectConfig {
    /// Whether a target writes HistogramSets.
    pub fn reads_histogram_sets(&self, target: &str) -> bool {
        self.histogram_set_targets.iter().any(|t| t == target)
    }

    /// Runtime configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_passes: self.engine.max_passes,
        }
    }
}
