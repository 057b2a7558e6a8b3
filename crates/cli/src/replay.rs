//! Offline bisection against recorded samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use culprit_bisect::{bisection_evaluator, create_graph, BisectConfig, CollaboratorError, InMemoryHistory, JobParams};
use culprit_core::{
    Artifact, BuildOptions, BuildStatus, Change, Event, JobId, ReadMode, ReadOptions, TestOptions,
    TestStatus,
};
use culprit_execution::{Evaluation, ExecutionEngine};
use culprit_storage::GraphStore;

/// A recorded bisection: job parameters, the commit history and the samples
/// each commit produces.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    /// Job parameters
    pub params: JobParams,
    /// Repository history, oldest first
    pub commits: Vec<String>,
    /// Samples by commit hash. A commit without an entry measures like the
    /// closest earlier commit that has one.
    pub samples: BTreeMap<String, Vec<f64>>,
    /// Commits whose builds fail
    #[serde(default)]
    pub failed_builds: Vec<String>,
}

impl Fixture {
    fn history(&self) -> InMemoryHistory {
        let repository = self.params.repository.clone().unwrap_or_default();
        InMemoryHistory::new().with_repository(repository, self.commits.clone())
    }

    fn samples_for(&self, hash: &str) -> Option<&[f64]> {
        let position = self.commits.iter().position(|c| c == hash)?;
        self.commits[..=position]
            .iter()
            .rev()
            .find_map(|c| self.samples.get(c))
            .map(Vec::as_slice)
    }

    /// Value the `index`th attempt on `hash` reports.
    fn sample(&self, hash: &str, index: usize) -> Option<f64> {
        let samples = self.samples_for(hash)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples[index % samples.len()])
    }

    /// Results document in the format `options` reads.
    fn document(&self, options: &ReadOptions, value: f64) -> serde_json::Value {
        match options.mode {
            ReadMode::HistogramSets => {
                let histogram = &options.histogram_options;
                let name = histogram
                    .histogram_name
                    .clone()
                    .unwrap_or_else(|| "metric".to_string());
                let mut diagnostics = serde_json::Map::new();
                if let Some(story) = &histogram.story {
                    diagnostics.insert(
                        "stories".to_string(),
                        json!({"type": "GenericSet", "values": [story]}),
                    );
                }
                json!([{
                    "name": name,
                    "unit": "ms_smallerIsBetter",
                    "sampleValues": [value],
                    "diagnostics": diagnostics,
                }])
            }
            _ => {
                let chart = options.graph_json_options.chart.clone().unwrap_or_default();
                let trace = options.graph_json_options.trace.clone().unwrap_or_default();
                let mut traces = serde_json::Map::new();
                traces.insert(trace, json!([value.to_string(), "0.0"]));
                let mut doc = serde_json::Map::new();
                doc.insert(chart, json!({ "traces": traces }));
                serde_json::Value::Object(doc)
            }
        }
    }
}

fn commit_hash(change: &Change) -> String {
    change
        .base_commit()
        .map(|c| c.git_hash.clone())
        .unwrap_or_default()
}

/// Create a job for the fixture in `store` and drive it until nothing is
/// left to do.
pub async fn replay<S: GraphStore>(
    store: S,
    fixture: Fixture,
    config: &BisectConfig,
) -> Result<(JobId, Evaluation)> {
    let input = fixture
        .params
        .clone()
        .into_input(config)
        .context("Invalid job parameters")?;
    let read_options = input.read_options.clone();
    let job = JobId::new();
    store.populate(job, create_graph(input)).await?;
    info!("Replaying job {} over {} commits", job, fixture.commits.len());

    let fixture = Arc::new(fixture);

    let builds = {
        let fixture = Arc::clone(&fixture);
        move |_: &BuildOptions, change: &Change| -> Result<BuildStatus, CollaboratorError> {
            let hash = commit_hash(change);
            if fixture.failed_builds.contains(&hash) {
                return Ok(BuildStatus::Failed {
                    reason: format!("recorded build failure at {}", hash),
                });
            }
            Ok(BuildStatus::Completed {
                artifact: Artifact {
                    server: "replay".to_string(),
                    hash: change.id_string(),
                },
            })
        }
    };

    let tests = |_: &TestOptions, _: &Artifact, change: &Change, index: u32| -> Result<TestStatus, CollaboratorError> {
        Ok(TestStatus::Completed {
            output_location: format!("{}/{}", commit_hash(change), index),
        })
    };

    let artifacts = {
        let fixture = Arc::clone(&fixture);
        move |location: &str, path: &str| -> culprit_reader::Result<Option<String>> {
            let Some((hash, index)) = location.split_once('/') else {
                return Ok(None);
            };
            let Ok(index) = index.parse::<usize>() else {
                return Ok(None);
            };
            debug!("Reading {} from {}", path, location);
            Ok(fixture
                .sample(hash, index)
                .map(|value| fixture.document(&read_options, value).to_string()))
        }
    };

    let evaluator = bisection_evaluator(fixture.history(), builds, tests, artifacts, config);
    let engine = ExecutionEngine::new(store).with_config(config.engine_config());
    let evaluation = engine.evaluate(job, &Event::initiate(), &evaluator).await?;
    Ok((job, evaluation))
}
