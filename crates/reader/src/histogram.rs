//! HistogramSet documents.
//!
//! A HistogramSet is a JSON array mixing histograms and shared diagnostics.
//! Shared diagnostics carry a `type` and a `guid`; histograms reference them
//! by guid from their own `diagnostics` map.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use culprit_core::TraceUrl;
use regex::Regex;
use serde_json::Value as JsonValue;
use crate::error::{ReadValueError, Result};

/// Diagnostic listing the stories a histogram covers.
pub const STORIES: &str = "stories";
/// Diagnostic listing `key:value` story tags.
pub const STORY_TAGS: &str = "storyTags";
/// Diagnostic naming what a summary histogram summarises over.
pub const SUMMARY_KEYS: &str = "summaryKeys";
/// Diagnostic listing trace links.
pub const TRACE_URLS: &str = "traceUrls";

/// Streaming statistics as stored in a histogram's `running` field.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStatistics {
    /// Number of samples
    pub count: u64,
    /// Largest sample
    pub max: f64,
    /// Mean of the sample logarithms, absent if any sample was <= 0
    pub meanlogs: Option<f64>,
    /// Sample mean
    pub mean: f64,
    /// Smallest sample
    pub min: f64,
    /// Sum of samples
    pub sum: f64,
    /// Sum of squared deviations from the mean
    pub variance: Option<f64>,
}

impl RunningStatistics {
    /// Parse the 7-element `[count, max, meanlogs, mean, min, sum, variance]`
    /// array. Anything else yields `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != 7 {
            return None;
        }
        Some(Self {
            count: items[0].as_f64()? as u64,
            max: items[1].as_f64()?,
            meanlogs: items[2].as_f64(),
            mean: items[3].as_f64()?,
            min: items[4].as_f64()?,
            sum: items[5].as_f64()?,
            variance: items[6].as_f64(),
        })
    }

    /// Compute the statistics of a sample list.
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut stats = Self {
            count: 0,
            max: f64::MIN,
            meanlogs: Some(0.0),
            mean: 0.0,
            min: f64::MAX,
            sum: 0.0,
            variance: Some(0.0),
        };
        for &x in samples {
            stats.count += 1;
            let n = stats.count as f64;
            let delta = x - stats.mean;
            stats.mean += delta / n;
            stats.variance = stats.variance.map(|m2| m2 + delta * (x - stats.mean));
            stats.meanlogs = match stats.meanlogs {
                Some(ml) if x > 0.0 => Some(ml + (x.ln() - ml) / n),
                _ => None,
            };
            stats.max = stats.max.max(x);
            stats.min = stats.min.min(x);
            stats.sum += x;
        }
        stats
    }

    /// Mean, absent without samples.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance with Bessel's correction.
    pub fn variance(&self) -> Option<f64> {
        let m2 = self.variance?;
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => Some(m2 / (n - 1) as f64),
        }
    }

    /// Sample standard deviation with Bessel's correction.
    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

/// One histogram of a HistogramSet.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Metric name
    pub name: String,
    /// Unit string as written
    pub unit: String,
    /// Resolved diagnostics: name -> values
    pub diagnostics: HashMap<String, Vec<JsonValue>>,
    /// Running statistics, when present
    pub running: Option<RunningStatistics>,
    /// Raw samples
    pub sample_values: Vec<f64>,
}

impl Histogram {
    fn from_json(value: &JsonValue, shared: &HashMap<String, Vec<JsonValue>>) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ReadValueError::Malformed("histogram without a name".to_string()))?;
        let unit = value
            .get("unit")
            .and_then(JsonValue::as_str)
            .unwrap_or("unitless");

        let mut diagnostics = HashMap::new();
        if let Some(map) = value.get("diagnostics").and_then(JsonValue::as_object) {
            for (diag_name, diag) in map {
                if diag_name == "tagmap" {
                    continue;
                }
                let values = match diag {
                    JsonValue::String(guid) => shared.get(guid).cloned(),
                    other => other.get("values").and_then(JsonValue::as_array).cloned(),
                };
                if let Some(values) = values {
                    diagnostics.insert(diag_name.clone(), values);
                }
            }
        }

        let sample_values = value
            .get("sampleValues")
            .and_then(JsonValue::as_array)
            .map(|samples| samples.iter().filter_map(JsonValue::as_f64).collect())
            .unwrap_or_default();

        Ok(Self {
            name: name.to_string(),
            unit: unit.to_string(),
            diagnostics,
            running: value.get("running").and_then(RunningStatistics::from_json),
            sample_values,
        })
    }

    /// String entries of a diagnostic.
    pub fn diagnostic_strings(&self, name: &str) -> Vec<String> {
        self.diagnostics
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .map(|v| match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Running statistics, computed from the samples when not stored.
    pub fn running(&self) -> RunningStatistics {
        self.running
            .clone()
            .unwrap_or_else(|| RunningStatistics::from_samples(&self.sample_values))
    }

    /// Grouping label derived from `key:value` story tags: the values,
    /// ordered by key, joined with `_`.
    pub fn grouping_label(&self) -> String {
        let mut tags: Vec<(String, String)> = self
            .diagnostic_strings(STORY_TAGS)
            .into_iter()
            .filter_map(|tag| {
                tag.split_once(':')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        tags.sort();
        tags.into_iter()
            .map(|(_, v)| v)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Test path of this histogram, optionally ignoring grouping labels.
    pub fn test_path(&self, ignore_grouping_label: bool) -> String {
        let summary_keys = self.diagnostic_strings(SUMMARY_KEYS);
        let grouping_label = if ignore_grouping_label {
            None
        } else {
            Some(self.grouping_label())
        };
        let stories = self.diagnostic_strings(STORIES);
        let story = match stories.as_slice() {
            [single] => Some(single.as_str()),
            _ => None,
        };
        test_path_from_components(
            Some(&self.name),
            grouping_label.as_deref(),
            story,
            &summary_keys,
            true,
        )
    }
}

/// Replace characters that cannot appear in a test path component.
pub fn escape_name(name: &str) -> String {
    static ESCAPE: OnceLock<Option<Regex>> = OnceLock::new();
    match ESCAPE.get_or_init(|| Regex::new(r"[:|=/#&,]").ok()) {
        Some(re) => re.replace_all(name, "_").into_owned(),
        None => name.to_string(),
    }
}

/// Build a test path: name, then grouping label unless the histogram is a
/// summary that does not summarise story tags, then the story unless it is
/// a summary.
pub fn test_path_from_components(
    histogram_name: Option<&str>,
    grouping_label: Option<&str>,
    story: Option<&str>,
    summary_keys: &[String],
    needs_escape: bool,
) -> String {
    let is_summary = !summary_keys.is_empty();
    let mut path = histogram_name.unwrap_or_default().to_string();

    if let Some(label) = grouping_label.filter(|l| !l.is_empty()) {
        if !is_summary || summary_keys.iter().any(|k| k == STORY_TAGS) {
            path.push('/');
            path.push_str(label);
        }
    }

    if let Some(story) = story.filter(|s| !s.is_empty()) {
        if !is_summary {
            path.push('/');
            if needs_escape {
                path.push_str(&escape_name(story));
            } else {
                path.push_str(story);
            }
        }
    }

    path
}

/// A parsed HistogramSet.
#[derive(Debug, Clone, Default)]
pub struct HistogramSet {
    histograms: Vec<Histogram>,
}

impl HistogramSet {
    /// Parse a HistogramSet JSON array.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let dicts = value
            .as_array()
            .ok_or_else(|| ReadValueError::Malformed("expected a JSON array".to_string()))?;

        let shared: HashMap<String, Vec<JsonValue>> = dicts
            .iter()
            .filter(|d| d.get("type").and_then(JsonValue::as_str) == Some("GenericSet"))
            .filter_map(|d| {
                let guid = d.get("guid")?.as_str()?.to_string();
                let values = d.get("values")?.as_array()?.clone();
                Some((guid, values))
            })
            .collect();

        let histograms = dicts
            .iter()
            .filter(|d| d.get("type").is_none())
            .map(|d| Histogram::from_json(d, &shared))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { histograms })
    }

    /// All histograms in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Histogram> {
        self.histograms.iter()
    }

    /// Number of histograms.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// Whether the set has no histograms.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    /// Unique trace links, sorted, named by their last path segment.
    pub fn trace_urls(&self) -> Vec<TraceUrl> {
        let urls: BTreeSet<String> = self
            .histograms
            .iter()
            .flat_map(|h| h.diagnostic_strings(TRACE_URLS))
            .collect();
        urls.into_iter()
            .map(|url| TraceUrl {
                name: url.rsplit('/').next().unwrap_or_default().to_string(),
                url,
            })
            .collect()
    }
}
