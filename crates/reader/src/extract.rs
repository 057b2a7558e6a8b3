//! Metric extraction from test results.

use std::collections::{BTreeMap, BTreeSet};
use culprit_core::{GraphJsonOptions, HistogramOptions, TraceUrl};
use serde_json::Value as JsonValue;
use tracing::debug;
use crate::error::{ReadValueError, Result};
use crate::histogram::{test_path_from_components, Histogram, HistogramSet};

/// Values read out of a HistogramSet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    /// Sample values or reduced statistics
    pub values: Vec<f64>,
    /// Trace links found anywhere in the set
    pub trace_urls: Vec<TraceUrl>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Read the values matching `options` from a HistogramSet document.
///
/// A locator that matches nothing with grouping labels applied is retried
/// with grouping labels ignored.
pub fn read_histogram_sets(doc: &JsonValue, options: &HistogramOptions) -> Result<Extracted> {
    let set = HistogramSet::from_json(doc)?;
    let trace_urls = set.trace_urls();

    let values = match extract(&set, options, false) {
        Err(ReadValueError::NotFound(locator)) => {
            debug!("No histogram for {}, retrying without grouping label", locator);
            extract(&set, options, true)?
        }
        other => other?,
    };

    Ok(Extracted { values, trace_urls })
}

fn extract(set: &HistogramSet, options: &HistogramOptions, ignore_grouping_label: bool) -> Result<Vec<f64>> {
    let histogram_name = non_empty(&options.histogram_name);
    let grouping_label = if ignore_grouping_label {
        None
    } else {
        non_empty(&options.grouping_label)
    };
    let story = non_empty(&options.story);
    let statistic = non_empty(&options.statistic);

    let paths_to_match: BTreeSet<String> = [true, false]
        .into_iter()
        .map(|escape| test_path_from_components(histogram_name, grouping_label, story, &[], escape))
        .collect();

    let mut by_path: BTreeMap<String, Vec<&Histogram>> = BTreeMap::new();
    for histogram in set.iter() {
        by_path
            .entry(histogram.test_path(ignore_grouping_label))
            .or_default()
            .push(histogram);
    }

    let mut values = Vec::new();
    let mut matched = 0usize;
    for path in &paths_to_match {
        for histogram in by_path.get(path).into_iter().flatten() {
            matched += 1;
            values.extend(reduce(histogram, statistic)?);
        }
    }

    // Summary fallback: sum everything under the requested path, only when
    // no histogram sits at the path itself.
    if matched == 0 && histogram_name.is_some() {
        let mut total = None;
        for (path, histograms) in &by_path {
            if !paths_to_match.iter().any(|p| path.starts_with(p.as_str())) {
                continue;
            }
            for histogram in histograms {
                matched += 1;
                for v in reduce(histogram, statistic)? {
                    *total.get_or_insert(0.0) += v;
                }
            }
        }
        values.extend(total);
    }

    if values.is_empty() && histogram_name.is_some() {
        if matched > 0 {
            return Err(ReadValueError::NoValues);
        }
        return Err(ReadValueError::NotFound(format!(
            "histogram:{}, grouping_label:{}, story:{}",
            histogram_name.unwrap_or_default(),
            grouping_label.unwrap_or_default(),
            story.unwrap_or_default()
        )));
    }

    Ok(values)
}

/// Raw samples without a statistic, else the one reduced value.
fn reduce(histogram: &Histogram, statistic: Option<&str>) -> Result<Vec<f64>> {
    let Some(statistic) = statistic else {
        return Ok(histogram.sample_values.clone());
    };
    if histogram.sample_values.is_empty() {
        return Ok(Vec::new());
    }
    let running = histogram.running();
    let value = match statistic {
        "avg" => running.mean(),
        "min" => Some(running.min),
        "max" => Some(running.max),
        "sum" => Some(running.sum),
        "std" => running.stddev(),
        "count" => Some(running.count as f64),
        other => return Err(ReadValueError::UnknownStat(other.to_string())),
    };
    Ok(value.into_iter().collect())
}

/// Read the first value of `data[chart].traces[trace]` from a graph JSON
/// document. Nothing is read unless both chart and trace are set.
pub fn read_graph_json(doc: &JsonValue, options: &GraphJsonOptions) -> Result<Vec<f64>> {
    let (Some(chart), Some(trace)) = (non_empty(&options.chart), non_empty(&options.trace)) else {
        return Ok(Vec::new());
    };

    let chart_data = doc
        .get(chart)
        .ok_or_else(|| ReadValueError::ChartNotFound(chart.to_string()))?;
    let trace_data = chart_data
        .get("traces")
        .and_then(|traces| traces.get(trace))
        .ok_or_else(|| ReadValueError::TraceNotFound(trace.to_string()))?;

    let first = trace_data
        .get(0)
        .ok_or_else(|| ReadValueError::Malformed(format!("trace '{}' is empty", trace)))?;
    let value = match first {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ReadValueError::Malformed(format!("trace '{}' value is not a number", trace)))?;

    Ok(vec![value])
}
