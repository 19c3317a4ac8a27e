//! Feature engineering over resampled telemetry
//!
//! Derives lag and first-difference features for configured base metrics and
//! calendar fields from the time index. The engine is stateless: the same
//! series always yields the same frame.

use crate::config::{DerivedMetric, FeatureConfig};
use crate::models::{FeatureColumn, FeatureFrame, ResampledSeries};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::warn;

/// What the engine could and could not derive
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeatureReport {
    /// Base metrics requested but absent from the source
    pub missing: Vec<String>,
    /// Columns dropped because every value was missing
    pub omitted: Vec<String>,
    /// Whether calendar fields were derived
    pub calendar: bool,
}

impl FeatureReport {
    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty() || !self.omitted.is_empty()
    }
}

/// Builds a `FeatureFrame` from a `ResampledSeries`
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, series: &ResampledSeries) -> (FeatureFrame, FeatureReport) {
        let record = series.record();
        let len = record.len();
        let mut report = FeatureReport::default();
        let mut columns: Vec<FeatureColumn> = Vec::new();

        for column in record.columns() {
            match fill_gaps(&column.values) {
                Some(values) => columns.push(FeatureColumn {
                    name: column.name.clone(),
                    values,
                }),
                None => {
                    warn!(
                        event = "feature_omitted",
                        column = %column.name,
                        "Column has no values, omitting"
                    );
                    report.omitted.push(column.name.clone());
                }
            }
        }

        if self.config.calendar {
            if let Some(timestamps) = record.timestamps() {
                columns.extend(calendar_features(timestamps));
                report.calendar = true;
            }
        }

        for metric in &self.config.base_metrics {
            if record.column(&metric.source).is_none() {
                warn!(
                    event = "feature_degraded",
                    column = %metric.source,
                    "Base metric missing, skipping lag features"
                );
                report.missing.push(metric.source.clone());
                continue;
            }
            let base = match columns.iter().find(|c| c.name == metric.source) {
                Some(c) => c.values.clone(),
                // Present but entirely missing: already listed as omitted
                None => continue,
            };
            derive_lag_features(metric, &base, &mut columns, &mut report);
        }

        (FeatureFrame::new(record.timestamps().map(|t| t.to_vec()), columns, len), report)
    }
}

fn derive_lag_features(
    metric: &DerivedMetric,
    base: &[f64],
    columns: &mut Vec<FeatureColumn>,
    report: &mut FeatureReport,
) {
    let prev: Vec<Option<f64>> = lag(base, 1);
    let diff: Vec<Option<f64>> = base
        .iter()
        .zip(&prev)
        .map(|(value, prev)| prev.map(|p| value - p))
        .collect();

    for (name, values) in [(&metric.prev_name, prev), (&metric.diff_name, diff)] {
        match fill_gaps(&values) {
            Some(values) => columns.push(FeatureColumn {
                name: name.clone(),
                values,
            }),
            None => report.omitted.push(name.clone()),
        }
    }
}

/// Shift values forward by `k` periods; the first `k` rows are missing
pub fn lag(values: &[f64], k: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(k).map(|j| values[j]))
        .collect()
}

/// Forward-fill missing values, back-filling any leading gap from the first
/// present value. Returns `None` when the column has no values at all.
pub fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|v| {
                if let Some(v) = v {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

fn calendar_features(timestamps: &[DateTime<Utc>]) -> Vec<FeatureColumn> {
    let weekday: Vec<f64> = timestamps
        .iter()
        .map(|ts| ts.weekday().num_days_from_monday() as f64)
        .collect();
    let weekend = weekday
        .iter()
        .map(|d| if *d >= 5.0 { 1.0 } else { 0.0 })
        .collect();
    let month = timestamps.iter().map(|ts| ts.month() as f64).collect();
    let day = timestamps.iter().map(|ts| ts.day() as f64).collect();

    vec![
        FeatureColumn {
            name: "weekday".to_string(),
            values: weekday,
        },
        FeatureColumn {
            name: "weekend".to_string(),
            values: weekend,
        },
        FeatureColumn {
            name: "month".to_string(),
            values: month,
        },
        FeatureColumn {
            name: "day".to_string(),
            values: day,
        },
    ]
}
