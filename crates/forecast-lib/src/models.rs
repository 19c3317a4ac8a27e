//! Core data models for the forecasting pipeline

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named numeric column that may contain missing values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl MetricColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of present (non-missing) values
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Sum over present values
    pub fn present_sum(&self) -> f64 {
        self.values.iter().flatten().sum()
    }
}

/// Ordered raw telemetry observations
///
/// With a time index, timestamps are strictly increasing: rows sharing a
/// timestamp are merged on construction. Without one (degraded mode) rows are
/// kept in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesRecord {
    timestamps: Option<Vec<DateTime<Utc>>>,
    columns: Vec<MetricColumn>,
    len: usize,
}

impl TimeSeriesRecord {
    /// Build a time-indexed record, sorting rows and merging duplicates.
    ///
    /// Duplicate rows are merged by summing each column (missing-aware), so no
    /// mass is lost. Returns the record and the number of merged rows.
    pub fn from_timestamped_rows(
        names: Vec<String>,
        mut rows: Vec<(DateTime<Utc>, Vec<Option<f64>>)>,
    ) -> (Self, usize) {
        rows.sort_by_key(|(ts, _)| *ts);

        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(rows.len());
        let mut merged_rows: Vec<Vec<Option<f64>>> = Vec::with_capacity(rows.len());
        let mut duplicates = 0usize;

        for (ts, values) in rows {
            if timestamps.last() == Some(&ts) {
                duplicates += 1;
                if let Some(last) = merged_rows.last_mut() {
                    for (acc, v) in last.iter_mut().zip(values) {
                        *acc = match (*acc, v) {
                            (Some(a), Some(b)) => Some(a + b),
                            (a, None) => a,
                            (None, b) => b,
                        };
                    }
                }
            } else {
                timestamps.push(ts);
                merged_rows.push(values);
            }
        }

        let len = timestamps.len();
        let columns = transpose(names, merged_rows, len);
        (
            Self {
                timestamps: Some(timestamps),
                columns,
                len,
            },
            duplicates,
        )
    }

    /// Build a record without a time index
    pub fn positional(names: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> Self {
        let len = rows.len();
        let columns = transpose(names, rows, len);
        Self {
            timestamps: None,
            columns,
            len,
        }
    }

    /// Build directly from columns, as produced by resampling
    pub(crate) fn from_columns(
        timestamps: Option<Vec<DateTime<Utc>>>,
        columns: Vec<MetricColumn>,
        len: usize,
    ) -> Self {
        Self {
            timestamps,
            columns,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn has_time_index(&self) -> bool {
        self.timestamps.is_some()
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&MetricColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

fn transpose(names: Vec<String>, rows: Vec<Vec<Option<f64>>>, len: usize) -> Vec<MetricColumn> {
    let mut columns: Vec<MetricColumn> = names
        .into_iter()
        .map(|name| MetricColumn::new(name, Vec::with_capacity(len)))
        .collect();
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.values.push(row.get(idx).copied().flatten());
        }
    }
    columns
}

/// A record aggregated into contiguous fixed-width buckets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampledSeries {
    record: TimeSeriesRecord,
    /// Bucket width in seconds; `None` when the source had no time index
    cadence_secs: Option<i64>,
    /// Buckets with no source rows that were filled in
    filled_buckets: usize,
}

impl ResampledSeries {
    pub(crate) fn new(record: TimeSeriesRecord, cadence_secs: Option<i64>, filled_buckets: usize) -> Self {
        Self {
            record,
            cadence_secs,
            filled_buckets,
        }
    }

    /// Wrap a positional record that could not be resampled
    pub fn passthrough(record: TimeSeriesRecord) -> Self {
        Self::new(record, None, 0)
    }

    pub fn record(&self) -> &TimeSeriesRecord {
        &self.record
    }

    pub fn cadence_secs(&self) -> Option<i64> {
        self.cadence_secs
    }

    pub fn filled_buckets(&self) -> usize {
        self.filled_buckets
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// A dense derived column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Table of raw and derived columns keyed by (optional) timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFrame {
    timestamps: Option<Vec<DateTime<Utc>>>,
    columns: Vec<FeatureColumn>,
    len: usize,
}

impl FeatureFrame {
    pub(crate) fn new(
        timestamps: Option<Vec<DateTime<Utc>>>,
        columns: Vec<FeatureColumn>,
        len: usize,
    ) -> Self {
        Self {
            timestamps,
            columns,
            len,
        }
    }

    /// Build a frame from a single named series without a time index
    pub fn from_series(name: impl Into<String>, values: Vec<f64>) -> Self {
        let len = values.len();
        Self {
            timestamps: None,
            columns: vec![FeatureColumn {
                name: name.into(),
                values,
            }],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Values of every column at row `idx`, in column order
    pub fn row(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.len {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx]).collect())
    }
}
