//! Fixed-cadence resampling
//!
//! Buckets are aligned to the Unix epoch (`floor(ts / cadence) * cadence`) and
//! every bucket between the first and last populated one is emitted, so the
//! resampled index has no implicit gaps.

use crate::config::Aggregation;
use crate::error::{PipelineError, Result};
use crate::models::{MetricColumn, ResampledSeries, TimeSeriesRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Upper bound on emitted buckets, guards against a cadence far finer than the data span
const MAX_BUCKETS: i64 = 10_000_000;

/// Summary of one resampling pass
#[derive(Debug, Clone, Serialize)]
pub struct ResampleReport {
    pub cadence_secs: Option<i64>,
    pub aggregation: Aggregation,
    pub input_rows: usize,
    pub buckets: usize,
    /// Buckets that had no source rows and were filled
    pub filled_buckets: usize,
}

/// Aggregate a record into contiguous fixed-width buckets.
///
/// With `Sum`, missing cells are skipped and empty buckets become `0.0`, so the
/// column total is preserved. With `Mean`, empty buckets are marked missing.
/// A record without a time index is passed through unchanged.
pub fn resample(
    record: &TimeSeriesRecord,
    cadence_secs: i64,
    aggregation: Aggregation,
) -> Result<(ResampledSeries, ResampleReport)> {
    if cadence_secs <= 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "cadence must be positive, got {}s",
            cadence_secs
        )));
    }

    let timestamps = match record.timestamps() {
        Some(ts) if !ts.is_empty() => ts,
        _ => {
            info!(
                event = "resample_skipped",
                rows = record.len(),
                "No time index, passing series through unresampled"
            );
            let report = ResampleReport {
                cadence_secs: None,
                aggregation,
                input_rows: record.len(),
                buckets: record.len(),
                filled_buckets: 0,
            };
            return Ok((ResampledSeries::passthrough(record.clone()), report));
        }
    };

    let cadence_ms = cadence_secs.checked_mul(1000).ok_or_else(|| {
        PipelineError::InvalidConfig(format!("cadence of {}s is out of range", cadence_secs))
    })?;
    let keys: Vec<i64> = timestamps
        .iter()
        .map(|ts| ts.timestamp_millis().div_euclid(cadence_ms))
        .collect();
    // Timestamps are sorted, so the keys are too
    let first = keys[0];
    let last = keys[keys.len() - 1];
    let span = last - first + 1;
    if span > MAX_BUCKETS {
        return Err(PipelineError::InvalidConfig(format!(
            "cadence of {}s yields {} buckets, limit is {}",
            cadence_secs, span, MAX_BUCKETS
        )));
    }
    let n_buckets = span as usize;

    let mut rows_per_bucket = vec![0usize; n_buckets];
    for key in &keys {
        rows_per_bucket[(key - first) as usize] += 1;
    }

    let columns: Vec<MetricColumn> = record
        .columns()
        .iter()
        .map(|column| aggregate_column(column, &keys, first, n_buckets, aggregation))
        .collect();

    let bucket_times = (0..span)
        .map(|offset| {
            DateTime::<Utc>::from_timestamp((first + offset) * cadence_secs, 0).ok_or_else(|| {
                PipelineError::InvalidConfig("bucket timestamp out of range".into())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let filled_buckets = rows_per_bucket.iter().filter(|&&n| n == 0).count();
    let resampled = TimeSeriesRecord::from_columns(Some(bucket_times), columns, n_buckets);

    debug!(
        cadence_secs,
        input_rows = record.len(),
        buckets = n_buckets,
        filled_buckets,
        "Series resampled"
    );

    let report = ResampleReport {
        cadence_secs: Some(cadence_secs),
        aggregation,
        input_rows: record.len(),
        buckets: n_buckets,
        filled_buckets,
    };
    Ok((
        ResampledSeries::new(resampled, Some(cadence_secs), filled_buckets),
        report,
    ))
}

fn aggregate_column(
    column: &MetricColumn,
    keys: &[i64],
    first: i64,
    n_buckets: usize,
    aggregation: Aggregation,
) -> MetricColumn {
    let mut sums = vec![0.0f64; n_buckets];
    let mut counts = vec![0usize; n_buckets];

    for (value, key) in column.values.iter().zip(keys) {
        if let Some(v) = value {
            let bucket = (key - first) as usize;
            sums[bucket] += v;
            counts[bucket] += 1;
        }
    }

    let values = match aggregation {
        Aggregation::Sum => sums.into_iter().map(Some).collect(),
        Aggregation::Mean => sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
            .collect(),
    };
    MetricColumn::new(column.name.clone(), values)
}
