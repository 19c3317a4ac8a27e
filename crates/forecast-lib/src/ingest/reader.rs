//! CSV telemetry reader

use crate::config::{IngestConfig, TimestampUnit};
use crate::error::{PipelineError, Result};
use crate::models::TimeSeriesRecord;
use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, warn};

/// Epoch values above this are interpreted as milliseconds in `Auto` mode
const MILLIS_THRESHOLD: f64 = 1e11;

/// Options controlling how a source is read
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub timestamp_column: String,
    pub timestamp_unit: TimestampUnit,
    pub delimiter: u8,
    pub require_timestamp: bool,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let delimiter = u8::try_from(config.delimiter).map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "delimiter must be a single-byte character, got '{}'",
                config.delimiter
            ))
        })?;
        Ok(Self {
            timestamp_column: config.timestamp_column.clone(),
            timestamp_unit: config.timestamp_unit,
            delimiter,
            require_timestamp: config.require_timestamp,
        })
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            timestamp_column: crate::config::DEFAULT_TIMESTAMP_COLUMN.to_string(),
            timestamp_unit: TimestampUnit::Auto,
            delimiter: b',',
            require_timestamp: false,
        }
    }
}

/// Accounting for one ingestion pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_used: usize,
    /// Dropped row counts keyed by reason
    pub dropped: BTreeMap<String, usize>,
    pub duplicates_merged: usize,
    /// Name of the timestamp column actually used
    pub timestamp_column: Option<String>,
    /// True when no timestamp column was found and time features are skipped
    pub degraded: bool,
}

impl IngestReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    fn drop_row(&mut self, reason: &str) {
        *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
    }
}

/// Ingested record together with its accounting
#[derive(Debug, Clone)]
pub struct IngestedRecord {
    pub record: TimeSeriesRecord,
    pub report: IngestReport,
}

/// Read a CSV telemetry source.
///
/// Rows whose timestamp cannot be parsed are dropped and counted. A missing
/// timestamp column is fatal only when `require_timestamp` is set; otherwise
/// the record is positional and calendar features are skipped downstream.
pub fn read_csv<R: Read>(source: R, options: &IngestOptions) -> Result<IngestedRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let ts_idx = resolve_timestamp_column(&headers, &options.timestamp_column);

    let mut report = IngestReport::default();

    if ts_idx.is_none() {
        if options.require_timestamp {
            return Err(PipelineError::MissingColumn {
                column: options.timestamp_column.clone(),
            });
        }
        warn!(
            event = "timestamp_missing",
            column = %options.timestamp_column,
            "No timestamp column found, continuing without time index"
        );
        report.degraded = true;
    }
    report.timestamp_column = ts_idx.map(|i| headers[i].clone());

    let metric_idx: Vec<usize> = (0..headers.len()).filter(|i| Some(*i) != ts_idx).collect();
    let names: Vec<String> = metric_idx.iter().map(|&i| headers[i].clone()).collect();

    let mut timed_rows: Vec<(DateTime<Utc>, Vec<Option<f64>>)> = Vec::new();
    let mut positional_rows: Vec<Vec<Option<f64>>> = Vec::new();

    for result in reader.records() {
        report.rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Skipping malformed CSV record");
                report.drop_row("malformed_record");
                continue;
            }
        };

        let values = parse_metrics(&record, &metric_idx);
        match ts_idx {
            Some(idx) => match record.get(idx).and_then(|raw| parse_timestamp(raw, options.timestamp_unit)) {
                Some(ts) => timed_rows.push((ts, values)),
                None => report.drop_row("unparsable_timestamp"),
            },
            None => positional_rows.push(values),
        }
    }

    let record = if ts_idx.is_some() {
        let (record, duplicates) = TimeSeriesRecord::from_timestamped_rows(names, timed_rows);
        report.duplicates_merged = duplicates;
        record
    } else {
        TimeSeriesRecord::positional(names, positional_rows)
    };
    report.rows_used = report.rows_read - report.rows_dropped();

    if record.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    debug!(
        rows_read = report.rows_read,
        rows_dropped = report.rows_dropped(),
        duplicates = report.duplicates_merged,
        "CSV ingested"
    );

    Ok(IngestedRecord { record, report })
}

fn normalize_header(name: &str) -> String {
    // Spreadsheet exports may carry a UTF-8 BOM on the first header
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn resolve_timestamp_column(headers: &[String], configured: &str) -> Option<usize> {
    headers.iter().position(|h| h == configured).or_else(|| {
        headers
            .iter()
            .position(|h| h.to_ascii_lowercase().contains("timestamp"))
    })
}

fn parse_metrics(record: &StringRecord, metric_idx: &[usize]) -> Vec<Option<f64>> {
    metric_idx
        .iter()
        .map(|&i| record.get(i).and_then(parse_value))
        .collect()
}

/// Parse a numeric cell; empty, non-numeric and non-finite cells are missing
fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an epoch timestamp in seconds or milliseconds
pub(crate) fn parse_timestamp(raw: &str, unit: TimestampUnit) -> Option<DateTime<Utc>> {
    let value = parse_value(raw)?;
    let millis = match unit {
        TimestampUnit::Seconds => value * 1000.0,
        TimestampUnit::Milliseconds => value,
        TimestampUnit::Auto => {
            if value.abs() > MILLIS_THRESHOLD {
                value
            } else {
                value * 1000.0
            }
        }
    };
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Timestamp [ms],CPU usage [%],Network received throughput [KB/s]\n\
        1376314846,10.5,1.0\n\
        1376315146,11.0,\n\
        not-a-time,12.0,3.0\n\
        1376315446,abc,4.0\n";

    #[test]
    fn test_read_csv_drops_bad_timestamps() {
        let ingested = read_csv(SAMPLE.as_bytes(), &IngestOptions::default()).unwrap();
        let report = &ingested.report;
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_used, 3);
        assert_eq!(report.dropped.get("unparsable_timestamp"), Some(&1));
        assert!(!report.degraded);
        assert_eq!(report.timestamp_column.as_deref(), Some("Timestamp [ms]"));

        let record = &ingested.record;
        assert_eq!(record.len(), 3);
        let cpu = record.column("CPU usage [%]").unwrap();
        assert_eq!(cpu.values, vec![Some(10.5), Some(11.0), None]);
        let rx = record.column("Network received throughput [KB/s]").unwrap();
        assert_eq!(rx.values, vec![Some(1.0), None, Some(4.0)]);
    }

    #[test]
    fn test_timestamp_units() {
        let secs = parse_timestamp("1376314846", TimestampUnit::Auto).unwrap();
        let millis = parse_timestamp("1376314846000", TimestampUnit::Auto).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.timestamp(), 1_376_314_846);

        let forced = parse_timestamp("1376314846000", TimestampUnit::Milliseconds).unwrap();
        assert_eq!(forced.timestamp(), 1_376_314_846);
        assert!(parse_timestamp("", TimestampUnit::Seconds).is_none());
        assert!(parse_timestamp("NaN", TimestampUnit::Seconds).is_none());
    }

    #[test]
    fn test_missing_timestamp_degrades() {
        let data = "CPU usage [%],other\n1.0,2.0\n3.0,4.0\n";
        let ingested = read_csv(data.as_bytes(), &IngestOptions::default()).unwrap();
        assert!(ingested.report.degraded);
        assert!(!ingested.record.has_time_index());
        assert_eq!(ingested.record.len(), 2);
    }

    #[test]
    fn test_missing_timestamp_fails_when_required() {
        let data = "CPU usage [%]\n1.0\n";
        let options = IngestOptions {
            require_timestamp: true,
            ..Default::default()
        };
        let err = read_csv(data.as_bytes(), &options).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_fallback_timestamp_column_and_delimiter() {
        let data = "\u{feff}Timestamp;CPU usage [MHZ]\n100;5.0\n200;6.0\n";
        let options = IngestOptions {
            delimiter: b';',
            ..Default::default()
        };
        let ingested = read_csv(data.as_bytes(), &options).unwrap();
        assert_eq!(ingested.report.timestamp_column.as_deref(), Some("Timestamp"));
        assert_eq!(ingested.record.column_names(), vec!["CPU usage [MHZ]"]);
    }

    #[test]
    fn test_undecodable_row_is_dropped_as_malformed() {
        let mut data = b"Timestamp [ms],CPU usage [%]\n1376314846,10.5\n".to_vec();
        data.extend_from_slice(b"1376315146,\xff\xfe\n");
        data.extend_from_slice(b"1376315446,12.0\n");

        let ingested = read_csv(data.as_slice(), &IngestOptions::default()).unwrap();
        let report = &ingested.report;
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_used, 2);
        assert_eq!(report.dropped.get("malformed_record"), Some(&1));
        let cpu = ingested.record.column("CPU usage [%]").unwrap();
        assert_eq!(cpu.values, vec![Some(10.5), Some(12.0)]);
    }

    #[test]
    fn test_all_rows_invalid_is_empty_dataset() {
        let data = "Timestamp [ms],cpu\nbad,1.0\n";
        let err = read_csv(data.as_bytes(), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset));
    }
}
