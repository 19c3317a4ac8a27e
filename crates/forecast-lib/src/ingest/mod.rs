//! Ingestion and alignment of raw telemetry
//!
//! This module turns a tabular telemetry source into a `TimeSeriesRecord` and
//! aligns it onto a fixed cadence:
//! - CSV parsing with epoch-second or epoch-millisecond timestamps
//! - Row-level validation (bad rows are dropped and counted, never fatal)
//! - Degraded positional mode when no timestamp column exists
//! - Resampling into contiguous buckets

mod reader;
mod resample;

pub use reader::{read_csv, IngestOptions, IngestReport, IngestedRecord};
pub use resample::{resample, ResampleReport};
