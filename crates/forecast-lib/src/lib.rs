//! Capacity forecast benchmarking library
//!
//! This crate provides the core functionality for:
//! - Telemetry ingestion and fixed-cadence resampling
//! - Lag, difference and calendar feature engineering
//! - Chronological partitioning, windowing and min-max scaling
//! - Walk-forward evaluation of autoregressive, sequence and probabilistic models
//! - Accuracy metrics, run reports and observability

pub mod config;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod features;
pub mod forecaster;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod partition;
pub mod pipeline;
pub mod scaler;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use evaluator::{evaluate, ForecastResult, Metrics};
pub use forecaster::{ForecastStrategy, RollingForecaster, StrategyKind};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{Pipeline, PreparedDataset, RunReport, StrategyOutcome};
