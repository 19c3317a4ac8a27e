//! Observability for benchmark runs
//!
//! Provides:
//! - Prometheus metrics (ingestion volume, step outcomes, step latency, RMSE)
//! - Structured logging of pipeline events with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    GaugeVec, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-step fit+predict latency (in seconds)
const STEP_LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0,
];

static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    rows_ingested: IntCounter,
    rows_dropped: IntCounterVec,
    features_degraded: IntCounter,
    steps_evaluated: IntCounterVec,
    steps_skipped: IntCounterVec,
    step_latency_seconds: HistogramVec,
    strategy_failures: IntCounterVec,
    last_rmse: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            rows_ingested: register_int_counter!(
                "cfb_rows_ingested_total",
                "Source rows accepted by ingestion"
            )
            .expect("Failed to register rows_ingested"),

            rows_dropped: register_int_counter_vec!(
                "cfb_rows_dropped_total",
                "Source rows dropped during ingestion",
                &["reason"]
            )
            .expect("Failed to register rows_dropped"),

            features_degraded: register_int_counter!(
                "cfb_features_degraded_total",
                "Feature columns skipped or omitted"
            )
            .expect("Failed to register features_degraded"),

            steps_evaluated: register_int_counter_vec!(
                "cfb_steps_evaluated_total",
                "Rolling forecast steps that produced a prediction",
                &["strategy"]
            )
            .expect("Failed to register steps_evaluated"),

            steps_skipped: register_int_counter_vec!(
                "cfb_steps_skipped_total",
                "Rolling forecast steps skipped after a failed fit",
                &["strategy"]
            )
            .expect("Failed to register steps_skipped"),

            step_latency_seconds: register_histogram_vec!(
                "cfb_step_latency_seconds",
                "Time spent fitting and predicting one rolling step",
                &["strategy"],
                STEP_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register step_latency_seconds"),

            strategy_failures: register_int_counter_vec!(
                "cfb_strategy_failures_total",
                "Strategy runs that ended without metrics",
                &["strategy", "kind"]
            )
            .expect("Failed to register strategy_failures"),

            last_rmse: register_gauge_vec!(
                "cfb_last_rmse",
                "RMSE of the most recent run per strategy",
                &["strategy"]
            )
            .expect("Failed to register last_rmse"),
        }
    }
}

/// Handle to the process-wide pipeline metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn add_rows_ingested(&self, rows: usize) {
        self.inner().rows_ingested.inc_by(rows as u64);
    }

    pub fn add_rows_dropped(&self, reason: &str, rows: usize) {
        self.inner()
            .rows_dropped
            .with_label_values(&[reason])
            .inc_by(rows as u64);
    }

    pub fn add_features_degraded(&self, count: usize) {
        self.inner().features_degraded.inc_by(count as u64);
    }

    pub fn observe_step(&self, strategy: &str, duration_secs: f64) {
        let inner = self.inner();
        inner.steps_evaluated.with_label_values(&[strategy]).inc();
        inner
            .step_latency_seconds
            .with_label_values(&[strategy])
            .observe(duration_secs);
    }

    pub fn add_steps_skipped(&self, strategy: &str, count: usize) {
        self.inner()
            .steps_skipped
            .with_label_values(&[strategy])
            .inc_by(count as u64);
    }

    pub fn inc_strategy_failure(&self, strategy: &str, kind: &str) {
        self.inner()
            .strategy_failures
            .with_label_values(&[strategy, kind])
            .inc();
    }

    pub fn set_last_rmse(&self, strategy: &str, rmse: f64) {
        self.inner().last_rmse.with_label_values(&[strategy]).set(rmse);
    }
}

/// Structured logger for pipeline lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_ingest(&self, rows_read: usize, rows_used: usize, rows_dropped: usize, degraded: bool) {
        if rows_dropped > 0 || degraded {
            warn!(
                event = "ingest_completed",
                run_id = %self.run_id,
                rows_read,
                rows_used,
                rows_dropped,
                degraded,
                "Ingestion completed with dropped rows or a degraded time index"
            );
        } else {
            info!(
                event = "ingest_completed",
                run_id = %self.run_id,
                rows_read,
                rows_used,
                "Ingestion completed"
            );
        }
    }

    pub fn log_features(&self, rows: usize, columns: usize, missing: &[String], omitted: &[String]) {
        info!(
            event = "features_built",
            run_id = %self.run_id,
            rows,
            columns,
            missing = ?missing,
            omitted = ?omitted,
            "Feature frame built"
        );
    }

    pub fn log_strategy_started(&self, strategy: &str, target: &str, train_len: usize, test_len: usize) {
        info!(
            event = "strategy_started",
            run_id = %self.run_id,
            strategy = %strategy,
            target = %target,
            train_len,
            test_len,
            "Strategy evaluation started"
        );
    }

    pub fn log_strategy_completed(
        &self,
        strategy: &str,
        evaluated: usize,
        skipped: usize,
        rmse: f64,
        elapsed_ms: u128,
    ) {
        info!(
            event = "strategy_completed",
            run_id = %self.run_id,
            strategy = %strategy,
            evaluated,
            skipped,
            rmse,
            elapsed_ms = elapsed_ms as u64,
            "Strategy evaluation completed"
        );
    }

    pub fn log_strategy_failed(&self, strategy: &str, kind: &str, error: &str, skipped: usize) {
        warn!(
            event = "strategy_failed",
            run_id = %self.run_id,
            strategy = %strategy,
            kind = %kind,
            error = %error,
            skipped = skipped,
            "Strategy evaluation failed"
        );
    }
}
