//! End-to-end orchestration: prepare a dataset once, then benchmark strategies
//!
//! Structural failures (unreadable source, empty dataset, invalid config) abort
//! `prepare`. Everything after that is contained per strategy: one strategy
//! failing never stops the others, and the report says why.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::evaluator::{evaluate, ForecastResult, Unscored};
use crate::features::{FeatureEngine, FeatureReport};
use crate::forecaster::{
    AutoregressiveStrategy, ForecastPoint, LstmConfig, LstmRegressor, OnnxRegressor,
    ProbabilisticStrategy, RollingForecaster, SequenceRegressor, SequenceStrategy, SkippedStep,
    StrategyKind,
};
use crate::ingest::{read_csv, resample, IngestOptions, IngestReport, ResampleReport};
use crate::models::FeatureFrame;
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::partition::Split;
use serde::Serialize;
use std::io::Read;
use std::time::Instant;
use tracing::warn;

/// Featured dataset plus the accounting of how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDataset {
    pub frame: FeatureFrame,
    pub ingest: IngestReport,
    pub resample: Option<ResampleReport>,
    pub features: FeatureReport,
}

impl PreparedDataset {
    /// Wrap an in-memory frame that skipped ingestion
    pub fn from_frame(frame: FeatureFrame) -> Self {
        let rows = frame.len();
        Self {
            frame,
            ingest: IngestReport {
                rows_read: rows,
                rows_used: rows,
                ..IngestReport::default()
            },
            resample: None,
            features: FeatureReport::default(),
        }
    }
}

/// Per-strategy outcome of a benchmark run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StrategyOutcome {
    Completed {
        strategy: StrategyKind,
        elapsed_ms: u64,
        result: ForecastResult,
    },
    Failed {
        strategy: StrategyKind,
        elapsed_ms: u64,
        kind: String,
        message: String,
        /// Forecasts produced before the strategy could not be scored
        #[serde(skip_serializing_if = "Vec::is_empty")]
        points: Vec<ForecastPoint>,
        skipped: Vec<SkippedStep>,
    },
}

impl StrategyOutcome {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            StrategyOutcome::Completed { strategy, .. } | StrategyOutcome::Failed { strategy, .. } => {
                *strategy
            }
        }
    }

    pub fn result(&self) -> Option<&ForecastResult> {
        match self {
            StrategyOutcome::Completed { result, .. } => Some(result),
            StrategyOutcome::Failed { .. } => None,
        }
    }

    /// Rolling steps skipped, whether or not the strategy completed
    pub fn skipped(&self) -> &[SkippedStep] {
        match self {
            StrategyOutcome::Completed { result, .. } => result.skipped(),
            StrategyOutcome::Failed { skipped, .. } => skipped,
        }
    }
}

/// Everything one benchmark run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub rows: usize,
    pub ingest: IngestReport,
    pub resample: Option<ResampleReport>,
    pub features: FeatureReport,
    pub strategies: Vec<StrategyOutcome>,
}

impl RunReport {
    pub fn outcome(&self, kind: StrategyKind) -> Option<&StrategyOutcome> {
        self.strategies.iter().find(|o| o.strategy() == kind)
    }

    /// Completed results ordered by ascending RMSE
    pub fn ranking(&self) -> Vec<&ForecastResult> {
        let mut completed: Vec<&ForecastResult> =
            self.strategies.iter().filter_map(|o| o.result()).collect();
        completed.sort_by(|a, b| a.metrics().rmse.total_cmp(&b.metrics().rmse));
        completed
    }

    pub fn total_skipped_steps(&self) -> usize {
        self.strategies
            .iter()
            .map(|o| o.skipped().len())
            .sum()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let run_id = format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"));
        Ok(Self {
            config,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new(run_id),
        })
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(run_id);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        self.logger.run_id()
    }

    /// Ingest, resample and featurize a CSV source
    pub fn prepare<R: Read>(&self, source: R) -> Result<PreparedDataset> {
        let options = IngestOptions::from_config(&self.config.ingest)?;
        let ingested = read_csv(source, &options)?;
        let ingest = ingested.report;

        self.metrics.add_rows_ingested(ingest.rows_used);
        for (reason, count) in &ingest.dropped {
            self.metrics.add_rows_dropped(reason, *count);
        }
        self.logger.log_ingest(
            ingest.rows_read,
            ingest.rows_used,
            ingest.rows_dropped(),
            ingest.degraded,
        );

        let cadence = self.config.ingest.cadence_secs()?;
        let (series, resample_report) =
            resample(&ingested.record, cadence, self.config.ingest.aggregation)?;

        let (frame, features) = FeatureEngine::new(self.config.features.clone()).build(&series);
        if frame.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        self.metrics
            .add_features_degraded(features.missing.len() + features.omitted.len());
        self.logger.log_features(
            frame.len(),
            frame.columns().len(),
            &features.missing,
            &features.omitted,
        );

        Ok(PreparedDataset {
            frame,
            ingest,
            resample: Some(resample_report),
            features,
        })
    }

    /// Benchmark one strategy against the prepared dataset
    pub fn evaluate(&self, dataset: &PreparedDataset, kind: StrategyKind) -> Result<ForecastResult> {
        self.evaluate_recorded(dataset, kind)
            .map_err(|failure| failure.error)
    }

    /// Benchmark one strategy, keeping the rolling points and skips of a run
    /// that could not be scored
    pub fn evaluate_outcome(&self, dataset: &PreparedDataset, kind: StrategyKind) -> StrategyOutcome {
        let start = Instant::now();
        let result = self.evaluate_recorded(dataset, kind);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(result) => StrategyOutcome::Completed {
                strategy: kind,
                elapsed_ms,
                result,
            },
            Err(failure) => StrategyOutcome::Failed {
                strategy: kind,
                elapsed_ms,
                kind: failure.error.kind().to_string(),
                message: failure.error.to_string(),
                points: failure.points,
                skipped: failure.skipped,
            },
        }
    }

    fn evaluate_recorded(
        &self,
        dataset: &PreparedDataset,
        kind: StrategyKind,
    ) -> std::result::Result<ForecastResult, StrategyFailure> {
        let start = Instant::now();
        let outcome = self.evaluate_inner(dataset, kind);
        match &outcome {
            Ok(result) => {
                let name = result.strategy();
                for point in result.points() {
                    self.metrics
                        .observe_step(name, point.elapsed_us as f64 / 1_000_000.0);
                }
                self.metrics.add_steps_skipped(name, result.skipped().len());
                self.metrics.set_last_rmse(name, result.metrics().rmse);
                self.logger.log_strategy_completed(
                    name,
                    result.points().len(),
                    result.skipped().len(),
                    result.metrics().rmse,
                    start.elapsed().as_millis(),
                );
            }
            Err(failure) => {
                let e = &failure.error;
                self.metrics.inc_strategy_failure(kind.as_str(), e.kind());
                self.metrics.add_steps_skipped(kind.as_str(), failure.skipped.len());
                self.logger.log_strategy_failed(
                    kind.as_str(),
                    e.kind(),
                    &e.to_string(),
                    failure.skipped.len(),
                );
            }
        }
        outcome
    }

    fn evaluate_inner(
        &self,
        dataset: &PreparedDataset,
        kind: StrategyKind,
    ) -> std::result::Result<ForecastResult, StrategyFailure> {
        let forecaster = RollingForecaster::new(self.config.evaluation.max_steps);
        let seed = self.config.evaluation.seed;
        let frame = &dataset.frame;

        match kind {
            StrategyKind::Autoregressive => {
                let cfg = &self.config.autoregressive;
                let series = Split::new(frame, cfg.split_fraction)?.series(&cfg.target_column)?;
                self.logger.log_strategy_started(
                    kind.as_str(),
                    &cfg.target_column,
                    series.train.len(),
                    series.test.len(),
                );
                let mut strategy = AutoregressiveStrategy::new(cfg.order, series.train.len())?;
                let outcome = forecaster.run(&mut strategy, series.train, series.test)?;
                Ok(ForecastResult::score(outcome, cfg.target_column.clone())?)
            }
            StrategyKind::Sequence => {
                let cfg = &self.config.sequence;
                let series = Split::new(frame, cfg.split_fraction)?.series(&cfg.target_column)?;
                self.logger.log_strategy_started(
                    kind.as_str(),
                    &cfg.target_column,
                    series.train.len(),
                    series.test.len(),
                );
                let regressor: Box<dyn SequenceRegressor> = match &cfg.onnx_model_path {
                    Some(path) => Box::new(OnnxRegressor::from_path(
                        path,
                        cfg.look_back,
                        cfg.onnx_sha256.as_deref(),
                    )?),
                    None => Box::new(LstmRegressor::new(LstmConfig::from_sequence(cfg, seed))?),
                };
                let mut strategy = SequenceStrategy::train(regressor, series.train, cfg.look_back)?;
                let train_metrics = match evaluate(strategy.train_pairs()) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!(error = %e, "No in-sample metrics for sequence strategy");
                        None
                    }
                };
                let outcome = forecaster.run(&mut strategy, series.train, series.test)?;
                let result = ForecastResult::score(outcome, cfg.target_column.clone())?;
                Ok(match train_metrics {
                    Some(m) => result.with_train_metrics(m),
                    None => result,
                })
            }
            StrategyKind::Probabilistic => {
                let cfg = &self.config.probabilistic;
                let series = Split::new(frame, cfg.split_fraction)?.series(&cfg.target_column)?;
                self.logger.log_strategy_started(
                    kind.as_str(),
                    &cfg.target_column,
                    series.train.len(),
                    series.test.len(),
                );
                let mut strategy = ProbabilisticStrategy::new(
                    cfg.order,
                    cfg.num_samples,
                    cfg.point_estimate,
                    seed,
                    series.train.len(),
                )?;
                let outcome = forecaster.run(&mut strategy, series.train, series.test)?;
                Ok(ForecastResult::score(outcome, cfg.target_column.clone())?)
            }
        }
    }

    /// Benchmark every strategy, across threads when configured
    pub fn evaluate_all(&self, dataset: &PreparedDataset) -> RunReport {
        self.evaluate_many(dataset, &StrategyKind::ALL)
    }

    pub fn evaluate_many(&self, dataset: &PreparedDataset, kinds: &[StrategyKind]) -> RunReport {
        let strategies = if self.config.evaluation.parallel_strategies && kinds.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = kinds
                    .iter()
                    .map(|&kind| (kind, scope.spawn(move || self.evaluate_outcome(dataset, kind))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(kind, handle)| {
                        handle.join().unwrap_or_else(|_| StrategyOutcome::Failed {
                            strategy: kind,
                            elapsed_ms: 0,
                            kind: "panic".to_string(),
                            message: "strategy thread panicked".to_string(),
                            points: Vec::new(),
                            skipped: Vec::new(),
                        })
                    })
                    .collect()
            })
        } else {
            kinds.iter().map(|&kind| self.evaluate_outcome(dataset, kind)).collect()
        };

        RunReport {
            run_id: self.run_id().to_string(),
            rows: dataset.frame.len(),
            ingest: dataset.ingest.clone(),
            resample: dataset.resample.clone(),
            features: dataset.features.clone(),
            strategies,
        }
    }

    /// Prepare a source and benchmark every strategy on it
    pub fn run<R: Read>(&self, source: R) -> Result<RunReport> {
        let dataset = self.prepare(source)?;
        Ok(self.evaluate_all(&dataset))
    }
}

/// A strategy error together with the rolling output produced before it
struct StrategyFailure {
    error: PipelineError,
    points: Vec<ForecastPoint>,
    skipped: Vec<SkippedStep>,
}

impl From<PipelineError> for StrategyFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            points: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl From<Unscored> for StrategyFailure {
    fn from(unscored: Unscored) -> Self {
        Self {
            error: unscored.error,
            points: unscored.outcome.points,
            skipped: unscored.outcome.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CPU_USAGE_MHZ, CPU_USAGE_PERCENT};

    fn wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| 40.0 + 15.0 * (t as f64 * 0.5).sin() + (t % 3) as f64)
            .collect()
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sequence.target_column = CPU_USAGE_PERCENT.to_string();
        config.sequence.epochs = 2;
        config.probabilistic.num_samples = 50;
        config
    }

    #[test]
    fn test_prepare_from_csv() {
        let csv = "Timestamp [ms];CPU usage [%];CPU usage [MHZ]\n\
                   0;10;100\n\
                   1800;20;200\n\
                   3600;30;300\n\
                   bad;1;1\n\
                   10800;40;400\n";
        let mut config = config();
        config.ingest.delimiter = ';';
        config.ingest.timestamp_unit = crate::config::TimestampUnit::Seconds;
        let pipeline = Pipeline::new(config).unwrap();
        let dataset = pipeline.prepare(csv.as_bytes()).unwrap();

        assert_eq!(dataset.ingest.rows_used, 4);
        assert_eq!(dataset.ingest.rows_dropped(), 1);
        // Buckets 0h, 1h, 2h (empty), 3h
        assert_eq!(dataset.frame.len(), 4);
        assert_eq!(dataset.frame.column(CPU_USAGE_PERCENT).unwrap(), &[30.0, 30.0, 0.0, 40.0]);
        assert_eq!(dataset.frame.column(CPU_USAGE_MHZ).unwrap()[0], 300.0);
        assert_eq!(dataset.resample.as_ref().unwrap().filled_buckets, 1);
    }

    #[test]
    fn test_evaluate_all_sequential_and_parallel_agree() {
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, wave(60)));

        let sequential = Pipeline::new(config()).unwrap().evaluate_all(&dataset);
        let mut parallel_config = config();
        parallel_config.evaluation.parallel_strategies = true;
        let parallel = Pipeline::new(parallel_config).unwrap().evaluate_all(&dataset);

        assert_eq!(sequential.strategies.len(), 3);
        for kind in StrategyKind::ALL {
            let a = sequential.outcome(kind).unwrap().result().unwrap();
            let b = parallel.outcome(kind).unwrap().result().unwrap();
            assert_eq!(a.predictions(), b.predictions());
            assert!(a.points().len() <= 10);
        }
        let ranking = sequential.ranking();
        assert_eq!(ranking.len(), 3);
        assert!(ranking[0].metrics().rmse <= ranking[2].metrics().rmse);
    }

    #[test]
    fn test_missing_target_fails_only_that_strategy() {
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, wave(40)));
        let mut config = config();
        config.sequence.target_column = CPU_USAGE_MHZ.to_string();
        let report = Pipeline::new(config).unwrap().evaluate_all(&dataset);

        match report.outcome(StrategyKind::Sequence).unwrap() {
            StrategyOutcome::Failed { kind, .. } => assert_eq!(kind, "missing_column"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(report.outcome(StrategyKind::Autoregressive).unwrap().result().is_some());
        assert_eq!(report.ranking().len(), 2);
    }

    #[test]
    fn test_unscorable_strategy_keeps_skip_accounting() {
        // A NaN in the training history makes every AR refit fail
        let mut values = wave(40);
        values[5] = f64::NAN;
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, values));
        let report = Pipeline::new(config())
            .unwrap()
            .evaluate_many(&dataset, &[StrategyKind::Autoregressive]);

        match report.outcome(StrategyKind::Autoregressive).unwrap() {
            StrategyOutcome::Failed {
                kind,
                points,
                skipped,
                ..
            } => {
                assert_eq!(kind, "insufficient_results");
                assert!(points.is_empty());
                assert_eq!(skipped.len(), 10);
                assert!(skipped.iter().all(|s| s.kind == "fit_failure"));
                assert!(skipped.iter().all(|s| !s.reason.is_empty()));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.total_skipped_steps(), 10);

        let json = serde_json::to_value(&report).unwrap();
        let failed = &json["strategies"][0];
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["skipped"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_structural_failure_reports_no_skips() {
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, wave(40)));
        let mut config = config();
        config.autoregressive.target_column = "absent".to_string();
        let outcome = Pipeline::new(config)
            .unwrap()
            .evaluate_outcome(&dataset, StrategyKind::Autoregressive);
        assert!(outcome.result().is_none());
        assert!(outcome.skipped().is_empty());
    }

    #[test]
    fn test_sequence_reports_train_metrics() {
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, wave(40)));
        let result = Pipeline::new(config())
            .unwrap()
            .evaluate(&dataset, StrategyKind::Sequence)
            .unwrap();
        assert!(result.train_metrics().is_some());
        assert_eq!(result.target(), CPU_USAGE_PERCENT);
    }

    #[test]
    fn test_probabilistic_points_carry_distributions() {
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series(CPU_USAGE_PERCENT, wave(40)));
        let result = Pipeline::new(config())
            .unwrap()
            .evaluate(&dataset, StrategyKind::Probabilistic)
            .unwrap();
        assert!(result.points().iter().all(|p| p.distribution.is_some()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.autoregressive.split_fraction = 1.5;
        assert!(matches!(Pipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }
}
