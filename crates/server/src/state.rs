//! Shared server state: the prepared dataset and per-model run records

use chrono::{DateTime, Utc};
use forecast_lib::{ForecastResult, Pipeline, PipelineError, PreparedDataset, StrategyKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Dashboard-facing description of a model family
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
}

pub fn model_info(kind: StrategyKind) -> ModelInfo {
    match kind {
        StrategyKind::Autoregressive => ModelInfo {
            name: "ARIMA",
            description: "AutoRegressive model refit on the full history every step",
            use_case: "Time series forecasting for CPU trends",
        },
        StrategyKind::Sequence => ModelInfo {
            name: "LSTM",
            description: "Long Short-Term Memory network over scaled look-back windows",
            use_case: "Deep learning for sequential pattern recognition",
        },
        StrategyKind::Probabilistic => ModelInfo {
            name: "DeepAR",
            description: "Probabilistic forecasting with sampled predictive distributions",
            use_case: "Uncertainty quantification in predictions",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotRun,
    Running,
    Completed,
    Failed,
}

/// Latest run of one model family
#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub status: RunStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<ForecastResult>,
}

impl Default for ModelRecord {
    fn default() -> Self {
        Self {
            status: RunStatus::NotRun,
            updated_at: None,
            error: None,
            result: None,
        }
    }
}

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub dataset: Option<Arc<PreparedDataset>>,
    pub load_error: Option<String>,
    pub preview_rows: usize,
    pub started_at: DateTime<Utc>,
    runs: RwLock<HashMap<StrategyKind, ModelRecord>>,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        dataset: Result<PreparedDataset, PipelineError>,
        preview_rows: usize,
    ) -> Self {
        let (dataset, load_error) = match dataset {
            Ok(d) => (Some(Arc::new(d)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            pipeline: Arc::new(pipeline),
            dataset,
            load_error,
            preview_rows,
            started_at: Utc::now(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.dataset.is_some()
    }

    pub async fn record(&self, kind: StrategyKind) -> ModelRecord {
        self.runs.read().await.get(&kind).cloned().unwrap_or_default()
    }

    /// Mark a model as running; false when a run is already in flight
    pub async fn try_begin_run(&self, kind: StrategyKind) -> bool {
        let mut runs = self.runs.write().await;
        let record = runs.entry(kind).or_default();
        if record.status == RunStatus::Running {
            return false;
        }
        record.status = RunStatus::Running;
        record.updated_at = Some(Utc::now());
        true
    }

    pub async fn finish_run(&self, kind: StrategyKind, outcome: Result<ForecastResult, String>) {
        let mut runs = self.runs.write().await;
        let record = runs.entry(kind).or_default();
        record.updated_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                record.status = RunStatus::Completed;
                record.error = None;
                record.result = Some(result);
            }
            Err(error) => {
                record.status = RunStatus::Failed;
                record.error = Some(error);
            }
        }
    }
}

/// Read and prepare the telemetry file configured for the server
pub fn load_dataset(pipeline: &Pipeline, path: &Path) -> Result<PreparedDataset, PipelineError> {
    let file = File::open(path)?;
    pipeline.prepare(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_lib::{FeatureFrame, PipelineConfig};

    fn state() -> AppState {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let dataset = PreparedDataset::from_frame(FeatureFrame::from_series("cpu", vec![1.0, 2.0]));
        AppState::new(pipeline, Ok(dataset), 10)
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let state = state();
        assert_eq!(state.record(StrategyKind::Sequence).await.status, RunStatus::NotRun);

        assert!(state.try_begin_run(StrategyKind::Sequence).await);
        assert!(!state.try_begin_run(StrategyKind::Sequence).await);
        assert_eq!(state.record(StrategyKind::Sequence).await.status, RunStatus::Running);

        state
            .finish_run(StrategyKind::Sequence, Err("degenerate scale".into()))
            .await;
        let record = state.record(StrategyKind::Sequence).await;
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("degenerate scale"));
        assert!(state.try_begin_run(StrategyKind::Sequence).await);
    }

    #[test]
    fn test_load_error_is_not_ready() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let state = AppState::new(pipeline, Err(PipelineError::EmptyDataset), 10);
        assert!(!state.is_ready());
        assert!(state.load_error.unwrap().contains("empty"));
    }

    #[test]
    fn test_model_names() {
        assert_eq!(model_info(StrategyKind::Autoregressive).name, "ARIMA");
        assert_eq!(model_info(StrategyKind::Probabilistic).name, "DeepAR");
    }
}
