//! Forecast server - benchmark API over a prepared telemetry dataset

use anyhow::{Context, Result};
use forecast_lib::{Pipeline, PipelineConfig};
use forecast_server::{load_dataset, serve, AppState, ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting forecast-server");

    let config = ServerConfig::load().context("Failed to load server configuration")?;
    let pipeline_config = PipelineConfig::load(config.pipeline_config.as_deref())
        .context("Failed to load pipeline configuration")?;
    let pipeline = Pipeline::new(pipeline_config)?;

    let data_path = config.data_path.clone();
    let (pipeline, dataset) = tokio::task::spawn_blocking(move || {
        let dataset = load_dataset(&pipeline, &data_path);
        (pipeline, dataset)
    })
    .await?;

    match &dataset {
        Ok(d) => info!(
            path = %config.data_path.display(),
            rows = d.frame.len(),
            columns = d.frame.columns().len(),
            "Dataset prepared"
        ),
        Err(e) => warn!(
            path = %config.data_path.display(),
            error = %e,
            "Dataset unavailable, serving without data"
        ),
    }

    let state = Arc::new(AppState::new(pipeline, dataset, config.preview_rows));
    serve(config.api_port, state).await?;

    info!("Shutting down");
    Ok(())
}
