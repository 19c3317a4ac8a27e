//! HTTP API: health, Prometheus metrics, dataset preview and model runs

use crate::state::{model_info, AppState, RunStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use forecast_lib::export::frame_records;
use forecast_lib::{StrategyKind, StrategyOutcome};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn parse_model(model: &str) -> Result<StrategyKind, Response> {
    StrategyKind::parse(model)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("Model not found: {}", model)))
}

/// Liveness: the process is serving requests
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(json!({
        "status": "healthy",
        "uptime_secs": uptime.num_seconds(),
        "dataset_loaded": state.is_ready(),
    }))
}

/// Readiness: 200 once the dataset is prepared, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.dataset {
        Some(dataset) => (
            StatusCode::OK,
            Json(json!({ "ready": true, "rows": dataset.frame.len() })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": state.load_error })),
        ),
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// First rows of the featured dataset
async fn data(State(state): State<Arc<AppState>>) -> Response {
    let Some(dataset) = &state.dataset else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No data loaded");
    };
    let rows = frame_records(&dataset.frame, state.preview_rows);
    Json(json!({
        "count": rows.len(),
        "total_rows": dataset.frame.len(),
        "columns": dataset.frame.column_names(),
        "data": rows,
    }))
    .into_response()
}

async fn models_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut models = Vec::with_capacity(StrategyKind::ALL.len());
    for kind in StrategyKind::ALL {
        let info = model_info(kind);
        let record = state.record(kind).await;
        models.push(json!({
            "name": info.name,
            "strategy": kind,
            "description": info.description,
            "useCase": info.use_case,
            "status": record.status,
            "updatedAt": record.updated_at,
            "error": record.error,
            "rmse": record.result.as_ref().map(|r| r.metrics().rmse),
        }));
    }
    Json(json!({ "models": models }))
}

/// Run one strategy on a blocking thread and store the outcome
async fn run_model(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    let kind = match parse_model(&model) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let Some(dataset) = state.dataset.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No data loaded");
    };
    if !state.try_begin_run(kind).await {
        return error_response(StatusCode::CONFLICT, format!("{} is already running", model));
    }

    info!(event = "model_run_requested", strategy = %kind, "Running model");
    let pipeline = state.pipeline.clone();
    let joined =
        tokio::task::spawn_blocking(move || pipeline.evaluate_outcome(&dataset, kind)).await;

    match joined {
        Ok(StrategyOutcome::Completed { result, .. }) => {
            let body = json!({
                "model": model,
                "strategy": kind,
                "status": RunStatus::Completed,
                "result": &result,
            });
            state.finish_run(kind, Ok(result)).await;
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(StrategyOutcome::Failed {
            kind: error_kind,
            message,
            points,
            skipped,
            ..
        }) => {
            let body = json!({
                "model": model,
                "strategy": kind,
                "status": RunStatus::Failed,
                "kind": error_kind,
                "error": &message,
                "points": points,
                "skipped": skipped,
            });
            state.finish_run(kind, Err(message)).await;
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        Err(e) => {
            error!(strategy = %kind, error = %e, "Model run task failed");
            state.finish_run(kind, Err(e.to_string())).await;
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to run model")
        }
    }
}

/// Last stored result of a model
async fn model_result(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    let kind = match parse_model(&model) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let record = state.record(kind).await;
    match record.result {
        Some(result) => Json(json!({
            "model": model,
            "strategy": kind,
            "status": record.status,
            "updatedAt": record.updated_at,
            "result": result,
        }))
        .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No result for {} yet", model),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/data", get(data))
        .route("/api/models/status", get(models_status))
        .route("/api/models/run/:model", post(run_model))
        .route("/api/results/:model", get(model_result))
        .with_state(state)
}

/// Start the API server, stopping on Ctrl-C
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
