//! HTTP front end for the capacity forecast benchmark
//!
//! Serves health and Prometheus endpoints plus a small JSON API over a dataset
//! prepared at startup: a featured-data preview, model status and on-demand
//! strategy runs.

pub mod api;
pub mod config;
pub mod state;

pub use api::{create_router, serve};
pub use config::ServerConfig;
pub use state::{load_dataset, AppState, RunStatus};
