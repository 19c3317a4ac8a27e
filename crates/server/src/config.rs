//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration, read from `CFB_SERVER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the API, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Telemetry CSV loaded at startup
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Optional TOML file with pipeline settings
    #[serde(default)]
    pub pipeline_config: Option<PathBuf>,

    /// Rows returned by the dataset preview endpoint
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/telemetry.csv")
}

fn default_preview_rows() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            data_path: default_data_path(),
            pipeline_config: None,
            preview_rows: default_preview_rows(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CFB_SERVER").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
