//! Configuration resolution for the CLI

use anyhow::{Context, Result};
use forecast_lib::PipelineConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `<config dir>/cfb/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("cfb").join("config.toml"))
}

/// Load the pipeline configuration.
///
/// An explicit path must exist. Without one, the default file is used when
/// present. `CFB__*` environment variables override either.
pub fn load(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    debug!(path = ?path, "Loading pipeline config");

    PipelineConfig::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("Failed to load config from {}", p.display()),
        None => "Failed to load config".to_string(),
    })
}
