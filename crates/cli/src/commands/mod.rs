//! Subcommand implementations

pub mod evaluate;
pub mod inspect;
pub mod process;

use anyhow::{Context, Result};
use forecast_lib::{Pipeline, PreparedDataset};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Ingest, resample and featurize the CSV at `input`
pub(crate) fn prepare(pipeline: &Pipeline, input: &Path) -> Result<PreparedDataset> {
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    pipeline
        .prepare(BufReader::new(file))
        .with_context(|| format!("Failed to prepare {}", input.display()))
}
