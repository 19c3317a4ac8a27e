//! `cfb process`: write the featured dataset

use anyhow::{Context, Result};
use forecast_lib::export::write_frame_csv_path;
use forecast_lib::{Pipeline, PipelineConfig};
use serde_json::json;
use std::path::Path;

use super::prepare;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

pub fn run(
    config: PipelineConfig,
    input: &Path,
    output_dir: &Path,
    file_name: &str,
    format: OutputFormat,
) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let dataset = prepare(&pipeline, input)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(file_name);
    write_frame_csv_path(&dataset.frame, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "output": path,
            "rows": dataset.frame.len(),
            "columns": dataset.frame.column_names(),
            "ingest": dataset.ingest,
            "resample": dataset.resample,
            "features": dataset.features,
        }))?,
        OutputFormat::Table => {
            print_success(&format!(
                "Wrote {} rows x {} columns to {}",
                dataset.frame.len(),
                dataset.frame.columns().len(),
                path.display()
            ));
            if dataset.ingest.rows_dropped() > 0 {
                print_warning(&format!(
                    "{} rows dropped during ingestion",
                    dataset.ingest.rows_dropped()
                ));
            }
            for missing in &dataset.features.missing {
                print_warning(&format!("Base metric '{}' not found, skipped", missing));
            }
            if dataset.ingest.degraded {
                print_info("No timestamp column: positional rows, no calendar features");
            }
        }
    }

    Ok(())
}
