//! `cfb inspect`: columns and preparation reports

use anyhow::Result;
use colored::Colorize;
use forecast_lib::{FeatureFrame, Pipeline, PipelineConfig, PreparedDataset};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::prepare;
use crate::output::{
    color_status, format_metric, print_heading, print_json, print_table, OutputFormat,
};

#[derive(Debug, Serialize, Tabled)]
struct ColumnRow {
    #[tabled(rename = "Column")]
    name: String,
    #[tabled(rename = "Min", display_with = "display_opt")]
    min: Option<f64>,
    #[tabled(rename = "Max", display_with = "display_opt")]
    max: Option<f64>,
    #[tabled(rename = "Mean", display_with = "display_opt")]
    mean: Option<f64>,
}

fn display_opt(value: &Option<f64>) -> String {
    format_metric(*value)
}

fn column_rows(frame: &FeatureFrame) -> Vec<ColumnRow> {
    frame
        .columns()
        .iter()
        .map(|column| {
            let values = &column.values;
            let (min, max, mean) = if values.is_empty() {
                (None, None, None)
            } else {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (Some(min), Some(max), Some(mean))
            };
            ColumnRow {
                name: column.name.clone(),
                min,
                max,
                mean,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    rows: usize,
    columns: Vec<ColumnRow>,
    ingest: &'a forecast_lib::ingest::IngestReport,
    resample: &'a Option<forecast_lib::ingest::ResampleReport>,
    features: &'a forecast_lib::features::FeatureReport,
}

pub fn run(config: PipelineConfig, input: &Path, format: OutputFormat) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let dataset = prepare(&pipeline, input)?;

    match format {
        OutputFormat::Json => print_json(&InspectOutput {
            rows: dataset.frame.len(),
            columns: column_rows(&dataset.frame),
            ingest: &dataset.ingest,
            resample: &dataset.resample,
            features: &dataset.features,
        }),
        OutputFormat::Table => {
            print_report(&dataset);
            Ok(())
        }
    }
}

fn print_report(dataset: &PreparedDataset) {
    let ingest = &dataset.ingest;
    print_heading("Ingestion");
    println!("Rows read:              {}", ingest.rows_read);
    println!("Rows used:              {}", ingest.rows_used);
    println!("Duplicates merged:      {}", ingest.duplicates_merged);
    for (reason, count) in &ingest.dropped {
        println!("Dropped ({}):  {}", reason, count.to_string().yellow());
    }
    match &ingest.timestamp_column {
        Some(column) => println!("Timestamp column:       {}", column.cyan()),
        None => println!("Timestamp column:       {}", color_status("missing")),
    }
    println!();

    if let Some(resample) = &dataset.resample {
        print_heading("Resampling");
        match resample.cadence_secs {
            Some(secs) => println!("Cadence:                {}s", secs),
            None => println!("Cadence:                {}", "passthrough".dimmed()),
        }
        println!("Aggregation:            {:?}", resample.aggregation);
        println!("Buckets:                {}", resample.buckets);
        println!("Filled buckets:         {}", resample.filled_buckets);
        println!();
    }

    let features = &dataset.features;
    print_heading("Features");
    let status = if features.is_degraded() { "degraded" } else { "ok" };
    println!("Status:                 {}", color_status(status));
    println!("Calendar fields:        {}", features.calendar);
    if !features.missing.is_empty() {
        println!("Missing base metrics:   {}", features.missing.join(", ").yellow());
    }
    if !features.omitted.is_empty() {
        println!("Omitted (all null):     {}", features.omitted.join(", ").yellow());
    }
    println!();

    println!("{} ({} rows)", "Columns".bold(), dataset.frame.len());
    print_table(&column_rows(&dataset.frame));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_rows_stats() {
        let frame = FeatureFrame::from_series("cpu", vec![1.0, 3.0, 5.0]);
        let rows = column_rows(&frame);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].min, Some(1.0));
        assert_eq!(rows[0].max, Some(5.0));
        assert_eq!(rows[0].mean, Some(3.0));
    }

    #[test]
    fn test_column_rows_empty() {
        let frame = FeatureFrame::from_series("cpu", vec![]);
        let rows = column_rows(&frame);
        assert_eq!(rows[0].min, None);
    }
}
