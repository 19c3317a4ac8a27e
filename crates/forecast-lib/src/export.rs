//! Output artifacts: the featured dataset as CSV/JSON rows and run reports as JSON

use crate::error::Result;
use crate::models::FeatureFrame;
use crate::pipeline::RunReport;
use serde_json::{Map, Number, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Name of the timestamp column written ahead of the feature columns
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Write a frame as CSV, timestamps first when the frame has a time index
pub fn write_frame_csv<W: Write>(frame: &FeatureFrame, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let timestamps = frame.timestamps();

    let mut header: Vec<&str> = Vec::with_capacity(frame.columns().len() + 1);
    if timestamps.is_some() {
        header.push(TIMESTAMP_FIELD);
    }
    header.extend(frame.column_names());
    out.write_record(&header)?;

    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for row in 0..frame.len() {
        record.clear();
        if let Some(ts) = timestamps {
            record.push(ts[row].to_rfc3339());
        }
        record.extend(frame.columns().iter().map(|c| c.values[row].to_string()));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_frame_csv_path(frame: &FeatureFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_frame_csv(frame, BufWriter::new(file))
}

/// The first `limit` rows as JSON objects keyed by column name
pub fn frame_records(frame: &FeatureFrame, limit: usize) -> Vec<Value> {
    let timestamps = frame.timestamps();
    (0..frame.len().min(limit))
        .map(|row| {
            let mut object = Map::new();
            if let Some(ts) = timestamps {
                object.insert(TIMESTAMP_FIELD.to_string(), Value::String(ts[row].to_rfc3339()));
            }
            for column in frame.columns() {
                // NaN and infinities have no JSON form
                let value = Number::from_f64(column.values[row])
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                object.insert(column.name.clone(), value);
            }
            Value::Object(object)
        })
        .collect()
}

pub fn write_report_json<W: Write>(report: &RunReport, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, report).map_err(std::io::Error::from)?;
    Ok(())
}

pub fn write_report_json_path(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_report_json(report, &mut writer)?;
    writer.flush()?;
    Ok(())
}
