//! `cfb evaluate`: rolling benchmark of the forecasting strategies

use anyhow::{Context, Result};
use colored::Colorize;
use forecast_lib::export::write_report_json_path;
use forecast_lib::{Pipeline, PipelineConfig, RunReport, StrategyKind, StrategyOutcome};
use std::path::Path;
use tabled::Tabled;

use super::prepare;
use crate::output::{
    color_status, format_metric, print_heading, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for the strategy comparison table
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Steps")]
    steps: String,
    #[tabled(rename = "Skipped")]
    skipped: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "MSE")]
    mse: String,
    #[tabled(rename = "R²")]
    r2: String,
    #[tabled(rename = "Train RMSE")]
    train_rmse: String,
    #[tabled(rename = "Time (ms)")]
    elapsed_ms: u64,
}

impl From<&StrategyOutcome> for OutcomeRow {
    fn from(outcome: &StrategyOutcome) -> Self {
        match outcome {
            StrategyOutcome::Completed {
                strategy,
                elapsed_ms,
                result,
            } => {
                let metrics = result.metrics();
                Self {
                    strategy: strategy.to_string(),
                    status: color_status("completed"),
                    target: result.target().to_string(),
                    steps: result.points().len().to_string(),
                    skipped: result.skipped().len().to_string(),
                    rmse: format_metric(Some(metrics.rmse)),
                    mae: format_metric(Some(metrics.mae)),
                    mse: format_metric(Some(metrics.mse)),
                    r2: format_metric(metrics.r2),
                    train_rmse: format_metric(result.train_metrics().map(|m| m.rmse)),
                    elapsed_ms: *elapsed_ms,
                }
            }
            StrategyOutcome::Failed {
                strategy,
                elapsed_ms,
                kind,
                points,
                skipped,
                ..
            } => Self {
                strategy: strategy.to_string(),
                status: color_status("failed"),
                target: "-".to_string(),
                steps: points.len().to_string(),
                skipped: skipped.len().to_string(),
                rmse: kind.clone(),
                mae: "-".to_string(),
                mse: "-".to_string(),
                r2: "-".to_string(),
                train_rmse: "-".to_string(),
                elapsed_ms: *elapsed_ms,
            },
        }
    }
}

pub fn run(
    config: PipelineConfig,
    input: &Path,
    kinds: &[StrategyKind],
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let dataset = prepare(&pipeline, input)?;
    let report = pipeline.evaluate_many(&dataset, kinds);

    if let Some(path) = output {
        write_report_json_path(&report, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_summary(&report);
            if let Some(path) = output {
                print_success(&format!("Report written to {}", path.display()));
            }
        }
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    print_heading("Rolling Evaluation");
    println!("Run:                    {}", report.run_id.cyan());
    println!("Rows:                   {}", report.rows);
    println!();

    let rows: Vec<OutcomeRow> = report.strategies.iter().map(OutcomeRow::from).collect();
    print_table(&rows);

    for outcome in &report.strategies {
        if let StrategyOutcome::Failed {
            strategy, message, ..
        } = outcome
        {
            print_warning(&format!("{} failed: {}", strategy, message));
        }
        for skip in outcome.skipped() {
            print_warning(&format!(
                "{} skipped step {} ({}): {}",
                outcome.strategy(),
                skip.step,
                skip.kind,
                skip.reason
            ));
        }
    }

    let ranking = report.ranking();
    if let Some(best) = ranking.first() {
        println!();
        print_info(&format!(
            "Lowest RMSE: {} ({})",
            best.strategy().green().bold(),
            format_metric(Some(best.metrics().rmse))
        ));
    }
}
