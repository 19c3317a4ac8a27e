//! Capacity Forecast Bench CLI
//!
//! A command-line tool for preparing telemetry datasets and benchmarking
//! the forecasting strategies on them.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{evaluate, inspect, process};
use forecast_lib::StrategyKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Capacity Forecast Bench CLI
#[derive(Parser)]
#[command(name = "cfb")]
#[command(author, version, about = "CLI for the Capacity Forecast Bench", long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (TOML); defaults to the user config directory
    #[arg(long, short, env = "CFB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Log pipeline events to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest, resample and featurize a CSV, writing the featured dataset
    Process {
        /// Telemetry CSV file
        #[arg(long, short)]
        input: PathBuf,

        /// Directory receiving the featured dataset
        #[arg(long, short)]
        output: PathBuf,

        /// File name of the featured dataset
        #[arg(long, default_value = "final_data.csv")]
        file_name: String,
    },

    /// Show columns and the ingest and feature reports of a CSV
    Inspect {
        /// Telemetry CSV file
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Run rolling one-step-ahead evaluation of forecasting strategies
    Evaluate {
        /// Telemetry CSV file
        #[arg(long, short)]
        input: PathBuf,

        /// Strategy to run (autoregressive/arima, sequence/lstm, probabilistic/deepar); repeatable
        #[arg(long, short, value_parser = parse_strategy)]
        strategy: Vec<StrategyKind>,

        /// Cap on rolling steps per strategy
        #[arg(long)]
        max_steps: Option<usize>,

        /// Evaluate the whole test partition
        #[arg(long, conflicts_with = "max_steps")]
        all_steps: bool,

        /// Write the full run report as JSON
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn parse_strategy(name: &str) -> Result<StrategyKind, String> {
    StrategyKind::parse(name).ok_or_else(|| format!("unknown strategy '{}'", name))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .compact()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let mut pipeline_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            input,
            output,
            file_name,
        } => {
            process::run(pipeline_config, &input, &output, &file_name, cli.format)?;
        }
        Commands::Inspect { input } => {
            inspect::run(pipeline_config, &input, cli.format)?;
        }
        Commands::Evaluate {
            input,
            strategy,
            max_steps,
            all_steps,
            output,
        } => {
            if all_steps {
                pipeline_config.evaluation.max_steps = None;
            } else if max_steps.is_some() {
                pipeline_config.evaluation.max_steps = max_steps;
            }
            let kinds = if strategy.is_empty() {
                StrategyKind::ALL.to_vec()
            } else {
                strategy
            };
            evaluate::run(pipeline_config, &input, &kinds, output.as_deref(), cli.format)?;
        }
    }

    Ok(())
}
