//! Pipeline configuration
//!
//! Every option has a default matching the original experiment setup, so an
//! empty config file (or none at all) reproduces the reference run. Values
//! can be overridden from a TOML file and from `CFB__`-prefixed environment
//! variables, e.g. `CFB__EVALUATION__MAX_STEPS=25`.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column holding the epoch timestamp in the Bitbrains traces
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "Timestamp [ms]";
pub const CPU_USAGE_PERCENT: &str = "CPU usage [%]";
pub const CPU_USAGE_MHZ: &str = "CPU usage [MHZ]";
pub const NETWORK_RECEIVED: &str = "Network received throughput [KB/s]";
pub const NETWORK_TRANSMITTED: &str = "Network transmitted throughput [KB/s]";

/// Top-level configuration threaded through every pipeline component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub features: FeatureConfig,
    pub autoregressive: AutoregressiveConfig,
    pub sequence: SequenceConfig,
    pub probabilistic: ProbabilisticConfig,
    pub evaluation: EvaluationConfig,
}

/// How epoch timestamps are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    /// Infer per value from magnitude
    #[default]
    Auto,
    Seconds,
    Milliseconds,
}

/// Bucket aggregation used by resampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Additive resource accounting: bucket value is the sum of its rows
    #[default]
    Sum,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub timestamp_column: String,
    pub timestamp_unit: TimestampUnit,
    pub delimiter: char,
    /// Fail instead of running without calendar features when no timestamp exists
    pub require_timestamp: bool,
    /// Resample cadence, e.g. "1h", "30min", "1 hour"
    pub cadence: String,
    pub aggregation: Aggregation,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            timestamp_unit: TimestampUnit::Auto,
            delimiter: ',',
            require_timestamp: false,
            cadence: "1h".to_string(),
            aggregation: Aggregation::Sum,
        }
    }
}

impl IngestConfig {
    pub fn cadence_secs(&self) -> Result<i64> {
        parse_cadence(&self.cadence)
    }
}

/// A base metric and the names of its lag and difference features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub source: String,
    pub prev_name: String,
    pub diff_name: String,
}

impl DerivedMetric {
    pub fn new(source: &str, prev_name: &str, diff_name: &str) -> Self {
        Self {
            source: source.to_string(),
            prev_name: prev_name.to_string(),
            diff_name: diff_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub base_metrics: Vec<DerivedMetric>,
    pub calendar: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            base_metrics: vec![
                DerivedMetric::new(CPU_USAGE_PERCENT, "CPU usage prev", "CPU_diff"),
                DerivedMetric::new(NETWORK_RECEIVED, "received_prev", "received_diff"),
                DerivedMetric::new(NETWORK_TRANSMITTED, "transmitted_prev", "transmitted_diff"),
            ],
            calendar: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoregressiveConfig {
    pub target_column: String,
    pub split_fraction: f64,
    pub order: usize,
}

impl Default for AutoregressiveConfig {
    fn default() -> Self {
        Self {
            target_column: CPU_USAGE_PERCENT.to_string(),
            split_fraction: 0.66,
            order: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub target_column: String,
    pub split_fraction: f64,
    pub look_back: usize,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Use a pre-trained ONNX model instead of training the built-in LSTM
    pub onnx_model_path: Option<PathBuf>,
    /// Expected hex SHA-256 of the ONNX model file
    pub onnx_sha256: Option<String>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            target_column: CPU_USAGE_MHZ.to_string(),
            split_fraction: 0.70,
            look_back: 1,
            hidden_units: 4,
            epochs: 5,
            learning_rate: 0.001,
            onnx_model_path: None,
            onnx_sha256: None,
        }
    }
}

/// Which statistic of the predictive distribution is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointEstimate {
    #[default]
    Mean,
    Median,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilisticConfig {
    pub target_column: String,
    pub split_fraction: f64,
    pub order: usize,
    pub num_samples: usize,
    pub point_estimate: PointEstimate,
}

impl Default for ProbabilisticConfig {
    fn default() -> Self {
        Self {
            target_column: CPU_USAGE_PERCENT.to_string(),
            split_fraction: 0.66,
            order: 2,
            num_samples: 200,
            point_estimate: PointEstimate::Mean,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Cap on rolling steps per strategy; `None` evaluates the whole test split
    pub max_steps: Option<usize>,
    /// Seed for stochastic model initialisation and sampling only
    pub seed: u64,
    /// Evaluate independent strategies on separate threads
    pub parallel_strategies: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(10),
            seed: 42,
            parallel_strategies: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("CFB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run structurally meaningless
    pub fn validate(&self) -> Result<()> {
        self.ingest.cadence_secs()?;
        for (name, fraction) in [
            ("autoregressive.split_fraction", self.autoregressive.split_fraction),
            ("sequence.split_fraction", self.sequence.split_fraction),
            ("probabilistic.split_fraction", self.probabilistic.split_fraction),
        ] {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    name, fraction
                )));
            }
        }
        if self.sequence.look_back == 0 {
            return Err(PipelineError::InvalidConfig(
                "sequence.look_back must be at least 1".into(),
            ));
        }
        if self.sequence.hidden_units == 0 {
            return Err(PipelineError::InvalidConfig(
                "sequence.hidden_units must be at least 1".into(),
            ));
        }
        if self.autoregressive.order == 0 || self.probabilistic.order == 0 {
            return Err(PipelineError::InvalidConfig(
                "autoregressive order must be at least 1".into(),
            ));
        }
        if self.probabilistic.num_samples < 2 {
            return Err(PipelineError::InvalidConfig(
                "probabilistic.num_samples must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a cadence such as "1h", "30min", "15 minutes", "1 hour", "1d" into seconds
pub fn parse_cadence(input: &str) -> Result<i64> {
    let trimmed = input.trim().to_ascii_lowercase();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    let count: i64 = if number.is_empty() {
        1
    } else {
        number
            .parse()
            .map_err(|_| PipelineError::InvalidConfig(format!("invalid cadence: {input}")))?
    };

    let unit_secs = match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" | "t" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        other => {
            return Err(PipelineError::InvalidConfig(format!(
                "unknown cadence unit '{}' in '{}'",
                other, input
            )))
        }
    };

    if count <= 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "cadence must be positive: {input}"
        )));
    }
    count.checked_mul(unit_secs).ok_or_else(|| {
        PipelineError::InvalidConfig(format!("cadence out of range: {input}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.autoregressive.split_fraction, 0.66);
        assert_eq!(config.sequence.split_fraction, 0.70);
        assert_eq!(config.sequence.look_back, 1);
        assert_eq!(config.autoregressive.order, 2);
        assert_eq!(config.evaluation.max_steps, Some(10));
        assert_eq!(config.ingest.aggregation, Aggregation::Sum);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_cadence() {
        assert_eq!(parse_cadence("1h").unwrap(), 3600);
        assert_eq!(parse_cadence("1 hour").unwrap(), 3600);
        assert_eq!(parse_cadence("H").unwrap(), 3600);
        assert_eq!(parse_cadence("30min").unwrap(), 1800);
        assert_eq!(parse_cadence("15 minutes").unwrap(), 900);
        assert_eq!(parse_cadence("2d").unwrap(), 172_800);
        assert_eq!(parse_cadence("300s").unwrap(), 300);
    }

    #[test]
    fn test_parse_cadence_rejects_garbage() {
        assert!(parse_cadence("0h").is_err());
        assert!(parse_cadence("5 fortnights").is_err());
        assert!(matches!(
            parse_cadence("999999999999999d"),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(parse_cadence("99999999999999999999h").is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_cadence() {
        let mut config = PipelineConfig::default();
        config.ingest.cadence = "999999999999999d".to_string();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let mut config = PipelineConfig::default();
        config.autoregressive.split_fraction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut config = PipelineConfig::default();
        config.sequence.look_back = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[evaluation]\nmax_steps = 25\n[ingest]\ncadence = \"30min\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let parsed: PipelineConfig = settings.try_deserialize().unwrap();
        assert_eq!(parsed.evaluation.max_steps, Some(25));
        assert_eq!(parsed.ingest.cadence_secs().unwrap(), 1800);
        assert_eq!(parsed.autoregressive.order, 2);
    }
}
