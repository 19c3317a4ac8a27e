//! Error taxonomy for the forecasting pipeline
//!
//! Column- and step-level failures are contained by the caller (the pipeline
//! logs them as degraded/skipped). Structural failures abort the run.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by ingestion, feature engineering, partitioning, scaling,
/// forecasting and evaluation
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required input column is absent
    #[error("missing column: {column}")]
    MissingColumn { column: String },

    /// Not enough rows for the requested window, order or split
    #[error("insufficient data: need more than {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Zero-variance column cannot be min-max scaled
    #[error("degenerate scale: min == max == {value}")]
    DegenerateScale { value: f64 },

    /// Model fitting failed for a single rolling step
    #[error("model fit failed: {0}")]
    FitFailure(String),

    /// Too few valid forecasts remain to compute metrics
    #[error("insufficient results: {valid} valid forecast pairs, need at least {needed}")]
    InsufficientResults { valid: usize, needed: usize },

    /// Configuration value outside its allowed range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Source contained no usable rows
    #[error("dataset is empty after ingestion")]
    EmptyDataset,

    /// Pre-trained model could not be loaded or executed
    #[error("model error: {0}")]
    Model(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the failure is contained to one column or one step
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingColumn { .. }
                | PipelineError::FitFailure(_)
                | PipelineError::DegenerateScale { .. }
        )
    }

    /// Short machine-readable kind, used in reports and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingColumn { .. } => "missing_column",
            PipelineError::InsufficientData { .. } => "insufficient_data",
            PipelineError::DegenerateScale { .. } => "degenerate_scale",
            PipelineError::FitFailure(_) => "fit_failure",
            PipelineError::InsufficientResults { .. } => "insufficient_results",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::EmptyDataset => "empty_dataset",
            PipelineError::Model(_) => "model",
            PipelineError::Csv(_) => "csv",
            PipelineError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::MissingColumn {
            column: "CPU usage [%]".to_string(),
        };
        assert_eq!(err.to_string(), "missing column: CPU usage [%]");

        let err = PipelineError::InsufficientData { needed: 2, got: 2 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need more than 2 rows, got 2"
        );

        let err = PipelineError::InsufficientResults { valid: 1, needed: 2 };
        assert!(err.to_string().contains("1 valid forecast pairs"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PipelineError::FitFailure("singular".into()).is_recoverable());
        assert!(PipelineError::MissingColumn { column: "x".into() }.is_recoverable());
        assert!(PipelineError::DegenerateScale { value: 1.0 }.is_recoverable());
        assert!(!PipelineError::EmptyDataset.is_recoverable());
        assert!(!PipelineError::InvalidConfig("f".into()).is_recoverable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(PipelineError::EmptyDataset.kind(), "empty_dataset");
        assert_eq!(
            PipelineError::DegenerateScale { value: 0.0 }.kind(),
            "degenerate_scale"
        );
    }
}
