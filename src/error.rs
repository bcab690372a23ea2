//! Error types for the pollcast library.

use thiserror::Error;

/// Result type alias for blending and forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while blending, correcting or forecasting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// A required table or column is absent.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Fewer data points than the component needs.
    #[error("insufficient history: need at least {needed}, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// Out-of-range hyperparameter or malformed configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Zero total weight, singular system, non-finite likelihood.
    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Model must be fitted before prediction.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Date ordering or parsing problem.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Malformed cell or row in a tabular file.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Filesystem failure while reading or writing a table.
    #[error("io error: {0}")]
    Io(String),
}

impl ForecastError {
    /// Whether a component may handle this error locally by degrading to a
    /// simpler model or skipping a backtest fold. Bad configuration is never
    /// recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientHistory { .. } | ForecastError::NumericDegeneracy(_)
        )
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Io(format!("json: {err}"))
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::InvalidConfiguration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientHistory { needed: 8, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient history: need at least 8, got 5"
        );

        let err = ForecastError::InvalidConfiguration("ewma_lambda must be in [0, 1)".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: ewma_lambda must be in [0, 1)"
        );

        let err = ForecastError::MissingInput("MAE column".into());
        assert_eq!(err.to_string(), "missing input: MAE column");

        let err = ForecastError::Parse {
            line: 3,
            message: "bad date".into(),
        };
        assert_eq!(err.to_string(), "parse error at line 3: bad date");
    }

    #[test]
    fn recoverable_errors_follow_the_fallback_taxonomy() {
        assert!(ForecastError::InsufficientHistory { needed: 8, got: 2 }.is_recoverable());
        assert!(ForecastError::NumericDegeneracy("singular".into()).is_recoverable());
        assert!(!ForecastError::MissingInput("category".into()).is_recoverable());
        assert!(!ForecastError::InvalidConfiguration("recency_shrink".into()).is_recoverable());
        assert!(!ForecastError::EmptyData.is_recoverable());
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::NumericDegeneracy("zero weight".into());
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
