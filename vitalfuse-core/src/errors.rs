//! Error Types for Estimation Failures
//!
//! ## Design Philosophy
//!
//! Every error raised by the core is scoped to a single subject. The
//! registry catches these errors at the subject boundary, so a failing
//! subject never affects its siblings or the subject table itself.
//!
//! ## Error Categories
//!
//! ### Input Rejections
//! - `RejectedStaleMeasurement`: timestamp precedes the filter clock
//! - `MalformedMeasurement`: identifying fields missing, nothing observed, non-finite values
//! - `OutOfRange`: value outside physiological plausibility bounds
//!
//! These leave the estimator untouched.
//!
//! ### Query Rejections
//! - `InvalidForecast`: horizon or step not finite, or too many steps
//!
//! ### Numerical Failures
//! - `NumericalInstability`: a decomposition failed even after regularization
//!
//! The registry resets the affected estimator to its priors.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use vitalfuse_core::FusionError;
//!
//! fn classify(err: &FusionError) -> &'static str {
//!     match err {
//!         FusionError::RejectedStaleMeasurement { .. } => "late sample, drop",
//!         FusionError::MalformedMeasurement { .. } | FusionError::OutOfRange { .. } => "bad input, drop",
//!         FusionError::NumericalInstability { .. } => "estimator reset",
//!         FusionError::InvalidForecast { .. } => "bad query",
//!     }
//! }
//! ```

use thiserror::Error;

use crate::time::Timestamp;

/// Result type for estimation operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Per-subject estimation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// Measurement is older than the estimator's current filter time
    #[error("measurement at {timestamp} ms precedes filter time {filter_time} ms")]
    RejectedStaleMeasurement {
        /// Timestamp carried by the rejected measurement
        timestamp: Timestamp,
        /// Filter time of the estimator when the measurement arrived
        filter_time: Timestamp,
    },

    /// Measurement cannot be interpreted
    #[error("malformed measurement: {reason}")]
    MalformedMeasurement {
        /// What was wrong with it
        reason: &'static str,
    },

    /// Observed value is physiologically implausible
    #[error("{field} = {value} outside plausible range [{min}, {max}]")]
    OutOfRange {
        /// Name of the offending field
        field: &'static str,
        /// The observed value
        value: f64,
        /// Lowest plausible value
        min: f64,
        /// Highest plausible value
        max: f64,
    },

    /// Covariance decomposition failed even after regularization
    #[error("numerical instability during {stage}")]
    NumericalInstability {
        /// Filter stage that failed
        stage: &'static str,
    },

    /// Forecast parameters cannot be simulated
    #[error("invalid forecast: {reason}")]
    InvalidForecast {
        reason: &'static str,
    },
}

impl FusionError {
    /// True for errors caused by the measurement itself rather than the filter
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::NumericalInstability { .. })
    }

    /// Short machine-readable label for telemetry
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RejectedStaleMeasurement { .. } => "stale",
            Self::MalformedMeasurement { .. } => "malformed",
            Self::OutOfRange { .. } => "out_of_range",
            Self::NumericalInstability { .. } => "numerical_instability",
            Self::InvalidForecast { .. } => "invalid_forecast",
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with
    #[error("invalid configuration for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The document could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_message_carries_both_clocks() {
        let err = FusionError::RejectedStaleMeasurement { timestamp: 900, filter_time: 1000 };
        let msg = err.to_string();
        assert!(msg.contains("900"));
        assert!(msg.contains("1000"));
        assert_eq!(err.kind(), "stale");
        assert!(err.is_input_error());
    }

    #[test]
    fn instability_is_not_an_input_error() {
        let err = FusionError::NumericalInstability { stage: "sigma point generation" };
        assert!(!err.is_input_error());
        assert_eq!(err.kind(), "numerical_instability");
    }

    #[test]
    fn forecast_rejection_is_caller_error() {
        let err = FusionError::InvalidForecast { reason: "horizon must be finite" };
        assert!(err.is_input_error());
        assert_eq!(err.kind(), "invalid_forecast");
        assert!(err.to_string().contains("horizon"));
    }

    #[test]
    fn parse_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ConfigError = parse.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
