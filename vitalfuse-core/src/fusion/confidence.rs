//! Confidence Scoring for Fused Estimates
//!
//! ## Overview
//!
//! Consumers of a [`StateEstimate`](crate::events::StateEstimate) want a
//! single number saying how much to trust it. That number comes from the
//! posterior covariance: each physiological component contributes
//!
//! ```text
//! cᵢ = 1 / (1 + Pᵢᵢ / refᵢ)
//! ```
//!
//! where `refᵢ` is the variance at which the component is "half trusted".
//! The estimate confidence is the mean over heart rate, respiratory rate,
//! activity, fatigue and stress. Sensor bias terms are excluded.
//!
//! ## Chi-squared Gating
//!
//! Anomaly scoring compares a normalized innovation squared against the
//! 95% chi-squared critical value for its dimension:
//!
//! ```text
//! 1D: 3.84   2D: 5.99   3D: 7.81   4D: 9.49   5D: 11.07
//! nD (n > 5): n + 2.45·√(2n)   (Wilson–Hilferty style approximation)
//! ```
//!
//! ## Representation
//!
//! Scores are stored as `u16` fixed point so they order, compare and hash
//! deterministically across platforms.

use crate::{constants::metrics::CONFIDENCE_REFERENCE_VARIANCE, fusion::matrix::StateCovariance};

/// Confidence score in range [0, 1]
///
/// Internally stored as fixed-point.
/// 0.0 = no confidence, 1.0 = full confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfidenceScore {
    /// Fixed-point representation (0-65535 maps to 0.0-1.0)
    value: u16,
}

impl ConfidenceScore {
    /// Minimum meaningful confidence (1%)
    pub const MIN_CONFIDENCE: Self = Self { value: 655 };

    /// Maximum confidence (100%)
    pub const MAX_CONFIDENCE: Self = Self { value: 65535 };

    /// No confidence (0%)
    pub const ZERO: Self = Self { value: 0 };

    /// Moderate confidence (50%)
    pub const MODERATE: Self = Self { value: 32768 };

    /// High confidence threshold (90%)
    pub const HIGH_THRESHOLD: Self = Self { value: 58982 };

    /// Create from floating point value [0, 1]
    pub fn from_float(confidence: f64) -> Self {
        let clamped = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            value: (clamped * 65535.0).round() as u16,
        }
    }

    /// Convert to floating point [0, 1]
    pub fn as_float(&self) -> f64 {
        self.value as f64 / 65535.0
    }

    /// Get raw fixed-point value
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Check if confidence is above high threshold
    pub fn is_high(&self) -> bool {
        *self >= Self::HIGH_THRESHOLD
    }

    /// Check if confidence is critically low
    pub fn is_critical(&self) -> bool {
        *self < Self::MIN_CONFIDENCE
    }

    /// Confidence implied by a posterior covariance
    pub fn from_covariance(covariance: &StateCovariance) -> Self {
        let total: f64 = CONFIDENCE_REFERENCE_VARIANCE
            .iter()
            .enumerate()
            .map(|(i, reference)| 1.0 / (1.0 + covariance[(i, i)].max(0.0) / reference))
            .sum();
        Self::from_float(total / CONFIDENCE_REFERENCE_VARIANCE.len() as f64)
    }
}

impl Default for ConfidenceScore {
    fn default() -> Self {
        Self::MODERATE
    }
}

/// 95% chi-squared critical value for `dimensions` degrees of freedom
pub fn chi_square_95(dimensions: usize) -> f64 {
    match dimensions {
        0 => 0.0,
        1 => 3.84,
        2 => 5.99,
        3 => 7.81,
        4 => 9.49,
        5 => 11.07,
        n => {
            let n = n as f64;
            n + 2.45 * (2.0 * n).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::state::PRIOR_VARIANCE;
    use crate::fusion::matrix::StateVector;

    #[test]
    fn float_round_trip_is_clamped() {
        assert_eq!(ConfidenceScore::from_float(1.5), ConfidenceScore::MAX_CONFIDENCE);
        assert_eq!(ConfidenceScore::from_float(-0.1), ConfidenceScore::ZERO);
        assert_eq!(ConfidenceScore::from_float(f64::NAN), ConfidenceScore::ZERO);
        assert!((ConfidenceScore::from_float(0.25).as_float() - 0.25).abs() < 1e-4);
    }

    #[test]
    fn tighter_covariance_means_more_confidence() {
        let prior = StateCovariance::from_diagonal(&StateVector::from(PRIOR_VARIANCE));
        let tight = prior * 0.01;

        let loose = ConfidenceScore::from_covariance(&prior);
        let sure = ConfidenceScore::from_covariance(&tight);
        assert!(sure > loose);
        assert!(sure.is_high());
        assert!(!loose.is_critical());
    }

    #[test]
    fn reference_variance_scores_half() {
        let mut diag = [0.0; 7];
        diag[..5].copy_from_slice(&CONFIDENCE_REFERENCE_VARIANCE);
        let cov = StateCovariance::from_diagonal(&StateVector::from(diag));
        assert!((ConfidenceScore::from_covariance(&cov).as_float() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn chi_square_table() {
        assert_eq!(chi_square_95(1), 3.84);
        assert_eq!(chi_square_95(3), 7.81);
        assert!(chi_square_95(10) > 18.0 && chi_square_95(10) < 19.5);
    }
}
