//! Unscented Filter Constants

/// Sigma point spread around the mean.
///
/// Small values keep sigma points close to the mean, which matters for
/// the bounded fatigue and stress components.
///
/// Source: Merwe scaled unscented transform (van der Merwe, 2004)
pub const UKF_ALPHA: f64 = 0.1;

/// Prior distribution weighting; 2 is optimal for Gaussian priors.
pub const UKF_BETA: f64 = 2.0;

/// Secondary scaling parameter.
pub const UKF_KAPPA: f64 = 0.0;

/// Diagonal loading added once when a decomposition fails.
pub const REGULARIZATION_EPSILON: f64 = 1.0e-6;

/// Eigenvalue floor used when repairing a covariance that lost PSD.
pub const EIGENVALUE_FLOOR: f64 = 1.0e-9;

/// Upper bound on the number of steps one forecast may simulate.
///
/// One day at one-minute resolution.
pub const MAX_FORECAST_STEPS: usize = 1_440;
