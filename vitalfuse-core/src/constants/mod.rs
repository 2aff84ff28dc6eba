//! Constants for VitalFuse Core
//!
//! This module centralizes every numeric default used by the estimator,
//! the noise tuner, the derived metrics and the ingestion router. Values
//! here are defaults only: each one can be overridden through
//! [`FusionConfig`](crate::config::FusionConfig).
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **State**: State vector layout and default priors
//! - **Dynamics**: Process model decay rates and process noise
//! - **Measurement**: Observation noise and physiological plausibility bounds
//! - **Filter**: Sigma-point scaling and numerical repair tolerances
//! - **Tuning**: Adaptive process-noise controller limits
//! - **Metrics**: Resilience weights, anomaly thresholds, fatigue horizons
//! - **Registry**: Queue sizes, worker counts and eviction timing
//! - **Time**: Unit conversions
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Document the physiological source or the calibration behind a value
//! 3. Include units in the name whenever the value has one

/// State vector layout and default priors.
pub mod state;

/// Process model decay factors and per-second process noise.
pub mod dynamics;

/// Measurement noise variances and plausibility bounds per observed signal.
pub mod measurement;

/// Unscented transform parameters and covariance repair tolerances.
pub mod filter;

/// Adaptive noise tuner limits.
pub mod tuning;

/// Derived metric weights and thresholds.
pub mod metrics;

/// Registry and router sizing.
pub mod registry;

/// Time unit conversions.
pub mod time;

pub use state::{
    STATE_DIM, IDX_HEART_RATE, IDX_RESPIRATORY_RATE, IDX_ACTIVITY,
    IDX_FATIGUE, IDX_STRESS, IDX_HR_DRIFT, IDX_RR_DRIFT,
};

pub use time::{MS_PER_SECOND, SECONDS_PER_MINUTE, MS_PER_MINUTE};

pub use filter::{UKF_ALPHA, UKF_BETA, UKF_KAPPA, MAX_FORECAST_STEPS};

pub use tuning::NIS_WINDOW_LEN;

pub use measurement::MAX_OBSERVED_SIGNALS;
