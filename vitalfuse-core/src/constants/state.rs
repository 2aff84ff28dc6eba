//! State Vector Layout and Priors
//!
//! The estimator tracks seven scalar components in a fixed order. Index
//! constants are used everywhere a component is addressed so that the
//! layout lives in exactly one place.
//!
//! ```text
//! idx  component            unit
//! ───  ───────────────────  ──────────────
//!  0   heart rate           beats/min
//!  1   respiratory rate     breaths/min
//!  2   activity level       MET
//!  3   fatigue index        [0, 1]
//!  4   stress level         [0, 1]
//!  5   heart-rate drift     beats/min (wearable bias)
//!  6   resp.-rate drift     breaths/min (wearable bias)
//! ```

/// Number of state components.
pub const STATE_DIM: usize = 7;

/// Heart rate (bpm).
pub const IDX_HEART_RATE: usize = 0;
/// Respiratory rate (breaths/min).
pub const IDX_RESPIRATORY_RATE: usize = 1;
/// Metabolic equivalent activity level (MET).
pub const IDX_ACTIVITY: usize = 2;
/// Fatigue index, clipped to [0, 1].
pub const IDX_FATIGUE: usize = 3;
/// Stress level, clipped to [0, 1].
pub const IDX_STRESS: usize = 4;
/// Heart-rate sensor bias of the wearable (bpm).
pub const IDX_HR_DRIFT: usize = 5;
/// Respiratory-rate sensor bias of the wearable (breaths/min).
pub const IDX_RR_DRIFT: usize = 6;

/// Human-readable component names, indexed like the state vector.
pub const STATE_NAMES: [&str; STATE_DIM] = [
    "heart_rate",
    "respiratory_rate",
    "activity_level",
    "fatigue_index",
    "stress_level",
    "heart_rate_drift",
    "respiratory_rate_drift",
];

/// Default prior mean for a newly seen subject.
///
/// Resting adult: 70 bpm, 15 breaths/min, 1 MET (seated rest), no
/// fatigue, no stress, no sensor bias.
///
/// Source: resting reference values (AHA; Ainsworth compendium, 1 MET = rest)
pub const PRIOR_MEAN: [f64; STATE_DIM] = [70.0, 15.0, 1.0, 0.0, 0.0, 0.0, 0.0];

/// Default prior variances.
///
/// Wide enough that the first observation of each signal dominates:
/// ±10 bpm, ±4 breaths/min, ±1 MET, ±0.2 on the unit-interval indices,
/// ±2 bpm and ±1 breath/min of initial sensor bias (1σ).
pub const PRIOR_VARIANCE: [f64; STATE_DIM] = [100.0, 16.0, 1.0, 0.04, 0.04, 4.0, 1.0];
