//! Process Model Constants
//!
//! Every component is multiplied by a per-second decay factor raised to
//! the elapsed time in seconds. Primary signals persist (factor 1.0) and
//! rely on process noise to follow real changes. Bias terms relax toward
//! zero faster than the slow physiological indices.

use super::state::STATE_DIM;

/// Per-second multiplicative decay, indexed like the state vector.
///
/// Source: half-lives of ~11.5 min for stress (0.999/s), ~2.3 min for the
/// wearable bias terms (0.995/s) and ~23 min for fatigue (0.9995/s).
pub const DECAY_PER_SECOND: [f64; STATE_DIM] = [1.0, 1.0, 1.0, 0.9995, 0.999, 0.995, 0.995];

/// Fatigue accumulation rate per second per MET above the rest threshold.
///
/// At 6 MET the equilibrium fatigue is ~0.78 with a ~7 minute time
/// constant; at 8 MET the equilibrium crosses the critical threshold.
pub const FATIGUE_GROWTH_PER_MET_SECOND: f64 = 4.0e-4;

/// Activity level at or below which fatigue does not accumulate (MET).
///
/// Source: light-activity boundary, Ainsworth compendium (< 1.5 MET sedentary)
pub const FATIGUE_REST_THRESHOLD_MET: f64 = 1.5;

/// Per-second process noise variance, indexed like the state vector.
///
/// Multiplied by elapsed seconds and the adaptive tuning scale before
/// being added to the propagated covariance.
pub const PROCESS_NOISE_PER_SECOND: [f64; STATE_DIM] = [0.05, 0.01, 0.005, 1.0e-5, 1.0e-5, 0.01, 0.002];
