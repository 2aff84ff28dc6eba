//! Derived Metrics Constants

// ===== RESILIENCE =====

/// Cardiovascular sub-score weight.
pub const WEIGHT_CARDIOVASCULAR: f64 = 0.30;
/// Metabolic sub-score weight.
pub const WEIGHT_METABOLIC: f64 = 0.25;
/// Stress adaptation sub-score weight.
pub const WEIGHT_STRESS_ADAPTATION: f64 = 0.25;
/// Fatigue resistance sub-score weight.
pub const WEIGHT_FATIGUE_RESISTANCE: f64 = 0.20;

/// Resting heart rate at 1 MET (bpm).
pub const BASELINE_HEART_RATE: f64 = 70.0;

/// Expected heart rate increase per MET above rest (bpm/MET).
///
/// Source: linear HR–VO₂ relationship, ~10 bpm per MET for untrained adults
pub const HEART_RATE_PER_MET: f64 = 10.0;

/// Resting respiratory rate at 1 MET (breaths/min).
pub const BASELINE_RESPIRATORY_RATE: f64 = 15.0;

/// Expected respiratory rate increase per MET above rest.
pub const RESPIRATORY_RATE_PER_MET: f64 = 2.5;

/// Heart-rate excess over the activity expectation that scores zero (bpm).
pub const CARDIO_EXCESS_SPAN: f64 = 60.0;

/// Respiratory-rate deviation from expectation that scores zero.
pub const METABOLIC_DEVIATION_SPAN: f64 = 15.0;

/// Recovery time that maps to a zero recovery sub-score (minutes).
pub const RECOVERY_SPAN_MIN: f64 = 120.0;

// ===== ANOMALY =====

/// Anomaly score at which severity becomes medium.
pub const SEVERITY_MEDIUM: f64 = 0.4;

/// Anomaly score at which severity becomes high.
pub const SEVERITY_HIGH: f64 = 0.75;

/// Per-dimension squared normalized innovation (y²/S) above which a signal is listed.
///
/// Source: 3σ rule
pub const SIGNAL_CONTRIBUTION_THRESHOLD: f64 = 9.0;

/// Standard deviation of heart rate around its activity expectation (bpm).
pub const HEART_RATE_MISMATCH_SIGMA: f64 = 15.0;

/// Mismatch z-score at which the cardio/activity term starts contributing.
pub const HEART_RATE_MISMATCH_Z: f64 = 3.0;

/// Activity variance below which the activity level counts as observed (MET²).
pub const ACTIVITY_OBSERVED_VARIANCE: f64 = 0.5;

// ===== FATIGUE =====

/// Fatigue level treated as critical.
pub const FATIGUE_CRITICAL: f64 = 0.8;

/// Fatigue level treated as recovered.
pub const FATIGUE_RECOVERED: f64 = 0.2;

/// Stress level treated as recovered.
pub const STRESS_RECOVERED: f64 = 0.2;

/// Projection horizons (minutes).
pub const FATIGUE_HORIZONS_MIN: [f64; 2] = [30.0, 60.0];

/// Fatigue standard deviation at which projection confidence reaches zero.
pub const FATIGUE_STD_ZERO_CONFIDENCE: f64 = 0.3;

// ===== CONFIDENCE =====

/// Variances at which a component contributes 0.5 to estimate confidence.
///
/// Only the five physiological components count; bias terms are excluded.
pub const CONFIDENCE_REFERENCE_VARIANCE: [f64; 5] = [25.0, 4.0, 0.25, 0.01, 0.01];

// ===== RECOVERY =====

/// Activity level assumed while resting (MET).
pub const RESTING_MET: f64 = 1.0;
