//! Measurement Model Constants
//!
//! Noise variances for each observed signal and the physiological
//! plausibility bounds used to reject impossible readings before they
//! reach a filter.

/// Maximum number of observed quantities in one measurement event.
pub const MAX_OBSERVED_SIGNALS: usize = 3;

// ===== VISION =====

/// Activity level noise variance (MET²).
pub const R_ACTIVITY_LEVEL: f64 = 0.25;

/// Accelerometer magnitude noise variance (g²).
pub const R_ACCEL_MAGNITUDE: f64 = 0.04;

/// Camera-derived respiratory rate noise variance ((breaths/min)²).
pub const R_RESPIRATORY_RATE_PROXY: f64 = 9.0;

/// Resting acceleration magnitude (gravity only), in g.
pub const ACCEL_REST_G: f64 = 1.0;

/// Additional acceleration magnitude per MET above rest, in g.
pub const ACCEL_G_PER_MET: f64 = 0.3;

// ===== WEARABLE =====

/// Heart-rate noise variance (bpm²).
///
/// Source: ±2 bpm typical for optical PPG at rest
pub const R_HEART_RATE: f64 = 4.0;

/// Respiratory-rate noise variance ((breaths/min)²).
pub const R_RESPIRATORY_RATE: f64 = 1.0;

/// HRV (RMSSD) noise variance (ms²).
pub const R_HRV_PROXY: f64 = 25.0;

/// Resting RMSSD at 70 bpm with no stress (ms).
///
/// Source: adult short-term RMSSD reference range 19–75 ms (Nunan et al., 2010)
pub const HRV_REST_MS: f64 = 45.0;

/// Fractional HRV suppression at full stress.
pub const HRV_STRESS_SUPPRESSION: f64 = 0.6;

/// Reference heart rate for HRV scaling (bpm).
pub const HRV_REFERENCE_HR: f64 = 70.0;

/// Heart-rate floor in the HRV model, avoids division blow-up on outlying sigma points.
pub const HRV_MIN_HR: f64 = 20.0;

/// Floor applied to confidence/quality weights before they scale R.
///
/// A 0.05 weight inflates the noise variance twenty-fold.
pub const MIN_OBSERVATION_WEIGHT: f64 = 0.05;

// ===== PLAUSIBILITY BOUNDS =====

/// Heart rate bounds (bpm).
pub const HEART_RATE_RANGE: (f64, f64) = (20.0, 250.0);

/// Respiratory rate bounds (breaths/min).
pub const RESPIRATORY_RATE_RANGE: (f64, f64) = (2.0, 80.0);

/// Activity level bounds (MET).
///
/// Source: Ainsworth compendium, sleeping 0.9 MET to elite running ~23 MET
pub const ACTIVITY_LEVEL_RANGE: (f64, f64) = (0.5, 25.0);

/// Acceleration magnitude bounds (g).
pub const ACCEL_MAGNITUDE_RANGE: (f64, f64) = (0.0, 16.0);

/// HRV (RMSSD) bounds (ms).
pub const HRV_PROXY_RANGE: (f64, f64) = (1.0, 300.0);

/// Confidence and quality indicator bounds.
pub const WEIGHT_RANGE: (f64, f64) = (0.0, 1.0);
