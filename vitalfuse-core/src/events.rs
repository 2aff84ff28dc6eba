//! Event Types Flowing In and Out of the Estimator
//!
//! ## Overview
//!
//! Two producers feed the estimator and three consumers read from it:
//!
//! ```text
//! pose/activity detector ── VisionObservation ──┐
//!                                               ├─► Measurement ─► SubjectRegistry
//! wearable transport ───── WearableObservation ─┘                      │
//!                                                                      ▼
//!                          StateEstimate / AnomalyEvent / TuningSample ─► sinks
//! ```
//!
//! ## Partial Observability
//!
//! Every observed quantity is optional. A camera that lost sight of the
//! chest still reports activity; a wearable that failed to lock onto a
//! respiration signal still reports heart rate. [`Measurement::observed`]
//! returns only the quantities that are present, and the estimator builds
//! its measurement function and noise matrix from that subset.
//!
//! ## Type Safety
//!
//! Modality dispatch is a two-case enum. Every consumer matches it
//! exhaustively, so adding a third modality is a compile error everywhere
//! it needs handling.
//!
//! ## Wire Format
//!
//! All types are serde-serializable. [`Measurement`] is internally tagged
//! by `modality`:
//!
//! ```text
//! {"modality":"wearable","subject_id":"s-17","timestamp":1000,"heart_rate":92.0}
//! ```

use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};

use crate::{
    constants::measurement::{
        ACCEL_MAGNITUDE_RANGE, ACTIVITY_LEVEL_RANGE, HEART_RATE_RANGE, HRV_PROXY_RANGE,
        MAX_OBSERVED_SIGNALS, RESPIRATORY_RATE_RANGE, WEIGHT_RANGE,
    },
    errors::{FusionError, FusionResult},
    time::Timestamp,
};

/// Identifier of a tracked subject
pub type SubjectId = String;

/// Observed quantities of a single measurement, in field order
pub type Observed = HVec<(Signal, f64), MAX_OBSERVED_SIGNALS>;

/// Source of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Camera-based pose/activity detector
    Vision,
    /// Body-worn biosignal sensor
    Wearable,
}

impl Modality {
    /// Stable index for per-modality tables
    pub const fn index(self) -> usize {
        match self {
            Self::Vision => 0,
            Self::Wearable => 1,
        }
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Wearable => "wearable",
        }
    }
}

/// A single observable quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Vision: activity level (MET)
    ActivityLevel,
    /// Vision: acceleration magnitude (g)
    AccelMagnitude,
    /// Vision: respiratory rate estimated from chest motion
    RespiratoryRateProxy,
    /// Wearable: heart rate (bpm)
    HeartRate,
    /// Wearable: respiratory rate (breaths/min)
    RespiratoryRate,
    /// Wearable: heart-rate variability, RMSSD (ms)
    HrvProxy,
}

impl Signal {
    /// Field name as it appears on the wire
    pub const fn name(self) -> &'static str {
        match self {
            Self::ActivityLevel => "activity_level",
            Self::AccelMagnitude => "accel_magnitude",
            Self::RespiratoryRateProxy => "respiratory_rate_proxy",
            Self::HeartRate => "heart_rate",
            Self::RespiratoryRate => "respiratory_rate",
            Self::HrvProxy => "hrv_proxy",
        }
    }

    /// Modality that carries this signal
    pub const fn modality(self) -> Modality {
        match self {
            Self::ActivityLevel | Self::AccelMagnitude | Self::RespiratoryRateProxy => Modality::Vision,
            Self::HeartRate | Self::RespiratoryRate | Self::HrvProxy => Modality::Wearable,
        }
    }

    /// Physiological plausibility bounds (inclusive)
    pub const fn bounds(self) -> (f64, f64) {
        match self {
            Self::ActivityLevel => ACTIVITY_LEVEL_RANGE,
            Self::AccelMagnitude => ACCEL_MAGNITUDE_RANGE,
            Self::RespiratoryRateProxy | Self::RespiratoryRate => RESPIRATORY_RATE_RANGE,
            Self::HeartRate => HEART_RATE_RANGE,
            Self::HrvProxy => HRV_PROXY_RANGE,
        }
    }
}

/// Observation from the visual activity detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionObservation {
    /// Subject the detector attributed this observation to
    pub subject_id: SubjectId,
    /// Capture time (ms)
    pub timestamp: Timestamp,
    /// Activity level (MET)
    #[serde(default)]
    pub activity_level: Option<f64>,
    /// Acceleration magnitude of the tracked body (g)
    #[serde(default)]
    pub accel_magnitude: Option<f64>,
    /// Respiratory rate from chest motion (breaths/min)
    #[serde(default)]
    pub respiratory_rate_proxy: Option<f64>,
    /// Detector confidence in [0, 1]; absent means 1.0
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl VisionObservation {
    /// Observation carrying only an activity level
    pub fn activity(subject_id: impl Into<SubjectId>, timestamp: Timestamp, met: f64) -> Self {
        Self {
            subject_id: subject_id.into(),
            timestamp,
            activity_level: Some(met),
            accel_magnitude: None,
            respiratory_rate_proxy: None,
            confidence: None,
        }
    }

    /// Set the acceleration magnitude
    pub fn with_accel(mut self, g: f64) -> Self {
        self.accel_magnitude = Some(g);
        self
    }

    /// Set the camera respiratory rate
    pub fn with_respiratory_rate(mut self, rr: f64) -> Self {
        self.respiratory_rate_proxy = Some(rr);
        self
    }

    /// Set the detector confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Observation from a body-worn sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WearableObservation {
    /// Subject wearing the device
    pub subject_id: SubjectId,
    /// Sample time (ms)
    pub timestamp: Timestamp,
    /// Heart rate (bpm)
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Respiratory rate (breaths/min)
    #[serde(default)]
    pub respiratory_rate: Option<f64>,
    /// RMSSD (ms)
    #[serde(default)]
    pub hrv_proxy: Option<f64>,
    /// Signal quality in [0, 1]; absent means 1.0
    #[serde(default)]
    pub quality: Option<f64>,
}

impl WearableObservation {
    /// Observation carrying only a heart rate
    pub fn heart_rate(subject_id: impl Into<SubjectId>, timestamp: Timestamp, bpm: f64) -> Self {
        Self {
            subject_id: subject_id.into(),
            timestamp,
            heart_rate: Some(bpm),
            respiratory_rate: None,
            hrv_proxy: None,
            quality: None,
        }
    }

    /// Set the respiratory rate
    pub fn with_respiratory_rate(mut self, rr: f64) -> Self {
        self.respiratory_rate = Some(rr);
        self
    }

    /// Set the HRV proxy
    pub fn with_hrv(mut self, rmssd_ms: f64) -> Self {
        self.hrv_proxy = Some(rmssd_ms);
        self
    }

    /// Set the signal quality
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// A measurement event from either modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "snake_case")]
pub enum Measurement {
    /// Camera-derived observation
    Vision(VisionObservation),
    /// Wearable-derived observation
    Wearable(WearableObservation),
}

impl Measurement {
    /// Subject this measurement belongs to
    pub fn subject_id(&self) -> &str {
        match self {
            Self::Vision(v) => &v.subject_id,
            Self::Wearable(w) => &w.subject_id,
        }
    }

    /// Measurement time (ms)
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Vision(v) => v.timestamp,
            Self::Wearable(w) => w.timestamp,
        }
    }

    /// Which sensor produced it
    pub fn modality(&self) -> Modality {
        match self {
            Self::Vision(_) => Modality::Vision,
            Self::Wearable(_) => Modality::Wearable,
        }
    }

    /// Confidence (vision) or quality (wearable), defaulting to 1.0
    pub fn weight(&self) -> f64 {
        match self {
            Self::Vision(v) => v.confidence,
            Self::Wearable(w) => w.quality,
        }
        .unwrap_or(1.0)
    }

    /// The quantities actually present, in field order
    pub fn observed(&self) -> Observed {
        let fields: [(Signal, Option<f64>); MAX_OBSERVED_SIGNALS] = match self {
            Self::Vision(v) => [
                (Signal::ActivityLevel, v.activity_level),
                (Signal::AccelMagnitude, v.accel_magnitude),
                (Signal::RespiratoryRateProxy, v.respiratory_rate_proxy),
            ],
            Self::Wearable(w) => [
                (Signal::HeartRate, w.heart_rate),
                (Signal::RespiratoryRate, w.respiratory_rate),
                (Signal::HrvProxy, w.hrv_proxy),
            ],
        };

        let mut observed = Observed::new();
        for (signal, value) in fields {
            if let Some(value) = value {
                // Capacity equals the field count
                let _ = observed.push((signal, value));
            }
        }
        observed
    }

    /// Check identifying fields, presence, finiteness and plausibility
    pub fn validate(&self) -> FusionResult<()> {
        if self.subject_id().trim().is_empty() {
            return Err(FusionError::MalformedMeasurement { reason: "missing subject_id" });
        }

        let weight_field = match self {
            Self::Vision(v) => v.confidence.map(|c| ("confidence", c)),
            Self::Wearable(w) => w.quality.map(|q| ("quality", q)),
        };
        if let Some((field, value)) = weight_field {
            check_value(field, value, WEIGHT_RANGE)?;
        }

        let observed = self.observed();
        if observed.is_empty() {
            return Err(FusionError::MalformedMeasurement { reason: "no observed quantity" });
        }
        for (signal, value) in &observed {
            check_value(signal.name(), *value, signal.bounds())?;
        }
        Ok(())
    }
}

fn check_value(field: &'static str, value: f64, (min, max): (f64, f64)) -> FusionResult<()> {
    if !value.is_finite() {
        return Err(FusionError::MalformedMeasurement { reason: "non-finite value" });
    }
    if value < min || value > max {
        return Err(FusionError::OutOfRange { field, value, min, max });
    }
    Ok(())
}

impl From<VisionObservation> for Measurement {
    fn from(obs: VisionObservation) -> Self {
        Self::Vision(obs)
    }
}

impl From<WearableObservation> for Measurement {
    fn from(obs: WearableObservation) -> Self {
        Self::Wearable(obs)
    }
}

/// Anomaly severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Within expected variation
    Low,
    /// Worth surfacing
    Medium,
    /// Needs attention
    High,
}

/// Fused physiological state for one subject at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEstimate {
    pub subject_id: SubjectId,
    pub timestamp: Timestamp,
    pub heart_rate: f64,
    pub respiratory_rate: f64,
    pub activity_level: f64,
    pub fatigue_index: f64,
    pub stress_level: f64,
    /// Composite score in [0, 100]
    pub resilience_score: f64,
    /// Estimate confidence in [0, 1], from the posterior covariance
    pub confidence: f64,
}

/// Emitted when an update looks inconsistent with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub subject_id: SubjectId,
    pub timestamp: Timestamp,
    /// Score in [0, 1]
    pub anomaly_score: f64,
    pub severity: Severity,
    /// Wire names of the signals that drove the score
    pub affected_signals: Vec<String>,
    pub description: String,
}

/// Per-update innovation statistic, exported for calibration monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningSample {
    pub subject_id: SubjectId,
    pub timestamp: Timestamp,
    pub modality: Modality,
    /// Innovation dimension
    pub dimension: usize,
    /// Normalized innovation squared
    pub nis: f64,
    /// Scale of the process noise in effect for this update
    pub noise_scale: f64,
    /// Version of the process noise in effect for this update
    pub noise_version: u64,
}

/// A process-noise adjustment published by the tuner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningAdjustment {
    pub subject_id: SubjectId,
    /// Mean of NIS / dimension over the window (expectation 1.0)
    pub mean_normalized_nis: f64,
    /// Window size the decision was based on
    pub samples: usize,
    pub previous_scale: f64,
    pub new_scale: f64,
    /// Version of the newly published noise
    pub version: u64,
}
