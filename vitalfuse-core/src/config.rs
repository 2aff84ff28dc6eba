//! Engine Configuration
//!
//! ## Overview
//!
//! One [`FusionConfig`] describes the whole engine. It is loaded from
//! JSON, every field defaults to the documented value in
//! [`constants`](crate::constants), and [`FusionConfig::validate`] rejects
//! anything the filter cannot run with before a single estimator exists.
//!
//! ```text
//! FusionConfig
//! ├── filter              sigma points, priors, decay, process noise
//! ├── measurement_noise   R per observed signal
//! ├── tuning              adaptive process-noise controller
//! ├── metrics             resilience / anomaly / fatigue thresholds
//! └── registry            workers, queues, eviction
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use vitalfuse_core::config::FusionConfig;
//!
//! let config = FusionConfig::from_json_str(r#"{
//!     "registry": { "workers": 8, "idle_timeout_ms": 60000 },
//!     "tuning": { "enabled": false }
//! }"#).unwrap();
//!
//! assert_eq!(config.registry.workers, 8);
//! assert!(!config.tuning.enabled);
//! // Everything else keeps its default
//! assert_eq!(config.filter.sigma.beta, 2.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        dynamics::{
            DECAY_PER_SECOND, FATIGUE_GROWTH_PER_MET_SECOND, FATIGUE_REST_THRESHOLD_MET,
            PROCESS_NOISE_PER_SECOND,
        },
        filter::{EIGENVALUE_FLOOR, MAX_FORECAST_STEPS, REGULARIZATION_EPSILON},
        measurement::{
            MIN_OBSERVATION_WEIGHT, R_ACCEL_MAGNITUDE, R_ACTIVITY_LEVEL, R_HEART_RATE, R_HRV_PROXY,
            R_RESPIRATORY_RATE, R_RESPIRATORY_RATE_PROXY,
        },
        metrics::{
            ACTIVITY_OBSERVED_VARIANCE, FATIGUE_CRITICAL, FATIGUE_RECOVERED,
            HEART_RATE_MISMATCH_SIGMA, HEART_RATE_MISMATCH_Z, SEVERITY_HIGH, SEVERITY_MEDIUM,
            SIGNAL_CONTRIBUTION_THRESHOLD, STRESS_RECOVERED,
        },
        registry::{
            DEFAULT_DRAIN_BATCH, DEFAULT_EVICTION_INTERVAL_MS, DEFAULT_IDLE_TIMEOUT_MS,
            DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
        },
        state::{PRIOR_MEAN, PRIOR_VARIANCE},
        tuning::{
            MAX_NOISE_SCALE, MAX_SCALE_GROWTH, MIN_NIS_SAMPLES, MIN_NOISE_SCALE, MIN_SCALE_SHRINK,
            NIS_DEADBAND, NIS_WINDOW_LEN, TUNING_INTERVAL_MS,
        },
        STATE_DIM,
    },
    errors::ConfigError,
    events::Severity,
    fusion::unscented::SigmaParams,
};

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Filter dynamics and numerics
    pub filter: FilterConfig,
    /// Observation noise
    pub measurement_noise: MeasurementNoiseConfig,
    /// Adaptive process-noise tuning
    pub tuning: TuningConfig,
    /// Derived metric thresholds
    pub metrics: MetricsConfig,
    /// Subject table, queues and workers
    pub registry: RegistryConfig,
}

impl FusionConfig {
    /// Parse JSON and validate
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate()?;
        self.measurement_noise.validate()?;
        self.tuning.validate()?;
        self.metrics.validate()?;
        self.registry.validate()
    }

    /// Set the worker pool size
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.registry.workers = workers;
        self
    }

    /// Set the per-subject queue bound
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.registry.queue_capacity = capacity;
        self
    }

    /// Set the inactivity timeout before eviction
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.registry.idle_timeout_ms = timeout_ms;
        self
    }

    /// Replace the tuning section
    pub fn with_tuning(mut self, tuning: TuningConfig) -> Self {
        self.tuning = tuning;
        self
    }

    /// Replace the sigma point parameters
    pub fn with_sigma_params(mut self, sigma: SigmaParams) -> Self {
        self.filter.sigma = sigma;
        self
    }
}

/// Filter dynamics and numerics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Sigma point scaling
    pub sigma: SigmaParams,
    /// Diagonal load applied once when a decomposition fails
    pub regularization: f64,
    /// Eigenvalue floor for covariance repair
    pub eigenvalue_floor: f64,
    /// Prior mean for new subjects
    pub prior_mean: [f64; STATE_DIM],
    /// Prior variances for new subjects
    pub prior_variance: [f64; STATE_DIM],
    /// Per-second decay factors
    pub decay_per_second: [f64; STATE_DIM],
    /// Per-second process noise variances
    pub process_noise_per_second: [f64; STATE_DIM],
    /// Fatigue accumulation per MET above rest per second
    pub fatigue_growth_per_met_second: f64,
    /// Activity below which fatigue does not accumulate (MET)
    pub fatigue_rest_threshold_met: f64,
    /// Most steps a single forecast may simulate
    pub max_forecast_steps: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sigma: SigmaParams::default(),
            regularization: REGULARIZATION_EPSILON,
            eigenvalue_floor: EIGENVALUE_FLOOR,
            prior_mean: PRIOR_MEAN,
            prior_variance: PRIOR_VARIANCE,
            decay_per_second: DECAY_PER_SECOND,
            process_noise_per_second: PROCESS_NOISE_PER_SECOND,
            fatigue_growth_per_met_second: FATIGUE_GROWTH_PER_MET_SECOND,
            fatigue_rest_threshold_met: FATIGUE_REST_THRESHOLD_MET,
            max_forecast_steps: MAX_FORECAST_STEPS,
        }
    }
}

impl FilterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let SigmaParams { alpha, beta, kappa } = self.sigma;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::invalid("filter.sigma.alpha", "must be in (0, 1]"));
        }
        if !(beta >= 0.0) {
            return Err(ConfigError::invalid("filter.sigma.beta", "must be non-negative"));
        }
        if !(STATE_DIM as f64 + kappa > 0.0) {
            return Err(ConfigError::invalid("filter.sigma.kappa", "n + kappa must be positive"));
        }
        if !(self.regularization > 0.0) {
            return Err(ConfigError::invalid("filter.regularization", "must be positive"));
        }
        if !(self.eigenvalue_floor >= 0.0) {
            return Err(ConfigError::invalid("filter.eigenvalue_floor", "must be non-negative"));
        }
        if self.prior_mean.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("filter.prior_mean", "must be finite"));
        }
        if self.prior_variance.iter().any(|v| !(*v > 0.0)) {
            return Err(ConfigError::invalid("filter.prior_variance", "must be positive"));
        }
        if self.decay_per_second.iter().any(|d| !(*d > 0.0 && *d <= 1.0)) {
            return Err(ConfigError::invalid("filter.decay_per_second", "factors must be in (0, 1]"));
        }
        if self.process_noise_per_second.iter().any(|q| !(*q >= 0.0)) {
            return Err(ConfigError::invalid("filter.process_noise_per_second", "must be non-negative"));
        }
        if !(self.fatigue_growth_per_met_second >= 0.0) {
            return Err(ConfigError::invalid("filter.fatigue_growth_per_met_second", "must be non-negative"));
        }
        if self.max_forecast_steps == 0 {
            return Err(ConfigError::invalid("filter.max_forecast_steps", "must be at least 1"));
        }
        Ok(())
    }
}

/// Observation noise variances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementNoiseConfig {
    /// Vision activity level (MET²)
    pub activity_level: f64,
    /// Vision acceleration magnitude (g²)
    pub accel_magnitude: f64,
    /// Vision respiratory rate
    pub respiratory_rate_proxy: f64,
    /// Wearable heart rate (bpm²)
    pub heart_rate: f64,
    /// Wearable respiratory rate
    pub respiratory_rate: f64,
    /// Wearable RMSSD (ms²)
    pub hrv_proxy: f64,
    /// Floor on confidence/quality before scaling R
    pub min_weight: f64,
}

impl Default for MeasurementNoiseConfig {
    fn default() -> Self {
        Self {
            activity_level: R_ACTIVITY_LEVEL,
            accel_magnitude: R_ACCEL_MAGNITUDE,
            respiratory_rate_proxy: R_RESPIRATORY_RATE_PROXY,
            heart_rate: R_HEART_RATE,
            respiratory_rate: R_RESPIRATORY_RATE,
            hrv_proxy: R_HRV_PROXY,
            min_weight: MIN_OBSERVATION_WEIGHT,
        }
    }
}

impl MeasurementNoiseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let variances = [
            self.activity_level,
            self.accel_magnitude,
            self.respiratory_rate_proxy,
            self.heart_rate,
            self.respiratory_rate,
            self.hrv_proxy,
        ];
        if variances.iter().any(|v| !(*v > 0.0)) {
            return Err(ConfigError::invalid("measurement_noise", "variances must be positive"));
        }
        if !(self.min_weight > 0.0 && self.min_weight <= 1.0) {
            return Err(ConfigError::invalid("measurement_noise.min_weight", "must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Adaptive noise tuner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Run tuning passes at all
    pub enabled: bool,
    /// Cadence of tuning passes (ms)
    pub interval_ms: u64,
    /// Samples needed before acting
    pub min_samples: usize,
    /// Tolerance around the expected normalized NIS of 1.0
    pub deadband: f64,
    /// Cap on the multiplicative increase per adjustment
    pub max_growth: f64,
    /// Floor on the multiplicative decrease per adjustment
    pub min_shrink: f64,
    /// Lowest absolute scale
    pub min_scale: f64,
    /// Highest absolute scale
    pub max_scale: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: TUNING_INTERVAL_MS,
            min_samples: MIN_NIS_SAMPLES,
            deadband: NIS_DEADBAND,
            max_growth: MAX_SCALE_GROWTH,
            min_shrink: MIN_SCALE_SHRINK,
            min_scale: MIN_NOISE_SCALE,
            max_scale: MAX_NOISE_SCALE,
        }
    }
}

impl TuningConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid("tuning.interval_ms", "must be positive"));
        }
        if self.min_samples == 0 || self.min_samples > NIS_WINDOW_LEN {
            return Err(ConfigError::invalid(
                "tuning.min_samples",
                format!("must be in 1..={}", NIS_WINDOW_LEN),
            ));
        }
        if !(self.deadband >= 0.0 && self.deadband < 1.0) {
            return Err(ConfigError::invalid("tuning.deadband", "must be in [0, 1)"));
        }
        if !(self.max_growth >= 1.0) {
            return Err(ConfigError::invalid("tuning.max_growth", "must be at least 1"));
        }
        if !(self.min_shrink > 0.0 && self.min_shrink <= 1.0) {
            return Err(ConfigError::invalid("tuning.min_shrink", "must be in (0, 1]"));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0 && self.max_scale >= 1.0) {
            return Err(ConfigError::invalid("tuning.min_scale", "scale bounds must bracket 1"));
        }
        Ok(())
    }
}

/// Derived metric thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Anomaly score where severity becomes medium
    pub severity_medium: f64,
    /// Anomaly score where severity becomes high
    pub severity_high: f64,
    /// Lowest severity that produces an [`AnomalyEvent`](crate::events::AnomalyEvent)
    pub emit_severity: Severity,
    /// Per-signal y²/S above which a signal is listed
    pub signal_threshold: f64,
    /// Heart-rate spread around its activity expectation (bpm)
    pub mismatch_sigma: f64,
    /// z-score where the cardio/activity term starts
    pub mismatch_z: f64,
    /// Activity variance below which activity counts as observed
    pub activity_observed_variance: f64,
    /// Critical fatigue level
    pub fatigue_critical: f64,
    /// Recovered fatigue level
    pub fatigue_recovered: f64,
    /// Recovered stress level
    pub stress_recovered: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            severity_medium: SEVERITY_MEDIUM,
            severity_high: SEVERITY_HIGH,
            emit_severity: Severity::Medium,
            signal_threshold: SIGNAL_CONTRIBUTION_THRESHOLD,
            mismatch_sigma: HEART_RATE_MISMATCH_SIGMA,
            mismatch_z: HEART_RATE_MISMATCH_Z,
            activity_observed_variance: ACTIVITY_OBSERVED_VARIANCE,
            fatigue_critical: FATIGUE_CRITICAL,
            fatigue_recovered: FATIGUE_RECOVERED,
            stress_recovered: STRESS_RECOVERED,
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0 < self.severity_medium && self.severity_medium < self.severity_high && self.severity_high <= 1.0) {
            return Err(ConfigError::invalid(
                "metrics.severity_high",
                "need 0 < severity_medium < severity_high <= 1",
            ));
        }
        if !(self.signal_threshold > 0.0) {
            return Err(ConfigError::invalid("metrics.signal_threshold", "must be positive"));
        }
        if !(self.mismatch_sigma > 0.0) {
            return Err(ConfigError::invalid("metrics.mismatch_sigma", "must be positive"));
        }
        if !(self.fatigue_recovered > 0.0 && self.fatigue_recovered < self.fatigue_critical && self.fatigue_critical < 1.0) {
            return Err(ConfigError::invalid(
                "metrics.fatigue_critical",
                "need 0 < fatigue_recovered < fatigue_critical < 1",
            ));
        }
        if !(self.stress_recovered > 0.0 && self.stress_recovered < 1.0) {
            return Err(ConfigError::invalid("metrics.stress_recovered", "must be in (0, 1)"));
        }
        Ok(())
    }
}

/// Subject table and worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Worker threads draining subject queues
    pub workers: usize,
    /// Bound of each per-subject queue
    pub queue_capacity: usize,
    /// Measurements handled per subject before yielding the worker
    pub drain_batch: usize,
    /// Inactivity before a subject is evicted (ms)
    pub idle_timeout_ms: u64,
    /// Cadence of eviction sweeps (ms)
    pub eviction_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_batch: DEFAULT_DRAIN_BATCH,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            eviction_interval_ms: DEFAULT_EVICTION_INTERVAL_MS,
        }
    }
}

impl RegistryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("registry.workers", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("registry.queue_capacity", "must be at least 1"));
        }
        if self.drain_batch == 0 {
            return Err(ConfigError::invalid("registry.drain_batch", "must be at least 1"));
        }
        if self.eviction_interval_ms == 0 {
            return Err(ConfigError::invalid("registry.eviction_interval_ms", "must be positive"));
        }
        Ok(())
    }
}
