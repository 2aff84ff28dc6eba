//! Process and Measurement Models
//!
//! ## Process Model
//!
//! Constant-decay dynamics. Over an interval of `Δt` seconds each
//! component is multiplied by its per-second decay factor raised to `Δt`:
//!
//! ```text
//! xᵢ(t + Δt) = xᵢ(t) · dᵢ^Δt
//! ```
//!
//! Heart rate, respiratory rate and activity persist (`d = 1`) and follow
//! real changes through process noise. Stress relaxes toward zero, and the
//! wearable bias terms relax faster than any physiological index.
//!
//! Fatigue additionally accumulates while the subject is active:
//!
//! ```text
//! df/dt = a·(1 − f) − r·f
//!   a  = g · max(MET − MET_rest, 0)     accumulation
//!   r  = −ln(d_fatigue)                 recovery
//!
//! f(Δt) = f∞ + (f₀ − f∞)·e^{−(a+r)Δt},   f∞ = a / (a + r)
//! ```
//!
//! At rest `a = 0` and the closed form collapses to `f₀ · d^Δt`, the same
//! decay every other component follows. The closed form is exact for any
//! interval, so long gaps between measurements cost nothing extra.
//!
//! ## Measurement Models
//!
//! ```text
//! vision    activity_level          = MET
//!           accel_magnitude         = 1 g + 0.3 g · (MET − 1)
//!           respiratory_rate_proxy  = RR
//! wearable  heart_rate              = HR + HR_drift
//!           respiratory_rate        = RR + RR_drift
//!           hrv_proxy               = 45 ms · (1 − 0.6·stress) · 70 / max(HR, 20)
//! ```
//!
//! Only the wearable carries bias terms; the camera sees the chest
//! directly. Noise variances are scaled by the inverse of the reported
//! confidence or quality.

use crate::{
    config::{FilterConfig, FusionConfig, MeasurementNoiseConfig},
    constants::{
        measurement::{
            ACCEL_G_PER_MET, ACCEL_REST_G, HRV_MIN_HR, HRV_REFERENCE_HR, HRV_REST_MS,
            HRV_STRESS_SUPPRESSION,
        },
        IDX_ACTIVITY, IDX_FATIGUE, IDX_HEART_RATE, IDX_HR_DRIFT, IDX_RESPIRATORY_RATE,
        IDX_RR_DRIFT, IDX_STRESS, STATE_DIM,
    },
    events::Signal,
    fusion::{
        matrix::{StateCovariance, StateVector},
        unscented::UnscentedTransform,
    },
};

/// Constant-decay process model with activity-driven fatigue
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessModel {
    decay: [f64; STATE_DIM],
    fatigue_growth: f64,
    rest_threshold: f64,
}

impl ProcessModel {
    /// Build from filter configuration
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            decay: config.decay_per_second,
            fatigue_growth: config.fatigue_growth_per_met_second,
            rest_threshold: config.fatigue_rest_threshold_met,
        }
    }

    /// Per-second decay factors
    pub fn decay(&self) -> &[f64; STATE_DIM] {
        &self.decay
    }

    /// Advance a state by `dt_s` seconds
    pub fn advance(&self, x: &StateVector, dt_s: f64) -> StateVector {
        let mut next = *x;
        for i in 0..STATE_DIM {
            if i != IDX_FATIGUE {
                next[i] = x[i] * self.decay[i].powf(dt_s);
            }
        }
        next[IDX_FATIGUE] = self.fatigue_after(x[IDX_FATIGUE], x[IDX_ACTIVITY], dt_s);
        next
    }

    /// Accumulation and recovery rates (a, r) at an activity level
    pub fn fatigue_rates(&self, met: f64) -> (f64, f64) {
        let growth = self.fatigue_growth * (met - self.rest_threshold).max(0.0);
        let recovery = -self.decay[IDX_FATIGUE].ln();
        (growth, recovery.max(0.0))
    }

    /// Fatigue level approached when activity stays at `met`
    pub fn fatigue_equilibrium(&self, met: f64) -> f64 {
        let (a, r) = self.fatigue_rates(met);
        if a + r <= 0.0 {
            return 0.0;
        }
        a / (a + r)
    }

    /// Fatigue after `dt_s` seconds at constant activity
    pub fn fatigue_after(&self, fatigue: f64, met: f64, dt_s: f64) -> f64 {
        let (a, r) = self.fatigue_rates(met);
        let k = a + r;
        if k <= 0.0 {
            return fatigue;
        }
        let equilibrium = a / k;
        equilibrium + (fatigue - equilibrium) * (-k * dt_s).exp()
    }

    /// Seconds until fatigue reaches `target` at constant activity
    ///
    /// `None` when the trajectory never gets there.
    pub fn time_to_fatigue(&self, fatigue: f64, met: f64, target: f64) -> Option<f64> {
        if (fatigue - target).abs() < f64::EPSILON {
            return Some(0.0);
        }

        let (a, r) = self.fatigue_rates(met);
        let k = a + r;
        if k <= 0.0 {
            return None;
        }

        let equilibrium = a / k;
        let ratio = (target - equilibrium) / (fatigue - equilibrium);
        if ratio > 0.0 && ratio <= 1.0 {
            Some(-ratio.ln() / k)
        } else {
            None
        }
    }

    /// Seconds for a value to decay below `target` under component `idx`'s factor
    pub fn time_to_decay(&self, idx: usize, value: f64, target: f64) -> Option<f64> {
        if value <= target {
            return Some(0.0);
        }
        let d = self.decay[idx];
        if d >= 1.0 || d <= 0.0 || target <= 0.0 {
            return None;
        }
        Some((target / value).ln() / d.ln())
    }
}

impl Default for ProcessModel {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

/// Predicted value of `signal` for state `x`
pub fn observe(signal: Signal, x: &StateVector) -> f64 {
    match signal {
        Signal::ActivityLevel => x[IDX_ACTIVITY],
        Signal::AccelMagnitude => ACCEL_REST_G + ACCEL_G_PER_MET * (x[IDX_ACTIVITY] - 1.0),
        Signal::RespiratoryRateProxy => x[IDX_RESPIRATORY_RATE],
        Signal::HeartRate => x[IDX_HEART_RATE] + x[IDX_HR_DRIFT],
        Signal::RespiratoryRate => x[IDX_RESPIRATORY_RATE] + x[IDX_RR_DRIFT],
        Signal::HrvProxy => {
            let suppression = 1.0 - HRV_STRESS_SUPPRESSION * x[IDX_STRESS];
            HRV_REST_MS * suppression * HRV_REFERENCE_HR / x[IDX_HEART_RATE].max(HRV_MIN_HR)
        }
    }
}

/// Measurement noise per observed signal
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementModel {
    noise: MeasurementNoiseConfig,
}

impl MeasurementModel {
    /// Build from noise configuration
    pub fn new(noise: MeasurementNoiseConfig) -> Self {
        Self { noise }
    }

    /// Noise variance for `signal` given the event's confidence or quality
    pub fn variance(&self, signal: Signal, weight: f64) -> f64 {
        let base = match signal {
            Signal::ActivityLevel => self.noise.activity_level,
            Signal::AccelMagnitude => self.noise.accel_magnitude,
            Signal::RespiratoryRateProxy => self.noise.respiratory_rate_proxy,
            Signal::HeartRate => self.noise.heart_rate,
            Signal::RespiratoryRate => self.noise.respiratory_rate,
            Signal::HrvProxy => self.noise.hrv_proxy,
        };
        base / weight.max(self.noise.min_weight)
    }
}

/// Everything an estimator needs that is shared across subjects
///
/// Built once from configuration and handed to every estimator behind an
/// `Arc`.
#[derive(Debug, Clone)]
pub struct FilterModel {
    /// Sigma-point machinery for the 7-component state
    pub transform: UnscentedTransform<STATE_DIM>,
    /// State dynamics
    pub process: ProcessModel,
    /// Observation noise
    pub measurement: MeasurementModel,
    /// Default prior mean
    pub prior_mean: StateVector,
    /// Default prior covariance
    pub prior_covariance: StateCovariance,
    /// Base per-second process noise (before tuning scale)
    pub process_noise: [f64; STATE_DIM],
    /// Diagonal load for near-singular innovation covariances
    pub regularization: f64,
    /// Eigenvalue floor for covariance repair
    pub eigenvalue_floor: f64,
    /// Step cap for forecasts
    pub max_forecast_steps: usize,
}

impl FilterModel {
    /// Build from the full configuration
    pub fn from_config(config: &FusionConfig) -> Self {
        let filter = &config.filter;
        Self {
            transform: UnscentedTransform::new(filter.sigma).with_regularization(filter.regularization),
            process: ProcessModel::from_config(filter),
            measurement: MeasurementModel::new(config.measurement_noise.clone()),
            prior_mean: StateVector::from(filter.prior_mean),
            prior_covariance: StateCovariance::from_diagonal(&StateVector::from(filter.prior_variance)),
            process_noise: filter.process_noise_per_second,
            regularization: filter.regularization,
            eigenvalue_floor: filter.eigenvalue_floor,
            max_forecast_steps: filter.max_forecast_steps,
        }
    }
}

impl Default for FilterModel {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}
