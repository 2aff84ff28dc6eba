//! Seeded data generators
//!
//! Ground truth evolves under the filter's own process model with process
//! noise drawn to match Q, and measurements carry noise drawn to match R.
//! A filter fed from here is consistent by construction, so innovation
//! statistics should follow their theoretical distribution.

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use vitalfuse_core::{
    constants::{
        dynamics::PROCESS_NOISE_PER_SECOND,
        measurement::{R_HEART_RATE, R_RESPIRATORY_RATE},
        state::PRIOR_MEAN,
        IDX_FATIGUE, IDX_HEART_RATE, IDX_HR_DRIFT, IDX_RESPIRATORY_RATE, IDX_RR_DRIFT, IDX_STRESS,
        STATE_DIM,
    },
    fusion::{ProcessModel, StateVector},
    Timestamp, WearableObservation,
};

/// Gaussian noise source with a fixed seed
pub struct GaussianRng {
    rng: StdRng,
}

impl GaussianRng {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Normal draw with the given variance
    pub fn normal(&mut self, mean: f64, variance: f64) -> f64 {
        Normal::new(mean, variance.sqrt())
            .expect("finite non-negative variance")
            .sample(&mut self.rng)
    }
}

/// Ground-truth subject evolving under the process model
pub struct TruthSimulator {
    process: ProcessModel,
    noise: GaussianRng,
    state: StateVector,
    time: Timestamp,
}

impl TruthSimulator {
    /// Truth starting at the default prior mean
    pub fn new(seed: u64) -> Self {
        Self {
            process: ProcessModel::default(),
            noise: GaussianRng::new(seed),
            state: StateVector::from(PRIOR_MEAN),
            time: 0,
        }
    }

    /// Advance by `dt_ms`, adding process noise matching Q·Δt
    pub fn step(&mut self, dt_ms: u64) {
        let dt_s = dt_ms as f64 / 1000.0;
        let mut next = self.process.advance(&self.state, dt_s);
        for i in 0..STATE_DIM {
            next[i] = self.noise.normal(next[i], PROCESS_NOISE_PER_SECOND[i] * dt_s);
        }
        next[IDX_FATIGUE] = next[IDX_FATIGUE].clamp(0.0, 1.0);
        next[IDX_STRESS] = next[IDX_STRESS].clamp(0.0, 1.0);
        self.state = next;
        self.time += dt_ms;
    }

    /// Wearable heart rate and respiratory rate with noise matching R
    pub fn wearable(&mut self, subject_id: &str) -> WearableObservation {
        let hr = self.state[IDX_HEART_RATE] + self.state[IDX_HR_DRIFT];
        let rr = self.state[IDX_RESPIRATORY_RATE] + self.state[IDX_RR_DRIFT];
        WearableObservation::heart_rate(subject_id, self.time, self.noise.normal(hr, R_HEART_RATE))
            .with_respiratory_rate(self.noise.normal(rr, R_RESPIRATORY_RATE))
    }
}
