//! Adaptive Process-Noise Tuning
//!
//! ## Overview
//!
//! A well-calibrated filter produces innovations whose normalized squared
//! magnitude (NIS) follows a chi-squared distribution with as many degrees
//! of freedom as the innovation has dimensions. Dividing NIS by that
//! dimension gives a statistic with expectation 1.0 regardless of which
//! fields a measurement carried.
//!
//! ```text
//! mean(NIS/m) ≫ 1   innovations larger than predicted   → filter overconfident → grow Q
//! mean(NIS/m) ≪ 1   innovations smaller than predicted  → Q overestimated      → shrink Q
//! ```
//!
//! ## Bounded Adjustment
//!
//! Each adjustment multiplies the scale by the observed ratio, capped at
//! `max_growth` upward and floored at `min_shrink` downward, and the
//! absolute scale stays within `[min_scale, max_scale]`. After an
//! adjustment the window starts over so the next decision only sees
//! innovations produced under the new noise.
//!
//! ## Publication
//!
//! Process noise is an immutable, versioned [`ProcessNoise`] value. The
//! tuner never mutates it; it publishes a replacement through a
//! [`NoiseHandle`], which swaps an `Arc` under a short write lock. An
//! estimator reads the handle once at the start of each cycle, so a cycle
//! always runs against exactly one version.
//!
//! ```text
//!   tuner thread                       estimator (per subject)
//!   ────────────                       ───────────────────────
//!   window.mean() ─► evaluate()        cycle start: noise = handle.current()
//!        │                                   │
//!        └─► handle.publish(Arc v+1) ──────► next cycle sees v+1
//! ```

use std::sync::Arc;

use heapless::HistoryBuffer;
use parking_lot::RwLock;

use crate::{
    config::TuningConfig,
    constants::{tuning::NIS_WINDOW_LEN, STATE_DIM},
    events::TuningAdjustment,
    fusion::matrix::{StateCovariance, StateVector},
};

/// Immutable, versioned process noise
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessNoise {
    version: u64,
    scale: f64,
    per_second: [f64; STATE_DIM],
}

impl ProcessNoise {
    /// Version 0 at unit scale
    pub fn new(per_second: [f64; STATE_DIM]) -> Self {
        Self { version: 0, scale: 1.0, per_second }
    }

    /// Monotonic version, bumped on every published adjustment
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Multiplier applied to the base per-second variances
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Base per-second variances
    pub fn per_second(&self) -> &[f64; STATE_DIM] {
        &self.per_second
    }

    /// Q for an interval of `dt_s` seconds
    pub fn covariance(&self, dt_s: f64) -> StateCovariance {
        let diag = StateVector::from_fn(|i, _| self.per_second[i] * self.scale * dt_s);
        StateCovariance::from_diagonal(&diag)
    }

    /// A new version at `scale`
    pub fn rescaled(&self, scale: f64) -> Self {
        Self {
            version: self.version + 1,
            scale,
            per_second: self.per_second,
        }
    }
}

/// Shared slot through which a subject's process noise is replaced
#[derive(Debug, Clone)]
pub struct NoiseHandle {
    current: Arc<RwLock<Arc<ProcessNoise>>>,
}

impl NoiseHandle {
    /// Handle initially holding `noise`
    pub fn new(noise: ProcessNoise) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(noise))),
        }
    }

    /// The currently published noise
    pub fn current(&self) -> Arc<ProcessNoise> {
        Arc::clone(&*self.current.read())
    }

    /// Atomically replace the published noise
    pub fn publish(&self, noise: ProcessNoise) -> Arc<ProcessNoise> {
        let next = Arc::new(noise);
        *self.current.write() = Arc::clone(&next);
        next
    }
}

/// Sliding window of normalized NIS samples
pub struct NisWindow {
    samples: HistoryBuffer<f64, NIS_WINDOW_LEN>,
}

impl NisWindow {
    /// Empty window
    pub fn new() -> Self {
        Self { samples: HistoryBuffer::new() }
    }

    /// Record NIS divided by its innovation dimension
    pub fn record(&mut self, nis: f64, dimension: usize) {
        if dimension == 0 || !nis.is_finite() {
            return;
        }
        self.samples.write(nis / dimension as f64);
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample
    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    /// Mean normalized NIS, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        let samples = self.samples.as_slice();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    /// Forget every sample
    pub fn clear(&mut self) {
        self.samples = HistoryBuffer::new();
    }
}

impl std::fmt::Debug for NisWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NisWindow")
            .field("len", &self.len())
            .field("mean", &self.mean())
            .finish()
    }
}

impl Default for NisWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides and publishes process-noise adjustments
#[derive(Debug, Clone)]
pub struct AdaptiveNoiseTuner {
    config: TuningConfig,
}

impl AdaptiveNoiseTuner {
    /// Tuner with the given limits
    pub fn new(config: TuningConfig) -> Self {
        Self { config }
    }

    /// Tuning limits
    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// The adjusted noise the window calls for, if any
    pub fn evaluate(&self, window: &NisWindow, current: &ProcessNoise) -> Option<ProcessNoise> {
        if !self.config.enabled || window.len() < self.config.min_samples {
            return None;
        }

        let mean = window.mean()?;
        let factor = if mean > 1.0 + self.config.deadband {
            mean.min(self.config.max_growth)
        } else if mean < 1.0 - self.config.deadband {
            mean.max(self.config.min_shrink)
        } else {
            return None;
        };

        let scale = (current.scale() * factor).clamp(self.config.min_scale, self.config.max_scale);
        if (scale - current.scale()).abs() <= f64::EPSILON * current.scale() {
            // Pinned at a bound
            return None;
        }
        Some(current.rescaled(scale))
    }

    /// Evaluate one subject's window and publish through its handle
    pub fn adjust(
        &self,
        subject_id: &str,
        window: &mut NisWindow,
        handle: &NoiseHandle,
    ) -> Option<TuningAdjustment> {
        let current = handle.current();
        let samples = window.len();
        let mean = window.mean()?;
        let next = self.evaluate(window, &current)?;

        let published = handle.publish(next);
        window.clear();

        log::info!(
            "subject {}: process noise scale {:.3} -> {:.3} (mean NIS/m {:.2} over {} samples, v{})",
            subject_id,
            current.scale(),
            published.scale(),
            mean,
            samples,
            published.version()
        );

        Some(TuningAdjustment {
            subject_id: subject_id.to_string(),
            mean_normalized_nis: mean,
            samples,
            previous_scale: current.scale(),
            new_scale: published.scale(),
            version: published.version(),
        })
    }
}
