//! Unscented Kalman Fusion of Vision and Wearable Measurements
//!
//! ## Overview
//!
//! Each subject's physiological state is tracked by a nonlinear Kalman
//! filter over a 7-component state:
//!
//! ```text
//! ┌────┬────┬──────────┬─────────┬────────┬──────────┬──────────┐
//! │ HR │ RR │ activity │ fatigue │ stress │ HR drift │ RR drift │
//! └────┴────┴──────────┴─────────┴────────┴──────────┴──────────┘
//!   bpm  /min    MET      [0, 1]    [0, 1]     bpm       /min
//! ```
//!
//! Vision and wearable measurements observe different, partially
//! overlapping subsets of that state. Both feed the same filter, and every
//! measurement only constrains the fields it actually carries:
//!
//! ```text
//! Vision   ──┐
//!            ├─→ predict(Δt) ─→ update(observed fields) ─→ x̂, P
//! Wearable ──┘         ↑                                     │
//!                 process noise Q ◄── adaptive tuner ◄── NIS ┘
//! ```
//!
//! ## Why Unscented?
//!
//! The HRV measurement is a product of stress and an inverse of heart
//! rate, and fatigue dynamics depend on activity. Linearizing those would
//! need hand-derived Jacobians that are wrong far from the operating
//! point. The unscented transform propagates 2n+1 deterministic sigma
//! points through the exact nonlinear functions instead.
//!
//! ## Architecture
//!
//! 1. **Matrix helpers** ([`matrix`]): symmetrization, regularized
//!    Cholesky, eigenvalue repair
//! 2. **Unscented transform** ([`unscented`]): sigma points and weights
//! 3. **Models** ([`models`]): process dynamics, measurement functions,
//!    noise
//! 4. **Estimator** ([`estimator`]): per-subject predict/update cycle
//! 5. **Confidence** ([`confidence`]): covariance-derived trust scores
//!
//! ## Numerical Stability
//!
//! - **Symmetric enforcement**: covariance averaged with its transpose
//!   after every step
//! - **Positive definite**: Cholesky with one regularization retry, then a
//!   typed error
//! - **Repair**: eigenvalues clamped to a floor when rounding breaks
//!   definiteness
//! - **Bounded indices**: fatigue and stress clipped to [0, 1]
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vitalfuse_core::fusion::{FilterModel, SubjectEstimator};
//! use vitalfuse_core::tuning::{NoiseHandle, ProcessNoise};
//! use vitalfuse_core::events::WearableObservation;
//!
//! let model = Arc::new(FilterModel::default());
//! let noise = NoiseHandle::new(ProcessNoise::new(model.process_noise));
//! let mut estimator = SubjectEstimator::new("athlete-7", model, noise);
//!
//! let hr = WearableObservation::heart_rate("athlete-7", 1_000, 92.0);
//! let innovation = estimator.update(&hr.into()).unwrap();
//! assert_eq!(innovation.dimension(), 1);
//! ```

pub mod confidence;
pub mod estimator;
pub mod matrix;
pub mod models;
pub mod unscented;

// Re-export main types
pub use confidence::{chi_square_95, ConfidenceScore};
pub use estimator::{ForecastPoint, Innovation, SubjectEstimator, SubjectSnapshot};
pub use matrix::{StateCovariance, StateVector};
pub use models::{observe, FilterModel, MeasurementModel, ProcessModel};
pub use unscented::{SigmaParams, SigmaPoints, UnscentedTransform};
