//! Per-Subject Unscented Kalman Estimator
//!
//! ## Overview
//!
//! One [`SubjectEstimator`] owns the state, covariance and filter clock of
//! one subject. It exposes two operations:
//!
//! ```text
//! predict(to)          update(measurement)
//! ───────────          ───────────────────
//! χ = σ(x, P)          predict(t_meas)
//! χ' = f(χ, Δt)        χ = σ(x, P)
//! x = Σ Wm χ'          Z = h_obs(χ)                 observed fields only
//! P = Σ Wc δχ' δχ'ᵀ    ẑ, Pzz, Pxz from Z
//!   + Q·Δt·scale       S = Pzz + R_obs              regularized if singular
//!                      K = Pxz S⁻¹
//!                      x += K (z − ẑ)
//!                      P -= K S Kᵀ
//! ```
//!
//! After every cycle fatigue and stress are clipped to [0, 1], the
//! covariance is averaged with its transpose and, if it no longer admits a
//! Cholesky factor, its eigenvalues are clamped to a small floor.
//!
//! ## Filter Clock
//!
//! A fresh estimator has no filter time. Its first measurement anchors the
//! clock without propagating. Afterwards:
//!
//! - a target equal to the filter time is a no-op
//! - a target earlier than the filter time is rejected as stale and
//!   leaves the estimator untouched
//!
//! ## Process Noise
//!
//! The estimator holds a [`NoiseHandle`] clone and re-reads it at the
//! start of every predict, so a tuner adjustment takes effect on the next
//! cycle and never in the middle of one.

use std::sync::Arc;

use heapless::Vec as HVec;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        measurement::MAX_OBSERVED_SIGNALS, IDX_ACTIVITY, IDX_FATIGUE, IDX_HEART_RATE,
        IDX_RESPIRATORY_RATE, IDX_STRESS, MS_PER_SECOND, STATE_DIM,
    },
    errors::{FusionError, FusionResult},
    events::{Measurement, Modality, Signal, SubjectId},
    fusion::{
        matrix::{invert_spd, is_finite, make_symmetric, repair_psd, StateCovariance, StateVector},
        models::{observe, FilterModel},
    },
    time::{elapsed_secs, Timestamp},
    tuning::{NisWindow, NoiseHandle, ProcessNoise},
};

/// Innovation of one update, restricted to the observed fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Innovation {
    /// Modality of the measurement
    pub modality: Modality,
    /// Measurement time
    pub timestamp: Timestamp,
    /// Observed signals, in field order
    pub signals: HVec<Signal, MAX_OBSERVED_SIGNALS>,
    /// Observed minus predicted, per signal
    pub residual: HVec<f64, MAX_OBSERVED_SIGNALS>,
    /// Diagonal of the innovation covariance S, per signal
    pub variance: HVec<f64, MAX_OBSERVED_SIGNALS>,
    /// Normalized innovation squared yᵀS⁻¹y
    pub nis: f64,
}

impl Innovation {
    /// Number of observed fields
    pub fn dimension(&self) -> usize {
        self.signals.len()
    }

    /// NIS divided by dimension, expectation 1.0
    pub fn normalized_nis(&self) -> f64 {
        if self.signals.is_empty() {
            return 0.0;
        }
        self.nis / self.signals.len() as f64
    }

    /// Per-signal squared normalized residual y²/Sᵢᵢ
    pub fn contributions(&self) -> impl Iterator<Item = (Signal, f64)> + '_ {
        self.signals
            .iter()
            .zip(self.residual.iter().zip(self.variance.iter()))
            .map(|(signal, (y, s))| (*signal, if *s > 0.0 { y * y / s } else { 0.0 }))
    }
}

/// Copy of an estimator's state taken outside its exclusive section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub subject_id: SubjectId,
    /// Filter time; 0 before the first measurement
    pub timestamp: Timestamp,
    pub state: [f64; STATE_DIM],
    /// Row-major covariance
    pub covariance: [[f64; STATE_DIM]; STATE_DIM],
    pub update_count: u64,
    pub noise_version: u64,
    pub noise_scale: f64,
    /// Latest innovation per modality
    pub innovations: Vec<Innovation>,
}

impl SubjectSnapshot {
    /// State as a vector
    pub fn state_vector(&self) -> StateVector {
        StateVector::from(self.state)
    }

    /// Covariance as a matrix
    pub fn covariance_matrix(&self) -> StateCovariance {
        StateCovariance::from_fn(|r, c| self.covariance[r][c])
    }

    /// Diagonal entry `idx`
    pub fn variance(&self, idx: usize) -> f64 {
        self.covariance[idx][idx]
    }

    /// Estimated heart rate (bpm)
    pub fn heart_rate(&self) -> f64 {
        self.state[IDX_HEART_RATE]
    }

    /// Estimated respiratory rate
    pub fn respiratory_rate(&self) -> f64 {
        self.state[IDX_RESPIRATORY_RATE]
    }

    /// Estimated activity (MET)
    pub fn activity_level(&self) -> f64 {
        self.state[IDX_ACTIVITY]
    }

    /// Estimated fatigue index
    pub fn fatigue_index(&self) -> f64 {
        self.state[IDX_FATIGUE]
    }

    /// Estimated stress level
    pub fn stress_level(&self) -> f64 {
        self.state[IDX_STRESS]
    }

    /// Latest innovation of `modality`, if any
    pub fn innovation(&self, modality: Modality) -> Option<&Innovation> {
        self.innovations.iter().find(|i| i.modality == modality)
    }
}

/// One step of a forward simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Seconds after the filter time
    pub offset_s: f64,
    /// Absolute time of this step
    pub timestamp: Timestamp,
    /// Predicted mean
    pub state: [f64; STATE_DIM],
    /// Predicted variances
    pub variance: [f64; STATE_DIM],
}

/// Estimator for a single subject
#[derive(Debug)]
pub struct SubjectEstimator {
    subject_id: SubjectId,
    model: Arc<FilterModel>,
    noise_handle: NoiseHandle,
    noise: Arc<ProcessNoise>,
    state: StateVector,
    covariance: StateCovariance,
    filter_time: Option<Timestamp>,
    nis: NisWindow,
    latest: [Option<Innovation>; 2],
    update_count: u64,
    repairs: u64,
}

impl SubjectEstimator {
    /// Estimator at the model's default priors
    pub fn new(subject_id: impl Into<SubjectId>, model: Arc<FilterModel>, noise_handle: NoiseHandle) -> Self {
        let noise = noise_handle.current();
        Self {
            subject_id: subject_id.into(),
            state: model.prior_mean,
            covariance: model.prior_covariance,
            model,
            noise_handle,
            noise,
            filter_time: None,
            nis: NisWindow::new(),
            latest: [None, None],
            update_count: 0,
            repairs: 0,
        }
    }

    /// Subject identifier
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Current mean
    pub fn state(&self) -> &StateVector {
        &self.state
    }

    /// Current covariance
    pub fn covariance(&self) -> &StateCovariance {
        &self.covariance
    }

    /// Filter clock, `None` before the first measurement
    pub fn filter_time(&self) -> Option<Timestamp> {
        self.filter_time
    }

    /// Successful updates since creation or reset
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Covariance repairs performed so far
    pub fn repair_count(&self) -> u64 {
        self.repairs
    }

    /// Process noise in effect for the last cycle
    pub fn noise(&self) -> &ProcessNoise {
        &self.noise
    }

    /// Recent normalized NIS values
    pub fn nis_window(&self) -> &NisWindow {
        &self.nis
    }

    /// NIS window for the tuner, which clears it after an adjustment
    pub fn nis_window_mut(&mut self) -> &mut NisWindow {
        &mut self.nis
    }

    /// Latest innovation of `modality`
    pub fn latest_innovation(&self, modality: Modality) -> Option<&Innovation> {
        self.latest[modality.index()].as_ref()
    }

    /// Advance to `to`
    pub fn predict(&mut self, to: Timestamp) -> FusionResult<()> {
        let from = match self.filter_time {
            None => {
                self.filter_time = Some(to);
                return Ok(());
            }
            Some(from) => from,
        };

        if to < from {
            return Err(FusionError::RejectedStaleMeasurement { timestamp: to, filter_time: from });
        }
        if to == from {
            return Ok(());
        }

        self.noise = self.noise_handle.current();
        let (state, covariance) = propagate(&self.model, &self.noise, &self.state, &self.covariance, elapsed_secs(from, to))?;

        self.state = state;
        self.covariance = covariance;
        self.condition()?;
        self.filter_time = Some(to);
        Ok(())
    }

    /// Fold in one measurement
    pub fn update(&mut self, measurement: &Measurement) -> FusionResult<Innovation> {
        let timestamp = measurement.timestamp();
        if let Some(filter_time) = self.filter_time {
            if timestamp < filter_time {
                return Err(FusionError::RejectedStaleMeasurement { timestamp, filter_time });
            }
        }

        let observed = measurement.observed();
        if observed.is_empty() {
            return Err(FusionError::MalformedMeasurement { reason: "no observed quantity" });
        }

        self.predict(timestamp)?;

        let model = Arc::clone(&self.model);
        let dim = observed.len();
        let sigma = model.transform.sigma_points(&self.state, &self.covariance)?;
        let predicted = model.transform.transform(&sigma, dim, |x, out| {
            for (slot, (signal, _)) in out.iter_mut().zip(observed.iter()) {
                *slot = observe(*signal, x);
            }
        });

        let weight = measurement.weight();
        let mut innovation_cov = predicted.covariance.clone();
        for (k, (signal, _)) in observed.iter().enumerate() {
            innovation_cov[(k, k)] += model.measurement.variance(*signal, weight);
        }
        let s_inv = invert_spd(&innovation_cov, model.regularization, "innovation covariance")?;

        let z = DVector::from_iterator(dim, observed.iter().map(|(_, v)| *v));
        let residual: DVector<f64> = z - &predicted.mean;
        let gain: DMatrix<f64> = &predicted.cross_covariance * &s_inv;
        let correction: DVector<f64> = &gain * &residual;
        let shrink: DMatrix<f64> = &gain * &innovation_cov * gain.transpose();

        for i in 0..STATE_DIM {
            self.state[i] += correction[i];
            for j in 0..STATE_DIM {
                self.covariance[(i, j)] -= shrink[(i, j)];
            }
        }
        self.condition()?;

        let nis = residual.dot(&(&s_inv * &residual));
        let innovation = Innovation {
            modality: measurement.modality(),
            timestamp,
            signals: observed.iter().map(|(s, _)| *s).collect(),
            residual: residual.iter().copied().collect(),
            variance: (0..dim).map(|k| innovation_cov[(k, k)]).collect(),
            nis,
        };

        self.nis.record(nis, dim);
        self.latest[innovation.modality.index()] = Some(innovation.clone());
        self.update_count += 1;

        log::debug!(
            "subject {}: {} update at {} ms, dim {}, NIS {:.3}",
            self.subject_id,
            innovation.modality.name(),
            timestamp,
            dim,
            nis
        );
        Ok(innovation)
    }

    /// Back to default priors, keeping the filter clock
    ///
    /// Keeping the clock preserves the non-decreasing timestamp guarantee
    /// across a reset.
    pub fn reset(&mut self) {
        self.state = self.model.prior_mean;
        self.covariance = self.model.prior_covariance;
        self.nis.clear();
        self.latest = [None, None];
        self.update_count = 0;
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SubjectSnapshot {
        let mut covariance = [[0.0; STATE_DIM]; STATE_DIM];
        for (r, row) in covariance.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.covariance[(r, c)];
            }
        }

        SubjectSnapshot {
            subject_id: self.subject_id.clone(),
            timestamp: self.filter_time.unwrap_or(0),
            state: core::array::from_fn(|i| self.state[i]),
            covariance,
            update_count: self.update_count,
            noise_version: self.noise.version(),
            noise_scale: self.noise.scale(),
            innovations: self.latest.iter().flatten().cloned().collect(),
        }
    }

    /// Simulate forward without touching the estimator
    ///
    /// Steps of `step_s` seconds up to `horizon_s`; the last step is
    /// shortened to land exactly on the horizon. A non-positive horizon or
    /// step yields no points. Non-finite values and step counts above the
    /// model's cap are rejected.
    pub fn forecast(&self, horizon_s: f64, step_s: f64) -> FusionResult<Vec<ForecastPoint>> {
        if !horizon_s.is_finite() || !step_s.is_finite() {
            return Err(FusionError::InvalidForecast { reason: "horizon and step must be finite" });
        }
        if horizon_s <= 0.0 || step_s <= 0.0 {
            return Ok(Vec::new());
        }
        let steps = forecast_steps(horizon_s, step_s);
        if steps > self.model.max_forecast_steps as f64 {
            return Err(FusionError::InvalidForecast { reason: "too many steps" });
        }
        let steps = steps as usize;

        let start = self.filter_time.unwrap_or(0);
        let noise = self.noise_handle.current();
        let mut state = self.state;
        let mut covariance = self.covariance;
        let mut previous = 0.0;
        let mut points = Vec::with_capacity(steps);

        for i in 1..=steps {
            let offset = if i == steps { horizon_s } else { (i as f64 * step_s).min(horizon_s) };
            let (s, p) = propagate(&self.model, &noise, &state, &covariance, offset - previous)?;
            state = s;
            covariance = repair_if_needed(&self.model, &p).0;
            clip_bounded(&mut state);
            previous = offset;

            points.push(ForecastPoint {
                offset_s: offset,
                timestamp: start + (offset * MS_PER_SECOND as f64).round() as Timestamp,
                state: core::array::from_fn(|i| state[i]),
                variance: core::array::from_fn(|i| covariance[(i, i)]),
            });
        }
        Ok(points)
    }

    fn condition(&mut self) -> FusionResult<()> {
        clip_bounded(&mut self.state);

        if !is_finite(&self.covariance) || self.state.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::NumericalInstability { stage: "covariance update" });
        }

        let (covariance, repaired) = repair_if_needed(&self.model, &self.covariance);
        if repaired {
            self.repairs += 1;
            log::warn!("subject {}: covariance lost positive definiteness, eigenvalues clamped", self.subject_id);
        }
        self.covariance = covariance;
        Ok(())
    }
}

fn propagate(
    model: &FilterModel,
    noise: &ProcessNoise,
    state: &StateVector,
    covariance: &StateCovariance,
    dt_s: f64,
) -> FusionResult<(StateVector, StateCovariance)> {
    let sigma = model.transform.sigma_points(state, covariance)?;
    let (mean, propagated) = model.transform.propagate(&sigma, |x| model.process.advance(x, dt_s));
    Ok((mean, propagated + noise.covariance(dt_s)))
}

/// Number of steps covering `horizon_s`, ignoring float dust in the ratio
fn forecast_steps(horizon_s: f64, step_s: f64) -> f64 {
    let ratio = horizon_s / step_s;
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest.max(1.0)
    } else {
        ratio.ceil()
    }
}

fn clip_bounded(state: &mut StateVector) {
    state[IDX_FATIGUE] = state[IDX_FATIGUE].clamp(0.0, 1.0);
    state[IDX_STRESS] = state[IDX_STRESS].clamp(0.0, 1.0);
}

fn repair_if_needed(model: &FilterModel, covariance: &StateCovariance) -> (StateCovariance, bool) {
    let symmetric = make_symmetric(covariance);
    if symmetric.cholesky().is_some() {
        return (symmetric, false);
    }
    (repair_psd(&symmetric, model.eigenvalue_floor), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::{VisionObservation, WearableObservation},
        fusion::matrix::min_eigenvalue,
    };

    fn estimator() -> SubjectEstimator {
        let model = Arc::new(FilterModel::default());
        let handle = NoiseHandle::new(ProcessNoise::new(model.process_noise));
        SubjectEstimator::new("subject-1", model, handle)
    }

    fn assert_symmetric_psd(p: &StateCovariance) {
        for i in 0..STATE_DIM {
            for j in 0..STATE_DIM {
                assert!((p[(i, j)] - p[(j, i)]).abs() < 1e-9, "asymmetric at ({}, {})", i, j);
            }
        }
        assert!(min_eigenvalue(p) >= -1e-9);
    }

    #[test]
    fn first_measurement_anchors_clock() {
        let mut est = estimator();
        assert_eq!(est.filter_time(), None);

        est.update(&WearableObservation::heart_rate("subject-1", 5_000, 80.0).into()).unwrap();
        assert_eq!(est.filter_time(), Some(5_000));
        assert_eq!(est.update_count(), 1);
    }

    #[test]
    fn wearable_update_pulls_heart_rate_without_overshoot() {
        let mut est = estimator();
        let prior_var = est.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)];

        let innovation = est.update(&WearableObservation::heart_rate("subject-1", 0, 145.0).into()).unwrap();
        let hr = est.state()[IDX_HEART_RATE];

        assert!(hr > 70.0 && hr < 145.0, "hr = {}", hr);
        assert!(est.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)] < prior_var);
        assert_eq!(innovation.dimension(), 1);
        assert!((innovation.residual[0] - 75.0).abs() < 1e-6);
        assert_symmetric_psd(est.covariance());
    }

    #[test]
    fn stale_measurement_is_rejected_untouched() {
        let mut est = estimator();
        est.update(&WearableObservation::heart_rate("subject-1", 10_000, 90.0).into()).unwrap();
        let before = est.snapshot();

        let err = est.update(&VisionObservation::activity("subject-1", 9_000, 3.0).into()).unwrap_err();
        assert_eq!(err, FusionError::RejectedStaleMeasurement { timestamp: 9_000, filter_time: 10_000 });
        assert_eq!(est.snapshot(), before);
    }

    #[test]
    fn predict_to_same_time_is_noop() {
        let mut est = estimator();
        est.update(&WearableObservation::heart_rate("subject-1", 0, 90.0).into()).unwrap();
        est.predict(60_000).unwrap();
        let once = est.snapshot();
        est.predict(60_000).unwrap();
        assert_eq!(est.snapshot(), once);
    }

    #[test]
    fn partial_observation_touches_only_observed_dimensions() {
        let mut est = estimator();
        let innovation = est
            .update(&VisionObservation::activity("subject-1", 0, 4.0).into())
            .unwrap();
        assert_eq!(innovation.signals.as_slice(), &[Signal::ActivityLevel]);
        assert!(est.state()[IDX_ACTIVITY] > 3.0);
        // Prior is diagonal, so heart rate is unaffected
        assert!((est.state()[IDX_HEART_RATE] - 70.0).abs() < 1e-9);
    }

    #[test]
    fn picks_up_published_noise_on_next_cycle() {
        let model = Arc::new(FilterModel::default());
        let handle = NoiseHandle::new(ProcessNoise::new(model.process_noise));
        let mut est = SubjectEstimator::new("s", Arc::clone(&model), handle.clone());

        est.update(&WearableObservation::heart_rate("s", 0, 70.0).into()).unwrap();
        handle.publish(handle.current().rescaled(3.0));
        assert_eq!(est.noise().version(), 0);

        est.predict(1_000).unwrap();
        assert_eq!(est.noise().version(), 1);
        assert_eq!(est.noise().scale(), 3.0);
        assert_eq!(est.snapshot().noise_scale, 3.0);
    }

    #[test]
    fn hrv_update_keeps_stress_in_bounds() {
        let mut est = estimator();
        for i in 0..50 {
            let m = WearableObservation::heart_rate("subject-1", i * 1_000, 75.0).with_hrv(5.0);
            est.update(&m.into()).unwrap();
            let stress = est.state()[IDX_STRESS];
            assert!((0.0..=1.0).contains(&stress));
            assert_symmetric_psd(est.covariance());
        }
        assert!(est.state()[IDX_STRESS] > 0.5);
    }

    #[test]
    fn non_finite_update_reports_instability() {
        let mut est = estimator();
        let err = est
            .update(&WearableObservation::heart_rate("subject-1", 0, f64::INFINITY).into())
            .unwrap_err();
        assert_eq!(err, FusionError::NumericalInstability { stage: "covariance update" });
    }

    #[test]
    fn reset_restores_priors_and_keeps_clock() {
        let mut est = estimator();
        est.update(&WearableObservation::heart_rate("subject-1", 2_000, 120.0).into()).unwrap();
        est.reset();
        assert_eq!(est.state()[IDX_HEART_RATE], 70.0);
        assert_eq!(est.update_count(), 0);
        assert_eq!(est.filter_time(), Some(2_000));
        assert!(est.latest_innovation(Modality::Wearable).is_none());
        assert!(est.nis_window().is_empty());
    }

    #[test]
    fn forecast_does_not_mutate() {
        let mut est = estimator();
        est.update(&VisionObservation::activity("subject-1", 0, 8.0).into()).unwrap();
        let before = est.snapshot();

        let points = est.forecast(600.0, 60.0).unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points.last().map(|p| p.timestamp), Some(600_000));
        assert!(points[9].state[IDX_FATIGUE] > points[0].state[IDX_FATIGUE]);
        assert!(points[9].variance[IDX_HEART_RATE] > points[0].variance[IDX_HEART_RATE]);
        assert_eq!(est.snapshot(), before);
    }

    #[test]
    fn forecast_step_count_ignores_float_accumulation() {
        let mut est = estimator();
        est.update(&WearableObservation::heart_rate("subject-1", 0, 80.0).into()).unwrap();

        let points = est.forecast(1.0, 0.1).unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points.last().map(|p| p.offset_s), Some(1.0));
        assert_eq!(points.last().map(|p| p.timestamp), Some(1_000));
        assert!(points.windows(2).all(|w| w[1].offset_s > w[0].offset_s));

        // Uneven horizon: last step shortened
        let points = est.forecast(25.0, 10.0).unwrap();
        let offsets: Vec<f64> = points.iter().map(|p| p.offset_s).collect();
        assert_eq!(offsets, vec![10.0, 20.0, 25.0]);
    }

    #[test]
    fn forecast_rejects_unbounded_requests() {
        let est = estimator();
        assert!(matches!(
            est.forecast(f64::INFINITY, 60.0),
            Err(FusionError::InvalidForecast { .. })
        ));
        assert!(matches!(est.forecast(600.0, f64::NAN), Err(FusionError::InvalidForecast { .. })));
        assert!(matches!(est.forecast(1e300, 1e-300), Err(FusionError::InvalidForecast { .. })));

        let cap = FilterModel::default().max_forecast_steps;
        assert_eq!(est.forecast(cap as f64, 1.0).map(|p| p.len()), Ok(cap));
        assert!(est.forecast(cap as f64 + 1.0, 1.0).is_err());
        assert_eq!(est.forecast(-5.0, 1.0), Ok(Vec::new()));
    }

    #[test]
    fn snapshot_carries_latest_innovation_per_modality() {
        let mut est = estimator();
        est.update(&VisionObservation::activity("subject-1", 0, 2.0).into()).unwrap();
        est.update(&WearableObservation::heart_rate("subject-1", 100, 80.0).into()).unwrap();
        est.update(&WearableObservation::heart_rate("subject-1", 200, 81.0).into()).unwrap();

        let snap = est.snapshot();
        assert_eq!(snap.innovations.len(), 2);
        assert_eq!(snap.innovation(Modality::Wearable).map(|i| i.timestamp), Some(200));
        assert_eq!(est.nis_window().len(), 3);
        assert_eq!(snap.noise_version, 0);
    }
}
