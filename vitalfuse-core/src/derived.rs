//! Derived Physiological Metrics
//!
//! ## Overview
//!
//! The estimator produces a state and a covariance. Consumers want
//! answers: how resilient is this subject right now, is something off,
//! and how long until they need a break. [`MetricsCalculator`] is a pure
//! mapping from a [`SubjectSnapshot`] to those answers. It holds no
//! state and never touches an estimator.
//!
//! ## Resilience
//!
//! Four sub-scores in [0, 100], weighted into a total:
//!
//! ```text
//! cardiovascular     30 %   HR excess over 70 + 10·(MET − 1), zero at +60 bpm
//! metabolic          25 %   |RR − (15 + 2.5·(MET − 1))|, zero at 15 /min
//! stress adaptation  25 %   100 · (1 − stress)
//! fatigue resistance 20 %   100 · (1 − fatigue)
//! ```
//!
//! A recovery sub-score (time to recover at rest, zero at two hours) is
//! reported alongside but does not enter the weighted total.
//!
//! ## Anomaly Scoring
//!
//! Two independent terms; the overall score is the larger one.
//!
//! ```text
//! innovation   per modality:  excess = max(NIS − χ²₉₅(m), 0)
//!                             score  = 1 − exp(−excess / 4m)
//! mismatch     z = (HR − HR_expected(MET)) / σ     only if activity observed
//!                             score  = 1 − exp(−(z − z₀) / 2)   for z > z₀
//! ```
//!
//! Only innovations produced at the snapshot time are scored. The other
//! modality's innovation describes an earlier update and has already been
//! judged when it happened.
//!
//! A signal is listed as affected when its own squared normalized
//! residual exceeds the per-dimension threshold (3σ by default).
//!
//! ## Fatigue Projection
//!
//! Fatigue under the process model with activity held at its current
//! level, at fixed horizons, plus the time until the critical level and
//! the rest needed to get back below the recovered level.

use serde::{Deserialize, Serialize};

use crate::{
    config::MetricsConfig,
    constants::{
        metrics::{
            BASELINE_HEART_RATE, BASELINE_RESPIRATORY_RATE, CARDIO_EXCESS_SPAN,
            FATIGUE_HORIZONS_MIN, FATIGUE_STD_ZERO_CONFIDENCE, HEART_RATE_PER_MET,
            METABOLIC_DEVIATION_SPAN, RECOVERY_SPAN_MIN, RESPIRATORY_RATE_PER_MET, RESTING_MET,
            WEIGHT_CARDIOVASCULAR, WEIGHT_FATIGUE_RESISTANCE, WEIGHT_METABOLIC,
            WEIGHT_STRESS_ADAPTATION,
        },
        IDX_ACTIVITY, IDX_FATIGUE, IDX_STRESS, SECONDS_PER_MINUTE,
    },
    events::{AnomalyEvent, Severity, Signal, StateEstimate},
    fusion::{chi_square_95, models::ProcessModel, ConfidenceScore, SubjectSnapshot},
};

/// Resilience total and its parts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceBreakdown {
    /// Weighted total in [0, 100]
    pub score: f64,
    pub cardiovascular: f64,
    pub metabolic: f64,
    pub stress_adaptation: f64,
    pub fatigue_resistance: f64,
    /// Reported only; not part of the weighted total
    pub recovery: f64,
    /// Estimate confidence in [0, 1]
    pub confidence: f64,
}

/// Anomaly score with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    /// Score in [0, 1]
    pub score: f64,
    pub severity: Severity,
    /// Wire names of contributing signals, deduplicated
    pub affected_signals: Vec<String>,
    pub description: String,
}

/// Fatigue trajectory at constant activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueProjection {
    pub current: f64,
    /// (horizon minutes, projected fatigue)
    pub horizons: Vec<(f64, f64)>,
    /// Minutes until the critical level; `None` if never reached
    pub time_to_critical_min: Option<f64>,
    /// Minutes of rest to get back below the recovered level
    pub recommended_rest_duration_min: Option<f64>,
    /// Confidence in [0, 1] from the fatigue variance
    pub confidence: f64,
}

/// Which index governs recovery time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryFactor {
    /// Already recovered
    None,
    Fatigue,
    Stress,
}

/// Time to recover at rest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEstimate {
    /// Minutes until both fatigue and stress are below their recovered
    /// levels; `None` if either never gets there
    pub minutes: Option<f64>,
    pub limiting_factor: RecoveryFactor,
}

/// Everything derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub resilience: ResilienceBreakdown,
    pub anomaly: AnomalyAssessment,
    pub fatigue: FatigueProjection,
    pub recovery: RecoveryEstimate,
}

/// Stateless mapping from snapshots to derived metrics
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    config: MetricsConfig,
    process: ProcessModel,
}

impl MetricsCalculator {
    pub fn new(config: MetricsConfig, process: ProcessModel) -> Self {
        Self { config, process }
    }

    /// Thresholds in use
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// All derived metrics for a snapshot
    pub fn evaluate(&self, snapshot: &SubjectSnapshot) -> DerivedMetrics {
        let recovery = self.recovery(snapshot);
        DerivedMetrics {
            resilience: self.resilience_with(snapshot, &recovery),
            anomaly: self.anomaly(snapshot),
            fatigue: self.fatigue_projection(snapshot),
            recovery,
        }
    }

    /// Resilience score and sub-scores
    pub fn resilience(&self, snapshot: &SubjectSnapshot) -> ResilienceBreakdown {
        let recovery = self.recovery(snapshot);
        self.resilience_with(snapshot, &recovery)
    }

    fn resilience_with(&self, snapshot: &SubjectSnapshot, recovery: &RecoveryEstimate) -> ResilienceBreakdown {
        let met = snapshot.activity_level();

        let hr_excess = (snapshot.heart_rate() - expected_heart_rate(met)).max(0.0);
        let cardiovascular = percent(1.0 - hr_excess / CARDIO_EXCESS_SPAN);

        let rr_deviation = (snapshot.respiratory_rate() - expected_respiratory_rate(met)).abs();
        let metabolic = percent(1.0 - rr_deviation / METABOLIC_DEVIATION_SPAN);

        let stress_adaptation = percent(1.0 - snapshot.stress_level());
        let fatigue_resistance = percent(1.0 - snapshot.fatigue_index());

        let recovery_score = match recovery.minutes {
            Some(minutes) => percent(1.0 - minutes / RECOVERY_SPAN_MIN),
            None => 0.0,
        };

        let total = WEIGHT_CARDIOVASCULAR * cardiovascular
            + WEIGHT_METABOLIC * metabolic
            + WEIGHT_STRESS_ADAPTATION * stress_adaptation
            + WEIGHT_FATIGUE_RESISTANCE * fatigue_resistance;

        ResilienceBreakdown {
            score: if total.is_finite() { total.clamp(0.0, 100.0) } else { 0.0 },
            cardiovascular,
            metabolic,
            stress_adaptation,
            fatigue_resistance,
            recovery: recovery_score,
            confidence: ConfidenceScore::from_covariance(&snapshot.covariance_matrix()).as_float(),
        }
    }

    /// Anomaly score from the current innovation and the cardio/activity relationship
    pub fn anomaly(&self, snapshot: &SubjectSnapshot) -> AnomalyAssessment {
        let mut score: f64 = 0.0;
        let mut affected: Vec<Signal> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        let current = snapshot
            .innovations
            .iter()
            .filter(|innovation| innovation.timestamp >= snapshot.timestamp);
        for innovation in current {
            let dim = innovation.dimension();
            if dim == 0 {
                continue;
            }
            let gate = chi_square_95(dim);
            let excess = (innovation.nis - gate).max(0.0);
            if excess > 0.0 {
                let term = 1.0 - (-excess / (4.0 * dim as f64)).exp();
                score = score.max(term);
                notes.push(format!(
                    "{} innovation NIS {:.1} above {:.2}",
                    innovation.modality.name(),
                    innovation.nis,
                    gate
                ));
            }
            for (signal, contribution) in innovation.contributions() {
                if contribution > self.config.signal_threshold && !affected.contains(&signal) {
                    affected.push(signal);
                }
            }
        }

        let activity_observed = snapshot.variance(IDX_ACTIVITY) < self.config.activity_observed_variance;
        if activity_observed {
            let met = snapshot.activity_level();
            let expected = expected_heart_rate(met);
            let z = (snapshot.heart_rate() - expected) / self.config.mismatch_sigma;
            if z > self.config.mismatch_z {
                let term = 1.0 - (-(z - self.config.mismatch_z) / 2.0).exp();
                score = score.max(term);
                for signal in [Signal::HeartRate, Signal::ActivityLevel] {
                    if !affected.contains(&signal) {
                        affected.push(signal);
                    }
                }
                notes.push(format!(
                    "heart rate {:.0} bpm vs {:.0} expected at {:.1} MET",
                    snapshot.heart_rate(),
                    expected,
                    met
                ));
            }
        }

        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 1.0 };
        let description = if notes.is_empty() {
            "within expected variation".to_string()
        } else {
            notes.join("; ")
        };

        AnomalyAssessment {
            score,
            severity: self.severity(score),
            affected_signals: affected.iter().map(|s| s.name().to_string()).collect(),
            description,
        }
    }

    /// Severity bucket for a score
    pub fn severity(&self, score: f64) -> Severity {
        if score >= self.config.severity_high {
            Severity::High
        } else if score >= self.config.severity_medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Fatigue at fixed horizons and time to critical
    pub fn fatigue_projection(&self, snapshot: &SubjectSnapshot) -> FatigueProjection {
        let fatigue = snapshot.fatigue_index();
        let met = snapshot.activity_level();

        let horizons = FATIGUE_HORIZONS_MIN
            .iter()
            .map(|&minutes| {
                let projected = self.process.fatigue_after(fatigue, met, minutes * SECONDS_PER_MINUTE as f64);
                (minutes, projected.clamp(0.0, 1.0))
            })
            .collect();

        let time_to_critical_min = if fatigue >= self.config.fatigue_critical {
            Some(0.0)
        } else {
            self.process
                .time_to_fatigue(fatigue, met, self.config.fatigue_critical)
                .map(to_minutes)
        };

        let recommended_rest_duration_min = if fatigue <= self.config.fatigue_recovered {
            Some(0.0)
        } else {
            self.process
                .time_to_fatigue(fatigue, RESTING_MET, self.config.fatigue_recovered)
                .map(to_minutes)
        };

        let std = snapshot.variance(IDX_FATIGUE).max(0.0).sqrt();
        let confidence = (1.0 - std / FATIGUE_STD_ZERO_CONFIDENCE).clamp(0.0, 1.0);

        FatigueProjection {
            current: fatigue,
            horizons,
            time_to_critical_min,
            recommended_rest_duration_min,
            confidence,
        }
    }

    /// Minutes at rest until fatigue and stress are recovered
    pub fn recovery(&self, snapshot: &SubjectSnapshot) -> RecoveryEstimate {
        let fatigue = snapshot.fatigue_index();
        let stress = snapshot.stress_level();

        let fatigue_s = if fatigue <= self.config.fatigue_recovered {
            Some(0.0)
        } else {
            self.process.time_to_fatigue(fatigue, RESTING_MET, self.config.fatigue_recovered)
        };
        let stress_s = self.process.time_to_decay(IDX_STRESS, stress, self.config.stress_recovered);

        match (fatigue_s, stress_s) {
            (Some(f), Some(s)) => RecoveryEstimate {
                minutes: Some(to_minutes(f.max(s))),
                limiting_factor: if f <= 0.0 && s <= 0.0 {
                    RecoveryFactor::None
                } else if f >= s {
                    RecoveryFactor::Fatigue
                } else {
                    RecoveryFactor::Stress
                },
            },
            (None, _) => RecoveryEstimate { minutes: None, limiting_factor: RecoveryFactor::Fatigue },
            (Some(_), None) => RecoveryEstimate { minutes: None, limiting_factor: RecoveryFactor::Stress },
        }
    }

    /// Outbound estimate for a snapshot
    pub fn estimate(&self, snapshot: &SubjectSnapshot, metrics: &DerivedMetrics) -> StateEstimate {
        StateEstimate {
            subject_id: snapshot.subject_id.clone(),
            timestamp: snapshot.timestamp,
            heart_rate: snapshot.heart_rate(),
            respiratory_rate: snapshot.respiratory_rate(),
            activity_level: snapshot.activity_level(),
            fatigue_index: snapshot.fatigue_index(),
            stress_level: snapshot.stress_level(),
            resilience_score: metrics.resilience.score,
            confidence: metrics.resilience.confidence,
        }
    }

    /// Anomaly event if severity reaches the emission level
    pub fn anomaly_event(&self, snapshot: &SubjectSnapshot, metrics: &DerivedMetrics) -> Option<AnomalyEvent> {
        if metrics.anomaly.severity < self.config.emit_severity {
            return None;
        }
        Some(AnomalyEvent {
            subject_id: snapshot.subject_id.clone(),
            timestamp: snapshot.timestamp,
            anomaly_score: metrics.anomaly.score,
            severity: metrics.anomaly.severity,
            affected_signals: metrics.anomaly.affected_signals.clone(),
            description: metrics.anomaly.description.clone(),
        })
    }
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(MetricsConfig::default(), ProcessModel::default())
    }
}

/// Heart rate explained by an activity level
pub fn expected_heart_rate(met: f64) -> f64 {
    BASELINE_HEART_RATE + HEART_RATE_PER_MET * (met - RESTING_MET).max(0.0)
}

/// Respiratory rate explained by an activity level
pub fn expected_respiratory_rate(met: f64) -> f64 {
    BASELINE_RESPIRATORY_RATE + RESPIRATORY_RATE_PER_MET * (met - RESTING_MET).max(0.0)
}

fn percent(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return 0.0;
    }
    (fraction * 100.0).clamp(0.0, 100.0)
}

fn to_minutes(seconds: f64) -> f64 {
    seconds / SECONDS_PER_MINUTE as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{state::{PRIOR_MEAN, PRIOR_VARIANCE}, IDX_HEART_RATE, IDX_RESPIRATORY_RATE, STATE_DIM},
        fusion::Innovation,
    };
    use heapless::Vec as HVec;

    fn snapshot(state: [f64; STATE_DIM], variance: [f64; STATE_DIM]) -> SubjectSnapshot {
        let mut covariance = [[0.0; STATE_DIM]; STATE_DIM];
        for i in 0..STATE_DIM {
            covariance[i][i] = variance[i];
        }
        SubjectSnapshot {
            subject_id: "s".to_string(),
            timestamp: 1_000,
            state,
            covariance,
            update_count: 1,
            noise_version: 0,
            noise_scale: 1.0,
            innovations: Vec::new(),
        }
    }

    fn innovation(signal: Signal, residual: f64, variance: f64) -> Innovation {
        let mut signals = HVec::new();
        signals.push(signal).unwrap();
        let mut res = HVec::new();
        res.push(residual).unwrap();
        let mut var = HVec::new();
        var.push(variance).unwrap();
        Innovation {
            modality: signal.modality(),
            timestamp: 1_000,
            signals,
            residual: res,
            variance: var,
            nis: residual * residual / variance,
        }
    }

    #[test]
    fn resting_prior_is_fully_resilient() {
        let calc = MetricsCalculator::default();
        let r = calc.resilience(&snapshot(PRIOR_MEAN, PRIOR_VARIANCE));
        assert_eq!(r.cardiovascular, 100.0);
        assert_eq!(r.metabolic, 100.0);
        assert!((r.score - 100.0).abs() < 1e-9);
        assert_eq!(r.recovery, 100.0);
    }

    #[test]
    fn elevated_heart_rate_lowers_cardio_score() {
        let calc = MetricsCalculator::default();
        let mut state = PRIOR_MEAN;
        state[IDX_HEART_RATE] = 100.0;
        let r = calc.resilience(&snapshot(state, PRIOR_VARIANCE));
        assert!((r.cardiovascular - 50.0).abs() < 1e-9);
        assert!((r.score - 85.0).abs() < 1e-9);

        // Same heart rate explained by activity
        state[IDX_ACTIVITY] = 4.0;
        state[IDX_RESPIRATORY_RATE] = 22.5;
        let r = calc.resilience(&snapshot(state, PRIOR_VARIANCE));
        assert_eq!(r.cardiovascular, 100.0);
        assert_eq!(r.metabolic, 100.0);
    }

    #[test]
    fn extreme_state_stays_in_bounds() {
        let calc = MetricsCalculator::default();
        let state = [250.0, 80.0, 0.5, 1.0, 1.0, 0.0, 0.0];
        let r = calc.resilience(&snapshot(state, PRIOR_VARIANCE));
        assert!((0.0..=100.0).contains(&r.score));
        assert_eq!(r.fatigue_resistance, 0.0);
        assert_eq!(r.stress_adaptation, 0.0);
    }

    #[test]
    fn large_innovation_is_high_severity() {
        let calc = MetricsCalculator::default();
        let mut snap = snapshot(PRIOR_MEAN, PRIOR_VARIANCE);
        snap.innovations.push(innovation(Signal::HeartRate, 130.0, 108.0));

        let a = calc.anomaly(&snap);
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.affected_signals, vec!["heart_rate".to_string()]);
        assert!(a.description.contains("wearable"));
    }

    #[test]
    fn calibrated_innovation_scores_zero() {
        let calc = MetricsCalculator::default();
        let mut snap = snapshot(PRIOR_MEAN, PRIOR_VARIANCE);
        snap.innovations.push(innovation(Signal::ActivityLevel, 0.5, 1.0));

        let a = calc.anomaly(&snap);
        assert_eq!(a.score, 0.0);
        assert_eq!(a.severity, Severity::Low);
        assert!(a.affected_signals.is_empty());
        assert!(calc.anomaly_event(&snap, &calc.evaluate(&snap)).is_none());
    }

    #[test]
    fn earlier_outlier_is_not_scored_again() {
        let calc = MetricsCalculator::default();
        let mut snap = snapshot(PRIOR_MEAN, PRIOR_VARIANCE);
        let mut outlier = innovation(Signal::HeartRate, 130.0, 108.0);
        outlier.timestamp = 500;
        snap.innovations.push(outlier);
        snap.innovations.push(innovation(Signal::ActivityLevel, 0.2, 1.0));

        let a = calc.anomaly(&snap);
        assert_eq!(a.score, 0.0);
        assert!(a.affected_signals.is_empty());
        assert!(calc.anomaly_event(&snap, &calc.evaluate(&snap)).is_none());
    }

    #[test]
    fn mismatch_requires_observed_activity() {
        let calc = MetricsCalculator::default();
        let mut state = PRIOR_MEAN;
        state[IDX_HEART_RATE] = 180.0;

        // Activity variance at prior: unobserved, no mismatch term
        let unobserved = calc.anomaly(&snapshot(state, PRIOR_VARIANCE));
        assert_eq!(unobserved.score, 0.0);

        let mut variance = PRIOR_VARIANCE;
        variance[IDX_ACTIVITY] = 0.1;
        let observed = calc.anomaly(&snapshot(state, variance));
        // z = 110 / 15 ≈ 7.3
        assert_eq!(observed.severity, Severity::High);
        assert!(observed.affected_signals.contains(&"heart_rate".to_string()));
        assert!(observed.affected_signals.contains(&"activity_level".to_string()));
    }

    #[test]
    fn anomaly_event_copies_assessment() {
        let calc = MetricsCalculator::default();
        let mut snap = snapshot(PRIOR_MEAN, PRIOR_VARIANCE);
        snap.innovations.push(innovation(Signal::HeartRate, 130.0, 108.0));
        let metrics = calc.evaluate(&snap);

        let event = calc.anomaly_event(&snap, &metrics).unwrap();
        assert_eq!(event.subject_id, "s");
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.anomaly_score, metrics.anomaly.score);
    }

    #[test]
    fn fatigue_projection_under_load() {
        let calc = MetricsCalculator::default();
        let mut state = PRIOR_MEAN;
        state[IDX_ACTIVITY] = 8.0;
        state[IDX_FATIGUE] = 0.3;
        let p = calc.fatigue_projection(&snapshot(state, PRIOR_VARIANCE));

        assert_eq!(p.horizons.len(), 2);
        assert!(p.horizons[0].1 > 0.3);
        assert!(p.horizons[1].1 > p.horizons[0].1);
        let ttc = p.time_to_critical_min.unwrap();
        assert!(ttc > 0.0 && ttc < 60.0);
        assert!(p.recommended_rest_duration_min.unwrap() > 0.0);
        // Fatigue std 0.2 of 0.3
        assert!((p.confidence - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn fatigue_already_critical() {
        let calc = MetricsCalculator::default();
        let mut state = PRIOR_MEAN;
        state[IDX_FATIGUE] = 0.9;
        let p = calc.fatigue_projection(&snapshot(state, PRIOR_VARIANCE));
        assert_eq!(p.time_to_critical_min, Some(0.0));
    }

    #[test]
    fn recovery_names_limiting_factor() {
        let calc = MetricsCalculator::default();

        let rested = calc.recovery(&snapshot(PRIOR_MEAN, PRIOR_VARIANCE));
        assert_eq!(rested.minutes, Some(0.0));
        assert_eq!(rested.limiting_factor, RecoveryFactor::None);

        let mut state = PRIOR_MEAN;
        state[IDX_STRESS] = 0.8;
        let stressed = calc.recovery(&snapshot(state, PRIOR_VARIANCE));
        assert_eq!(stressed.limiting_factor, RecoveryFactor::Stress);
        // ln(0.25) / ln(0.999) s ≈ 23 min
        let minutes = stressed.minutes.unwrap();
        assert!(minutes > 20.0 && minutes < 25.0);

        state[IDX_FATIGUE] = 0.9;
        let tired = calc.recovery(&snapshot(state, PRIOR_VARIANCE));
        assert_eq!(tired.limiting_factor, RecoveryFactor::Fatigue);
    }

    #[test]
    fn estimate_copies_state() {
        let calc = MetricsCalculator::default();
        let snap = snapshot(PRIOR_MEAN, PRIOR_VARIANCE);
        let metrics = calc.evaluate(&snap);
        let est = calc.estimate(&snap, &metrics);
        assert_eq!(est.heart_rate, 70.0);
        assert_eq!(est.resilience_score, metrics.resilience.score);
        assert_eq!(est.timestamp, 1_000);
    }
}
