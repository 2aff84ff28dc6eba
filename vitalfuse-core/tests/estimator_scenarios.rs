//! Integration tests for the per-subject estimator
//!
//! Covers:
//! - Single wearable update from the default prior
//! - Stale measurement rejection
//! - Uncertainty growth over a gap without data
//! - Cardio/activity mismatch flagged as a high-severity anomaly
//! - A single outlier raises one anomaly, not one per later update
//! - Long-run innovation consistency under matched noise

mod common;

use vitalfuse_core::{
    constants::{dynamics::PROCESS_NOISE_PER_SECOND, IDX_HEART_RATE, IDX_RESPIRATORY_RATE},
    FusionConfig, FusionError, Severity, VisionObservation, WearableObservation,
};

use common::{default_estimator, generators::TruthSimulator, manual_registry};

#[test]
fn wearable_update_moves_toward_measurement_without_overshoot() {
    let (mut estimator, _) = default_estimator("s1");
    let prior_hr = estimator.state()[IDX_HEART_RATE];
    let prior_var = estimator.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)];

    estimator
        .update(&WearableObservation::heart_rate("s1", 0, 145.0).into())
        .unwrap();

    let hr = estimator.state()[IDX_HEART_RATE];
    assert!(hr > prior_hr && hr < 145.0, "hr = {}", hr);
    // Prior HR variance 100 and drift variance 4 against R = 4
    assert!((hr - (70.0 + 75.0 * 100.0 / 108.0)).abs() < 1e-6, "hr = {}", hr);
    assert!(estimator.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)] < prior_var);
}

#[test]
fn stale_measurement_leaves_state_untouched() {
    let (mut estimator, _) = default_estimator("s1");
    estimator
        .update(&WearableObservation::heart_rate("s1", 60_000, 95.0).into())
        .unwrap();
    let before = estimator.snapshot();

    let err = estimator
        .update(&WearableObservation::heart_rate("s1", 59_999, 130.0).into())
        .unwrap_err();

    assert_eq!(
        err,
        FusionError::RejectedStaleMeasurement { timestamp: 59_999, filter_time: 60_000 }
    );
    assert_eq!(estimator.snapshot(), before);
}

#[test]
fn ten_minute_gap_grows_variance_linearly_and_keeps_mean() {
    let (mut estimator, _) = default_estimator("s1");
    estimator
        .update(&VisionObservation::activity("s1", 0, 1.0).into())
        .unwrap();

    let hr_before = estimator.state()[IDX_HEART_RATE];
    let var_before = estimator.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)];
    let rr_var_before = estimator.covariance()[(IDX_RESPIRATORY_RATE, IDX_RESPIRATORY_RATE)];

    estimator.predict(600_000).unwrap();

    let var_after = estimator.covariance()[(IDX_HEART_RATE, IDX_HEART_RATE)];
    let rr_var_after = estimator.covariance()[(IDX_RESPIRATORY_RATE, IDX_RESPIRATORY_RATE)];
    assert!((var_after - var_before - PROCESS_NOISE_PER_SECOND[IDX_HEART_RATE] * 600.0).abs() < 1e-6);
    assert!((rr_var_after - rr_var_before - PROCESS_NOISE_PER_SECOND[IDX_RESPIRATORY_RATE] * 600.0).abs() < 1e-6);
    assert!((estimator.state()[IDX_HEART_RATE] - hr_before).abs() < 1e-6);

    // Same target again changes nothing
    let once = estimator.snapshot();
    estimator.predict(600_000).unwrap();
    assert_eq!(estimator.snapshot(), once);
}

#[test]
fn low_activity_with_racing_heart_is_high_severity() {
    let (registry, _) = manual_registry(FusionConfig::default());

    registry
        .apply(&VisionObservation::activity("s1", 0, 1.0).with_confidence(0.9).into())
        .unwrap();
    let output = registry
        .apply(&WearableObservation::heart_rate("s1", 2_000, 200.0).into())
        .unwrap();

    let anomaly = output.metrics.anomaly;
    assert!(anomaly.score >= registry.config().metrics.severity_high);
    assert_eq!(anomaly.severity, Severity::High);
    assert!(anomaly.affected_signals.iter().any(|s| s == "heart_rate"));
    assert!(output.anomaly.is_some());
}

#[test]
fn outlier_is_reported_once_not_by_later_updates() {
    let (registry, _) = manual_registry(FusionConfig::default());

    for i in 0..60 {
        let t = i * 1_000;
        registry.apply(&VisionObservation::activity("s1", t, 1.0).into()).unwrap();
        let output = registry
            .apply(&WearableObservation::heart_rate("s1", t + 500, 70.0).into())
            .unwrap();
        assert!(output.anomaly.is_none());
    }

    let outlier = registry
        .apply(&WearableObservation::heart_rate("s1", 60_500, 40.0).into())
        .unwrap();
    let event = outlier.anomaly.expect("outlier raises an anomaly");
    assert_eq!(event.timestamp, 60_500);
    assert!(event.affected_signals.iter().any(|s| s == "heart_rate"));

    for k in 0..20 {
        let output = registry
            .apply(&VisionObservation::activity("s1", 61_000 + k * 100, 1.0).into())
            .unwrap();
        assert!(output.anomaly.is_none(), "vision update {} re-raised {:?}", k, output.anomaly);
        assert_eq!(output.metrics.anomaly.score, 0.0);
    }
}

#[test]
fn resting_subject_keeps_bounded_metrics() {
    let (registry, _) = manual_registry(FusionConfig::default());
    let mut truth = TruthSimulator::new(7);

    for _ in 0..60 {
        truth.step(1_000);
        let output = registry.apply(&truth.wearable("s1").into()).unwrap();
        assert!(output.estimate.resilience_score >= 0.0 && output.estimate.resilience_score <= 100.0);
    }

    let metrics = registry.metrics("s1").unwrap();
    assert!(metrics.resilience.confidence > 0.0);
    assert!(metrics.fatigue.current < 0.05);
}

#[test]
fn mean_nis_matches_measurement_dimension() {
    let (mut estimator, _) = default_estimator("s1");
    let mut truth = TruthSimulator::new(2024);

    let mut total = 0.0;
    let mut count = 0usize;
    for step in 0..500 {
        truth.step(1_000);
        let innovation = estimator.update(&truth.wearable("s1").into()).unwrap();
        assert_eq!(innovation.dimension(), 2);
        if step >= 50 {
            total += innovation.nis;
            count += 1;
        }
    }

    let mean = total / count as f64;
    assert!((1.6..=2.4).contains(&mean), "mean NIS = {}", mean);
}

#[test]
fn forecast_projects_fatigue_under_sustained_load() {
    let (mut estimator, _) = default_estimator("s1");
    for i in 0..10 {
        estimator
            .update(&VisionObservation::activity("s1", i * 1_000, 9.0).with_accel(3.4).into())
            .unwrap();
    }
    let before = estimator.snapshot();

    let points = estimator.forecast(1_800.0, 300.0).unwrap();
    assert_eq!(points.len(), 6);
    let fatigue: Vec<f64> = points.iter().map(|p| p.state[3]).collect();
    assert!(fatigue.windows(2).all(|w| w[1] >= w[0]));
    assert!(fatigue[5] > 0.5);
    assert_eq!(estimator.snapshot(), before);
}
