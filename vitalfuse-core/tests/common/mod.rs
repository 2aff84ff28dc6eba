//! Common test utilities for integration tests
//!
//! This module provides:
//! - Seeded gaussian noise
//! - A ground-truth subject simulator driven by the same process model as
//!   the filter, with process noise drawn to match Q
//! - Measurement builders that add noise drawn to match R

#![allow(dead_code)]

pub mod generators;

use std::sync::Arc;

use vitalfuse_core::{
    fusion::{FilterModel, SubjectEstimator},
    tuning::{NoiseHandle, ProcessNoise},
    FusionConfig, ManualClock, SubjectRegistry,
};

/// Estimator at default priors with its own noise handle
pub fn default_estimator(subject_id: &str) -> (SubjectEstimator, NoiseHandle) {
    let model = Arc::new(FilterModel::default());
    let handle = NoiseHandle::new(ProcessNoise::new(model.process_noise));
    (SubjectEstimator::new(subject_id, model, handle.clone()), handle)
}

/// Registry on a manual clock starting at zero
pub fn manual_registry(config: FusionConfig) -> (Arc<SubjectRegistry>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let registry = SubjectRegistry::new(config, Arc::clone(&clock) as Arc<dyn vitalfuse_core::TimeSource>)
        .expect("valid config");
    (Arc::new(registry), clock)
}
