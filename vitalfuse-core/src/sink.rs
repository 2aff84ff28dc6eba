//! Output Sinks
//!
//! The engine pushes its outputs into caller-supplied sinks. Sinks are
//! always invoked on a copy taken after a subject's exclusive section has
//! been released, so a slow sink delays only the worker that called it
//! and never another producer or subject.
//!
//! ```text
//! worker ─ lock(subject) ─ update ─ snapshot ─ unlock ─┬─► FusionSink::on_estimate
//!                                                      ├─► FusionSink::on_anomaly
//!                                                      └─► FusionSink::on_tuning_sample
//! eviction ─ mark ─ remove ─ lock(subject) ─ snapshot ─ unlock ─► SnapshotSink::persist
//! ```
//!
//! Every method except [`FusionSink::on_estimate`] has an empty default,
//! so a sink only implements what it cares about.

use std::sync::mpsc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    errors::FusionError,
    events::{AnomalyEvent, StateEstimate, TuningAdjustment, TuningSample},
    fusion::SubjectSnapshot,
    time::Timestamp,
};

/// Receives the router's outputs
pub trait FusionSink: Send + Sync {
    /// A fused estimate after a successful update
    fn on_estimate(&self, estimate: &StateEstimate);

    /// An anomaly at or above the emission severity
    fn on_anomaly(&self, _event: &AnomalyEvent) {}

    /// Innovation statistic of one update
    fn on_tuning_sample(&self, _sample: &TuningSample) {}

    /// A published process-noise adjustment
    fn on_tuning_adjustment(&self, _adjustment: &TuningAdjustment) {}

    /// A measurement that was dropped
    fn on_rejected(&self, _subject_id: &str, _timestamp: Timestamp, _error: &FusionError) {}
}

/// Receives final snapshots of evicted subjects
pub trait SnapshotSink: Send + Sync {
    fn persist(&self, snapshot: SubjectSnapshot);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FusionSink for NullSink {
    fn on_estimate(&self, _estimate: &StateEstimate) {}
}

impl SnapshotSink for NullSink {
    fn persist(&self, _snapshot: SubjectSnapshot) {}
}

/// Any engine output, as one serializable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FusionEvent {
    Estimate(StateEstimate),
    Anomaly(AnomalyEvent),
    TuningSample(TuningSample),
    TuningAdjustment(TuningAdjustment),
    Rejected {
        subject_id: String,
        timestamp: Timestamp,
        kind: String,
        message: String,
    },
    Snapshot(SubjectSnapshot),
}

/// Forwards every output into an mpsc channel
///
/// Sends to a closed receiver are ignored.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<mpsc::Sender<FusionEvent>>,
}

impl ChannelSink {
    /// Sink plus the receiving end
    pub fn new() -> (Self, mpsc::Receiver<FusionEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender: Mutex::new(sender) }, receiver)
    }

    fn send(&self, event: FusionEvent) {
        let _ = self.sender.lock().send(event);
    }
}

impl FusionSink for ChannelSink {
    fn on_estimate(&self, estimate: &StateEstimate) {
        self.send(FusionEvent::Estimate(estimate.clone()));
    }

    fn on_anomaly(&self, event: &AnomalyEvent) {
        self.send(FusionEvent::Anomaly(event.clone()));
    }

    fn on_tuning_sample(&self, sample: &TuningSample) {
        self.send(FusionEvent::TuningSample(sample.clone()));
    }

    fn on_tuning_adjustment(&self, adjustment: &TuningAdjustment) {
        self.send(FusionEvent::TuningAdjustment(adjustment.clone()));
    }

    fn on_rejected(&self, subject_id: &str, timestamp: Timestamp, error: &FusionError) {
        self.send(FusionEvent::Rejected {
            subject_id: subject_id.to_string(),
            timestamp,
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }
}

impl SnapshotSink for ChannelSink {
    fn persist(&self, snapshot: SubjectSnapshot) {
        self.send(FusionEvent::Snapshot(snapshot));
    }
}
