//! Core estimation engine for VitalFuse
//!
//! Fuses a high-rate, noisy visual activity signal with a low-rate
//! wearable biosignal stream into one calibrated physiological state
//! estimate per tracked subject, with uncertainty, in real time.
//!
//! Key properties:
//! - Unscented Kalman filter per subject, partial observations supported
//! - Covariance kept symmetric positive semi-definite after every step
//! - Per-subject locking; subjects never wait on each other
//! - Process noise adapted online from innovation statistics
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitalfuse_core::{
//!     FusionConfig, IngestionRouter, NullSink, SubjectRegistry, SystemTime,
//!     VisionObservation, WearableObservation,
//! };
//!
//! let registry = Arc::new(SubjectRegistry::new(FusionConfig::default(), Arc::new(SystemTime)).unwrap());
//! let router = IngestionRouter::start(Arc::clone(&registry), Arc::new(NullSink));
//!
//! router.submit(VisionObservation::activity("athlete-7", 1_000, 6.5).into()).unwrap();
//! router.submit(WearableObservation::heart_rate("athlete-7", 1_250, 128.0).into()).unwrap();
//!
//! router.shutdown();
//! let metrics = registry.metrics("athlete-7").unwrap();
//! println!("resilience {:.0}", metrics.resilience.score);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod derived;
pub mod errors;
pub mod events;
pub mod fusion;
pub mod ingest;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod time;
pub mod tuning;

// Public API
pub use config::FusionConfig;
pub use derived::{DerivedMetrics, MetricsCalculator};
pub use errors::{ConfigError, FusionError, FusionResult};
pub use events::{
    AnomalyEvent, Measurement, Modality, Severity, Signal, StateEstimate, SubjectId,
    TuningAdjustment, TuningSample, VisionObservation, WearableObservation,
};
pub use fusion::{SubjectEstimator, SubjectSnapshot};
pub use ingest::{IngestError, IngestionRouter};
pub use registry::{FusionOutput, RegistryStats, SubjectRegistry};
pub use sink::{ChannelSink, FusionEvent, FusionSink, NullSink, SnapshotSink};
pub use time::{ManualClock, SystemTime, TimeSource, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
