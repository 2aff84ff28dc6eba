//! Subject Registry
//!
//! ## Overview
//!
//! The registry owns one [`SubjectSlot`] per live subject id. A slot
//! bundles the subject's estimator (which carries its own NIS window),
//! noise handle and pending measurement queue:
//!
//! ```text
//! RwLock<HashMap<SubjectId, Arc<SubjectSlot>>>
//!                          │
//!          ┌───────────────┼────────────────────┐
//!          ▼               ▼                    ▼
//!   Mutex<SubjectEstimator>  NoiseHandle     Mutex<MeasurementQueue>
//!   updates + tuner pass     tuner publishes  producers + workers
//! ```
//!
//! ## Locking Rules
//!
//! 1. The map is read-locked for lookup only; the write lock is taken to
//!    create or evict a subject and is never held across an update
//! 2. An update holds exactly one estimator mutex; different subjects
//!    never contend
//! 3. Nothing leaves the process while a slot lock is held: snapshots are
//!    copied out and handed to sinks after release
//! 4. Eviction takes the map write lock and then the slot's queue lock;
//!    producers take the queue lock without the map lock, so the two
//!    orders never cross
//! 5. Eviction marks a slot before taking its estimator lock for the final
//!    snapshot; an update that finds the mark retries on a fresh slot
//!
//! ## Failure Containment
//!
//! A `NumericalInstability` resets only the affected subject to its
//! priors. Stale and invalid measurements are dropped and counted; the
//! estimator is not touched.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::{
    config::FusionConfig,
    derived::{DerivedMetrics, MetricsCalculator},
    errors::{ConfigError, FusionError, FusionResult},
    events::{AnomalyEvent, Measurement, StateEstimate, SubjectId, TuningAdjustment, TuningSample},
    fusion::{models::ProcessModel, FilterModel, ForecastPoint, Innovation, SubjectEstimator, SubjectSnapshot},
    queue::{MeasurementQueue, QueueStats, QueueStatsSnapshot},
    sink::{NullSink, SnapshotSink},
    time::{TimeSource, Timestamp},
    tuning::{AdaptiveNoiseTuner, NoiseHandle, ProcessNoise},
};

/// Everything the registry keeps for one subject
#[derive(Debug)]
pub struct SubjectSlot {
    id: SubjectId,
    estimator: Mutex<SubjectEstimator>,
    noise: NoiseHandle,
    pub(crate) queue: Mutex<MeasurementQueue>,
    pub(crate) scheduled: AtomicBool,
    evicted: AtomicBool,
    last_seen: AtomicU64,
}

impl SubjectSlot {
    /// Subject identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock time of the last activity
    pub fn last_seen(&self) -> Timestamp {
        self.last_seen.load(Ordering::Relaxed)
    }

    /// True once removed from the registry
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Measurements waiting for a worker
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Copy of the estimator state
    pub fn snapshot(&self) -> SubjectSnapshot {
        self.estimator.lock().snapshot()
    }

    pub(crate) fn touch(&self, now: Timestamp) {
        self.last_seen.fetch_max(now, Ordering::Relaxed);
    }
}

/// Result of applying one measurement
#[derive(Debug, Clone)]
pub struct FusionOutput {
    pub snapshot: SubjectSnapshot,
    pub estimate: StateEstimate,
    /// Present when severity reaches the emission level
    pub anomaly: Option<AnomalyEvent>,
    pub sample: TuningSample,
    pub metrics: DerivedMetrics,
}

enum SlotUpdate {
    Applied(Innovation, SubjectSnapshot),
    Failed(FusionError),
    /// Slot left the registry before the estimator lock was taken
    Detached,
}

#[derive(Debug, Default)]
struct RegistryCounters {
    created: AtomicU64,
    evicted: AtomicU64,
    updates: AtomicU64,
    rejected: AtomicU64,
    resets: AtomicU64,
}

/// Point-in-time registry statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Live subjects
    pub subjects: usize,
    pub created: u64,
    pub evicted: u64,
    /// Successful updates
    pub updates: u64,
    /// Stale, malformed and out-of-range measurements
    pub rejected: u64,
    /// Estimators reset after numerical failure
    pub resets: u64,
    /// Queued measurements dropped on overflow
    pub dropped: u64,
    pub queue: QueueStatsSnapshot,
}

/// Concurrency-safe table of per-subject estimators
pub struct SubjectRegistry {
    subjects: RwLock<HashMap<SubjectId, Arc<SubjectSlot>>>,
    model: Arc<FilterModel>,
    metrics: MetricsCalculator,
    tuner: AdaptiveNoiseTuner,
    config: FusionConfig,
    clock: Arc<dyn TimeSource>,
    snapshot_sink: Arc<dyn SnapshotSink>,
    queue_stats: Arc<QueueStats>,
    counters: RegistryCounters,
}

impl SubjectRegistry {
    /// Registry for a validated configuration
    pub fn new(config: FusionConfig, clock: Arc<dyn TimeSource>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            subjects: RwLock::new(HashMap::new()),
            model: Arc::new(FilterModel::from_config(&config)),
            metrics: MetricsCalculator::new(config.metrics.clone(), ProcessModel::from_config(&config.filter)),
            tuner: AdaptiveNoiseTuner::new(config.tuning.clone()),
            config,
            clock,
            snapshot_sink: Arc::new(NullSink),
            queue_stats: Arc::new(QueueStats::new()),
            counters: RegistryCounters::default(),
        })
    }

    /// Hand final snapshots of evicted subjects to `sink`
    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.snapshot_sink = sink;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Shared filter model
    pub fn model(&self) -> &Arc<FilterModel> {
        &self.model
    }

    /// Derived metrics calculator
    pub fn metrics_calculator(&self) -> &MetricsCalculator {
        &self.metrics
    }

    /// Current time according to the registry clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Slot for `subject_id`, created on first use
    pub fn slot(&self, subject_id: &str) -> Arc<SubjectSlot> {
        if let Some(slot) = self.read_map().get(subject_id) {
            return Arc::clone(slot);
        }

        let mut map = self.subjects.write();
        if let Some(slot) = map.get(subject_id) {
            return Arc::clone(slot);
        }

        let slot = Arc::new(self.new_slot(subject_id));
        map.insert(subject_id.to_string(), Arc::clone(&slot));
        drop(map);

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        log::info!("subject {} created", subject_id);
        slot
    }

    fn new_slot(&self, subject_id: &str) -> SubjectSlot {
        let noise = NoiseHandle::new(ProcessNoise::new(self.model.process_noise));
        SubjectSlot {
            id: subject_id.to_string(),
            estimator: Mutex::new(SubjectEstimator::new(subject_id, Arc::clone(&self.model), noise.clone())),
            noise,
            queue: Mutex::new(MeasurementQueue::new(
                self.config.registry.queue_capacity,
                Arc::clone(&self.queue_stats),
            )),
            scheduled: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            last_seen: AtomicU64::new(self.clock.now()),
        }
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<SubjectId, Arc<SubjectSlot>>> {
        self.subjects.read()
    }

    fn existing(&self, subject_id: &str) -> Option<Arc<SubjectSlot>> {
        self.read_map().get(subject_id).map(Arc::clone)
    }

    /// Validate and apply one measurement synchronously
    pub fn apply(&self, measurement: &Measurement) -> FusionResult<FusionOutput> {
        if let Err(err) = measurement.validate() {
            self.note_rejected(measurement.subject_id(), measurement.timestamp(), &err);
            return Err(err);
        }
        let slot = self.slot(measurement.subject_id());
        self.apply_to_slot(&slot, measurement)
    }

    /// Apply an already validated measurement to a slot
    ///
    /// If the slot was evicted after it was looked up, the measurement goes
    /// to a freshly created slot for the same subject instead.
    pub(crate) fn apply_to_slot(&self, slot: &Arc<SubjectSlot>, measurement: &Measurement) -> FusionResult<FusionOutput> {
        let mut slot = Arc::clone(slot);
        loop {
            slot.touch(self.clock.now());
            match self.update_estimator(&slot, measurement) {
                SlotUpdate::Applied(innovation, snapshot) => return Ok(self.output(&slot, &innovation, snapshot)),
                SlotUpdate::Failed(err) => return Err(self.fail(&slot, measurement, err)),
                SlotUpdate::Detached => {
                    log::debug!("subject {}: slot evicted before update, retrying on a fresh one", slot.id);
                    let id = slot.id.clone();
                    slot = self.slot(&id);
                }
            }
        }
    }

    fn update_estimator(&self, slot: &SubjectSlot, measurement: &Measurement) -> SlotUpdate {
        let mut estimator = slot.estimator.lock();
        // Eviction marks the slot before it takes this lock for the final
        // snapshot, so an update that passes this check is in that snapshot
        if slot.is_evicted() {
            return SlotUpdate::Detached;
        }
        match estimator.update(measurement) {
            Ok(innovation) => SlotUpdate::Applied(innovation, estimator.snapshot()),
            Err(err) => {
                if matches!(err, FusionError::NumericalInstability { .. }) {
                    estimator.reset();
                }
                SlotUpdate::Failed(err)
            }
        }
    }

    fn fail(&self, slot: &SubjectSlot, measurement: &Measurement, err: FusionError) -> FusionError {
        if let FusionError::NumericalInstability { stage } = err {
            self.counters.resets.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "subject {}: numerical instability in {} at {} ms, estimator reset to priors",
                slot.id,
                stage,
                measurement.timestamp()
            );
        } else {
            self.note_rejected(&slot.id, measurement.timestamp(), &err);
        }
        err
    }

    fn output(&self, slot: &SubjectSlot, innovation: &Innovation, snapshot: SubjectSnapshot) -> FusionOutput {
        self.counters.updates.fetch_add(1, Ordering::Relaxed);

        let metrics = self.metrics.evaluate(&snapshot);
        let estimate = self.metrics.estimate(&snapshot, &metrics);
        let anomaly = self.metrics.anomaly_event(&snapshot, &metrics);
        let sample = TuningSample {
            subject_id: slot.id.clone(),
            timestamp: innovation.timestamp,
            modality: innovation.modality,
            dimension: innovation.dimension(),
            nis: innovation.nis,
            noise_scale: snapshot.noise_scale,
            noise_version: snapshot.noise_version,
        };

        FusionOutput { snapshot, estimate, anomaly, sample, metrics }
    }

    pub(crate) fn note_rejected(&self, subject_id: &str, timestamp: Timestamp, err: &FusionError) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        log::warn!("subject {}: measurement at {} ms dropped: {}", subject_id, timestamp, err);
    }

    /// Advance a subject's estimator without a measurement
    ///
    /// `Ok(None)` for an unknown subject.
    pub fn predict_to(&self, subject_id: &str, to: Timestamp) -> FusionResult<Option<SubjectSnapshot>> {
        let Some(slot) = self.existing(subject_id) else {
            return Ok(None);
        };
        let mut estimator = slot.estimator.lock();
        estimator.predict(to)?;
        Ok(Some(estimator.snapshot()))
    }

    /// Copy of a subject's state
    pub fn snapshot(&self, subject_id: &str) -> Option<SubjectSnapshot> {
        self.existing(subject_id).map(|slot| slot.snapshot())
    }

    /// Derived metrics for a subject's current state
    pub fn metrics(&self, subject_id: &str) -> Option<DerivedMetrics> {
        self.snapshot(subject_id).map(|snapshot| self.metrics.evaluate(&snapshot))
    }

    /// Forward simulation of a subject's state
    pub fn forecast(&self, subject_id: &str, horizon_s: f64, step_s: f64) -> FusionResult<Option<Vec<ForecastPoint>>> {
        let Some(slot) = self.existing(subject_id) else {
            return Ok(None);
        };
        let estimator = slot.estimator.lock();
        estimator.forecast(horizon_s, step_s).map(Some)
    }

    /// Reset a subject to default priors; false if unknown
    pub fn reset(&self, subject_id: &str) -> bool {
        let Some(slot) = self.existing(subject_id) else {
            return false;
        };
        slot.estimator.lock().reset();
        self.counters.resets.fetch_add(1, Ordering::Relaxed);
        log::info!("subject {} reset to priors", subject_id);
        true
    }

    /// Snapshot and remove subjects idle for longer than the timeout
    ///
    /// Subjects with queued or in-progress work are skipped.
    pub fn evict_idle(&self, now: Timestamp) -> Vec<SubjectId> {
        let timeout = self.config.registry.idle_timeout_ms;
        let candidates: Vec<SubjectId> = self
            .read_map()
            .values()
            .filter(|slot| now.saturating_sub(slot.last_seen()) >= timeout)
            .map(|slot| slot.id.clone())
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.remove_slot(id, Some((now, timeout))))
            .collect()
    }

    /// Snapshot and remove one subject regardless of activity
    ///
    /// False if unknown or if work is still pending for it.
    pub fn evict(&self, subject_id: &str) -> bool {
        self.remove_slot(subject_id, None)
    }

    fn remove_slot(&self, subject_id: &str, idle: Option<(Timestamp, u64)>) -> bool {
        let slot = {
            let mut map = self.subjects.write();
            let Some(slot) = map.get(subject_id).map(Arc::clone) else {
                return false;
            };

            let queue = slot.queue.lock();
            let busy = !queue.is_empty() || slot.scheduled.load(Ordering::Acquire);
            let still_idle = match idle {
                Some((now, timeout)) => now.saturating_sub(slot.last_seen()) >= timeout,
                None => true,
            };
            if busy || !still_idle {
                return false;
            }

            slot.evicted.store(true, Ordering::Release);
            drop(queue);
            map.remove(subject_id);
            slot
        };

        let snapshot = slot.snapshot();
        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "subject {} evicted after {} updates, last filter time {} ms",
            subject_id,
            snapshot.update_count,
            snapshot.timestamp
        );
        self.snapshot_sink.persist(snapshot);
        true
    }

    /// Run the noise tuner over every subject
    pub fn run_tuning_pass(&self) -> Vec<TuningAdjustment> {
        self.slots()
            .iter()
            .filter_map(|slot| {
                let mut estimator = slot.estimator.lock();
                self.tuner.adjust(&slot.id, estimator.nis_window_mut(), &slot.noise)
            })
            .collect()
    }

    /// Every live slot
    pub fn slots(&self) -> Vec<Arc<SubjectSlot>> {
        self.read_map().values().map(Arc::clone).collect()
    }

    /// Number of live subjects
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    /// True when no subject is tracked
    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// True if `subject_id` is live
    pub fn contains(&self, subject_id: &str) -> bool {
        self.read_map().contains_key(subject_id)
    }

    /// Ids of live subjects, sorted
    pub fn subject_ids(&self) -> Vec<SubjectId> {
        let mut ids: Vec<SubjectId> = self.read_map().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> RegistryStats {
        let queue = self.queue_stats.snapshot();
        RegistryStats {
            subjects: self.len(),
            created: self.counters.created.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            resets: self.counters.resets.load(Ordering::Relaxed),
            dropped: queue.dropped,
            queue,
        }
    }
}

impl std::fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectRegistry")
            .field("subjects", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
