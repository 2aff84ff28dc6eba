//! Ingestion Router
//!
//! ## Overview
//!
//! The router accepts measurements from any number of producer threads
//! and fans them out to a fixed pool of worker threads:
//!
//! ```text
//! producers ── submit() ── validate ── slot.queue.push ──┐
//!                                                        │ first item since idle?
//!                                                        ▼
//!                                           ready channel (Arc<SubjectSlot>)
//!                                                        │
//!                        ┌───────────────┬───────────────┼───────────────┐
//!                        ▼               ▼               ▼               ▼
//!                     worker 0        worker 1        worker 2        worker 3
//!                   drain ≤ batch ─ apply ─ sinks ─ requeue slot if items remain
//! ```
//!
//! A slot is in the ready channel at most once (its `scheduled` flag), so
//! at most one worker drains a subject at any time and its measurements
//! are applied in arrival order. A worker yields a busy subject after
//! `drain_batch` items so one chatty subject cannot starve the others.
//!
//! ## Back-Pressure
//!
//! `submit` never blocks on a worker. Each subject's queue is bounded and
//! drops its oldest entry on overflow.
//!
//! ## Maintenance
//!
//! A separate thread runs tuning passes and idle eviction on their own
//! intervals, independent of update traffic.
//!
//! ## Shutdown
//!
//! [`IngestionRouter::shutdown`] stops accepting, lets workers finish
//! what is queued, joins every thread and drains anything left inline.
//! Dropping the router shuts it down.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::{
    errors::FusionError,
    events::Measurement,
    registry::{SubjectRegistry, SubjectSlot},
    sink::FusionSink,
};

/// Why a measurement was not accepted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// Failed validation
    #[error(transparent)]
    Rejected(#[from] FusionError),

    /// Router is shutting down
    #[error("router is shut down")]
    ShutDown,
}

/// Outcome of a batch submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
}

struct Shared {
    registry: Arc<SubjectRegistry>,
    sink: Arc<dyn FusionSink>,
    ready: Mutex<Option<Sender<Arc<SubjectSlot>>>>,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle_lock: Mutex<()>,
    idle: Condvar,
    drain_batch: usize,
}

impl Shared {
    /// Account for one measurement leaving the pipeline
    fn settle(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }

    /// Queue a slot for a worker; false once the pool is gone
    fn dispatch(&self, slot: Arc<SubjectSlot>) -> bool {
        match self.ready.lock().as_ref() {
            Some(sender) => sender.send(slot).is_ok(),
            None => false,
        }
    }

    fn drain_slot(&self, slot: &Arc<SubjectSlot>) {
        loop {
            let batch = slot.queue.lock().drain_up_to(self.drain_batch);
            for measurement in &batch {
                self.process(slot, measurement);
                self.settle();
            }

            {
                let queue = slot.queue.lock();
                if queue.is_empty() {
                    slot.scheduled.store(false, Ordering::Release);
                    return;
                }
            }

            // More work: go to the back of the line, or keep going if the
            // pool is gone
            if self.dispatch(Arc::clone(slot)) {
                return;
            }
        }
    }

    fn process(&self, slot: &Arc<SubjectSlot>, measurement: &Measurement) {
        match self.registry.apply_to_slot(slot, measurement) {
            Ok(output) => {
                self.sink.on_estimate(&output.estimate);
                if let Some(anomaly) = &output.anomaly {
                    self.sink.on_anomaly(anomaly);
                }
                self.sink.on_tuning_sample(&output.sample);
            }
            Err(err) => self.sink.on_rejected(slot.id(), measurement.timestamp(), &err),
        }
    }

    fn maintain(&self, last_tuning: &mut Instant, last_eviction: &mut Instant) {
        let config = self.registry.config();

        if config.tuning.enabled && last_tuning.elapsed() >= Duration::from_millis(config.tuning.interval_ms) {
            *last_tuning = Instant::now();
            for adjustment in self.registry.run_tuning_pass() {
                self.sink.on_tuning_adjustment(&adjustment);
            }
        }

        if last_eviction.elapsed() >= Duration::from_millis(config.registry.eviction_interval_ms) {
            *last_eviction = Instant::now();
            let evicted = self.registry.evict_idle(self.registry.now());
            if !evicted.is_empty() {
                log::debug!("eviction sweep removed {} subjects", evicted.len());
            }
        }
    }
}

/// Multi-producer front end over a [`SubjectRegistry`]
pub struct IngestionRouter {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    maintenance: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl IngestionRouter {
    /// Start the worker pool and maintenance thread
    pub fn start(registry: Arc<SubjectRegistry>, sink: Arc<dyn FusionSink>) -> Self {
        let workers = registry.config().registry.workers.max(1);
        let drain_batch = registry.config().registry.drain_batch.max(1);
        let (sender, receiver) = mpsc::channel::<Arc<SubjectSlot>>();

        let shared = Arc::new(Shared {
            registry,
            sink,
            ready: Mutex::new(Some(sender)),
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            drain_batch,
        });

        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers)
            .filter_map(|index| spawn_worker(index, Arc::clone(&shared), Arc::clone(&receiver)))
            .collect::<Vec<_>>();

        let maintenance = spawn_maintenance(Arc::clone(&shared));

        log::info!("ingestion router started with {} workers", handles.len());
        Self {
            shared,
            workers: Mutex::new(handles),
            maintenance: Mutex::new(maintenance),
        }
    }

    /// Underlying registry
    pub fn registry(&self) -> &Arc<SubjectRegistry> {
        &self.shared.registry
    }

    /// Validate and queue one measurement
    pub fn submit(&self, measurement: Measurement) -> Result<(), IngestError> {
        if !self.shared.accepting.load(Ordering::Acquire) {
            return Err(IngestError::ShutDown);
        }

        if let Err(err) = measurement.validate() {
            self.shared
                .registry
                .note_rejected(measurement.subject_id(), measurement.timestamp(), &err);
            self.shared
                .sink
                .on_rejected(measurement.subject_id(), measurement.timestamp(), &err);
            return Err(err.into());
        }

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        let slot = loop {
            let slot = self.shared.registry.slot(measurement.subject_id());
            let mut queue = slot.queue.lock();
            if slot.is_evicted() {
                // Lost a race with eviction; the next lookup creates a fresh slot
                continue;
            }
            if let Some(displaced) = queue.push(measurement) {
                self.shared.settle();
                log::warn!(
                    "subject {}: queue full, dropped measurement at {} ms",
                    slot.id(),
                    displaced.timestamp()
                );
            }
            drop(queue);
            break slot;
        };

        if !slot.scheduled.swap(true, Ordering::AcqRel) && !self.shared.dispatch(Arc::clone(&slot)) {
            // Pool already gone
            self.shared.drain_slot(&slot);
        }
        Ok(())
    }

    /// Submit several measurements, continuing past rejections
    pub fn submit_batch<I>(&self, measurements: I) -> BatchReport
    where
        I: IntoIterator<Item = Measurement>,
    {
        let mut report = BatchReport::default();
        for measurement in measurements {
            match self.submit(measurement) {
                Ok(()) => report.accepted += 1,
                Err(_) => report.rejected += 1,
            }
        }
        report
    }

    /// Measurements accepted but not yet applied
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Block until everything accepted so far has been applied
    ///
    /// Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle_lock.lock();
        while self.in_flight() > 0 {
            if self.shared.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.in_flight() == 0;
            }
        }
        true
    }

    /// Stop accepting, finish queued work and join all threads
    pub fn shutdown(&self) {
        if !self.shared.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some((stop, handle)) = self.maintenance.lock().take() {
            drop(stop);
            if handle.join().is_err() {
                log::error!("maintenance thread panicked");
            }
        }

        // Workers exit once the channel is empty and every sender is gone
        self.shared.ready.lock().take();
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                log::error!("ingestion worker panicked");
            }
        }

        for slot in self.shared.registry.slots() {
            if slot.pending() > 0 {
                self.shared.drain_slot(&slot);
            }
        }
        log::info!("ingestion router stopped");
    }
}

impl Drop for IngestionRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for IngestionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionRouter")
            .field("registry", &self.shared.registry)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn spawn_worker(
    index: usize,
    shared: Arc<Shared>,
    receiver: Arc<Mutex<Receiver<Arc<SubjectSlot>>>>,
) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name(format!("vitalfuse-worker-{}", index))
        .spawn(move || loop {
            let next = receiver.lock().recv();
            match next {
                Ok(slot) => shared.drain_slot(&slot),
                Err(_) => break,
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::error!("failed to spawn ingestion worker {}: {}", index, err);
            None
        }
    }
}

fn spawn_maintenance(shared: Arc<Shared>) -> Option<(Sender<()>, JoinHandle<()>)> {
    let config = shared.registry.config();
    let tick = Duration::from_millis(
        config
            .tuning
            .interval_ms
            .min(config.registry.eviction_interval_ms)
            .max(1),
    );
    let (stop, stopped) = mpsc::channel::<()>();

    let spawned = thread::Builder::new()
        .name("vitalfuse-maintenance".to_string())
        .spawn(move || {
            let mut last_tuning = Instant::now();
            let mut last_eviction = Instant::now();
            loop {
                match stopped.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => shared.maintain(&mut last_tuning, &mut last_eviction),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

    match spawned {
        Ok(handle) => Some((stop, handle)),
        Err(err) => {
            log::error!("failed to spawn maintenance thread: {}", err);
            None
        }
    }
}
