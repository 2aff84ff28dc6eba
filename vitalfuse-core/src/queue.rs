//! Bounded Per-Subject Measurement Queue
//!
//! ## Overview
//!
//! Every subject has its own FIFO of raw measurements waiting for a
//! worker. The queue is bounded; when a producer outruns the workers the
//! OLDEST measurement is dropped so the freshest data always gets in:
//!
//! ```text
//! capacity 4, push m5 while full
//!
//!   front                back              front                back
//!   ┌────┬────┬────┬────┐                  ┌────┬────┬────┬────┐
//!   │ m1 │ m2 │ m3 │ m4 │   ── push m5 ──► │ m2 │ m3 │ m4 │ m5 │   m1 returned
//!   └────┴────┴────┴────┘                  └────┴────┴────┴────┘
//! ```
//!
//! Dropping raw measurements never corrupts estimator state: a dropped
//! measurement simply never happened as far as the filter is concerned.
//!
//! ## Concurrency
//!
//! A queue is owned by its subject slot and guarded by that slot's queue
//! mutex, which is separate from the estimator mutex so producers never
//! wait on a running update. Statistics are atomics shared by every queue
//! of a registry and can be read without taking any lock.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

use crate::events::Measurement;

/// Queue counters shared across subjects
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Measurements accepted
    pub pushed: AtomicU64,
    /// Measurements handed to a worker
    pub popped: AtomicU64,
    /// Measurements dropped because a queue was full
    pub dropped: AtomicU64,
    /// Deepest queue observed
    pub max_depth: AtomicU64,
}

impl QueueStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Update max depth if current is higher
    fn update_max_depth(&self, current: u64) {
        let mut max = self.max_depth.load(Ordering::Relaxed);
        while current > max {
            match self.max_depth.compare_exchange_weak(max, current, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatsSnapshot {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub max_depth: u64,
}

/// Drop-oldest FIFO of measurements for one subject
#[derive(Debug)]
pub struct MeasurementQueue {
    items: VecDeque<Measurement>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl MeasurementQueue {
    /// Empty queue holding at most `capacity` measurements (minimum 1)
    pub fn new(capacity: usize, stats: Arc<QueueStats>) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            stats,
        }
    }

    /// Append, returning the displaced oldest measurement when full
    pub fn push(&mut self, measurement: Measurement) -> Option<Measurement> {
        let displaced = if self.items.len() >= self.capacity {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            self.items.pop_front()
        } else {
            None
        };

        self.items.push_back(measurement);
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        self.stats.update_max_depth(self.items.len() as u64);
        displaced
    }

    /// Remove the oldest measurement
    pub fn pop(&mut self) -> Option<Measurement> {
        let item = self.items.pop_front();
        if item.is_some() {
            self.stats.popped.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Remove up to `max` measurements in arrival order
    pub fn drain_up_to(&mut self, max: usize) -> Vec<Measurement> {
        let count = max.min(self.items.len());
        let batch: Vec<Measurement> = self.items.drain(..count).collect();
        self.stats.popped.fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch
    }

    /// Oldest measurement without removing it
    pub fn peek(&self) -> Option<&Measurement> {
        self.items.front()
    }

    /// Current length
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Maximum length
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shared statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WearableObservation;

    fn hr(ts: u64) -> Measurement {
        WearableObservation::heart_rate("s", ts, 70.0).into()
    }

    #[test]
    fn fifo_order() {
        let mut queue = MeasurementQueue::new(4, Arc::new(QueueStats::new()));
        queue.push(hr(1));
        queue.push(hr(2));
        assert_eq!(queue.pop().map(|m| m.timestamp()), Some(1));
        assert_eq!(queue.pop().map(|m| m.timestamp()), Some(2));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let stats = Arc::new(QueueStats::new());
        let mut queue = MeasurementQueue::new(3, Arc::clone(&stats));
        for ts in 1..=3 {
            assert!(queue.push(hr(ts)).is_none());
        }
        assert!(queue.is_full());

        let displaced = queue.push(hr(4));
        assert_eq!(displaced.map(|m| m.timestamp()), Some(1));
        assert_eq!(queue.peek().map(|m| m.timestamp()), Some(2));

        let snap = stats.snapshot();
        assert_eq!(snap.pushed, 4);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.max_depth, 3);
    }

    #[test]
    fn drain_respects_limit() {
        let stats = Arc::new(QueueStats::new());
        let mut queue = MeasurementQueue::new(10, Arc::clone(&stats));
        for ts in 0..5 {
            queue.push(hr(ts));
        }

        let batch = queue.drain_up_to(3);
        assert_eq!(batch.iter().map(|m| m.timestamp()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(queue.len(), 2);
        assert_eq!(stats.snapshot().popped, 3);
    }

    #[test]
    fn stats_shared_between_queues() {
        let stats = Arc::new(QueueStats::new());
        let mut a = MeasurementQueue::new(2, Arc::clone(&stats));
        let mut b = MeasurementQueue::new(2, Arc::clone(&stats));
        a.push(hr(1));
        b.push(hr(1));
        b.push(hr(2));
        assert_eq!(stats.snapshot().pushed, 3);
        assert_eq!(stats.snapshot().max_depth, 2);
    }
}
