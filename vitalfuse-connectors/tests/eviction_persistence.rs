//! Eviction snapshots flowing from the registry into a store

use std::sync::Arc;

use vitalfuse_connectors::{persistence_channel, JsonLinesStore, MemoryStore, RetryPolicy};
use vitalfuse_core::{FusionConfig, ManualClock, SubjectRegistry, TimeSource, WearableObservation};

fn registry(clock: &Arc<ManualClock>) -> SubjectRegistry {
    let config = FusionConfig::default().with_idle_timeout_ms(60_000);
    SubjectRegistry::new(config, Arc::clone(clock) as Arc<dyn TimeSource>).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn evicted_subjects_land_in_jsonl_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evicted.jsonl");
    let store = Arc::new(JsonLinesStore::new(&path));
    let (handle, worker) = persistence_channel(store, RetryPolicy::default(), 16).unwrap();
    let worker = tokio::spawn(worker.run());

    let clock = Arc::new(ManualClock::new(0));
    let registry = registry(&clock).with_snapshot_sink(Arc::new(handle));
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        for k in 0..5u64 {
            let ts = k * 1_000 + i as u64;
            registry
                .apply(&WearableObservation::heart_rate(*id, ts, 90.0 + k as f64).into())
                .unwrap();
        }
    }

    clock.set(120_000);
    let mut evicted = registry.evict_idle(clock.now());
    evicted.sort();
    assert_eq!(evicted, vec!["a", "b", "c"]);

    drop(registry);
    let stats = worker.await.unwrap();
    assert_eq!(stats.written, 3);
    assert_eq!(stats.dropped, 0);

    let mut stored = JsonLinesStore::read_all(&path).await.unwrap();
    stored.sort_by(|x, y| x.subject_id.cmp(&y.subject_id));
    assert_eq!(stored.len(), 3);
    for snapshot in &stored {
        assert_eq!(snapshot.update_count, 5);
        assert!(snapshot.heart_rate() > 70.0);
    }
}

#[tokio::test(start_paused = true)]
async fn flaky_store_still_receives_every_snapshot() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next(3);
    let (handle, worker) = persistence_channel(store.clone(), RetryPolicy::default(), 16).unwrap();
    let worker = tokio::spawn(worker.run());

    let clock = Arc::new(ManualClock::new(0));
    let registry = registry(&clock).with_snapshot_sink(Arc::new(handle));
    registry
        .apply(&WearableObservation::heart_rate("a", 0, 80.0).into())
        .unwrap();
    registry
        .apply(&WearableObservation::heart_rate("b", 0, 85.0).into())
        .unwrap();

    assert!(registry.evict("a"));
    assert!(registry.evict("b"));
    assert!(!registry.evict("a"));
    drop(registry);

    let stats = worker.await.unwrap();
    assert_eq!(stats.written, 2);
    assert_eq!(stats.retries, 3);
    assert_eq!(store.len(), 2);
}
