//! Heartbeat and advertisement lifecycle tests.
//!
//! These run with millisecond-scale timings injected through the
//! configuration so that staleness is observable inside a test run.

use std::time::{Duration, Instant};

use imr_core::config::RegistryConfig;
use imr_core::record::{InstanceId, InstanceRecord};
use imr_registry::{Advertisement, HeartbeatEmitter, RegistryStore};
use tempfile::TempDir;

const FAST_INTERVAL: Duration = Duration::from_millis(40);
const FAST_STALE: Duration = Duration::from_millis(150);

fn fast_store(dir: &TempDir) -> RegistryStore {
    RegistryStore::new(
        RegistryConfig::new(dir.path())
            .with_heartbeat_interval(FAST_INTERVAL)
            .with_stale_timeout(FAST_STALE)
            .with_stop_timeout(Duration::from_secs(1)),
    )
}

fn test_record(id: &str, binary_name: &str) -> InstanceRecord {
    InstanceRecord::for_current_process(
        InstanceId::new(id),
        "127.0.0.1",
        13337,
        binary_name,
        "",
    )
}

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test]
async fn test_heartbeat_outruns_staleness() {
    let dir = TempDir::new().unwrap();
    let store = fast_store(&dir);

    // Two records registered together; only one gets a heartbeat.
    let beating = test_record("beating", "a.exe");
    let silent = test_record("silent", "b.exe");
    store.register(&beating).unwrap();
    store.register(&silent).unwrap();

    let mut emitter = HeartbeatEmitter::new(store.clone(), beating.instance_id.clone());
    emitter.start();
    tokio::time::sleep(FAST_STALE * 3).await;
    emitter.stop().await;

    let beating = store.get(&beating.instance_id).unwrap();
    let silent = store.get(&silent.instance_id).unwrap();
    assert!(
        !beating.is_stale(FAST_STALE),
        "heartbeated record went stale: {beating:?}"
    );
    assert!(
        silent.is_stale(FAST_STALE),
        "silent record should have aged out: {silent:?}"
    );
}

#[tokio::test]
async fn test_emitters_refresh_independently() {
    let dir = TempDir::new().unwrap();
    let store = fast_store(&dir);

    let first = test_record("first", "a.exe");
    let second = test_record("second", "b.exe");
    store.register(&first).unwrap();
    store.register(&second).unwrap();

    let mut emitter_a = HeartbeatEmitter::new(store.clone(), first.instance_id.clone());
    let mut emitter_b = HeartbeatEmitter::new(store.clone(), second.instance_id.clone());
    emitter_a.start();
    emitter_b.start();
    tokio::time::sleep(FAST_INTERVAL * 4).await;
    emitter_a.stop().await;

    // Stopping one emitter must not stop the other.
    let frozen = store.get(&first.instance_id).unwrap().last_heartbeat;
    tokio::time::sleep(FAST_INTERVAL * 4).await;
    emitter_b.stop().await;

    assert_eq!(
        store.get(&first.instance_id).unwrap().last_heartbeat,
        frozen
    );
    assert!(!store
        .get(&second.instance_id)
        .unwrap()
        .is_stale(FAST_STALE));
}

#[tokio::test]
async fn test_heartbeated_record_survives_reaping() {
    let dir = TempDir::new().unwrap();
    let store = fast_store(&dir);
    let record = test_record("survivor", "s.exe");
    store.register(&record).unwrap();

    let mut emitter = HeartbeatEmitter::new(store.clone(), record.instance_id.clone());
    emitter.start();

    // A reaper from another handle sweeps repeatedly while the heartbeat
    // runs; a fresh record owned by a live process must never be taken.
    let reaper = RegistryStore::new(store.config().clone());
    for _ in 0..5 {
        assert_eq!(reaper.reap_all().unwrap(), 0);
        tokio::time::sleep(FAST_INTERVAL).await;
    }

    emitter.stop().await;
    assert!(store.get(&record.instance_id).is_some());
}

// ============================================================================
// Advertisement Lifecycle
// ============================================================================

#[tokio::test]
async fn test_advertised_instance_is_discoverable_until_withdrawn() {
    let dir = TempDir::new().unwrap();
    let store = fast_store(&dir);

    let ad = Advertisement::publish(store.clone(), test_record("adv", "target.exe")).unwrap();
    assert!(ad.heartbeat_is_running());

    let found = store.find_by_binary_name("TARGET.EXE").unwrap();
    assert!(found.is_some(), "advertised instance must resolve");

    ad.withdraw().await.unwrap();
    assert!(store.find_by_binary_name("target.exe").unwrap().is_none());
    assert!(store.list(true).unwrap().is_empty());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_stop_does_not_wait_out_the_interval() {
    let dir = TempDir::new().unwrap();
    let store = RegistryStore::new(
        RegistryConfig::new(dir.path())
            .with_heartbeat_interval(Duration::from_secs(60))
            .with_stop_timeout(Duration::from_secs(5)),
    );
    let record = test_record("slow-tick", "s.exe");
    store.register(&record).unwrap();

    let mut emitter = HeartbeatEmitter::new(store, record.instance_id.clone());
    emitter.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    emitter.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop must preempt the pending tick, took {:?}",
        started.elapsed()
    );
    assert!(!emitter.is_running());
}
