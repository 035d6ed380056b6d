//! Primary process and display surface sharing one container
//!
//! Each side opens its own handles from configuration, the way two
//! processes would; nothing is shared in memory.

use std::sync::mpsc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use dosemate_core::app::preferences;
use dosemate_core::sync_gate::{CLOUD_SYNC_ENABLED_KEY, PREMIUM_CACHED_KEY};
use dosemate_core::{
    Clock, DataSnapshot, DefaultsValue, LogStatus, RefreshTrigger, SharedContainer,
    SnapshotChannel, SyncMode, bootstrap, watch_snapshots,
};
use dosemate_e2e_tests::harness::TestContainer;
use dosemate_e2e_tests::mocks::TestDataFactory;

fn container() -> TestContainer {
    TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap())
}

/// What the display process sees, opened from its own configuration
fn display_side(tc: &TestContainer) -> SnapshotChannel {
    let container: SharedContainer = tc.config().resolve_container().unwrap();
    SnapshotChannel::for_container(&container)
}

#[test]
fn test_display_reads_nothing_before_first_launch() {
    let tc = container();
    let display = display_side(&tc);
    assert!(display.read().is_none());
    assert!(display.last_update().is_none());
}

#[test]
fn test_startup_publishes_for_display() {
    let tc = container();
    let ctx = bootstrap(tc.config(), tc.clock(), &false).unwrap();

    let seen = display_side(&tc).read().unwrap();
    assert_eq!(seen, DataSnapshot::empty(tc.clock.now()));
    assert_eq!(display_side(&tc).last_update(), Some(tc.clock.now()));
    drop(ctx);
}

#[test]
fn test_concurrent_reads_never_see_partial_writes() {
    let tc = container();
    let publisher = tc.channel();
    let display = display_side(&tc);
    let start = tc.clock.now();

    // A torn payload would read as None after the first publish landed
    let reader = std::thread::spawn(move || {
        let mut landed = false;
        for _ in 0..200 {
            match display.read() {
                Some(snapshot) => {
                    assert!(snapshot.medications.is_empty());
                    landed = true;
                }
                None => assert!(!landed, "payload became unreadable mid-publish"),
            }
        }
    });

    for minute in 0..50 {
        publisher
            .publish(&DataSnapshot::empty(start + Duration::minutes(minute)))
            .unwrap();
    }
    reader.join().unwrap();

    let last = display_side(&tc).read().unwrap();
    assert_eq!(last.updated_at, start + Duration::minutes(49));
}

#[tokio::test]
async fn test_display_watcher_follows_foreground_publish() {
    let tc = container();
    let ctx = bootstrap(tc.config(), tc.clock(), &false).unwrap();

    let (tx, rx) = mpsc::channel();
    let display_container = tc.config().resolve_container().unwrap();
    let _watcher = watch_snapshots(&display_container, move |snapshot| {
        let _ = tx.send(snapshot);
    })
    .unwrap();

    // A dose is taken while the app is in the background
    let mut store = dosemate_core::SqliteStore::open(&tc.store_path(), SyncMode::LocalOnly).unwrap();
    let aspirin = TestDataFactory::create_medication(&mut store, "Aspirin", "1 tablet");
    TestDataFactory::create_dose(&mut store, &aspirin, tc.clock.now(), LogStatus::Taken);
    drop(store);

    tc.clock.advance(Duration::minutes(5));
    let publisher = ctx.spawn_publisher();
    publisher.request(RefreshTrigger::Foreground);
    publisher.shutdown().await;

    let seen = tokio::task::spawn_blocking(move || {
        loop {
            match rx.recv_timeout(StdDuration::from_secs(10)) {
                Ok(Some(snapshot)) if !snapshot.medications.is_empty() => return Some(snapshot),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .unwrap()
    .expect("display never saw the foreground publish");

    assert_eq!(seen.medications[0].name, "Aspirin");
    assert_eq!(seen.adherence_rate, 1.0);
    assert_eq!(seen.updated_at, tc.clock.now());
}

#[test]
fn test_sync_gate_needs_all_three_inputs() {
    let tc = container();
    let config = tc.config();
    let prefs = preferences(&config, &tc.container);
    prefs.set(PREMIUM_CACHED_KEY, DefaultsValue::Bool(true));
    prefs.set(CLOUD_SYNC_ENABLED_KEY, DefaultsValue::Bool(true));
    prefs.synchronize().unwrap();

    let ctx = bootstrap(config.clone(), tc.clock(), &false).unwrap();
    assert_eq!(ctx.sync_mode, SyncMode::LocalOnly);
    drop(ctx);

    let ctx = bootstrap(config, tc.clock(), &true).unwrap();
    assert_eq!(ctx.sync_mode, SyncMode::CloudReplicated);
}

#[test]
fn test_gate_inputs_stay_out_of_the_shared_suite() {
    let tc = container();
    let config = tc.config();
    let prefs = preferences(&config, &tc.container);
    prefs.set(PREMIUM_CACHED_KEY, DefaultsValue::Bool(true));
    prefs.synchronize().unwrap();

    assert_ne!(prefs.path(), tc.container.defaults_path().as_path());
    let shared = dosemate_core::Defaults::open(tc.container.defaults_path());
    assert!(shared.get(PREMIUM_CACHED_KEY).is_none());
}
