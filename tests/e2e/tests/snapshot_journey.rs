//! Snapshot journeys: seed a day of doses, build, publish, read back

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use dosemate_core::{
    Clock, DataSnapshot, EntityStore, LogStatus, RefreshTrigger, SnapshotBuilder,
    SnapshotPublisher, StatusColor,
};
use dosemate_e2e_tests::harness::TestContainer;
use dosemate_e2e_tests::mocks::TestDataFactory;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

#[test]
fn test_evening_snapshot_reaches_display() {
    let tc = TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 19, 0, 0).unwrap());
    let mut store = tc.open_store();
    let scenario = TestDataFactory::evening_scenario(&mut store, day());

    let snapshot = SnapshotBuilder::new(&store).build(scenario.now).unwrap();
    assert_eq!(snapshot.adherence_rate, scenario.expected_adherence);
    assert_eq!(
        snapshot.next_dose.as_ref().map(|d| d.scheduled_time),
        scenario.expected_next_dose
    );
    assert_eq!(snapshot.updated_at, scenario.now);

    // First three doses of the day, in order
    let times: Vec<_> = snapshot
        .medications
        .iter()
        .map(|item| item.scheduled_time)
        .collect();
    assert_eq!(times.len(), 3);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(snapshot.medications[0].name, "Aspirin");
    assert_eq!(snapshot.medications[2].status, "pending");

    tc.channel().publish(&snapshot).unwrap();

    // The display side opens its own handle
    let seen = tc.channel().read().unwrap();
    assert_eq!(seen, snapshot);
    assert_eq!(tc.channel().last_update(), Some(snapshot.updated_at));
    assert_eq!(
        seen.medications[0].status_color(),
        LogStatus::Taken.color()
    );
}

#[test]
fn test_empty_day_publishes_zero_adherence() {
    let tc = TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap());
    let mut store = tc.open_store();
    let aspirin = TestDataFactory::create_medication(&mut store, "Aspirin", "1 tablet");
    // Yesterday's dose is outside today's window
    TestDataFactory::create_dose(
        &mut store,
        &aspirin,
        tc.clock.now() - Duration::days(1),
        LogStatus::Taken,
    );

    let snapshot = SnapshotBuilder::new(&store).build(tc.clock.now()).unwrap();
    assert!(snapshot.medications.is_empty());
    assert_eq!(snapshot.adherence_rate, 0.0);
    assert!(snapshot.next_dose.is_none());

    tc.channel().publish(&snapshot).unwrap();
    assert_eq!(tc.channel().read().unwrap(), DataSnapshot::empty(tc.clock.now()));
}

#[test]
fn test_status_change_shows_in_next_snapshot() {
    let tc = TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 19, 0, 0).unwrap());
    let mut store = tc.open_store();
    let scenario = TestDataFactory::evening_scenario(&mut store, day());

    // The 22:00 dose gets taken early
    let late = scenario.logs[4].clone().with_status(LogStatus::Taken);
    store.insert(&late).unwrap();
    store.save().unwrap();

    let snapshot = SnapshotBuilder::new(&store).build(scenario.now).unwrap();
    assert_eq!(snapshot.adherence_rate, 0.8);
    assert!(snapshot.next_dose.is_none());
}

#[test]
fn test_undecodable_color_falls_back_to_gray() {
    let tc = TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 19, 0, 0).unwrap());
    let mut store = tc.open_store();
    let scenario = TestDataFactory::evening_scenario(&mut store, day());

    let mut snapshot = SnapshotBuilder::new(&store).build(scenario.now).unwrap();
    snapshot.medications[0].status_color_hex = "not a colour".to_string();
    tc.channel().publish(&snapshot).unwrap();

    let seen = tc.channel().read().unwrap();
    assert_eq!(seen.medications[0].status_color(), StatusColor::GRAY);
}

#[tokio::test]
async fn test_publisher_worker_publishes_on_foreground() {
    // Noon UTC falls on the same local day in nearly every timezone
    let tc = TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap());
    let mut store = tc.open_store();
    let aspirin = TestDataFactory::create_medication(&mut store, "Aspirin", "1 tablet");
    TestDataFactory::create_dose(&mut store, &aspirin, tc.clock.now(), LogStatus::Taken);

    assert!(tc.channel().read().is_none());
    let publisher = SnapshotPublisher::spawn(store, tc.channel(), tc.clock());
    publisher.request(RefreshTrigger::Foreground);
    publisher.shutdown().await;

    let seen = tc.channel().read().unwrap();
    assert_eq!(seen.updated_at, tc.clock.now());
    assert_eq!(seen.medications.len(), 1);
    assert_eq!(seen.adherence_rate, 1.0);
}
