//! Startup migration journeys on real shipped store shapes

use chrono::{Duration, TimeZone, Utc};
use dosemate_core::metrics::{active_medications, latest_metrics};
use dosemate_core::schema::history;
use dosemate_core::{
    BootstrapError, HookError, Measurement, MetricKind, MigrationError, MigrationOutcome,
    MigrationStage, MigrationState, MoodLevel, ScalarMetric, SchemaRegistry, bootstrap,
};
use dosemate_e2e_tests::harness::TestContainer;
use dosemate_e2e_tests::mocks::TestDataFactory;
use rusqlite::Connection;
use uuid::Uuid;

fn container() -> TestContainer {
    TestContainer::new_temp(Utc.with_ymd_and_hms(2026, 10, 18, 7, 0, 0).unwrap())
}

/// V1 store holding one medication and the legacy metric rows
fn seed_v1(tc: &TestContainer) {
    let conn = tc.seed_store_at(history::V1_0_0);
    TestDataFactory::insert_legacy_medication(&conn, &Uuid::new_v4().to_string(), "Lisinopril");
    TestDataFactory::insert_legacy_metrics(&conn, &TestDataFactory::legacy_metric_rows());
}

fn failing_registry() -> SchemaRegistry {
    let stages = vec![
        MigrationStage::custom(history::V1_1_0, history::V2_0_0)
            .did_migrate(|_| Err(HookError::Data("injected".to_string()))),
    ];
    SchemaRegistry::new(history::versions(), stages).unwrap()
}

fn has_column(tc: &TestContainer, table: &str, column: &str) -> bool {
    let conn = Connection::open(tc.store_path()).unwrap();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table)).unwrap();
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    names.iter().any(|n| n == column)
}

#[test]
fn test_v1_store_migrates_at_startup() {
    let tc = container();
    seed_v1(&tc);

    let ctx = bootstrap(tc.config(), tc.clock(), &false).unwrap();
    assert_eq!(ctx.migration.outcome, MigrationOutcome::Migrated);
    assert_eq!(ctx.migration.from, Some(history::V1_0_0));
    assert_eq!(ctx.migration.to, history::V2_0_0);
    assert_eq!(ctx.migration.stages_applied, 2);
    assert!(ctx.migration.backup.is_some());
    assert_eq!(tc.backup_count(), 1);
    assert_eq!(tc.recorded_version().as_deref(), Some("2.0.0"));

    // Legacy columns were backfilled into tagged measurements
    let latest = latest_metrics(&ctx.store).unwrap();
    assert_eq!(
        latest[&MetricKind::BloodPressure].measurement,
        Measurement::BloodPressure { systolic: 128.0, diastolic: 84.0 }
    );
    assert_eq!(
        latest[&MetricKind::Mood].measurement,
        Measurement::Mood { level: MoodLevel::Good }
    );
    assert_eq!(
        latest[&MetricKind::Weight].measurement,
        Measurement::Scalar { metric: ScalarMetric::Weight, value: 71.5 }
    );

    let meds = active_medications(&ctx.store).unwrap();
    assert_eq!(meds.len(), 1);
    assert_eq!(meds[0].name, "Lisinopril");
}

#[test]
fn test_failed_stage_restores_pre_migration_store() {
    let tc = container();
    seed_v1(&tc);

    let mut coordinator = tc.coordinator(failing_registry());
    let err = coordinator.run().unwrap_err();
    assert!(matches!(err, MigrationError::RolledBack { .. }));
    assert_eq!(coordinator.state(), MigrationState::MigrationFailed);

    // 1.0.0 -> 1.1.0 had committed before the failure; the restore undid it
    assert_eq!(tc.recorded_version().as_deref(), Some("1.0.0"));
    assert!(!has_column(&tc, "health_metrics", "medication_id"));
    assert!(!has_column(&tc, "health_metrics", "measurement"));
    let conn = Connection::open(tc.store_path()).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM health_metrics", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 3);
    drop(conn);

    // Next launch with the fixed build migrates from the restored store
    let ctx = bootstrap(tc.config(), tc.clock(), &false).unwrap();
    assert_eq!(ctx.migration.from, Some(history::V1_0_0));
    assert_eq!(ctx.migration.outcome, MigrationOutcome::Migrated);
    assert_eq!(latest_metrics(&ctx.store).unwrap().len(), 3);
    assert_eq!(tc.backup_count(), 2);
}

#[test]
fn test_unknown_legacy_metric_rolls_back_at_startup() {
    let tc = container();
    {
        let conn = tc.seed_store_at(history::V1_0_0);
        conn.execute(
            "INSERT INTO health_metrics (id, metric_type, value, recorded_at)
             VALUES (?1, 'steps', 9000, '2026-10-17T20:00:00.000000Z')",
            [Uuid::new_v4().to_string()],
        )
        .unwrap();
    }

    let err = bootstrap(tc.config(), tc.clock(), &false).err().unwrap();
    assert!(matches!(
        err,
        BootstrapError::Migration(MigrationError::RolledBack { .. })
    ));
    assert!(!err.is_recovery_failure());
    assert_eq!(tc.recorded_version().as_deref(), Some("1.0.0"));
}

#[test]
fn test_lost_backup_is_recovery_failure() {
    let tc = container();
    seed_v1(&tc);

    let backups = tc.backups();
    let stages = vec![
        MigrationStage::custom(history::V1_1_0, history::V2_0_0).did_migrate(move |_| {
            for backup in backups.list_backups().unwrap_or_default() {
                let _ = std::fs::remove_file(&backup.path);
            }
            Err(HookError::Data("injected".to_string()))
        }),
    ];
    let registry = SchemaRegistry::new(history::versions(), stages).unwrap();
    let err = tc.coordinator(registry).run().unwrap_err();

    assert!(matches!(err, MigrationError::RecoveryFailed { .. }));
    assert!(BootstrapError::from(err).is_recovery_failure());
}

#[test]
fn test_startup_prunes_backups_to_retention() {
    let tc = container();
    drop(tc.open_store());

    let backups = tc.backups();
    for _ in 0..5 {
        backups.create_backup().unwrap();
        tc.clock.advance(Duration::minutes(1));
    }
    assert_eq!(tc.backup_count(), 5);
    let newest = backups.list_backups().unwrap()[0].created_at;

    let ctx = bootstrap(tc.config(), tc.clock(), &false).unwrap();
    assert_eq!(ctx.migration.outcome, MigrationOutcome::UpToDate);
    assert_eq!(tc.backup_count(), ctx.config.backup_retention);
    assert_eq!(backups.list_backups().unwrap()[0].created_at, newest);
}
