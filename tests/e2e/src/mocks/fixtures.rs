//! Test Data Factory
//!
//! Provides utilities for generating realistic test data:
//! - Medications and dose logs in the current store
//! - A pre-built day of doses with known adherence
//! - Legacy health metric rows for stores still at V1

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use dosemate_core::{EntityStore, LogStatus, Medication, MedicationLog, SqliteStore};
use rusqlite::{Connection, params};
use uuid::Uuid;

/// Factory for creating test data
///
/// # Example
///
/// ```rust,ignore
/// let mut store = tc.open_store();
/// let day = TestDataFactory::evening_scenario(&mut store, date);
/// assert_eq!(day.expected_adherence, 0.6);
/// ```
pub struct TestDataFactory;

/// One day of doses with the summary a snapshot taken at `now` must show
#[derive(Debug)]
pub struct DayScenario {
    pub medications: Vec<Medication>,
    pub logs: Vec<MedicationLog>,
    pub now: DateTime<Utc>,
    pub expected_adherence: f64,
    pub expected_next_dose: Option<DateTime<Utc>>,
}

/// Legacy V1 health metric row; ids are fresh uuids
#[derive(Debug, Clone)]
pub struct LegacyMetricRow {
    pub id: String,
    pub metric_type: &'static str,
    pub value: f64,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub recorded_at: &'static str,
}

fn at(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).expect("Valid hour");
    Utc.from_utc_datetime(&day.and_time(time))
}

impl TestDataFactory {
    // ========================================================================
    // SINGLE RECORDS
    // ========================================================================

    /// Insert and save an active medication
    pub fn create_medication(store: &mut SqliteStore, name: &str, dosage: &str) -> Medication {
        let medication = Medication::new(name, dosage, "");
        store.insert(&medication).expect("Failed to insert medication");
        store.save().expect("Failed to save medication");
        medication
    }

    /// Insert and save a dose log
    pub fn create_dose(
        store: &mut SqliteStore,
        medication: &Medication,
        scheduled_time: DateTime<Utc>,
        status: LogStatus,
    ) -> MedicationLog {
        let mut log = MedicationLog::scheduled(medication.id, scheduled_time).with_status(status);
        if status.is_completed() {
            log.taken_time = Some(scheduled_time);
        }
        store.insert(&log).expect("Failed to insert dose log");
        store.save().expect("Failed to save dose log");
        log
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// Five doses on `day` (UTC), viewed at 19:00
    ///
    /// 08:00, 13:00 and 20:00 taken; 18:00 and 22:00 pending. Three of five
    /// completed, and the 18:00 dose is already past, so the next dose is 22:00.
    pub fn evening_scenario(store: &mut SqliteStore, day: NaiveDate) -> DayScenario {
        let aspirin = Self::create_medication(store, "Aspirin", "1 tablet");
        let metformin = Self::create_medication(store, "Metformin", "500mg");
        let vitamin_d = Self::create_medication(store, "Vitamin D", "1 capsule");

        let logs = vec![
            Self::create_dose(store, &aspirin, at(day, 8), LogStatus::Taken),
            Self::create_dose(store, &metformin, at(day, 13), LogStatus::Taken),
            Self::create_dose(store, &vitamin_d, at(day, 18), LogStatus::Pending),
            Self::create_dose(store, &aspirin, at(day, 20), LogStatus::Taken),
            Self::create_dose(store, &metformin, at(day, 22), LogStatus::Pending),
        ];

        DayScenario {
            medications: vec![aspirin, metformin, vitamin_d],
            logs,
            now: at(day, 19),
            expected_adherence: 0.6,
            expected_next_dose: Some(at(day, 22)),
        }
    }

    // ========================================================================
    // LEGACY STORES
    // ========================================================================

    /// Rows as the flat V1 health metric table held them
    pub fn legacy_metric_rows() -> Vec<LegacyMetricRow> {
        vec![
            LegacyMetricRow {
                id: Uuid::new_v4().to_string(),
                metric_type: "bloodPressure",
                value: 0.0,
                systolic: Some(128.0),
                diastolic: Some(84.0),
                recorded_at: "2026-10-16T08:00:00.000000Z",
            },
            LegacyMetricRow {
                id: Uuid::new_v4().to_string(),
                metric_type: "mood",
                value: 4.0,
                systolic: None,
                diastolic: None,
                recorded_at: "2026-10-17T21:00:00.000000Z",
            },
            LegacyMetricRow {
                id: Uuid::new_v4().to_string(),
                metric_type: "weight",
                value: 71.5,
                systolic: None,
                diastolic: None,
                recorded_at: "2026-10-18T07:30:00.000000Z",
            },
        ]
    }

    /// Write legacy metric rows into a store at V1
    pub fn insert_legacy_metrics(conn: &Connection, rows: &[LegacyMetricRow]) {
        for row in rows {
            conn.execute(
                "INSERT INTO health_metrics (id, metric_type, value, systolic, diastolic, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    row.metric_type,
                    row.value,
                    row.systolic,
                    row.diastolic,
                    row.recorded_at
                ],
            )
            .expect("Failed to insert legacy metric");
        }
    }

    /// One medication written straight into a V1 store
    pub fn insert_legacy_medication(conn: &Connection, id: &str, name: &str) {
        conn.execute(
            "INSERT INTO medications (id, name, dosage, strength, is_active, created_at)
             VALUES (?1, ?2, '1 tablet', '100mg', 1, '2026-09-01T08:00:00.000000Z')",
            params![id, name],
        )
        .expect("Failed to insert legacy medication");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestContainer;

    #[test]
    fn test_evening_scenario_shape() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let tc = TestContainer::new_temp(at(day, 19));
        let mut store = tc.open_store();
        let scenario = TestDataFactory::evening_scenario(&mut store, day);

        assert_eq!(scenario.medications.len(), 3);
        assert_eq!(scenario.logs.len(), 5);
        let completed = scenario.logs.iter().filter(|l| l.status.is_completed()).count();
        assert_eq!(completed, 3);
    }

    #[test]
    fn test_legacy_rows_fit_v1_schema() {
        let tc = TestContainer::new_temp(Utc::now());
        let conn = tc.seed_store_at(dosemate_core::schema::history::V1_0_0);
        TestDataFactory::insert_legacy_metrics(&conn, &TestDataFactory::legacy_metric_rows());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM health_metrics", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }
}
