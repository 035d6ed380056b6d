//! Store schema history
//!
//! Shipped store shapes, oldest first. New versions are appended; a shipped
//! version is never edited.

use rusqlite::{Connection, params};

use super::{HookError, MigrationStage, RegistryError, SchemaRegistry, SchemaVersion, VersionId};
use crate::model::{Measurement, MetricKind, MoodLevel};

pub const V1_0_0: VersionId = VersionId::new(1, 0, 0);
pub const V1_1_0: VersionId = VersionId::new(1, 1, 0);
pub const V2_0_0: VersionId = VersionId::new(2, 0, 0);

const ENTITIES: &[&str] = &["medications", "medication_logs", "health_metrics"];

/// V1: medications, dose logs, flat health metrics
const V1_0_0_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS medications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    dosage TEXT NOT NULL DEFAULT '',
    strength TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medication_logs (
    id TEXT PRIMARY KEY,
    medication_id TEXT REFERENCES medications(id) ON DELETE SET NULL,
    scheduled_time TEXT NOT NULL,
    taken_time TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_logs_scheduled ON medication_logs(scheduled_time);
CREATE INDEX IF NOT EXISTS idx_logs_medication ON medication_logs(medication_id);

CREATE TABLE IF NOT EXISTS health_metrics (
    id TEXT PRIMARY KEY,
    metric_type TEXT NOT NULL,
    value REAL NOT NULL DEFAULT 0,
    systolic REAL,
    diastolic REAL,
    notes TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_type_recorded ON health_metrics(metric_type, recorded_at);
"#;

/// V1.1: link metrics to a medication
const V1_1_0_DDL: &str = r#"
ALTER TABLE health_metrics ADD COLUMN medication_id TEXT REFERENCES medications(id) ON DELETE SET NULL;
"#;

/// V2: tagged measurement payload replaces the flat value columns
const V2_0_0_DDL: &str = r#"
ALTER TABLE health_metrics ADD COLUMN measurement TEXT;
"#;

pub fn versions() -> Vec<SchemaVersion> {
    vec![
        SchemaVersion {
            id: V1_0_0,
            description: "Initial schema",
            entities: ENTITIES,
            ddl: V1_0_0_DDL,
        },
        SchemaVersion {
            id: V1_1_0,
            description: "Link health metrics to medications",
            entities: ENTITIES,
            ddl: V1_1_0_DDL,
        },
        SchemaVersion {
            id: V2_0_0,
            description: "Tagged health metric measurements",
            entities: ENTITIES,
            ddl: V2_0_0_DDL,
        },
    ]
}

/// 1.0.0 -> 1.1.0 is lightweight; only 1.1.0 -> 2.0.0 needs a backfill
pub fn stages() -> Vec<MigrationStage> {
    vec![MigrationStage::custom(V1_1_0, V2_0_0).did_migrate(backfill_measurements)]
}

pub fn registry() -> Result<SchemaRegistry, RegistryError> {
    SchemaRegistry::new(versions(), stages())
}

/// Fill `measurement` from the legacy columns. Rows that already carry one
/// are left alone, so running twice is harmless.
fn backfill_measurements(conn: &Connection) -> Result<(), HookError> {
    let legacy = {
        let mut stmt = conn.prepare(
            "SELECT id, metric_type, value, systolic, diastolic
             FROM health_metrics WHERE measurement IS NULL",
        )?;
        stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut update = conn.prepare(
        "UPDATE health_metrics SET measurement = ?1 WHERE id = ?2 AND measurement IS NULL",
    )?;
    for (id, metric_type, value, systolic, diastolic) in &legacy {
        let measurement = legacy_measurement(metric_type, *value, *systolic, *diastolic)?;
        update.execute(params![serde_json::to_string(&measurement)?, id])?;
    }

    tracing::info!(rows = legacy.len(), "Backfilled health metric measurements");
    Ok(())
}

fn legacy_measurement(
    metric_type: &str,
    value: f64,
    systolic: Option<f64>,
    diastolic: Option<f64>,
) -> Result<Measurement, HookError> {
    let kind: MetricKind = metric_type.parse().map_err(HookError::Data)?;
    Ok(match kind {
        MetricKind::BloodPressure => Measurement::BloodPressure {
            systolic: systolic.unwrap_or(0.0),
            diastolic: diastolic.unwrap_or(0.0),
        },
        MetricKind::Mood => Measurement::Mood {
            level: MoodLevel::try_from(value.round().clamp(0.0, 255.0) as u8).unwrap_or_default(),
        },
        other => Measurement::Scalar {
            metric: other
                .scalar()
                .ok_or_else(|| HookError::Data(format!("No scalar form for {}", other)))?,
            value,
        },
    })
}
