//! Row mappings for the domain entities

use rusqlite::Row;
use rusqlite::types::{Type, Value};
use uuid::Uuid;

use super::{Entity, Result, decode_timestamp, encode_timestamp};
use crate::model::{HealthMetric, Measurement, Medication, MedicationLog};

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    decode_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_opt_timestamp(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| decode_timestamp(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

impl Entity for Medication {
    const KIND: &'static str = "medications";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "dosage", "strength", "is_active", "created_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            name: row.get(1)?,
            dosage: row.get(2)?,
            strength: row.get(3)?,
            is_active: row.get(4)?,
            created_at: get_timestamp(row, 5)?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id.to_string()),
            text(&self.name),
            text(&self.dosage),
            text(&self.strength),
            Value::Integer(i64::from(self.is_active)),
            text(&encode_timestamp(&self.created_at)),
        ])
    }
}

impl Entity for MedicationLog {
    const KIND: &'static str = "medication_logs";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "medication_id",
        "scheduled_time",
        "taken_time",
        "status",
        "notes",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        Ok(Self {
            id: get_uuid(row, 0)?,
            medication_id: get_opt_uuid(row, 1)?,
            scheduled_time: get_timestamp(row, 2)?,
            taken_time: get_opt_timestamp(row, 3)?,
            // Unknown statuses written by a newer build read as pending
            status: status.parse().unwrap_or_default(),
            notes: row.get(5)?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id.to_string()),
            opt_text(self.medication_id.map(|id| id.to_string()).as_deref()),
            text(&encode_timestamp(&self.scheduled_time)),
            opt_text(self.taken_time.map(|t| encode_timestamp(&t)).as_deref()),
            text(self.status.as_str()),
            opt_text(self.notes.as_deref()),
        ])
    }
}

impl Entity for HealthMetric {
    const KIND: &'static str = "health_metrics";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "metric_type",
        "measurement",
        "notes",
        "recorded_at",
        "medication_id",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(2)?;
        let measurement: Measurement =
            serde_json::from_str(&raw).map_err(|e| conversion_error(2, e))?;
        Ok(Self {
            id: get_uuid(row, 0)?,
            measurement,
            notes: row.get(3)?,
            recorded_at: get_timestamp(row, 4)?,
            medication_id: get_opt_uuid(row, 5)?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id.to_string()),
            text(self.kind().as_str()),
            Value::Text(serde_json::to_string(&self.measurement)?),
            opt_text(self.notes.as_deref()),
            text(&encode_timestamp(&self.recorded_at)),
            opt_text(self.medication_id.map(|id| id.to_string()).as_deref()),
        ])
    }
}
