//! Snapshot Builder
//!
//! Computes the small, denormalized summary published to the display
//! surface: today's first doses, the adherence rate and the next pending
//! dose. Building only reads the store.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{LogStatus, Medication, MedicationLog, StatusColor};
use crate::store::{
    EntityStore, FetchDescriptor, Predicate, SortKey, StoreError, timestamp_value, uuid_value,
};

/// Dose items carried by one snapshot
pub const MAX_ITEMS: usize = 3;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No local midnight on {0}")]
    DayBoundary(NaiveDate),
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Display-ready projection of one scheduled dose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseSnapshotItem {
    pub id: Uuid,
    pub name: String,
    pub dosage: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: String,
    /// `#RRGGBB`
    pub status_color_hex: String,
}

impl DoseSnapshotItem {
    pub fn new(log: &MedicationLog, medication: &Medication) -> Self {
        Self {
            id: log.id,
            name: medication.name.clone(),
            dosage: medication.display_dosage().to_string(),
            scheduled_time: log.scheduled_time,
            status: log.status.as_str().to_string(),
            status_color_hex: log.status.color().to_hex(),
        }
    }

    /// Decoded status colour; grey if the hex is malformed
    pub fn status_color(&self) -> StatusColor {
        StatusColor::from_hex_or_gray(&self.status_color_hex)
    }
}

/// Unit published through the cross-process channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub medications: Vec<DoseSnapshotItem>,
    pub adherence_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_dose: Option<DoseSnapshotItem>,
    pub updated_at: DateTime<Utc>,
}

impl DataSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            medications: Vec::new(),
            adherence_rate: 0.0,
            next_dose: None,
            updated_at: now,
        }
    }

    /// Summarise one day's logs
    ///
    /// `logs` must all fall in the day being summarised. Logs whose
    /// medication is missing from `medications` produce no item.
    pub fn from_logs(
        logs: &[MedicationLog],
        medications: &HashMap<Uuid, Medication>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut ordered: Vec<&MedicationLog> = logs.iter().collect();
        ordered.sort_by_key(|log| log.scheduled_time);

        let item = |log: &MedicationLog| {
            log.medication_id
                .and_then(|id| medications.get(&id))
                .map(|med| DoseSnapshotItem::new(log, med))
        };

        let items = ordered
            .iter()
            .take(MAX_ITEMS)
            .filter_map(|log| item(*log))
            .collect();

        let completed = ordered.iter().filter(|log| log.status.is_completed()).count();
        let adherence_rate = if ordered.is_empty() {
            0.0
        } else {
            completed as f64 / ordered.len() as f64
        };

        // A dose due exactly now is not "next"
        let next_dose = ordered
            .iter()
            .find(|log| log.status == LogStatus::Pending && log.scheduled_time > now)
            .and_then(|log| item(*log));

        Self {
            medications: items,
            adherence_rate,
            next_dose,
            updated_at: now,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ============================================================================
// DAY WINDOW
// ============================================================================

/// `[start of day, start of next day)` in the caller's timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Self, SnapshotError> {
        let tz = now.timezone();
        let day = now.date_naive();
        let next = day.succ_opt().ok_or(SnapshotError::DayBoundary(day))?;
        Ok(Self {
            start: start_of_day(&tz, day)?,
            end: start_of_day(&tz, next)?,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// First instant of `day`; days whose midnight falls in a DST gap start at
/// the first valid hour
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Result<DateTime<Utc>, SnapshotError> {
    (0..=3)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(SnapshotError::DayBoundary(day))
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct SnapshotBuilder<'a, S: EntityStore> {
    store: &'a S,
}

impl<'a, S: EntityStore> SnapshotBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Today's logs, ascending by scheduled time
    pub fn todays_logs<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Vec<MedicationLog>, SnapshotError> {
        let window = DayWindow::containing(now)?;
        let descriptor = FetchDescriptor::<MedicationLog>::new()
            .filter(Predicate::between(
                "scheduled_time",
                timestamp_value(&window.start),
                timestamp_value(&window.end),
            ))
            .sort(SortKey::ascending("scheduled_time"));
        Ok(self.store.fetch(&descriptor)?)
    }

    /// Snapshot of the day containing `now`
    pub fn build<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<DataSnapshot, SnapshotError> {
        let logs = self.todays_logs(&now)?;

        let mut ids: Vec<Uuid> = logs.iter().filter_map(|log| log.medication_id).collect();
        ids.sort();
        ids.dedup();
        let descriptor = FetchDescriptor::<Medication>::new()
            .filter(Predicate::In("id", ids.iter().map(uuid_value).collect()));
        let medications: HashMap<Uuid, Medication> = self
            .store
            .fetch(&descriptor)?
            .into_iter()
            .map(|med| (med.id, med))
            .collect();

        let snapshot = DataSnapshot::from_logs(&logs, &medications, now.with_timezone(&Utc));
        tracing::debug!(
            doses = logs.len(),
            items = snapshot.medications.len(),
            has_next = snapshot.next_dose.is_some(),
            "Built snapshot"
        );
        Ok(snapshot)
    }
}
