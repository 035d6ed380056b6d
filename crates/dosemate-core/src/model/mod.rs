//! Domain model - medications, dose logs and health metrics
//!
//! These are the entities owned by the entity store. The snapshot builder
//! only ever reads them.

mod color;
mod measurement;

pub use color::{ParseColorError, StatusColor};
pub use measurement::{
    EntryError, HealthMetric, ManualEntry, Measurement, MetricKind, MoodLevel, ScalarMetric,
    StatisticsPeriod,
};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// MEDICATION
// ============================================================================

/// A medication the owner takes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    /// Free-text dosage, e.g. "1 tablet"
    pub dosage: String,
    /// Strength printed on the package, e.g. "500mg"
    pub strength: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Medication {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>, strength: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            dosage: dosage.into(),
            strength: strength.into(),
            is_active: true,
            // Stored with microsecond precision
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Dosage for display; falls back to strength when dosage is empty
    pub fn display_dosage(&self) -> &str {
        if self.dosage.is_empty() {
            &self.strength
        } else {
            &self.dosage
        }
    }
}

// ============================================================================
// DOSE LOG
// ============================================================================

/// Status of one scheduled dose
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    #[default]
    Pending,
    Taken,
    Skipped,
    Delayed,
    Snoozed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "pending",
            LogStatus::Taken => "taken",
            LogStatus::Skipped => "skipped",
            LogStatus::Delayed => "delayed",
            LogStatus::Snoozed => "snoozed",
        }
    }

    /// Taken and delayed doses both count towards adherence
    pub fn is_completed(&self) -> bool {
        matches!(self, LogStatus::Taken | LogStatus::Delayed)
    }

    pub fn color(&self) -> StatusColor {
        match self {
            LogStatus::Pending => StatusColor::new(0x00, 0x7A, 0xFF),
            LogStatus::Taken => StatusColor::new(0x34, 0xC7, 0x59),
            LogStatus::Skipped => StatusColor::new(0xFF, 0x3B, 0x30),
            LogStatus::Delayed => StatusColor::new(0xFF, 0x95, 0x00),
            LogStatus::Snoozed => StatusColor::new(0xAF, 0x52, 0xDE),
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LogStatus::Pending),
            "taken" => Ok(LogStatus::Taken),
            "skipped" => Ok(LogStatus::Skipped),
            "delayed" => Ok(LogStatus::Delayed),
            "snoozed" => Ok(LogStatus::Snoozed),
            _ => Err(format!("Unknown log status: {}", s)),
        }
    }
}

/// One scheduled dose and what happened to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLog {
    pub id: Uuid,
    /// None when the medication was deleted after the log was written
    pub medication_id: Option<Uuid>,
    pub scheduled_time: DateTime<Utc>,
    pub taken_time: Option<DateTime<Utc>>,
    pub status: LogStatus,
    pub notes: Option<String>,
}

impl MedicationLog {
    pub fn scheduled(medication_id: Uuid, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id: Some(medication_id),
            scheduled_time,
            taken_time: None,
            status: LogStatus::Pending,
            notes: None,
        }
    }

    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.status = status;
        self
    }
}
