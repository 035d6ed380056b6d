//! Health metrics as a closed set of measurement kinds

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every kind of metric the owner can record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    BloodPressure,
    Mood,
    BloodSugar,
    Weight,
    HeartRate,
    BodyTemperature,
    OxygenSaturation,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::BloodPressure,
        MetricKind::Mood,
        MetricKind::BloodSugar,
        MetricKind::Weight,
        MetricKind::HeartRate,
        MetricKind::BodyTemperature,
        MetricKind::OxygenSaturation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::BloodPressure => "bloodPressure",
            MetricKind::Mood => "mood",
            MetricKind::BloodSugar => "bloodSugar",
            MetricKind::Weight => "weight",
            MetricKind::HeartRate => "heartRate",
            MetricKind::BodyTemperature => "bodyTemperature",
            MetricKind::OxygenSaturation => "oxygenSaturation",
        }
    }

    /// The scalar metric for this kind, if it carries a single value
    pub fn scalar(&self) -> Option<ScalarMetric> {
        match self {
            MetricKind::BloodPressure | MetricKind::Mood => None,
            MetricKind::BloodSugar => Some(ScalarMetric::BloodSugar),
            MetricKind::Weight => Some(ScalarMetric::Weight),
            MetricKind::HeartRate => Some(ScalarMetric::HeartRate),
            MetricKind::BodyTemperature => Some(ScalarMetric::BodyTemperature),
            MetricKind::OxygenSaturation => Some(ScalarMetric::OxygenSaturation),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown metric kind: {}", s))
    }
}

/// Metrics recorded as a single number
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ScalarMetric {
    BloodSugar,
    Weight,
    HeartRate,
    BodyTemperature,
    OxygenSaturation,
}

impl ScalarMetric {
    pub fn kind(&self) -> MetricKind {
        match self {
            ScalarMetric::BloodSugar => MetricKind::BloodSugar,
            ScalarMetric::Weight => MetricKind::Weight,
            ScalarMetric::HeartRate => MetricKind::HeartRate,
            ScalarMetric::BodyTemperature => MetricKind::BodyTemperature,
            ScalarMetric::OxygenSaturation => MetricKind::OxygenSaturation,
        }
    }
}

/// Five-step mood scale (1 = very bad, 5 = very good)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum MoodLevel {
    VeryBad = 1,
    Bad = 2,
    #[default]
    Neutral = 3,
    Good = 4,
    VeryGood = 5,
}

impl TryFrom<u8> for MoodLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MoodLevel::VeryBad),
            2 => Ok(MoodLevel::Bad),
            3 => Ok(MoodLevel::Neutral),
            4 => Ok(MoodLevel::Good),
            5 => Ok(MoodLevel::VeryGood),
            other => Err(format!("Mood level out of range: {}", other)),
        }
    }
}

impl From<MoodLevel> for u8 {
    fn from(level: MoodLevel) -> Self {
        level as u8
    }
}

/// One recorded value; each kind carries its own payload shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Measurement {
    BloodPressure { systolic: f64, diastolic: f64 },
    Mood { level: MoodLevel },
    Scalar { metric: ScalarMetric, value: f64 },
}

impl Measurement {
    pub fn kind(&self) -> MetricKind {
        match self {
            Measurement::BloodPressure { .. } => MetricKind::BloodPressure,
            Measurement::Mood { .. } => MetricKind::Mood,
            Measurement::Scalar { metric, .. } => metric.kind(),
        }
    }
}

/// A health metric entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    pub id: Uuid,
    pub measurement: Measurement,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Medication the owner associated with this reading
    pub medication_id: Option<Uuid>,
}

impl HealthMetric {
    pub fn new(measurement: Measurement, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            measurement,
            notes: None,
            recorded_at,
            medication_id: None,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.measurement.kind()
    }
}

// ============================================================================
// MANUAL ENTRY
// ============================================================================

/// Manual entry failed; `message` is safe to show to the owner
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EntryError {
    pub message: String,
}

impl EntryError {
    fn invalid_value() -> Self {
        Self {
            message: "Please enter a valid value.".to_string(),
        }
    }
}

/// Raw strings as typed into an entry form
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub value: String,
    pub systolic: String,
    pub diastolic: String,
    pub mood: MoodLevel,
}

impl ManualEntry {
    /// Parse into a measurement of `kind`
    pub fn parse(&self, kind: MetricKind) -> Result<Measurement, EntryError> {
        match kind {
            MetricKind::BloodPressure => Ok(Measurement::BloodPressure {
                systolic: parse_number(&self.systolic)?,
                diastolic: parse_number(&self.diastolic)?,
            }),
            MetricKind::Mood => Ok(Measurement::Mood { level: self.mood }),
            scalar => {
                let metric = scalar.scalar().ok_or_else(EntryError::invalid_value)?;
                Ok(Measurement::Scalar {
                    metric,
                    value: parse_number(&self.value)?,
                })
            }
        }
    }
}

fn parse_number(raw: &str) -> Result<f64, EntryError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(EntryError::invalid_value)
}

// ============================================================================
// STATISTICS PERIOD
// ============================================================================

/// Window for metric history queries, ending at "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum StatisticsPeriod {
    #[default]
    Week,
    Month,
    ThreeMonths,
    Year,
}

impl StatisticsPeriod {
    /// Start of the window that ends at `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            StatisticsPeriod::Week => return now - Duration::days(7),
            StatisticsPeriod::Month => 1,
            StatisticsPeriod::ThreeMonths => 3,
            StatisticsPeriod::Year => 12,
        };
        now.checked_sub_months(Months::new(months)).unwrap_or(now)
    }
}
