//! Health metric and medication queries

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::model::{
    EntryError, HealthMetric, ManualEntry, Medication, MetricKind, StatisticsPeriod,
};
use crate::store::{EntityStore, FetchDescriptor, Predicate, SortKey, StoreError, timestamp_value};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Shown to the owner as is
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn kind_filter(kind: MetricKind) -> Predicate {
    Predicate::Eq("metric_type", Value::Text(kind.as_str().to_string()))
}

/// Most recent reading of `kind`
pub fn latest_metric<S: EntityStore>(
    store: &S,
    kind: MetricKind,
) -> Result<Option<HealthMetric>, StoreError> {
    let descriptor = FetchDescriptor::<HealthMetric>::new()
        .filter(kind_filter(kind))
        .sort(SortKey::descending("recorded_at"))
        .limit(1);
    Ok(store.fetch(&descriptor)?.into_iter().next())
}

/// Most recent reading of every kind that has one
pub fn latest_metrics<S: EntityStore>(
    store: &S,
) -> Result<BTreeMap<MetricKind, HealthMetric>, StoreError> {
    let mut latest = BTreeMap::new();
    for kind in MetricKind::ALL {
        if let Some(metric) = latest_metric(store, kind)? {
            latest.insert(kind, metric);
        }
    }
    Ok(latest)
}

/// Readings of `kind` in `period` ending at `now`, oldest first
pub fn metric_history<S: EntityStore>(
    store: &S,
    kind: MetricKind,
    period: StatisticsPeriod,
    now: DateTime<Utc>,
) -> Result<Vec<HealthMetric>, StoreError> {
    let descriptor = FetchDescriptor::<HealthMetric>::new()
        .filter(Predicate::And(vec![
            kind_filter(kind),
            Predicate::Ge("recorded_at", timestamp_value(&period.start(now))),
            Predicate::Le("recorded_at", timestamp_value(&now)),
        ]))
        .sort(SortKey::ascending("recorded_at"));
    store.fetch(&descriptor)
}

/// Active medications sorted by name
pub fn active_medications<S: EntityStore>(store: &S) -> Result<Vec<Medication>, StoreError> {
    let descriptor = FetchDescriptor::<Medication>::new()
        .filter(Predicate::Eq("is_active", Value::Integer(1)))
        .sort(SortKey::ascending("name"));
    store.fetch(&descriptor)
}

/// Parse a manual entry and save it as a new reading
pub fn record_metric<S: EntityStore>(
    store: &mut S,
    kind: MetricKind,
    entry: &ManualEntry,
    notes: Option<String>,
    medication_id: Option<Uuid>,
    recorded_at: DateTime<Utc>,
) -> Result<HealthMetric, RecordError> {
    let measurement = entry.parse(kind)?;
    let mut metric = HealthMetric::new(measurement, recorded_at);
    metric.notes = notes.filter(|n| !n.trim().is_empty());
    metric.medication_id = medication_id;

    store.insert(&metric)?;
    store.save()?;
    tracing::info!(kind = %kind, "Recorded health metric");
    Ok(metric)
}
