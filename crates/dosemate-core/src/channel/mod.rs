//! Cross-Process Channel
//!
//! The only path from the primary process to the display surface: a shared
//! key-value suite plus a refresh signal. Last publish wins; a reader may
//! see a stale snapshot, or none at all before the first publish.

mod defaults;
mod refresh;

pub use defaults::{Defaults, DefaultsValue};
pub use refresh::{DisplayRefresh, ReloadMarker, SnapshotWatcher, watch_snapshots};

use chrono::{DateTime, Utc};

use crate::config::SharedContainer;
use crate::snapshot::DataSnapshot;

/// Serialized [`DataSnapshot`]
pub const SNAPSHOT_KEY: &str = "widgetMedicationData";
/// Generation time of the stored snapshot
pub const LAST_UPDATE_KEY: &str = "widgetLastUpdate";

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub struct SnapshotChannel {
    defaults: Defaults,
    refresh: Box<dyn DisplayRefresh>,
}

impl SnapshotChannel {
    pub fn new(defaults: Defaults, refresh: impl DisplayRefresh + 'static) -> Self {
        Self {
            defaults,
            refresh: Box::new(refresh),
        }
    }

    /// Channel over the container's group suite and reload marker
    pub fn for_container(container: &SharedContainer) -> Self {
        Self::new(
            Defaults::open(container.defaults_path()),
            ReloadMarker::new(container.reload_marker_path()),
        )
    }

    /// Store the snapshot, flush, then ask the display surface to reload
    pub fn publish(&self, snapshot: &DataSnapshot) -> Result<(), ChannelError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.defaults.set(SNAPSHOT_KEY, DefaultsValue::Data(bytes));
        self.defaults
            .set(LAST_UPDATE_KEY, DefaultsValue::Date(snapshot.updated_at));
        self.defaults.synchronize()?;

        // Reload timing belongs to the host; a missed signal is picked up next time
        if let Err(e) = self.refresh.request_reload() {
            tracing::warn!(error = %e, "Display reload request failed");
        }

        tracing::debug!(
            items = snapshot.medications.len(),
            updated_at = %snapshot.updated_at,
            "Published snapshot"
        );
        Ok(())
    }

    /// Latest published snapshot; None if absent or unreadable
    pub fn read(&self) -> Option<DataSnapshot> {
        let bytes = self.defaults.data(SNAPSHOT_KEY)?;
        match DataSnapshot::decode(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Stored snapshot could not be decoded");
                None
            }
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.defaults.date(LAST_UPDATE_KEY)
    }
}
