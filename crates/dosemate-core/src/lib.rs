//! # DoseMate Core
//!
//! Data layer shared by the DoseMate app and its display surface (the
//! home-screen widget). The widget runs in its own process and cannot open
//! the store, so the app publishes a small summary for it instead.
//!
//! - **Entity Store**: SQLite persistence for medications, dose logs and
//!   health metrics, behind the [`EntityStore`] trait
//! - **Schema Registry**: validated chain of store versions and the stages
//!   between them
//! - **Migration Coordinator**: startup gate that backs the store up,
//!   migrates it, and restores the backup if a stage fails
//! - **Backup Manager**: timestamped copies of the store with retention
//! - **Snapshot Builder**: today's doses, adherence rate and next dose
//! - **Cross-Process Channel**: shared key-value suite plus a reload signal
//! - **Cloud Sync Gate**: startup decision on remote replication
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dosemate_core::{AppConfig, SystemClock, SnapshotChannel, bootstrap};
//! use std::sync::Arc;
//!
//! // Primary process
//! let ctx = bootstrap(AppConfig::from_env()?, Arc::new(SystemClock), &probe)?;
//!
//! // Display surface, any time, possibly before the first publish
//! let snapshot = SnapshotChannel::for_container(&ctx.container).read();
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Compile SQLite into the binary
//! - `encryption`: SQLCipher; the key is read from `DOSEMATE_ENCRYPTION_KEY`

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod app;
pub mod backup;
pub mod channel;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod publisher;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod sync_gate;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use app::{AppContext, BootstrapError, bootstrap};
pub use backup::{BackupError, BackupManager, CleanupReport, StoreBackup};
pub use channel::{
    ChannelError, Defaults, DefaultsValue, DisplayRefresh, LAST_UPDATE_KEY, ReloadMarker,
    SNAPSHOT_KEY, SnapshotChannel, SnapshotWatcher, watch_snapshots,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, SharedContainer};
pub use migration::{
    MigrationCoordinator, MigrationError, MigrationOutcome, MigrationReport, MigrationState,
};
pub use model::{
    EntryError, HealthMetric, LogStatus, ManualEntry, Measurement, Medication, MedicationLog,
    MetricKind, MoodLevel, ScalarMetric, StatisticsPeriod, StatusColor,
};
pub use publisher::{PublishError, RefreshTrigger, SnapshotPublisher, refresh_once};
pub use schema::{
    HookError, MigrationStage, RegistryError, SchemaRegistry, SchemaVersion, StageError,
    VersionId,
};
pub use snapshot::{DataSnapshot, DayWindow, DoseSnapshotItem, SnapshotBuilder, SnapshotError};
pub use store::{
    Entity, EntityStore, FetchDescriptor, Predicate, SortKey, SqliteStore, StoreError, SyncMode,
};
pub use sync_gate::{AccountProbe, IdentityTokenProbe, SyncGateInputs};

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AppConfig, Clock, DataSnapshot, EntityStore, FetchDescriptor, LogStatus, Medication,
        MedicationLog, Predicate, SharedContainer, SnapshotBuilder, SnapshotChannel, SortKey,
        SqliteStore, SyncMode, SystemClock,
    };
}
