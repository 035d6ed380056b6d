//! Test Container Manager
//!
//! Provides isolated shared containers for testing:
//! - Temporary container directories that are automatically cleaned up
//! - A pinned clock shared by backups and snapshots
//! - Stores created at any shipped schema version

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dosemate_core::schema::history;
use dosemate_core::{
    AppConfig, BackupManager, Clock, FixedClock, MigrationCoordinator, SchemaRegistry,
    SharedContainer, SnapshotChannel, SqliteStore, SyncMode, VersionId,
};
use rusqlite::Connection;
use tempfile::TempDir;

/// Group identifier used by every test container
pub const TEST_GROUP_ID: &str = "group.com.bbdyno.app.doseMate.tests";

/// Manager for test containers
///
/// Each test gets its own container directory, playing the role of the
/// shared directory both processes can reach. Deleted when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let tc = TestContainer::new_temp(now);
/// let mut store = tc.open_store();
/// // ... insert logs, build a snapshot, publish through tc.channel()
/// ```
pub struct TestContainer {
    /// The shared container
    pub container: SharedContainer,
    /// Clock used for backup names and snapshot times
    pub clock: Arc<FixedClock>,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: TempDir,
}

impl TestContainer {
    /// Create an empty container with the clock pinned at `now`
    pub fn new_temp(now: DateTime<Utc>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let container =
            SharedContainer::open(temp_dir.path(), TEST_GROUP_ID).expect("Failed to open container");

        Self {
            container,
            clock: Arc::new(FixedClock::new(now)),
            _temp_dir: temp_dir,
        }
    }

    /// Container root
    pub fn path(&self) -> &Path {
        self.container.root()
    }

    pub fn store_path(&self) -> PathBuf {
        self.container.store_path()
    }

    /// Configuration pointing at this container
    pub fn config(&self) -> AppConfig {
        AppConfig {
            group_id: TEST_GROUP_ID.to_string(),
            ..AppConfig::default()
        }
        .with_container_dir(self.path())
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.container.clone(), self.clock())
    }

    /// Coordinator for `registry` over this container
    pub fn coordinator(&self, registry: SchemaRegistry) -> MigrationCoordinator {
        MigrationCoordinator::new(Arc::new(registry), self.backups())
    }

    /// Channel handle as any process would open it
    pub fn channel(&self) -> SnapshotChannel {
        SnapshotChannel::for_container(&self.container)
    }

    // ========================================================================
    // STORE
    // ========================================================================

    /// Run the production migration gate, then open the store
    pub fn open_store(&self) -> SqliteStore {
        let registry = history::registry().expect("Production registry is invalid");
        self.coordinator(registry)
            .run()
            .expect("Migration gate failed");
        SqliteStore::open(&self.store_path(), SyncMode::LocalOnly).expect("Failed to open store")
    }

    /// Create the store at a shipped `version` without going any further
    pub fn seed_store_at(&self, version: VersionId) -> Connection {
        let registry = history::registry().expect("Production registry is invalid");
        let mut conn = Connection::open(self.store_path()).expect("Failed to create store file");

        for step in registry.steps_from(None).expect("Chain from origin") {
            let reached = step.to.id;
            registry
                .apply_step(&mut conn, &step)
                .expect("Failed to apply shipped version");
            if reached == version {
                break;
            }
        }
        conn
    }

    /// Version string recorded inside the store file
    pub fn recorded_version(&self) -> Option<String> {
        let conn = Connection::open(self.store_path()).ok()?;
        dosemate_core::schema::read_recorded_version(&conn).ok().flatten()
    }

    pub fn backup_count(&self) -> usize {
        self.backups().list_backups().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 19, 0, 0).unwrap()
    }

    #[test]
    fn test_temp_container_creation() {
        let tc = TestContainer::new_temp(now());
        assert!(tc.path().is_dir());
        assert!(!tc.store_path().exists());
        assert_eq!(tc.backup_count(), 0);
    }

    #[test]
    fn test_open_store_creates_current_version() {
        let tc = TestContainer::new_temp(now());
        let _store = tc.open_store();
        assert_eq!(tc.recorded_version().as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_seed_store_stops_at_version() {
        let tc = TestContainer::new_temp(now());
        drop(tc.seed_store_at(history::V1_0_0));
        assert_eq!(tc.recorded_version().as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_config_resolves_to_container() {
        let tc = TestContainer::new_temp(now());
        let container = tc.config().resolve_container().unwrap();
        assert_eq!(container.root(), tc.path());
        assert_eq!(container.group_id(), TEST_GROUP_ID);
    }
}
