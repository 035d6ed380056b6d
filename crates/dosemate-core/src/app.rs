//! Process startup
//!
//! Order matters: nothing touches the store until the migration gate has
//! finished.
//!
//! 1. resolve the shared container (fatal if missing)
//! 2. validate the schema registry (fatal if malformed)
//! 3. evaluate the cloud sync gate
//! 4. run the migration coordinator
//! 5. prune old backups
//! 6. open the store in the decided sync mode
//! 7. publish an initial snapshot

use std::path::PathBuf;
use std::sync::Arc;

use crate::backup::BackupManager;
use crate::channel::{Defaults, SnapshotChannel};
use crate::clock::Clock;
use crate::config::{AppConfig, ConfigError, SharedContainer};
use crate::migration::{MigrationCoordinator, MigrationError, MigrationReport};
use crate::publisher::{SnapshotPublisher, refresh_once};
use crate::schema::{RegistryError, SchemaRegistry, history};
use crate::store::{SqliteStore, StoreError, SyncMode};
use crate::sync_gate::{self, AccountProbe};

/// App-private preferences file
pub const PREFERENCES_FILE: &str = "com.bbdyno.DoseMate.json";

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Schema registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BootstrapError {
    /// Store may be inconsistent; the owner has to be told
    pub fn is_recovery_failure(&self) -> bool {
        matches!(
            self,
            BootstrapError::Migration(MigrationError::RecoveryFailed { .. })
        )
    }
}

/// Everything a running primary process needs
pub struct AppContext {
    pub config: AppConfig,
    pub container: SharedContainer,
    pub registry: Arc<SchemaRegistry>,
    pub sync_mode: SyncMode,
    pub migration: MigrationReport,
    pub backups: BackupManager,
    pub store: SqliteStore,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Hand the store to a publisher worker
    pub fn spawn_publisher(self) -> SnapshotPublisher {
        let channel = SnapshotChannel::for_container(&self.container);
        SnapshotPublisher::spawn(self.store, channel, self.clock)
    }
}

pub fn preferences(config: &AppConfig, container: &SharedContainer) -> Defaults {
    let dir: PathBuf = config.resolve_preferences_dir(container);
    Defaults::open(dir.join(PREFERENCES_FILE))
}

pub fn bootstrap(
    config: AppConfig,
    clock: Arc<dyn Clock>,
    probe: &dyn AccountProbe,
) -> Result<AppContext, BootstrapError> {
    let container = config.resolve_container()?;
    tracing::info!(container = %container.root().display(), "Shared container resolved");

    let registry = Arc::new(history::registry()?);
    tracing::info!(
        current = %registry.current_version().id,
        versions = registry.versions().len(),
        "Schema registry validated"
    );

    let sync_mode = sync_gate::evaluate(&preferences(&config, &container), probe);

    let backups = BackupManager::new(container.clone(), clock.clone());
    let mut coordinator = MigrationCoordinator::new(registry.clone(), backups.clone());
    let migration = coordinator.run()?;

    match backups.cleanup_old_backups(config.backup_retention) {
        Ok(report) if !report.failed.is_empty() => {
            tracing::warn!(failed = report.failed.len(), "Some old backups could not be removed")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Backup cleanup skipped"),
    }

    let store = SqliteStore::open(&container.store_path(), sync_mode)?;

    let channel = SnapshotChannel::for_container(&container);
    if let Err(e) = refresh_once(&store, &channel, clock.as_ref()) {
        tracing::warn!(error = %e, "Initial snapshot publish failed");
    }

    Ok(AppContext {
        config,
        container,
        registry,
        sync_mode,
        migration,
        backups,
        store,
        clock,
    })
}
