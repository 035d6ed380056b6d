//! Migration Coordinator
//!
//! Startup gate that brings the store file to the registry's current
//! version. A migration only starts once a backup of the store exists on
//! disk; any stage failure restores that exact backup.
//!
//! ```text
//! NotChecked -> Checking -> UpToDate
//!                        -> MigrationRequired -> Migrating -> Migrated
//!                                                          -> MigrationFailed
//! ```

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use crate::backup::{BackupError, BackupManager};
use crate::schema::{RegistryError, SchemaRegistry, StageError, VersionId, read_recorded_version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationState {
    #[default]
    NotChecked,
    Checking,
    UpToDate,
    MigrationRequired,
    Migrating,
    Migrated,
    MigrationFailed,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Creating a new store failed: {0}")]
    Bootstrap(#[source] StageError),
    /// Migration was not attempted
    #[error("No backup could be created before migrating: {0}")]
    BackupUnavailable(#[source] BackupError),
    /// Store is back in its pre-migration state
    #[error("Migration failed and the store was restored from {backup}: {source}")]
    RolledBack {
        backup: String,
        #[source]
        source: StageError,
    },
    /// Store may be inconsistent
    #[error("Migration failed ({stage}) and restoring {backup} also failed: {restore}")]
    RecoveryFailed {
        backup: String,
        stage: StageError,
        #[source]
        restore: BackupError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No store existed; one was created at the current version
    Created,
    UpToDate,
    Migrated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// None for a new or unversioned store
    pub from: Option<VersionId>,
    pub to: VersionId,
    pub stages_applied: usize,
    pub outcome: MigrationOutcome,
    /// Backup taken before migrating
    pub backup: Option<String>,
}

pub struct MigrationCoordinator {
    registry: Arc<SchemaRegistry>,
    backups: BackupManager,
    state: MigrationState,
}

impl MigrationCoordinator {
    pub fn new(registry: Arc<SchemaRegistry>, backups: BackupManager) -> Self {
        Self {
            registry,
            backups,
            state: MigrationState::NotChecked,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Version recorded in the store file; None if it has none
    pub fn recorded_version(&self) -> Result<Option<VersionId>, MigrationError> {
        let conn = Connection::open_with_flags(
            self.backups.container().store_path(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        crate::store::apply_key(&conn)?;

        let Some(raw) = read_recorded_version(&conn)? else {
            return Ok(None);
        };
        let version: VersionId = raw.parse()?;
        if !self.registry.contains(version) {
            return Err(RegistryError::UnknownVersion(raw).into());
        }
        Ok(Some(version))
    }

    /// Compare the store on disk with the registry
    pub fn check(&mut self) -> Result<MigrationState, MigrationError> {
        self.state = MigrationState::Checking;

        if !self.backups.container().store_path().exists() {
            self.state = MigrationState::UpToDate;
            return Ok(self.state);
        }

        match self.recorded_version() {
            Ok(recorded) => {
                self.state = if recorded == Some(self.registry.current_version().id) {
                    MigrationState::UpToDate
                } else {
                    MigrationState::MigrationRequired
                };
                Ok(self.state)
            }
            Err(e) => {
                self.state = MigrationState::NotChecked;
                Err(e)
            }
        }
    }

    /// True iff a store file exists and its version is not current
    pub fn needs_migration(&mut self) -> Result<bool, MigrationError> {
        Ok(self.check()? == MigrationState::MigrationRequired)
    }

    /// Create or migrate the store
    ///
    /// Must finish before anything else opens the store.
    pub fn run(&mut self) -> Result<MigrationReport, MigrationError> {
        let registry = Arc::clone(&self.registry);
        let current = registry.current_version().id;
        let store = self.backups.container().store_path();

        if !store.exists() {
            return self.create_fresh(&registry, &store);
        }

        let recorded = self.recorded_version()?;
        if recorded == Some(current) {
            self.state = MigrationState::UpToDate;
            tracing::info!(version = %current, "Store schema is up to date");
            return Ok(MigrationReport {
                from: recorded,
                to: current,
                stages_applied: 0,
                outcome: MigrationOutcome::UpToDate,
                backup: None,
            });
        }

        let steps = registry.steps_from(recorded)?;
        self.state = MigrationState::MigrationRequired;
        tracing::info!(
            from = %recorded.map_or_else(|| "unversioned".to_string(), |v| v.to_string()),
            to = %current,
            stages = steps.len(),
            "Store schema migration required"
        );

        let backup = match self.backups.create_backup() {
            Ok(backup) => backup,
            Err(e) => {
                self.state = MigrationState::MigrationFailed;
                tracing::error!(error = %e, "Refusing to migrate without a backup");
                return Err(MigrationError::BackupUnavailable(e));
            }
        };

        self.state = MigrationState::Migrating;
        let mut conn = match open_store(&store) {
            Ok(conn) => conn,
            Err(e) => {
                // Nothing was applied; the store is as it was
                self.state = MigrationState::MigrationFailed;
                return Err(e);
            }
        };
        let mut applied = 0;
        let mut failure = None;
        for step in &steps {
            if let Err(e) = registry.apply_step(&mut conn, step) {
                failure = Some(e);
                break;
            }
            applied += 1;
        }
        drop(conn);

        let Some(stage) = failure else {
            self.state = MigrationState::Migrated;
            tracing::info!(to = %current, stages = applied, "Store schema migrated");
            return Ok(MigrationReport {
                from: recorded,
                to: current,
                stages_applied: applied,
                outcome: MigrationOutcome::Migrated,
                backup: Some(backup.file_name),
            });
        };

        self.state = MigrationState::MigrationFailed;
        tracing::error!(error = %stage, backup = %backup.file_name, "Migration stage failed, restoring backup");
        match self.backups.restore(&backup) {
            Ok(()) => Err(MigrationError::RolledBack {
                backup: backup.file_name,
                source: stage,
            }),
            Err(restore) => {
                tracing::error!(error = %restore, "Restoring the pre-migration backup failed");
                Err(MigrationError::RecoveryFailed {
                    backup: backup.file_name,
                    stage,
                    restore,
                })
            }
        }
    }

    fn create_fresh(
        &mut self,
        registry: &SchemaRegistry,
        store: &Path,
    ) -> Result<MigrationReport, MigrationError> {
        self.state = MigrationState::Migrating;
        let mut conn = open_store(store)?;
        match registry.bootstrap(&mut conn) {
            Ok(version) => {
                self.state = MigrationState::Migrated;
                tracing::info!(version = %version, "Created new store");
                Ok(MigrationReport {
                    from: None,
                    to: version,
                    stages_applied: registry.versions().len(),
                    outcome: MigrationOutcome::Created,
                    backup: None,
                })
            }
            Err(e) => {
                self.state = MigrationState::MigrationFailed;
                Err(MigrationError::Bootstrap(e))
            }
        }
    }
}

fn open_store(path: &Path) -> Result<Connection, MigrationError> {
    let conn = Connection::open(path)?;
    crate::store::configure_connection(&conn)?;
    Ok(conn)
}
