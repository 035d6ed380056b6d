//! Backup Manager
//!
//! Point-in-time copies of the store file, kept as siblings inside the
//! shared container. A backup is never modified after it is written; it is
//! only listed, restored from, or deleted.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{BACKUP_EXTENSION, BACKUP_PREFIX, SharedContainer, STORE_FILE_NAME};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Nothing to back up; normal on a fresh install
    #[error("Store file not found: {0}")]
    StoreMissing(PathBuf),
    #[error("No backups found in {0}")]
    NoBackups(PathBuf),
    #[error("Backup {operation} failed for {file}: {source}")]
    Io {
        file: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    fn io(file: impl Into<String>, operation: &'static str, source: io::Error) -> Self {
        BackupError::Io {
            file: file.into(),
            operation,
            source,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// One backup file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBackup {
    pub path: PathBuf,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub kept: usize,
    pub removed: Vec<String>,
    /// Files that could not be deleted; left for the next pass
    pub failed: Vec<String>,
}

/// `DoseMate_backup_<secs>.<micros>.sqlite`
pub fn backup_file_name(created_at: DateTime<Utc>) -> String {
    format!(
        "{}{}.{:06}.{}",
        BACKUP_PREFIX,
        created_at.timestamp(),
        created_at.timestamp_subsec_micros(),
        BACKUP_EXTENSION
    )
}

/// Creation time encoded in a backup file name
///
/// Accepts any fractional precision, so names written as
/// `<prefix><seconds since epoch as a decimal>.sqlite` also parse.
pub fn parse_backup_time(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_EXTENSION)?
        .strip_suffix('.')?;
    let (secs, fraction) = stamp.split_once('.').unwrap_or((stamp, ""));
    let secs: i64 = secs.parse().ok()?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let micros: u32 = format!("{:0<6}", &fraction[..fraction.len().min(6)])
        .parse()
        .ok()?;
    Utc.timestamp_opt(secs, micros * 1_000).single()
}

// ============================================================================
// MANAGER
// ============================================================================

#[derive(Clone)]
pub struct BackupManager {
    container: SharedContainer,
    clock: Arc<dyn Clock>,
}

impl BackupManager {
    pub fn new(container: SharedContainer, clock: Arc<dyn Clock>) -> Self {
        Self { container, clock }
    }

    pub fn container(&self) -> &SharedContainer {
        &self.container
    }

    /// Copy the live store to a new, uniquely named backup
    pub fn create_backup(&self) -> Result<StoreBackup, BackupError> {
        let store = self.container.store_path();
        if !store.exists() {
            tracing::info!(store = STORE_FILE_NAME, "No store file to back up");
            return Err(BackupError::StoreMissing(store));
        }

        if let Err(e) = checkpoint(&store) {
            tracing::warn!(error = %e, "WAL checkpoint before backup failed, copying main file as is");
        }

        let mut created_at = self.clock.now().trunc_subsecs(6);
        let mut file_name = backup_file_name(created_at);
        while self.container.root().join(&file_name).exists() {
            created_at += chrono::Duration::microseconds(1);
            file_name = backup_file_name(created_at);
        }
        let path = self.container.root().join(&file_name);

        fs::copy(&store, &path).map_err(|e| BackupError::io(&file_name, "copy", e))?;
        tracing::info!(file = %file_name, "Created store backup");

        Ok(StoreBackup {
            path,
            file_name,
            created_at,
        })
    }

    /// All backups, newest first. Equal creation times keep directory order.
    pub fn list_backups(&self) -> Result<Vec<StoreBackup>, BackupError> {
        let root = self.container.root();
        let entries =
            fs::read_dir(root).map_err(|e| BackupError::io(root.display().to_string(), "list", e))?;

        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') || !file_name.starts_with(BACKUP_PREFIX) {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let created_at = parse_backup_time(&file_name).or_else(|| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.created().or_else(|_| m.modified()).ok())
                    .map(DateTime::<Utc>::from)
            });
            let Some(created_at) = created_at else {
                tracing::warn!(file = %file_name, "Skipping backup with unknown creation time");
                continue;
            };

            backups.push(StoreBackup {
                path: entry.path(),
                file_name,
                created_at,
            });
        }

        // Stable sort
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Restore the most recent backup over the live store
    pub fn restore_from_backup(&self) -> Result<StoreBackup, BackupError> {
        let latest = self
            .list_backups()?
            .into_iter()
            .next()
            .ok_or_else(|| BackupError::NoBackups(self.container.root().to_path_buf()))?;
        self.restore(&latest)?;
        Ok(latest)
    }

    /// Replace the live store with `backup`
    ///
    /// The backup is staged in a temp file inside the container and renamed
    /// over the store, so the store path always holds a complete file.
    /// Callers must close every connection to the store first.
    pub fn restore(&self, backup: &StoreBackup) -> Result<(), BackupError> {
        let root = self.container.root();
        let name = backup.file_name.as_str();

        let mut source =
            fs::File::open(&backup.path).map_err(|e| BackupError::io(name, "open", e))?;
        let mut staged = tempfile::Builder::new()
            .prefix(".restore")
            .tempfile_in(root)
            .map_err(|e| BackupError::io(name, "stage", e))?;
        io::copy(&mut source, staged.as_file_mut()).map_err(|e| BackupError::io(name, "copy", e))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| BackupError::io(name, "sync", e))?;

        // Sidecars of the replaced store must not be replayed onto the backup
        let store = self.container.store_path();
        let aside = set_aside_sidecars(&store).map_err(|e| BackupError::io(name, "sidecar", e))?;

        if let Err(e) = staged.persist(&store) {
            let moved: Vec<String> = aside.iter().map(|s| s.original.display().to_string()).collect();
            tracing::error!(file = %name, sidecars = ?moved, error = %e.error, "Restore rename failed, putting sidecars back");
            put_back_sidecars(&aside);
            return Err(BackupError::io(name, "rename", e.error));
        }
        discard_sidecars(&aside);

        tracing::info!(file = %name, "Restored store from backup");
        Ok(())
    }

    /// Keep the `keep` newest backups and delete the rest, best effort
    pub fn cleanup_old_backups(&self, keep: usize) -> Result<CleanupReport, BackupError> {
        let backups = self.list_backups()?;
        let mut report = CleanupReport {
            kept: backups.len().min(keep),
            ..Default::default()
        };

        for backup in backups.into_iter().skip(keep) {
            match fs::remove_file(&backup.path) {
                Ok(()) => report.removed.push(backup.file_name),
                Err(e) => {
                    tracing::warn!(file = %backup.file_name, error = %e, "Failed to delete old backup");
                    report.failed.push(backup.file_name);
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(removed = report.removed.len(), kept = report.kept, "Pruned old backups");
        }
        Ok(report)
    }
}

/// Fold the write-ahead log into the main file before copying it
fn checkpoint(store: &Path) -> rusqlite::Result<()> {
    let conn = Connection::open_with_flags(
        store,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    crate::store::apply_key(&conn)?;
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
}

/// A live store sidecar moved out of the way during a restore
struct SetAside {
    original: PathBuf,
    aside: PathBuf,
}

/// Rename `-wal`/`-shm` to `<sidecar>.aside`
///
/// On error every sidecar already moved is put back.
fn set_aside_sidecars(store: &Path) -> io::Result<Vec<SetAside>> {
    let mut moved = Vec::new();
    for suffix in ["-wal", "-shm"] {
        let mut original = store.as_os_str().to_owned();
        original.push(suffix);
        let mut aside = original.clone();
        aside.push(".aside");
        let entry = SetAside {
            original: original.into(),
            aside: aside.into(),
        };

        match fs::rename(&entry.original, &entry.aside) {
            Ok(()) => moved.push(entry),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(suffix, error = %e, "Failed to move store sidecar aside");
                put_back_sidecars(&moved);
                return Err(e);
            }
        }
    }
    Ok(moved)
}

fn put_back_sidecars(moved: &[SetAside]) {
    for entry in moved {
        if let Err(e) = fs::rename(&entry.aside, &entry.original) {
            tracing::error!(
                sidecar = %entry.original.display(),
                kept_at = %entry.aside.display(),
                error = %e,
                "Failed to put store sidecar back"
            );
        }
    }
}

fn discard_sidecars(moved: &[SetAside]) {
    for entry in moved {
        match fs::remove_file(&entry.aside) {
            Ok(()) => tracing::debug!(sidecar = %entry.original.display(), "Removed stale store sidecar"),
            Err(e) => tracing::warn!(file = %entry.aside.display(), error = %e, "Failed to remove stale store sidecar"),
        }
    }
}
