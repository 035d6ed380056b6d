//! SQLite Entity Store
//!
//! Single-connection store living in the shared container. Schema creation
//! and evolution belong to the migration coordinator; opening a store never
//! touches the schema.

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};

use super::{Entity, EntityStore, FetchDescriptor, Result};

/// Remote-replication mode chosen by the cloud sync gate at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    LocalOnly,
    CloudReplicated,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::LocalOnly => write!(f, "local-only"),
            SyncMode::CloudReplicated => write!(f, "cloud-replicated"),
        }
    }
}

#[derive(Debug)]
enum PendingChange {
    Upsert {
        table: &'static str,
        columns: &'static [&'static str],
        values: Vec<Value>,
    },
    Delete {
        table: &'static str,
        id: String,
    },
}

/// Apply the SQLCipher key, if one is configured
#[allow(unused_variables)]
pub(crate) fn apply_key(conn: &Connection) -> rusqlite::Result<()> {
    #[cfg(feature = "encryption")]
    {
        if let Ok(key) = std::env::var("DOSEMATE_ENCRYPTION_KEY") {
            if !key.is_empty() {
                conn.pragma_update(None, "key", &key)?;
            }
        }
    }
    Ok(())
}

/// Apply PRAGMAs and optional encryption to a connection
pub(crate) fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    apply_key(conn)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA temp_store = MEMORY;",
    )
}

/// SQLite-backed [`EntityStore`]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    sync_mode: SyncMode,
    pending: Vec<PendingChange>,
}

impl SqliteStore {
    /// Open the store file at `path`
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        configure_connection(&conn)?;

        match sync_mode {
            SyncMode::CloudReplicated => tracing::info!("Cloud replication enabled for store"),
            SyncMode::LocalOnly => tracing::info!("Store running in local-only mode"),
        }

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            sync_mode,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Drop staged changes without writing them
    pub fn discard_changes(&mut self) {
        self.pending.clear();
    }
}

impl EntityStore for SqliteStore {
    fn fetch<E: Entity>(&self, descriptor: &FetchDescriptor<E>) -> Result<Vec<E>> {
        let (sql, params) = descriptor.to_sql()?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| E::from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<E>>>()?)
    }

    fn insert<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let values = entity.to_values()?;
        self.pending.push(PendingChange::Upsert {
            table: E::KIND,
            columns: E::COLUMNS,
            values,
        });
        Ok(())
    }

    fn delete<E: Entity>(&mut self, entity: &E) {
        self.pending.push(PendingChange::Delete {
            table: E::KIND,
            id: entity.id().to_string(),
        });
    }

    fn save(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for change in &self.pending {
            match change {
                PendingChange::Upsert {
                    table,
                    columns,
                    values,
                } => {
                    let placeholders: Vec<String> =
                        (1..=columns.len()).map(|i| format!("?{}", i)).collect();
                    let updates: Vec<String> = columns
                        .iter()
                        .skip(1)
                        .map(|c| format!("{c} = excluded.{c}"))
                        .collect();
                    let sql = format!(
                        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
                        table,
                        columns.join(", "),
                        placeholders.join(", "),
                        updates.join(", ")
                    );
                    tx.execute(&sql, params_from_iter(values.iter()))?;
                }
                PendingChange::Delete { table, id } => {
                    tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!(changes = self.pending.len(), "Store saved");
        self.pending.clear();
        Ok(())
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }
}
