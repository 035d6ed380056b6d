//! Schema Version Registry
//!
//! The ordered history of store shapes and the stages between them.
//! A registry is validated when it is built: versions strictly increase
//! (so the chain has no cycles), and every custom stage joins two adjacent
//! versions. An adjacent pair without a stage migrates lightweight: only the
//! target version's additive DDL is applied.

pub mod history;

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Table inside the store file recording its schema version
pub const VERSION_TABLE: &str = "schema_version";

// ============================================================================
// VERSION IDENTIFIER
// ============================================================================

/// major.minor.patch schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionId {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let parsed: Option<Vec<u32>> = parts.iter().map(|p| p.parse().ok()).collect();
        match parsed.as_deref() {
            Some([major, minor, patch]) => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(RegistryError::UnknownVersion(s.to_string())),
        }
    }
}

fn label(version: Option<VersionId>) -> String {
    version.map_or_else(|| "origin".to_string(), |v| v.to_string())
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Registry configuration error; fatal at startup
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Schema registry is empty")]
    Empty,
    #[error("Schema versions out of order: {previous} is followed by {next}")]
    OutOfOrder { previous: VersionId, next: VersionId },
    #[error("Migration stage {from} -> {to} does not join adjacent versions")]
    DetachedStage { from: VersionId, to: VersionId },
    #[error("Duplicate migration stage {from} -> {to}")]
    DuplicateStage { from: VersionId, to: VersionId },
    #[error("Unknown schema version: {0}")]
    UnknownVersion(String),
}

/// Failure inside a stage hook or structural change
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Data error: {0}")]
    Data(String),
}

/// A single stage failed; its transaction was rolled back
#[derive(Debug, thiserror::Error)]
#[error("Migration stage {} -> {to} failed: {source}", label(*.from))]
pub struct StageError {
    pub from: Option<VersionId>,
    pub to: VersionId,
    #[source]
    pub source: HookError,
}

// ============================================================================
// VERSIONS AND STAGES
// ============================================================================

/// One shape of the store
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pub id: VersionId,
    pub description: &'static str,
    /// Entity tables valid at this version
    pub entities: &'static [&'static str],
    /// Additive DDL taking the previous shape to this one
    pub ddl: &'static str,
}

/// Hook run inside a stage's transaction
pub type StageHook = Arc<dyn Fn(&Connection) -> Result<(), HookError> + Send + Sync>;

/// Custom migration between two adjacent versions
///
/// `will_migrate` runs before the structural change, `did_migrate` after it
/// (default backfill, derived fields). Hooks must be idempotent.
#[derive(Clone)]
pub struct MigrationStage {
    pub from: VersionId,
    pub to: VersionId,
    will_migrate: Option<StageHook>,
    did_migrate: Option<StageHook>,
}

impl MigrationStage {
    pub fn custom(from: VersionId, to: VersionId) -> Self {
        Self {
            from,
            to,
            will_migrate: None,
            did_migrate: None,
        }
    }

    pub fn will_migrate(
        mut self,
        hook: impl Fn(&Connection) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.will_migrate = Some(Arc::new(hook));
        self
    }

    pub fn did_migrate(
        mut self,
        hook: impl Fn(&Connection) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.did_migrate = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStage")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("will_migrate", &self.will_migrate.is_some())
            .field("did_migrate", &self.did_migrate.is_some())
            .finish()
    }
}

/// One edge of the migration path
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    /// None when starting from an empty or unversioned store
    pub from: Option<&'a SchemaVersion>,
    pub to: &'a SchemaVersion,
    pub stage: Option<&'a MigrationStage>,
}

impl Step<'_> {
    pub fn is_lightweight(&self) -> bool {
        self.stage.is_none()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Validated, ordered schema history
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    versions: Vec<SchemaVersion>,
    stages: BTreeMap<(VersionId, VersionId), MigrationStage>,
}

impl SchemaRegistry {
    pub fn new(
        versions: Vec<SchemaVersion>,
        stages: Vec<MigrationStage>,
    ) -> Result<Self, RegistryError> {
        if versions.is_empty() {
            return Err(RegistryError::Empty);
        }
        for pair in versions.windows(2) {
            if pair[0].id >= pair[1].id {
                return Err(RegistryError::OutOfOrder {
                    previous: pair[0].id,
                    next: pair[1].id,
                });
            }
        }

        let mut by_edge = BTreeMap::new();
        for stage in stages {
            let adjacent = versions
                .windows(2)
                .any(|pair| pair[0].id == stage.from && pair[1].id == stage.to);
            if !adjacent {
                return Err(RegistryError::DetachedStage {
                    from: stage.from,
                    to: stage.to,
                });
            }
            let edge = (stage.from, stage.to);
            if by_edge.insert(edge, stage).is_some() {
                return Err(RegistryError::DuplicateStage {
                    from: edge.0,
                    to: edge.1,
                });
            }
        }

        Ok(Self {
            versions,
            stages: by_edge,
        })
    }

    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// The last version in the history
    pub fn current_version(&self) -> &SchemaVersion {
        // Non-empty by construction
        &self.versions[self.versions.len() - 1]
    }

    pub fn contains(&self, id: VersionId) -> bool {
        self.versions.iter().any(|v| v.id == id)
    }

    /// Path from `recorded` (None = origin) to the current version
    pub fn steps_from(&self, recorded: Option<VersionId>) -> Result<Vec<Step<'_>>, RegistryError> {
        let start = match recorded {
            None => 0,
            Some(id) => {
                self.versions
                    .iter()
                    .position(|v| v.id == id)
                    .ok_or_else(|| RegistryError::UnknownVersion(id.to_string()))?
                    + 1
            }
        };

        Ok((start..self.versions.len())
            .map(|i| {
                let from = i.checked_sub(1).map(|p| &self.versions[p]);
                let to = &self.versions[i];
                let stage = from.and_then(|f| self.stages.get(&(f.id, to.id)));
                Step { from, to, stage }
            })
            .collect())
    }

    /// Apply one step in its own transaction
    pub fn apply_step(&self, conn: &mut Connection, step: &Step<'_>) -> Result<(), StageError> {
        let wrap = |source: HookError| StageError {
            from: step.from.map(|v| v.id),
            to: step.to.id,
            source,
        };

        let tx = conn.transaction().map_err(|e| wrap(e.into()))?;
        {
            let conn: &Connection = &tx;
            if let Some(hook) = step.stage.and_then(|s| s.will_migrate.as_ref()) {
                hook(conn).map_err(wrap)?;
            }
            conn.execute_batch(step.to.ddl).map_err(|e| wrap(e.into()))?;
            if let Some(hook) = step.stage.and_then(|s| s.did_migrate.as_ref()) {
                hook(conn).map_err(wrap)?;
            }
            record_version(conn, step.to.id).map_err(|e| wrap(e.into()))?;
        }
        tx.commit().map_err(|e| wrap(e.into()))?;

        tracing::info!(
            from = %label(step.from.map(|v| v.id)),
            to = %step.to.id,
            lightweight = step.is_lightweight(),
            "Applied schema migration stage: {}",
            step.to.description
        );
        Ok(())
    }

    /// Bring an empty store straight to the current version
    pub fn bootstrap(&self, conn: &mut Connection) -> Result<VersionId, StageError> {
        for step in self.steps_from(None).unwrap_or_default() {
            self.apply_step(conn, &step)?;
        }
        Ok(self.current_version().id)
    }
}

// ============================================================================
// RECORDED VERSION
// ============================================================================

/// Raw version string recorded in the store; None if never recorded
pub fn read_recorded_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [VERSION_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    conn.query_row(
        &format!("SELECT version FROM {} LIMIT 1", VERSION_TABLE),
        [],
        |row| row.get(0),
    )
    .optional()
}

fn record_version(conn: &Connection, version: VersionId) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {t} (version TEXT NOT NULL, applied_at TEXT NOT NULL);
         DELETE FROM {t};",
        t = VERSION_TABLE
    ))?;
    conn.execute(
        &format!("INSERT INTO {} (version, applied_at) VALUES (?1, ?2)", VERSION_TABLE),
        params![version.to_string(), crate::store::encode_timestamp(&chrono::Utc::now())],
    )?;
    Ok(())
}
