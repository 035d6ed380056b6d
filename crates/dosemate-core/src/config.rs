//! Configuration and the shared container layout
//!
//! Resolution order: defaults, then `DOSEMATE_*` environment variables, then
//! explicit overrides from the command line.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Cross-process group identifier
pub const DEFAULT_GROUP_ID: &str = "group.com.bbdyno.app.doseMate";
/// Fixed store file name inside the container
pub const STORE_FILE_NAME: &str = "DoseMate.sqlite";
/// Prefix shared by every backup file
pub const BACKUP_PREFIX: &str = "DoseMate_backup_";
pub const BACKUP_EXTENSION: &str = "sqlite";
pub const DEFAULT_BACKUP_RETENTION: usize = 3;

const RELOAD_MARKER: &str = ".display-reload";

/// Configuration error; fatal at startup
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Shared container not found: {0}")]
    MissingContainer(PathBuf),
    #[error("Could not determine a platform data directory")]
    NoPlatformDirectory,
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// SHARED CONTAINER
// ============================================================================

/// Filesystem location shared by the primary process and the display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedContainer {
    root: PathBuf,
    group_id: String,
}

impl SharedContainer {
    /// Open an existing container directory
    pub fn open(root: impl Into<PathBuf>, group_id: impl Into<String>) -> Result<Self, ConfigError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ConfigError::MissingContainer(root));
        }
        Ok(Self {
            root,
            group_id: group_id.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE_NAME)
    }

    /// Key-value suite named after the group
    pub fn defaults_path(&self) -> PathBuf {
        self.root
            .join("Library")
            .join("Preferences")
            .join(format!("{}.json", self.group_id))
    }

    /// File touched to ask the display surface to reload
    pub fn reload_marker_path(&self) -> PathBuf {
        self.root.join(RELOAD_MARKER)
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Explicit container root; must already exist
    pub container_dir: Option<PathBuf>,
    pub group_id: String,
    /// App-private preferences holding the sync-gate inputs
    pub preferences_dir: Option<PathBuf>,
    pub backup_retention: usize,
    /// Cloud identity token checked by the account probe
    pub account_token: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            container_dir: None,
            group_id: DEFAULT_GROUP_ID.to_string(),
            preferences_dir: None,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            account_token: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOSEMATE_CONTAINER_DIR") {
            config.container_dir = Some(PathBuf::from(dir));
        }
        if let Some(group) = get("DOSEMATE_GROUP_ID") {
            config.group_id = group;
        }
        if let Some(dir) = get("DOSEMATE_PREFERENCES_DIR") {
            config.preferences_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get("DOSEMATE_BACKUP_RETENTION") {
            config.backup_retention =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "DOSEMATE_BACKUP_RETENTION",
                    value: raw.clone(),
                })?;
        }
        if let Some(path) = get("DOSEMATE_ACCOUNT_TOKEN") {
            config.account_token = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    pub fn with_container_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.container_dir = Some(dir.into());
        self
    }

    /// Locate the shared container
    ///
    /// An explicit directory must exist. The platform default is created on
    /// first use.
    pub fn resolve_container(&self) -> Result<SharedContainer, ConfigError> {
        match &self.container_dir {
            Some(dir) => SharedContainer::open(dir, &self.group_id),
            None => {
                let dirs = project_dirs()?;
                let root = dirs
                    .data_dir()
                    .join("Group Containers")
                    .join(&self.group_id);
                std::fs::create_dir_all(&root)?;
                SharedContainer::open(root, &self.group_id)
            }
        }
    }

    /// App-private preferences directory, never shared with the display surface
    pub fn resolve_preferences_dir(&self, container: &SharedContainer) -> PathBuf {
        if let Some(dir) = &self.preferences_dir {
            return dir.clone();
        }
        match project_dirs() {
            Ok(dirs) if self.container_dir.is_none() => dirs.preference_dir().to_path_buf(),
            _ => container.root().join(".private"),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "bbdyno", "DoseMate").ok_or(ConfigError::NoPlatformDirectory)
}
