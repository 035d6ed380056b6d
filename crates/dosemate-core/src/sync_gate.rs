//! Cloud Sync Gate
//!
//! Decides once per process start whether the store runs cloud-replicated.
//! Changes to any input take effect on the next start.

use std::path::PathBuf;

use crate::channel::Defaults;
use crate::store::SyncMode;

/// Cached subscription entitlement
pub const PREMIUM_CACHED_KEY: &str = "isPremiumCached";
/// Owner's cloud sync preference
pub const CLOUD_SYNC_ENABLED_KEY: &str = "iCloudSyncEnabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncGateInputs {
    pub entitlement_cached: bool,
    pub user_preference: bool,
    pub account_available: bool,
}

/// Replication is on only when all three inputs agree
pub fn decide(entitlement_cached: bool, user_preference: bool, account_available: bool) -> bool {
    entitlement_cached && user_preference && account_available
}

impl SyncGateInputs {
    pub fn decision(&self) -> bool {
        decide(self.entitlement_cached, self.user_preference, self.account_available)
    }

    pub fn sync_mode(&self) -> SyncMode {
        if self.decision() {
            SyncMode::CloudReplicated
        } else {
            SyncMode::LocalOnly
        }
    }
}

/// Whether a cloud account is signed in on this device
pub trait AccountProbe {
    fn account_available(&self) -> bool;
}

/// Account is available when the identity token file exists and is non-empty
#[derive(Debug, Clone, Default)]
pub struct IdentityTokenProbe {
    token: Option<PathBuf>,
}

impl IdentityTokenProbe {
    pub fn new(token: Option<PathBuf>) -> Self {
        Self { token }
    }
}

impl AccountProbe for IdentityTokenProbe {
    fn account_available(&self) -> bool {
        self.token
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok())
            .is_some_and(|meta| meta.is_file() && meta.len() > 0)
    }
}

impl AccountProbe for bool {
    fn account_available(&self) -> bool {
        *self
    }
}

/// Read the inputs from the app-private preferences and the probe
pub fn gather(preferences: &Defaults, probe: &dyn AccountProbe) -> SyncGateInputs {
    let inputs = SyncGateInputs {
        entitlement_cached: preferences.bool(PREMIUM_CACHED_KEY),
        user_preference: preferences.bool(CLOUD_SYNC_ENABLED_KEY),
        account_available: probe.account_available(),
    };
    tracing::info!(
        account_available = inputs.account_available,
        "Cloud account status checked"
    );
    tracing::debug!(
        entitlement_cached = inputs.entitlement_cached,
        user_preference = inputs.user_preference,
        "Cloud sync gate inputs"
    );
    inputs
}

/// Sync mode for this process lifetime
pub fn evaluate(preferences: &Defaults, probe: &dyn AccountProbe) -> SyncMode {
    let mode = gather(preferences, probe).sync_mode();
    tracing::info!(mode = %mode, "Cloud sync gate decided");
    mode
}
