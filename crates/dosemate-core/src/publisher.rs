//! Snapshot publisher worker
//!
//! One serial worker owns the store handle and publishes a fresh snapshot
//! for every refresh trigger. Triggers are fire-and-forget: a trigger that
//! arrives while one is already queued is dropped, and a failed publish is
//! logged and left for the next trigger.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::channel::{ChannelError, SnapshotChannel};
use crate::clock::Clock;
use crate::snapshot::{DataSnapshot, SnapshotBuilder, SnapshotError};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// App became visible
    Foreground,
    /// App is going to the background or shutting down
    Background,
    /// Explicit request, e.g. from the CLI
    Manual,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Build today's snapshot and publish it
pub fn refresh_once<S: EntityStore>(
    store: &S,
    channel: &SnapshotChannel,
    clock: &dyn Clock,
) -> Result<DataSnapshot, PublishError> {
    let snapshot = SnapshotBuilder::new(store).build(clock.now_local())?;
    channel.publish(&snapshot)?;
    Ok(snapshot)
}

pub struct SnapshotPublisher {
    tx: Option<mpsc::Sender<RefreshTrigger>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SnapshotPublisher {
    /// Start the worker. Must be called from within a Tokio runtime.
    pub fn spawn<S>(store: S, channel: SnapshotChannel, clock: Arc<dyn Clock>) -> Self
    where
        S: EntityStore + Send + 'static,
    {
        // Capacity 1: at most one trigger waits behind the running publish
        let (tx, mut rx) = mpsc::channel::<RefreshTrigger>(1);

        let join_handle = tokio::task::spawn_blocking(move || {
            while let Some(trigger) = rx.blocking_recv() {
                match refresh_once(&store, &channel, clock.as_ref()) {
                    Ok(snapshot) => tracing::info!(
                        ?trigger,
                        items = snapshot.medications.len(),
                        "Snapshot published"
                    ),
                    Err(e) => tracing::warn!(?trigger, error = %e, "Snapshot publish failed"),
                }
            }
            tracing::debug!("Snapshot publisher stopped");
        });

        Self {
            tx: Some(tx),
            join_handle: Some(join_handle),
        }
    }

    /// Queue a refresh without waiting for it
    pub fn request(&self, trigger: RefreshTrigger) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(trigger) {
            Ok(()) => tracing::debug!(?trigger, "Snapshot refresh requested"),
            Err(TrySendError::Full(_)) => {
                tracing::debug!(?trigger, "Snapshot refresh already pending")
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(?trigger, "Snapshot publisher is not running")
            }
        }
    }

    /// Finish queued work and stop the worker
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Snapshot publisher panicked");
            }
        }
    }
}

impl Drop for SnapshotPublisher {
    fn drop(&mut self) {
        // Closing the sender lets the worker drain and exit on its own
        self.tx.take();
    }
}
