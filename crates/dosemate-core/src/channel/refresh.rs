//! Display refresh signalling
//!
//! The publisher only asks for a reload; the display side decides when to
//! redraw. On this platform the request is a marker file in the shared
//! container that the display side watches.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{ChannelError, SnapshotChannel};
use crate::config::SharedContainer;
use crate::snapshot::DataSnapshot;

/// Quiet period before a burst of file events is treated as one change
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Host hook asking the display surface to regenerate its content
pub trait DisplayRefresh: Send + Sync {
    fn request_reload(&self) -> Result<(), ChannelError>;
}

/// Touches the reload marker in the shared container
#[derive(Debug, Clone)]
pub struct ReloadMarker {
    path: PathBuf,
}

impl ReloadMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DisplayRefresh for ReloadMarker {
    fn request_reload(&self) -> Result<(), ChannelError> {
        let stamp = chrono::Utc::now().to_rfc3339();
        std::fs::write(&self.path, stamp)?;
        Ok(())
    }
}

/// Live watch over the shared container; stops when dropped
pub struct SnapshotWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for SnapshotWatcher {
    fn drop(&mut self) {
        // Dropping the watcher closes the event channel and ends the thread
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Call `on_change` with the freshly read snapshot after each reload request
pub fn watch_snapshots<F>(
    container: &SharedContainer,
    mut on_change: F,
) -> Result<SnapshotWatcher, ChannelError>
where
    F: FnMut(Option<DataSnapshot>) + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(container.root(), RecursiveMode::NonRecursive)?;

    let marker = container.reload_marker_path();
    let channel = SnapshotChannel::for_container(container);

    let handle = std::thread::spawn(move || {
        let mut changed = false;
        loop {
            match rx.recv_timeout(DEBOUNCE) {
                Ok(event) => {
                    if event.paths.iter().any(|p| p.file_name() == marker.file_name()) {
                        changed = true;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if changed {
                        changed = false;
                        on_change(channel.read());
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("Snapshot watcher stopped");
    });

    tracing::info!(container = %container.root().display(), "Watching for snapshot updates");
    Ok(SnapshotWatcher {
        watcher: Some(watcher),
        handle: Some(handle),
    })
}
