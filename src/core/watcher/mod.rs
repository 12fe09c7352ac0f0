//! # Folder Watcher Module
//!
//! Keeps the index current while the library is edited by other programs.
//!
//! ## Flow
//! - `notify` reports create/modify/remove events under the managed folder
//! - Only non-hidden image files count; the trash folder is ignored
//! - Changes are collected until the folder has been quiet for the debounce
//!   period, then one refresh runs for the whole batch
//!
//! ## Example
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//!
//! let shutdown = AtomicBool::new(false);
//! watch_library(&library, &sender, &shutdown)?;
//! ```

use crate::config::LibraryConfig;
use crate::core::library::Library;
use crate::core::scanner::{is_hidden, is_image_path};
use crate::error::{Result, WatchError};
use crate::events::{Event, EventSender, WatcherEvent};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often a blocked watcher checks the shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Configuration for the folder watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a batch of changes is handed on
    pub debounce_duration: Duration,
    /// Whether to watch subdirectories recursively
    pub recursive: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(1000),
            recursive: true,
        }
    }
}

impl WatcherConfig {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            debounce_duration: Duration::from_millis(config.watch_debounce_ms),
            recursive: true,
        }
    }
}

/// Watches folders for image file changes
pub struct FolderWatcher {
    watcher: RecommendedWatcher,
    config: WatcherConfig,
    watched_paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FolderWatcher {
    /// Create a watcher that hands [`WatcherEvent::Changed`] and
    /// [`WatcherEvent::Error`] to `event_handler`
    pub fn new<F>(config: WatcherConfig, event_handler: F) -> std::result::Result<Self, WatchError>
    where
        F: Fn(WatcherEvent) + Send + 'static,
    {
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    if let Some(watcher_event) = Self::process_event(event) {
                        event_handler(watcher_event);
                    }
                }
                Err(e) => event_handler(WatcherEvent::Error {
                    message: e.to_string(),
                }),
            }
        })
        .map_err(|e| WatchError::InitFailed(e.to_string()))?;

        Ok(Self {
            watcher,
            config,
            watched_paths: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Keep the image paths of a create/modify/remove event
    fn process_event(event: notify::Event) -> Option<WatcherEvent> {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return None;
        }

        let paths: Vec<PathBuf> = event
            .paths
            .into_iter()
            .filter(|p| Self::is_library_image(p))
            .collect();

        if paths.is_empty() {
            None
        } else {
            Some(WatcherEvent::Changed { paths })
        }
    }

    fn is_library_image(path: &Path) -> bool {
        is_image_path(path) && !is_hidden(path)
    }

    /// Start watching a directory
    pub fn watch(&mut self, path: impl AsRef<Path>) -> std::result::Result<(), WatchError> {
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            return Err(WatchError::WatchFailed {
                path,
                reason: "not an existing directory".to_string(),
            });
        }

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        self.watcher
            .watch(&path, mode)
            .map_err(|e| WatchError::WatchFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if let Ok(mut paths) = self.watched_paths.lock() {
            paths.insert(path);
        }

        Ok(())
    }

    /// Stop watching a directory
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> std::result::Result<(), WatchError> {
        let path = path.as_ref();

        self.watcher
            .unwatch(path)
            .map_err(|e| WatchError::WatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Ok(mut paths) = self.watched_paths.lock() {
            paths.remove(path);
        }

        Ok(())
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths
            .lock()
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.watched_paths
            .lock()
            .map(|paths| paths.contains(path.as_ref()))
            .unwrap_or(false)
    }
}

/// Wait for the next batch of changed paths.
///
/// Blocks until a change arrives, then keeps collecting until nothing new has
/// arrived for `quiet`. Returns `None` once `shutdown` is set or every sender
/// is gone.
pub fn collect_batch(
    changes: &Receiver<Vec<PathBuf>>,
    quiet: Duration,
    shutdown: &AtomicBool,
) -> Option<Vec<PathBuf>> {
    let mut batch = BTreeSet::new();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }
        match changes.recv_timeout(SHUTDOWN_POLL) {
            Ok(paths) => {
                batch.extend(paths);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }

    loop {
        match changes.recv_timeout(quiet) {
            Ok(paths) => batch.extend(paths),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }
    }

    Some(batch.into_iter().collect())
}

/// Hand every debounced batch to `on_batch` until `shutdown` is set.
///
/// Changes that arrive while `on_batch` runs are kept for the next batch;
/// echoes of a refresh's own moves just cost one idempotent pass.
pub fn for_each_batch<F>(
    changes: &Receiver<Vec<PathBuf>>,
    quiet: Duration,
    shutdown: &AtomicBool,
    mut on_batch: F,
) where
    F: FnMut(Vec<PathBuf>),
{
    while let Some(paths) = collect_batch(changes, quiet, shutdown) {
        on_batch(paths);
        if !changes.is_empty() {
            debug!(pending = changes.len(), "Changes arrived while handling batch");
        }
    }
}

/// Refresh the library after every debounced batch of image changes until
/// `shutdown` is set.
pub fn watch_library(library: &Library, events: &EventSender, shutdown: &AtomicBool) -> Result<()> {
    let root = library.store().root().to_path_buf();
    let trash = library.store().trash_folder().map(Path::to_path_buf);
    let config = WatcherConfig::from_config(library.config());
    let quiet = config.debounce_duration;

    let (tx, rx) = unbounded();
    let error_events = events.clone();
    let mut watcher = FolderWatcher::new(config, move |event| match event {
        WatcherEvent::Changed { paths } => {
            let paths: Vec<PathBuf> = paths
                .into_iter()
                .filter(|p| trash.as_ref().map_or(true, |t| !p.starts_with(t)))
                .collect();
            if !paths.is_empty() {
                let _ = tx.send(paths);
            }
        }
        WatcherEvent::Error { message } => {
            warn!(error = %message, "Watcher error");
            error_events.send(Event::Watcher(WatcherEvent::Error { message }));
        }
        _ => {}
    })?;
    watcher.watch(&root)?;

    info!(path = %root.display(), debounce_ms = quiet.as_millis() as u64, "Watching library");
    events.send(Event::Watcher(WatcherEvent::Started { path: root.clone() }));

    for_each_batch(&rx, quiet, shutdown, |paths| {
        debug!(count = paths.len(), "Changes settled");
        events.send(Event::Watcher(WatcherEvent::Changed { paths }));

        match library.refresh_with_events(library.config().remove_unrecognized, events) {
            Ok(report) => info!(
                pruned = report.pruned,
                updated = report.updated,
                discovered = report.discovered,
                "Refreshed after change"
            ),
            Err(e) => {
                error!(error = %e, "Refresh after change failed");
                events.send(Event::Watcher(WatcherEvent::Error {
                    message: e.to_string(),
                }));
            }
        }
    });

    let _ = watcher.unwatch(&root);
    info!(path = %root.display(), "Stopped watching");
    events.send(Event::Watcher(WatcherEvent::Stopped { path: root }));
    Ok(())
}
