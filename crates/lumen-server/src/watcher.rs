//! File watcher feeding the hot-update channel.
//!
//! Watches the project source directory and decides, per changed file,
//! whether the client must be told to reload. A style-only change forces a
//! full client reload rather than attempting fine-grained patching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ServerError, ServerResult};

/// Directive sent to connected clients over the reload socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HotUpdate {
    FullReload,
}

/// Decide the hot-update directive for a changed file.
pub fn hot_update(path: &Path) -> Option<HotUpdate> {
    if path.extension().is_some_and(|ext| ext == "css") {
        return Some(HotUpdate::FullReload);
    }
    None
}

/// File change event.
#[derive(Debug, Clone)]
pub enum FileEvent {
    /// File was modified or created.
    Modified(PathBuf),
    /// File was removed.
    Removed(PathBuf),
}

/// File watcher handle.
pub struct FileWatcher {
    /// Debouncer handle (kept alive to maintain watcher).
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Receiver for file events.
    rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    /// Watch the given directory recursively.
    pub fn new(dir: impl AsRef<Path>) -> ServerResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: DebounceEventResult| {
                if let Ok(events) = result {
                    for event in events {
                        let file_event = if event.path.exists() {
                            FileEvent::Modified(event.path.clone())
                        } else {
                            FileEvent::Removed(event.path.clone())
                        };
                        let _ = tx.send(file_event);
                    }
                }
            },
        )
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(dir.as_ref(), RecursiveMode::Recursive)
            .map_err(|e| ServerError::Watch(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Receive the next file event.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }
}
