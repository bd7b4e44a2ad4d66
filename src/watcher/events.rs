//! Event source adapter bridging the OS notification backend to bounded
//! per-registration feeds.
//!
//! The backend delivers raw [`notify::Event`]s on its own thread. This
//! module reduces them to the three change kinds the coordinator cares
//! about, fans multi-path events out into one entry per path, and queues
//! them on a bounded channel that the coordinator (or an eager worker)
//! drains later.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatchError;

/// Default capacity of a registration's event feed.
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Producer-side retries before an event is dropped on a full feed.
const FULL_FEED_RETRIES: usize = 5;

/// Pause between producer-side retries.
const FULL_FEED_RETRY_DELAY: Duration = Duration::from_millis(1);

/// What changed, reduced to the kinds that can require a rebuild.
///
/// Access and metadata-only notifications are dropped at the adapter;
/// forwarding them would turn every file read into a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
}

/// A single filesystem change: one path plus its change kind.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

/// One registration's event plumbing: the backend that must stay alive for
/// the subscription's lifetime, the feed receiver, and the overflow flag.
pub(crate) struct EventSource {
    pub backend: notify::RecommendedWatcher,
    pub receiver: mpsc::Receiver<FsEvent>,
    pub overflow: Arc<AtomicBool>,
}

impl EventSource {
    /// Subscribe to every root in `roots`.
    ///
    /// Symlinked roots are resolved to their targets first; an unresolvable
    /// symlink fails the whole registration. A root that cannot be stat'ed
    /// or subscribed is logged and skipped so one missing directory does
    /// not take down the rest. Directory roots are watched recursively,
    /// file roots individually.
    pub fn subscribe(roots: &[PathBuf], capacity: usize) -> Result<Self, WatchError> {
        let (tx, receiver) = mpsc::channel(capacity);
        let overflow = Arc::new(AtomicBool::new(false));

        let feed = FeedSender {
            tx,
            overflow: overflow.clone(),
        };
        let mut backend =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => feed.forward(event),
                Err(e) => tracing::error!("[watcher] backend error: {e}"),
            })?;

        let mut watched = 0usize;
        for root in roots {
            let root = resolve_root(root)?;
            let meta = match std::fs::metadata(&root) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("[watcher] cannot stat {}, skipping: {e}", root.display());
                    continue;
                }
            };
            let mode = if meta.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            match backend.watch(&root, mode) {
                Ok(()) => {
                    watched += 1;
                    crate::debug_event!("watcher", "watching", "{}", root.display());
                }
                Err(e) => {
                    tracing::warn!("[watcher] cannot watch {}, skipping: {e}", root.display());
                }
            }
        }
        if watched == 0 {
            tracing::warn!("[watcher] no watchable roots, listener will only see forced refreshes");
        }

        Ok(Self {
            backend,
            receiver,
            overflow,
        })
    }
}

/// Producer half of a feed, driven from the backend's callback thread.
struct FeedSender {
    tx: mpsc::Sender<FsEvent>,
    overflow: Arc<AtomicBool>,
}

impl FeedSender {
    /// Fan a backend event out into per-path feed entries.
    fn forward(&self, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) => FsEventKind::Created,
            EventKind::Modify(_) => FsEventKind::Modified,
            EventKind::Remove(_) => FsEventKind::Removed,
            _ => return,
        };
        for path in event.paths {
            self.push(FsEvent { path, kind });
        }
    }

    /// Queue one event on the bounded feed.
    ///
    /// This thread belongs to the OS notification backend and must never be
    /// parked indefinitely. After a few brief retries the event is dropped
    /// and the overflow flag is raised; whichever consumer next drains the
    /// feed sees the flag and refreshes unconditionally, so a dropped event
    /// costs at most one delayed cycle, never a missed rebuild.
    fn push(&self, mut event: FsEvent) {
        for _ in 0..FULL_FEED_RETRIES {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(back)) => {
                    event = back;
                    std::thread::sleep(FULL_FEED_RETRY_DELAY);
                }
                // Receiver gone: the registration was torn down.
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
        self.overflow.store(true, Ordering::SeqCst);
        tracing::debug!("[watcher] feed full, dropped {}", event.path.display());
    }
}

/// Resolve a symlinked root to its target.
///
/// Missing roots pass through untouched for the caller to stat and skip.
fn resolve_root(path: &Path) -> Result<PathBuf, WatchError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::canonicalize(path).map_err(|source| WatchError::RootResolve {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(path.to_path_buf()),
    }
}
