//! Refresh coordinator: turns raw change events into serialized listener
//! refreshes.
//!
//! All coordinator state lives behind one async mutex. Holding it across
//! the refresh call is what gives listeners the exclusive section they are
//! promised: request-driven `notify()` calls and background eager workers
//! all queue on the same lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::error::{RefreshError, WatchError};
use super::events::{DEFAULT_CHANNEL_CAPACITY, EventSource, FsEvent};
use super::listener::Listener;

/// How a registration's events reach its listener.
enum EventFeed {
    /// Drained inside `notify()`.
    Polled(mpsc::Receiver<FsEvent>),
    /// Owned by a background eager worker. `notify()` still refreshes the
    /// listener for the force and retry conditions, it just has no feed to
    /// drain.
    Eager,
}

/// One listener bound to one event feed. The pair travels together so a
/// feed can never be drained against the wrong listener.
struct Registration {
    listener: Arc<dyn Listener>,
    feed: EventFeed,
    overflow: Arc<AtomicBool>,
    /// Keeps the OS subscription alive. Absent for feeds injected in tests.
    _backend: Option<notify::RecommendedWatcher>,
}

/// Mutable coordinator state. The surrounding mutex is the exclusive
/// section; every refresh happens while it is held.
struct WatchState {
    registrations: Vec<Registration>,
    /// Set until the first cycle completes cleanly. Forces every listener
    /// to refresh once so nothing serves from a cold state.
    force_refresh: bool,
    /// Index of the listener whose last refresh failed. It is retried
    /// unconditionally on the next cycle, before later listeners get new
    /// work.
    last_error: Option<usize>,
}

/// Configures a [`RefreshWatcher`] before any listeners are attached.
pub struct RefreshWatcherBuilder {
    eager: bool,
    channel_capacity: usize,
}

impl RefreshWatcherBuilder {
    pub fn new() -> Self {
        Self {
            eager: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Refresh from background workers as events arrive instead of waiting
    /// for the next `notify()` call. Meant for interactive development
    /// where rebuilds should start before the browser is refreshed.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Capacity of each registration's event feed.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> RefreshWatcher {
        RefreshWatcher {
            state: Arc::new(Mutex::new(WatchState {
                registrations: Vec::new(),
                force_refresh: true,
                last_error: None,
            })),
            shutdown: CancellationToken::new(),
            eager: self.eager,
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for RefreshWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinates filesystem watching and listener refreshes.
///
/// Construct one per application, register listeners during setup with
/// [`listen`](Self::listen), then share it behind an [`Arc`] and call
/// [`notify`](Self::notify) from wherever staleness matters, typically once
/// per incoming request.
pub struct RefreshWatcher {
    state: Arc<Mutex<WatchState>>,
    shutdown: CancellationToken,
    eager: bool,
    channel_capacity: usize,
}

impl RefreshWatcher {
    pub fn builder() -> RefreshWatcherBuilder {
        RefreshWatcherBuilder::new()
    }

    /// Polling-mode coordinator with the default feed capacity.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Whether eager workers drive refreshes between `notify()` calls.
    pub fn is_eager(&self) -> bool {
        self.eager
    }

    /// Register `listener` for changes under `roots`.
    ///
    /// Part of setup: the `&mut` receiver keeps registration out of the
    /// serving phase, where the coordinator is already shared. Fails only
    /// when a root symlink cannot be resolved or the backend cannot be
    /// created; unreadable roots are logged and skipped.
    pub async fn listen(
        &mut self,
        listener: Arc<dyn Listener>,
        roots: &[PathBuf],
    ) -> Result<(), WatchError> {
        let source = EventSource::subscribe(roots, self.channel_capacity)?;
        self.attach(listener, source.receiver, source.overflow, Some(source.backend))
            .await;
        Ok(())
    }

    /// Wire a listener to an already-built feed. Tests drive the
    /// coordinator through this seam with hand-fed channels.
    pub(crate) async fn attach(
        &self,
        listener: Arc<dyn Listener>,
        receiver: mpsc::Receiver<FsEvent>,
        overflow: Arc<AtomicBool>,
        backend: Option<notify::RecommendedWatcher>,
    ) {
        let mut state = self.state.lock().await;
        let index = state.registrations.len();
        let feed = if self.eager {
            self.spawn_eager_worker(index, listener.clone(), receiver, overflow.clone());
            EventFeed::Eager
        } else {
            EventFeed::Polled(receiver)
        };
        crate::log_event!("watcher", "registered", "{}", listener.name());
        state.registrations.push(Registration {
            listener,
            feed,
            overflow,
            _backend: backend,
        });
    }

    /// Drain pending events and refresh whichever listeners need it.
    ///
    /// Listeners are visited in registration order. A listener refreshes
    /// when a relevant event arrived since its last refresh, when the
    /// first clean cycle has not happened yet, or when its previous
    /// refresh failed. The first error ends the cycle and is returned
    /// verbatim; the failed listener is remembered and retried before any
    /// later listener gets new work.
    ///
    /// Draining never blocks on the filesystem, so a quiet cycle costs a
    /// lock acquisition and nothing else.
    pub async fn notify(&self) -> Result<(), RefreshError> {
        let mut state = self.state.lock().await;

        for index in 0..state.registrations.len() {
            let registration = &mut state.registrations[index];
            let mut refresh_needed = registration.overflow.swap(false, Ordering::SeqCst);
            if let EventFeed::Polled(receiver) = &mut registration.feed {
                while let Ok(event) = receiver.try_recv() {
                    if rebuild_required(&event, registration.listener.as_ref()) {
                        refresh_needed = true;
                    }
                }
            }

            if state.force_refresh || refresh_needed || state.last_error == Some(index) {
                let listener = state.registrations[index].listener.clone();
                crate::debug_event!("watcher", "refreshing", "{}", listener.name());
                if let Err(err) = listener.refresh().await {
                    tracing::warn!("[watcher] {} failed to refresh: {err}", listener.name());
                    state.last_error = Some(index);
                    return Err(err);
                }
            }
        }

        state.force_refresh = false;
        state.last_error = None;
        Ok(())
    }

    /// Background worker owning one registration's feed in eager mode.
    ///
    /// Refreshes under the same exclusive section `notify()` uses. A failed
    /// eager refresh records the listener in `last_error` so the next
    /// `notify()` retries it and surfaces the error to a caller; logging is
    /// all a detached worker could do with it otherwise.
    fn spawn_eager_worker(
        &self,
        index: usize,
        listener: Arc<dyn Listener>,
        mut events: mpsc::Receiver<FsEvent>,
        overflow: Arc<AtomicBool>,
    ) {
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        // Sender gone: the registration was torn down.
                        None => break,
                    },
                };

                let lost_events = overflow.swap(false, Ordering::SeqCst);
                if !lost_events && !rebuild_required(&event, listener.as_ref()) {
                    continue;
                }

                let mut state = state.lock().await;
                crate::debug_event!("watcher", "eager refresh", "{}", listener.name());
                match listener.refresh().await {
                    Ok(()) => {
                        if state.last_error == Some(index) {
                            state.last_error = None;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            "[watcher] {} failed eager refresh: {err}",
                            listener.name()
                        );
                        state.last_error = Some(index);
                    }
                }
            }
            crate::debug_event!("watcher", "eager worker stopped", "{}", listener.name());
        });
    }
}

impl Default for RefreshWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefreshWatcher {
    /// Eager workers go down with the coordinator.
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Event filtering shared by the polled and eager paths.
///
/// Dotfiles never count, regardless of listener: editors and VCS tooling
/// churn them constantly. Discerning listeners must additionally accept
/// both the parent directory name and the file name. Only base names are
/// consulted, never full paths.
pub(crate) fn rebuild_required(event: &FsEvent, listener: &dyn Listener) -> bool {
    let Some(name) = event.path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy();
    if name.starts_with('.') {
        return false;
    }

    let parent = event
        .path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    listener.watches_dir(&parent) && listener.watches_file(&name)
}
