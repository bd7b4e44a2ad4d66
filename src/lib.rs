pub mod config;
#[cfg(feature = "http-server")]
pub mod filter;
pub mod logging;
pub mod watcher;

pub use config::{Settings, WatcherMode};
pub use watcher::{
    CommandListener, FsEvent, FsEventKind, Listener, RefreshError, RefreshWatcher,
    RefreshWatcherBuilder, WatchError,
};
