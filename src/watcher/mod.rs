//! Filesystem watching with serialized refresh dispatch.
//!
//! This module keeps development servers honest: listeners register for
//! the paths they depend on, and a coordinator refreshes them before stale
//! state can be served.
//!
//! # Architecture
//!
//! ```text
//! notify backend (one per registration)
//!   - raw OS events, reduced to create/modify/remove
//!   - bounded feed + overflow flag
//!         |
//! RefreshWatcher
//!   - drains feeds on notify(), or eager workers drain them live
//!   - one exclusive section, refreshes in registration order
//!   - first error stops the cycle and sticks until the retry succeeds
//!         |
//!    +---------+---------+
//!    |                   |
//! CommandListener   your Listener impl
//! ```

mod coordinator;
mod error;
mod events;
mod listener;
pub mod listeners;

pub use coordinator::{RefreshWatcher, RefreshWatcherBuilder};
pub use error::{RefreshError, WatchError};
pub use events::{FsEvent, FsEventKind};
pub use listener::Listener;
pub use listeners::CommandListener;
