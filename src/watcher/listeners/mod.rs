//! Listener implementations for common development loops.

mod command;

pub use command::CommandListener;
