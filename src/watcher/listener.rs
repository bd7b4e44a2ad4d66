//! Listener contract for consumers of filesystem change signals.

use async_trait::async_trait;

use super::error::RefreshError;

/// A consumer of coarse "something you watch changed" signals.
///
/// The coordinator does not tell a listener which paths changed, only that
/// at least one relevant change happened since its last refresh. Listeners
/// are expected to rescan or rebuild whatever they maintain.
///
/// The two predicates make a listener *discerning*: override them and the
/// coordinator skips events whose parent directory name or base file name
/// the listener does not care about. The defaults accept everything, which
/// gives plain listeners the classic "any change triggers a refresh"
/// behavior. Dotfiles are filtered out before the predicates ever run.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Name used in log lines and failure reports.
    fn name(&self) -> &str;

    /// Rebuild whatever this listener maintains.
    ///
    /// Called with the coordinator's exclusive section held, so two
    /// refreshes never run at the same time. Errors are returned to the
    /// caller that triggered the cycle and the listener is retried on the
    /// next one.
    async fn refresh(&self) -> Result<(), RefreshError>;

    /// Whether changes inside a directory with this base name matter.
    fn watches_dir(&self, _name: &str) -> bool {
        true
    }

    /// Whether changes to a file with this base name matter.
    fn watches_file(&self, _name: &str) -> bool {
        true
    }
}
