//! Listener that reruns a build command when watched files change.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::watcher::error::RefreshError;
use crate::watcher::listener::Listener;

/// Runs a shell command on every refresh and fails the refresh when the
/// command does.
///
/// The captured stderr of a failing command becomes the refresh error, so
/// compiler output lands in the browser instead of a terminal nobody is
/// looking at. An empty extension list watches every non-dotfile.
pub struct CommandListener {
    command: String,
    workdir: Option<PathBuf>,
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
}

impl CommandListener {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: None,
            extensions: Vec::new(),
            ignored_dirs: Vec::new(),
        }
    }

    /// Working directory for the command. Defaults to the process cwd.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Only files with one of these extensions trigger a rebuild. Leading
    /// dots are accepted and stripped.
    pub fn watch_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Directory base names whose direct contents never trigger a rebuild,
    /// e.g. build output living next to the sources.
    pub fn ignore_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Listener for CommandListener {
    fn name(&self) -> &str {
        &self.command
    }

    async fn refresh(&self) -> Result<(), RefreshError> {
        let mut cmd = shell_command(&self.command);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().await.map_err(|e| {
            RefreshError::with_source(format!("failed to run `{}`", self.command), e)
        })?;

        if output.status.success() {
            crate::log_event!("command", "rebuilt", "`{}`", self.command);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        if detail.is_empty() {
            Err(RefreshError::new(format!(
                "`{}` exited with {}",
                self.command, output.status
            )))
        } else {
            Err(RefreshError::new(format!(
                "`{}` exited with {}:\n{detail}",
                self.command, output.status
            )))
        }
    }

    fn watches_dir(&self, name: &str) -> bool {
        !self.ignored_dirs.iter().any(|dir| dir == name)
    }

    fn watches_file(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some((_, ext)) = name.rsplit_once('.') else {
            return false;
        };
        self.extensions.iter().any(|allowed| allowed == ext)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allowlist_matches_base_names() {
        let listener = CommandListener::new("make").watch_extensions(["rs", ".html"]);

        assert!(listener.watches_file("main.rs"));
        assert!(listener.watches_file("index.html"));
        assert!(!listener.watches_file("styles.css"));
        assert!(!listener.watches_file("Makefile"), "no extension, no match");
    }

    #[test]
    fn empty_allowlist_matches_everything() {
        let listener = CommandListener::new("make");
        assert!(listener.watches_file("anything.xyz"));
        assert!(listener.watches_file("Makefile"));
    }

    #[test]
    fn ignored_dirs_are_pruned() {
        let listener = CommandListener::new("make").ignore_dirs(["target", "node_modules"]);

        assert!(!listener.watches_dir("target"));
        assert!(!listener.watches_dir("node_modules"));
        assert!(listener.watches_dir("src"));
        assert!(listener.watches_dir(""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_refreshes() {
        let listener = CommandListener::new("true");
        listener.refresh().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_status_and_stderr() {
        let listener = CommandListener::new("echo boom >&2; exit 3");
        let err = listener.refresh().await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("boom"), "stderr missing from {message:?}");
        assert!(message.contains("exit"), "status missing from {message:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runs_in_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let listener =
            CommandListener::new("test -f marker").in_dir(dir.path().to_path_buf());

        listener.refresh().await.unwrap_err();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        listener.refresh().await.unwrap();
    }
}
