//! Configuration for the dev server and watcher.
//!
//! Layered configuration with three sources, later ones winning:
//! - Default values
//! - `devwatch.toml`, found in the current directory or any ancestor
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DEVWATCH_` and use double
//! underscores to separate nested levels:
//! - `DEVWATCH_WATCH__MODE=eager` sets `watch.mode`
//! - `DEVWATCH_SERVER__BIND=0.0.0.0:3000` sets `server.bind`
//! - `DEVWATCH_DEV_MODE=false` sets `dev_mode`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// File name searched for from the current directory upward.
pub const CONFIG_FILE_NAME: &str = "devwatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Development mode. Eager refresh is a dev-only behavior; turning
    /// this off forces per-request polling no matter what `watch.mode`
    /// says.
    #[serde(default = "default_true")]
    pub dev_mode: bool,

    /// Watcher behavior
    #[serde(default)]
    pub watch: WatchConfig,

    /// Dev server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Log level configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Master switch. With this off the server never constructs a watcher
    /// and serves whatever is on disk.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How refreshes are driven.
    #[serde(default)]
    pub mode: WatcherMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatcherMode {
    /// Refresh when polled, once per incoming request.
    #[default]
    Normal,
    /// Refresh from background workers as events arrive.
    Eager,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Bind address for the dev server
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory served to the browser
    #[serde(default = "default_serve_dir")]
    pub serve_dir: PathBuf,

    /// Roots handed to the watcher. Missing roots are skipped with a
    /// warning, so listing directories that only exist in some checkouts
    /// is fine.
    #[serde(default = "default_watch_roots")]
    pub watch_roots: Vec<PathBuf>,

    /// Command rerun when watched files change. Without one the server
    /// has nothing to refresh and runs unwatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild_command: Option<String>,

    /// File extensions that trigger a rebuild. Empty means any
    /// non-dotfile.
    #[serde(default)]
    pub watched_extensions: Vec<String>,

    /// Directory base names whose direct contents never trigger a rebuild
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `devwatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}
fn default_serve_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_watch_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}
fn default_ignored_dirs() -> Vec<String> {
    vec!["target".to_string(), "node_modules".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            dev_mode: true,
            watch: WatchConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: WatcherMode::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            serve_dir: default_serve_dir(),
            watch_roots: default_watch_roots(),
            rebuild_command: None,
            watched_extensions: Vec::new(),
            ignored_dirs: default_ignored_dirs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path =
            Self::find_config_file().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still applying environment
    /// overrides on top. A missing file contributes nothing.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Layer in environment variables with DEVWATCH_ prefix.
            // Double underscore separates nested levels; single
            // underscores stay part of the field name.
            .merge(Env::prefixed("DEVWATCH_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `devwatch.toml` by searching from the current directory up to
    /// the filesystem root.
    fn find_config_file() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let candidate = ancestor.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }

    /// Whether refreshes should run eagerly in the background.
    ///
    /// Requires all three switches at once: development mode, watching
    /// enabled, and the eager mode selected. Production deployments that
    /// flip `dev_mode` off get per-request polling regardless of the
    /// other two.
    pub fn eager_refresh_enabled(&self) -> bool {
        self.dev_mode && self.watch.enabled && self.watch.mode == WatcherMode::Eager
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default config file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_FILE_NAME);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let existed = config_path.exists();
        Settings::default().save(&config_path)?;
        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.dev_mode);
        assert!(settings.watch.enabled);
        assert_eq!(settings.watch.mode, WatcherMode::Normal);
        assert_eq!(settings.server.bind, "127.0.0.1:4000");
        assert_eq!(settings.server.watch_roots, vec![PathBuf::from("src")]);
        assert!(settings.server.rebuild_command.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
version = 2

[watch]
mode = "eager"

[server]
bind = "0.0.0.0:8080"
rebuild_command = "cargo build"
watched_extensions = ["rs", "html"]

[logging]
default = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.mode, WatcherMode::Eager);
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
        assert_eq!(
            settings.server.rebuild_command.as_deref(),
            Some("cargo build")
        );
        assert_eq!(settings.server.watched_extensions, vec!["rs", "html"]);
        assert_eq!(settings.logging.default, "debug");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        // Only specify a few settings
        let toml_content = r#"
[server]
serve_dir = "public"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.server.serve_dir, PathBuf::from("public"));

        // Default values should still be present
        assert_eq!(settings.version, 1);
        assert!(settings.watch.enabled);
        assert_eq!(settings.server.bind, "127.0.0.1:4000");
        assert!(!settings.server.ignored_dirs.is_empty());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let mut settings = Settings::default();
        settings.server.bind = "127.0.0.1:9999".to_string();
        settings.watch.mode = WatcherMode::Eager;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.server.bind, "127.0.0.1:9999");
        assert_eq!(loaded.watch.mode, WatcherMode::Eager);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[server]
bind = "127.0.0.1:1234"
serve_dir = "public"
"#;
        fs::write(&config_path, toml_content).unwrap();

        // Environment variables should override config file values
        unsafe {
            std::env::set_var("DEVWATCH_SERVER__BIND", "0.0.0.0:5678");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        // Environment variable wins
        assert_eq!(settings.server.bind, "0.0.0.0:5678");
        // Config file value used when no env var
        assert_eq!(settings.server.serve_dir, PathBuf::from("public"));

        // Clean up
        unsafe {
            std::env::remove_var("DEVWATCH_SERVER__BIND");
        }
    }

    #[test]
    fn test_eager_refresh_requires_all_three_flags() {
        let mut settings = Settings::default();
        settings.watch.mode = WatcherMode::Eager;
        assert!(settings.eager_refresh_enabled());

        settings.dev_mode = false;
        assert!(!settings.eager_refresh_enabled());

        settings.dev_mode = true;
        settings.watch.enabled = false;
        assert!(!settings.eager_refresh_enabled());

        settings.watch.enabled = true;
        settings.watch.mode = WatcherMode::Normal;
        assert!(!settings.eager_refresh_enabled());
    }
}
