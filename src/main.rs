use clap::{Parser, Subcommand};
use devwatch::WatcherMode;
use devwatch::config::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devwatch")]
#[command(about = "Watch sources, rerun the build, and serve the result without going stale")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to devwatch.toml found from the current
    /// directory upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory, refreshing listeners before each request
    Serve {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory to serve (overrides config)
        #[arg(long)]
        serve_dir: Option<PathBuf>,

        /// Watch root, repeatable (overrides config)
        #[arg(long = "root")]
        roots: Vec<PathBuf>,

        /// Rebuild command run when watched files change
        #[arg(long)]
        exec: Option<String>,

        /// Rebuild as events arrive instead of waiting for the next request
        #[arg(long)]
        eager: bool,
    },

    /// Show current configuration
    Config,

    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?,
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            eprintln!("Using default configuration.");
            Settings::default()
        }),
    };
    devwatch::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Serve {
            bind,
            serve_dir,
            roots,
            exec,
            eager,
        } => {
            // CLI flags beat config file values.
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            if let Some(serve_dir) = serve_dir {
                settings.server.serve_dir = serve_dir;
            }
            if !roots.is_empty() {
                settings.server.watch_roots = roots;
            }
            if exec.is_some() {
                settings.server.rebuild_command = exec;
            }
            if eager {
                settings.watch.mode = WatcherMode::Eager;
            }
            serve(settings).await
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }

        Commands::Init { force } => {
            Settings::init_config_file(force).map_err(|e| anyhow::anyhow!("{e}"))?;
            Ok(())
        }
    }
}

#[cfg(feature = "http-server")]
async fn serve(settings: Settings) -> anyhow::Result<()> {
    use std::sync::Arc;

    use axum::Router;
    use axum::middleware;
    use devwatch::filter::{InstalledWatcher, watch_filter};
    use devwatch::{CommandListener, RefreshWatcher};
    use tower_http::services::ServeDir;

    let watcher: InstalledWatcher = if !settings.watch.enabled {
        None
    } else if let Some(command) = &settings.server.rebuild_command {
        let mut watcher = RefreshWatcher::builder()
            .eager(settings.eager_refresh_enabled())
            .build();
        let listener = CommandListener::new(command.clone())
            .watch_extensions(settings.server.watched_extensions.iter().cloned())
            .ignore_dirs(settings.server.ignored_dirs.iter().cloned());
        watcher
            .listen(Arc::new(listener), &settings.server.watch_roots)
            .await?;
        devwatch::log_event!(
            "serve",
            "watching",
            "{} root(s) in {} mode",
            settings.server.watch_roots.len(),
            if watcher.is_eager() { "eager" } else { "normal" }
        );
        Some(Arc::new(watcher))
    } else {
        tracing::warn!(
            "[serve] watching enabled but no rebuild command configured, serving without a watcher"
        );
        None
    };

    let app = Router::new()
        .fallback_service(ServeDir::new(&settings.server.serve_dir))
        .layer(middleware::from_fn_with_state(watcher.clone(), watch_filter));

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    devwatch::log_event!("serve", "listening", "http://{}", settings.server.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    devwatch::log_event!("serve", "stopped");
    Ok(())
}

#[cfg(feature = "http-server")]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    devwatch::log_event!("serve", "shutdown signal received");
}

#[cfg(not(feature = "http-server"))]
async fn serve(_settings: Settings) -> anyhow::Result<()> {
    anyhow::bail!(
        "HTTP server support is not compiled in. Rebuild with: cargo build --features http-server"
    )
}
