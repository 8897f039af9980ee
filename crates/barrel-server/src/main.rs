//! Grog barrel room synchronization server: entry point.
//!
//! This binary accepts co-playback clients, seats them in named rooms, and
//! keeps every member of a room informed of who is present and what
//! everyone's player is doing.
//!
//! # Usage
//!
//! ```text
//! barrel-server [OPTIONS]
//!
//! Options:
//!   --port          <PORT>  WebSocket listener port [default: 8080]
//!   --hostname      <HOST>  WebSocket listener address [default: localhost]
//!   --log-level     <LEVEL> Log filter when RUST_LOG is unset [default: warn]
//!   --sockserver            Also serve the Unix-socket rendezvous transport
//!   --sock-base-dir <DIR>   Base directory for Unix sockets [default: /tmp/grogbarrel]
//!   --config        <FILE>  Optional TOML configuration file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Flag              |
//! |------------------------|-------------------|
//! | `BARREL_PORT`          | `--port`          |
//! | `BARREL_HOSTNAME`      | `--hostname`      |
//! | `BARREL_LOG_LEVEL`     | `--log-level`     |
//! | `BARREL_SOCKSERVER`    | `--sockserver`    |
//! | `BARREL_SOCK_BASE_DIR` | `--sock-base-dir` |
//! | `BARREL_CONFIG`        | `--config`        |
//!
//! Values are layered: built-in defaults, then the config file, then any
//! flag (or environment variable) that was actually given.
//!
//! # Architecture overview
//!
//! ```text
//! clients (WebSocket)        clients (Unix socket)
//!       ↕                           ↕
//! infrastructure/ws_server   infrastructure/unix_server
//!       ╰──────────┬────────────────╯
//!          application/driver     handshake rules
//!          application/registry   room lookup
//!          application/room       seats + statuses
//!          application/broadcast  status / announce producers
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use barrel_server::application::RoomRegistry;
use barrel_server::domain::ServerConfig;
use barrel_server::infrastructure::config_file::resolve_bind_addr;
use barrel_server::infrastructure::{load_config, FileConfig, WsServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Grog barrel room synchronization server.
///
/// Every flag is optional.  A flag that is not given leaves the value from
/// the config file (or the built-in default) untouched.
#[derive(Debug, Parser)]
#[command(
    name = "barrel-server",
    about = "Room synchronization server for grog barrel co-playback clients",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener [default: 8080].
    #[arg(long, env = "BARREL_PORT")]
    port: Option<u16>,

    /// Address for the WebSocket listener: an IP literal or `localhost` [default: localhost].
    #[arg(long, env = "BARREL_HOSTNAME")]
    hostname: Option<String>,

    /// Log filter used when `RUST_LOG` is not set [default: warn].
    #[arg(long, env = "BARREL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Also serve the Unix-socket rendezvous transport.
    #[arg(long, env = "BARREL_SOCKSERVER")]
    sockserver: bool,

    /// Base directory for the join socket and per-room socket directories.
    #[arg(long, env = "BARREL_SOCK_BASE_DIR")]
    sock_base_dir: Option<PathBuf>,

    /// Optional TOML configuration file.
    #[arg(long, env = "BARREL_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file named by `--config`, or the defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn file_config(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file '{}'", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// The log filter to use when `RUST_LOG` is unset.
    fn log_filter(&self, file: &FileConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| file.server.log_level.clone())
    }

    /// Overlays the flags that were given on top of `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting hostname is not a usable address.
    fn into_server_config(self, file: &FileConfig) -> anyhow::Result<ServerConfig> {
        let mut config = file
            .to_server_config()
            .context("invalid configuration file")?;

        if self.port.is_some() || self.hostname.is_some() {
            let hostname = self.hostname.as_deref().unwrap_or(&file.server.hostname);
            let port = self.port.unwrap_or(file.server.port);
            config.ws_bind_addr = resolve_bind_addr(hostname, port)
                .with_context(|| format!("invalid listen address '{hostname}:{port}'"))?;
        }
        if self.sockserver {
            config.unix_enabled = true;
        }
        if let Some(dir) = self.sock_base_dir {
            config.unix_base_dir = dir;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the optional config file is loaded.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    `--log-level` flag (or the file's `log_level`) is used.
/// 3. A Ctrl+C handler is spawned; it cancels a shared
///    [`CancellationToken`] that every listener and connection watches.
/// 4. The WebSocket server, the optional Unix server, and the registry
///    pruner run until that token fires.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.file_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    let fallback = cli.log_filter(&file);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    let config = Arc::new(cli.into_server_config(&file)?);
    info!(
        ws = %config.ws_bind_addr,
        unix = config.unix_enabled,
        version = %config.server_version,
        "grog barrel server starting"
    );

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl+C, shutting down"),
                Err(e) => error!(error = %e, "failed to listen for Ctrl+C signal"),
            }
            shutdown.cancel();
        });
    }

    let registry = Arc::new(RoomRegistry::new(config.status_interval));
    let pruner = tokio::spawn(
        Arc::clone(&registry).run_pruner(config.prune_interval, shutdown.clone()),
    );

    let ws = WsServer::bind(Arc::clone(&config), Arc::clone(&registry)).await?;
    let ws_task = tokio::spawn(ws.run(shutdown.clone()));

    let unix_task = start_unix_server(&config, &registry, &shutdown).await?;

    // A listener that dies takes the whole server down with it.
    let result = match ws_task.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("WebSocket server task failed: {e}")),
    };
    shutdown.cancel();

    if let Some(task) = unix_task {
        match task.await {
            Ok(Err(e)) => error!(error = %e, "Unix socket server failed"),
            Err(e) => error!(error = %e, "Unix socket server task failed"),
            Ok(Ok(())) => {}
        }
    }
    let _ = pruner.await;

    info!("grog barrel server stopped");
    result
}

#[cfg(unix)]
async fn start_unix_server(
    config: &Arc<ServerConfig>,
    registry: &Arc<RoomRegistry>,
    shutdown: &CancellationToken,
) -> anyhow::Result<Option<tokio::task::JoinHandle<anyhow::Result<()>>>> {
    use barrel_server::infrastructure::UnixServer;

    if !config.unix_enabled {
        return Ok(None);
    }
    let server = UnixServer::bind(Arc::clone(config), Arc::clone(registry)).await?;
    let shutdown = shutdown.clone();
    Ok(Some(tokio::spawn(async move {
        let result = server.run(shutdown.clone()).await;
        if result.is_err() {
            shutdown.cancel();
        }
        result
    })))
}

#[cfg(not(unix))]
async fn start_unix_server(
    config: &Arc<ServerConfig>,
    _registry: &Arc<RoomRegistry>,
    _shutdown: &CancellationToken,
) -> anyhow::Result<Option<tokio::task::JoinHandle<anyhow::Result<()>>>> {
    if config.unix_enabled {
        anyhow::bail!("the Unix socket transport is not available on this platform");
    }
    Ok(None)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
