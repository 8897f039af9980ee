//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built from defaults, optionally overlaid with a TOML file (see
//! [`crate::infrastructure::config_file`]), and finally with explicit CLI
//! flags in `main.rs`.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use barrel_core::protocol::semver::{SemVer, SERVER_VERSION};

/// Default TCP port for the WebSocket listener.
pub const DEFAULT_PORT: u16 = 8080;

/// Default base directory for the Unix rendezvous transport.
pub const DEFAULT_UNIX_BASE_DIR: &str = "/tmp/grogbarrel";

/// All runtime configuration for the server.
///
/// Build this struct once at startup and then wrap it in an `Arc` so it can
/// be shared cheaply across listener and connection tasks.
///
/// # Example
///
/// ```rust
/// use barrel_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8080);
/// assert!(!cfg.unix_enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub ws_bind_addr: SocketAddr,

    /// Whether the Unix-socket rendezvous transport is started.
    pub unix_enabled: bool,

    /// Directory holding `join.sock` and one sub-directory per room.
    pub unix_base_dir: PathBuf,

    /// How often each open room rebuilds its Status frame.
    pub status_interval: Duration,

    /// Deadline for the handshake and room-name reads on the join socket.
    pub handshake_timeout: Duration,

    /// How long a connection may go without sending a status update.
    pub idle_read_timeout: Duration,

    /// Deadline for each frame written to a Unix-socket client.
    pub write_timeout: Duration,

    /// Deadline for delivering an Error frame before closing.
    pub error_write_timeout: Duration,

    /// How long a private rendezvous endpoint waits for its client.
    pub rendezvous_timeout: Duration,

    /// How often the registry drops closed, unreferenced rooms.
    pub prune_interval: Duration,

    /// Protocol version clients are checked against.
    pub server_version: SemVer,
}

impl ServerConfig {
    /// Path of the shared join socket inside [`Self::unix_base_dir`].
    pub fn join_socket_path(&self) -> PathBuf {
        self.unix_base_dir.join("join.sock")
    }
}

impl Default for ServerConfig {
    /// | Field               | Default             |
    /// |---------------------|---------------------|
    /// | ws_bind_addr        | `127.0.0.1:8080`    |
    /// | unix_enabled        | `false`             |
    /// | unix_base_dir       | `/tmp/grogbarrel`   |
    /// | status_interval     | 1 second            |
    /// | handshake_timeout   | 50 seconds          |
    /// | idle_read_timeout   | 15 minutes          |
    /// | write_timeout       | 100 ms              |
    /// | error_write_timeout | 1 second            |
    /// | rendezvous_timeout  | 60 seconds          |
    /// | prune_interval      | 60 seconds          |
    /// | server_version      | 0.5.0               |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            unix_enabled: false,
            unix_base_dir: PathBuf::from(DEFAULT_UNIX_BASE_DIR),
            status_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(50),
            idle_read_timeout: Duration::from_secs(15 * 60),
            write_timeout: Duration::from_millis(100),
            error_write_timeout: Duration::from_secs(1),
            rendezvous_timeout: Duration::from_secs(60),
            prune_interval: Duration::from_secs(60),
            server_version: SERVER_VERSION,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
