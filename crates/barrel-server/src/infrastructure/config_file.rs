//! TOML configuration file for barrel-server.
//!
//! # File format
//!
//! Every key is optional; anything left out takes the same default the CLI
//! uses.  A complete file looks like this:
//!
//! ```toml
//! [server]
//! hostname = "localhost"
//! port = 8080
//! log_level = "warn"
//!
//! [unix]
//! enabled = true
//! base_dir = "/tmp/grogbarrel"
//!
//! [timeouts]
//! status_interval_ms = 1000
//! handshake_secs = 50
//! idle_read_secs = 900
//! write_ms = 100
//! error_write_ms = 1000
//! rendezvous_secs = 60
//! prune_secs = 60
//! ```
//!
//! # How values are layered (for beginners)
//!
//! `main.rs` loads this file (when `--config` is given), turns it into a
//! [`ServerConfig`] with [`FileConfig::to_server_config`], and then lets any
//! CLI flag the user typed explicitly overwrite the matching field.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{ServerConfig, DEFAULT_PORT, DEFAULT_UNIX_BASE_DIR};

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid hostname '{0}': expected an IP address or 'localhost'")]
    InvalidHostname(String),
}

// ── Config structs ────────────────────────────────────────────────────────────

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub unix: UnixSection,

    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// `[server]` section: the WebSocket listener and logging.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// `[unix]` section: the Unix-socket rendezvous transport.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UnixSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

/// `[timeouts]` section.  Units are in the key names.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TimeoutSection {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_handshake_secs")]
    pub handshake_secs: u64,

    #[serde(default = "default_idle_read_secs")]
    pub idle_read_secs: u64,

    #[serde(default = "default_write_ms")]
    pub write_ms: u64,

    #[serde(default = "default_error_write_ms")]
    pub error_write_ms: u64,

    #[serde(default = "default_rendezvous_secs")]
    pub rendezvous_secs: u64,

    #[serde(default = "default_prune_secs")]
    pub prune_secs: u64,
}

// ── Default value functions (required by serde) ───────────────────────────────

fn default_hostname() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_base_dir() -> PathBuf {
    PathBuf::from(DEFAULT_UNIX_BASE_DIR)
}
fn default_status_interval_ms() -> u64 {
    1_000
}
fn default_handshake_secs() -> u64 {
    50
}
fn default_idle_read_secs() -> u64 {
    15 * 60
}
fn default_write_ms() -> u64 {
    100
}
fn default_error_write_ms() -> u64 {
    1_000
}
fn default_rendezvous_secs() -> u64 {
    60
}
fn default_prune_secs() -> u64 {
    60
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for UnixSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_dir: default_base_dir(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            handshake_secs: default_handshake_secs(),
            idle_read_secs: default_idle_read_secs(),
            write_ms: default_write_ms(),
            error_write_ms: default_error_write_ms(),
            rendezvous_secs: default_rendezvous_secs(),
            prune_secs: default_prune_secs(),
        }
    }
}

impl FileConfig {
    /// Builds the runtime configuration described by this file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostname`] if `server.hostname` is not
    /// usable as a bind address.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let t = &self.timeouts;
        Ok(ServerConfig {
            ws_bind_addr: resolve_bind_addr(&self.server.hostname, self.server.port)?,
            unix_enabled: self.unix.enabled,
            unix_base_dir: self.unix.base_dir.clone(),
            status_interval: Duration::from_millis(t.status_interval_ms),
            handshake_timeout: Duration::from_secs(t.handshake_secs),
            idle_read_timeout: Duration::from_secs(t.idle_read_secs),
            write_timeout: Duration::from_millis(t.write_ms),
            error_write_timeout: Duration::from_millis(t.error_write_ms),
            rendezvous_timeout: Duration::from_secs(t.rendezvous_secs),
            prune_interval: Duration::from_secs(t.prune_secs),
            ..ServerConfig::default()
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses the configuration file at `path`.
///
/// Unlike a per-user settings file, a path given on the command line must
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: FileConfig = toml::from_str(&content)?;
    Ok(cfg)
}

/// Turns a hostname and port into a listener address.
///
/// `localhost` maps to `127.0.0.1`; anything else must be a literal IPv4 or
/// IPv6 address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidHostname`] for anything else.
pub fn resolve_bind_addr(hostname: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip = if hostname.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        hostname
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHostname(hostname.to_string()))?
    };
    Ok(SocketAddr::new(ip, port))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
