//! Infrastructure layer for barrel-server.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket and Unix
//! socket connections, running the per-connection read/write loops, and
//! reading the optional configuration file.
//!
//! # Responsibilities
//!
//! - Binding the WebSocket listener and routing `/barrel/{room}` upgrades
//! - Binding the Unix join socket and the per-client rendezvous endpoints
//! - Implementing the [`crate::application::Driver`] trait for each transport
//! - Spawning per-connection Tokio tasks
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Room membership and broadcast logic (that is the application layer)
//! - Wire format encoding (that is `barrel-core`)

pub mod config_file;
pub mod session;
#[cfg(unix)]
pub mod unix_server;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{load_config, ConfigError, FileConfig};
pub use session::SessionError;
#[cfg(unix)]
pub use unix_server::UnixServer;
pub use ws_server::WsServer;
