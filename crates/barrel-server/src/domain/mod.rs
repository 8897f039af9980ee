//! Domain layer for barrel-server.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or external frameworks.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;

pub use config::ServerConfig;
