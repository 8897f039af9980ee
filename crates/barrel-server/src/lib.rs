//! barrel-server library crate.
//!
//! This crate keeps groups of media players in sync.  Clients join a named
//! room over WebSocket or a local Unix socket, report their playback status,
//! and receive the room's roster and everyone's latest status back.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Player (WebSocket)        Player (Unix socket)
//!         ↕                          ↕
//! [barrel-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      Room, broadcast producers, RoomRegistry, Driver
//!   └── infrastructure/
//!         ├── ws_server/    WebSocket accept loop (tokio-tungstenite)
//!         ├── unix_server/  join.sock rendezvous + private sockets
//!         ├── session/      shared per-connection error handling
//!         └── config_file/  optional TOML configuration
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `barrel-core`; it spawns the room
//!   producers but never opens a socket.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: rooms, broadcast, registry, and handshake rules.
pub mod application;

/// Infrastructure layer: transports and configuration file loading.
pub mod infrastructure;
