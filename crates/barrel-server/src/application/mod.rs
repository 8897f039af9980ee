//! Application layer for barrel-server.
//!
//! The application layer owns the synchronization logic: rooms, their
//! broadcast producers, the registry that finds rooms by name, and the
//! transport-neutral handshake rules.  It knows *what* to do with a client,
//! but never touches a socket.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod broadcast;
pub mod driver;
pub mod registry;
pub mod room;

pub use driver::{accept_client, parse_handshake, Driver, HandshakeError};
pub use registry::RoomRegistry;
pub use room::{Membership, Room, RoomError};
