//! # barrel-core
//!
//! Shared library for grog barrel containing the wire protocol codec,
//! version negotiation, and domain types.
//!
//! It has no dependencies on sockets, async runtimes, or the filesystem.
//!
//! # Architecture overview (for beginners)
//!
//! Grog barrel keeps a group of media players in sync.  Clients connect to a
//! named *room*, send their playback position and state a few times a
//! second, and receive two kinds of frames back: a roster of who is in the
//! room (Announce) and the latest status of everyone (Status).
//!
//! This crate (`barrel-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network: the handshake,
//!   status updates, and the server's Announce / Status / Error frames.
//!
//! - **`domain`** – The connected [`Client`] and its slot numbering.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `barrel_core::Client` instead of `barrel_core::domain::client::Client`.
pub use domain::client::{Client, SlotId, MAX_CONNECTIONS};
pub use protocol::codec::ProtocolError;
pub use protocol::messages::{
    AnnounceRecord, ClientHandshake, ClientStatusMessage, MessageType, PlayerState, ServerFrame,
};
pub use protocol::semver::{SemVer, SERVER_VERSION};
