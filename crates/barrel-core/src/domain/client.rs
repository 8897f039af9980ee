//! A client connected to a room.
//!
//! Each room has a fixed table of [`MAX_CONNECTIONS`] slots.  A joining
//! client takes the lowest free slot, and that slot number is the `id` the
//! client is known by in every Announce and Status frame.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::semver::SemVer;

/// Slot index of a client inside its room (`0..=255`).
pub type SlotId = u8;

/// Number of slots in every room.
pub const MAX_CONNECTIONS: usize = SlotId::MAX as usize + 1;

/// A participant that has completed the handshake.
///
/// `addr` is a transport-assigned identifier (a peer address for WebSocket
/// clients, the private socket path for rendezvous clients).  It is the key
/// used to track the client's latest status, so it must be unique within a
/// room for as long as the client is connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Client {
    /// Display name from the handshake.
    pub name: String,
    /// Transport-assigned unique address.
    pub addr: String,
    /// Protocol version the client announced.
    pub version: SemVer,
}

impl Client {
    /// Creates a new client record.
    pub fn new(name: impl Into<String>, addr: impl Into<String>, version: SemVer) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            version,
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}
