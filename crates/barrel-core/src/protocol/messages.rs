//! All grog barrel protocol message types.
//!
//! Every application payload starts with a one-byte [`MessageType`].  All
//! multi-byte integers are big-endian.
//!
//! # Message flow (for beginners)
//!
//! ```text
//! Client                                   Server
//! ──────                                   ──────
//! [major][minor][patch][name...]   ──►     handshake (first message only)
//! [offset_hi][offset_lo][state]    ──►     status update (every later message)
//!                                  ◄──     [Announce][count][id][len][name]...
//!                                  ◄──     [Status][count][offset:2][state][id]...
//!                                  ◄──     [Error][utf8 message]  (then close)
//! ```
//!
//! The two server frames are *sampled*: the server rebuilds them in the
//! background and hands the same pre-serialized bytes to every client in a
//! room.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::client::SlotId;
use crate::protocol::semver::SemVer;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size in bytes of a client status update (`[offset:2][state:1]`).
pub const CLIENT_STATUS_SIZE: usize = 3;

/// Size in bytes of the handshake prefix before the client name.
pub const HANDSHAKE_PREFIX_SIZE: usize = 3;

/// Size in bytes of one entry inside a ServerStatus frame.
pub const STATUS_ENTRY_SIZE: usize = 4;

/// Longest client name accepted in a handshake, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Largest number of entries or records a single server frame can describe.
///
/// The count field is one byte wide.
pub const MAX_FRAME_ENTRIES: usize = u8::MAX as usize;

// ── Message type codes ────────────────────────────────────────────────────────

/// Leading byte of every application payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Empty = 0x00,
    Announce = 0x01,
    Status = 0x02,
    Error = 0x03,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(MessageType::Empty),
            0x01 => Ok(MessageType::Announce),
            0x02 => Ok(MessageType::Status),
            0x03 => Ok(MessageType::Error),
            _ => Err(()),
        }
    }
}

// ── Player state ──────────────────────────────────────────────────────────────

/// Playback state reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayerState {
    #[default]
    Unknown = 0x00,
    Playing = 0x01,
    Paused = 0x02,
    Loading = 0x03,
}

impl TryFrom<u8> for PlayerState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PlayerState::Unknown),
            0x01 => Ok(PlayerState::Playing),
            0x02 => Ok(PlayerState::Paused),
            0x03 => Ok(PlayerState::Loading),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlayerState::Unknown => "UNKNOWN",
            PlayerState::Playing => "PLAYING",
            PlayerState::Paused => "PAUSED",
            PlayerState::Loading => "LOADING",
        };
        f.write_str(label)
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// Latest playback status of one client, tagged with the client's slot.
///
/// On the client → server path only `offset` and `player_state` travel on the
/// wire; the server fills in `id` from the connection's slot assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientStatusMessage {
    /// Playback position (milliseconds for the reference clients).
    pub offset: u16,
    /// Play / pause / loading.
    pub player_state: PlayerState,
    /// Slot of the client inside its room.
    pub id: SlotId,
}

impl fmt::Display for ClientStatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.player_state, self.offset)
    }
}

/// First message on every connection: protocol version plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHandshake {
    /// Version the client speaks.
    pub version: SemVer,
    /// Display name, 1..=255 bytes of UTF-8.
    pub name: String,
}

/// One roster entry inside a ServerAnnounce frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceRecord {
    /// Slot of the client.
    pub id: SlotId,
    /// Display name of the client.
    pub name: String,
}

/// A decoded server → client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// A bare `[Empty]` frame.
    Empty,
    /// Room roster, ascending slot order.
    Announce(Vec<AnnounceRecord>),
    /// Sampled playback status of every client that has reported one.
    Status(Vec<ClientStatusMessage>),
    /// Out-of-band error, sent right before the server closes the connection.
    Error(String),
}

impl ServerFrame {
    /// Returns the [`MessageType`] that leads this frame on the wire.
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerFrame::Empty => MessageType::Empty,
            ServerFrame::Announce(_) => MessageType::Announce,
            ServerFrame::Status(_) => MessageType::Status,
            ServerFrame::Error(_) => MessageType::Error,
        }
    }
}
