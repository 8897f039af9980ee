//! Binary codec for encoding and decoding grog barrel protocol messages.
//!
//! Wire formats (all multi-byte integers are big-endian):
//! ```text
//! client handshake : [major:1][minor:1][patch:1][name:N]            N in 1..=255
//! client status    : [offset:2][player_state:1]                     exactly 3 bytes
//! server status    : [0x02][count:1]([offset:2][state:1][slot:1])*count
//! server announce  : [0x01][count:1]([slot:1][name_len:1][name:name_len])*count
//! error            : [0x03][utf8 message]
//! ```
//!
//! Encoding is append-only: the `*_into` builders append to a caller-owned
//! buffer so the broadcast producers can reuse one allocation per room.
//! Decoding bounds-checks every field before reading it.

use crate::domain::client::SlotId;
use crate::protocol::messages::{
    AnnounceRecord, ClientHandshake, ClientStatusMessage, MessageType, PlayerState, ServerFrame,
    CLIENT_STATUS_SIZE, HANDSHAKE_PREFIX_SIZE, MAX_FRAME_ENTRIES, MAX_NAME_LEN, STATUS_ENTRY_SIZE,
};
use crate::protocol::semver::SemVer;
use thiserror::Error;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The leading message type byte is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// A fixed-size message arrived with the wrong length.
    #[error("wrong message size: expected {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },

    /// A client name is empty, longer than 255 bytes, or not UTF-8.
    #[error("invalid client name: {0}")]
    InvalidName(String),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A frame's count byte disagrees with the entries that follow it.
    #[error("count mismatch: frame declares {declared} entries, found {actual}")]
    CountMismatch { declared: usize, actual: usize },

    /// More entries than a one-byte count can describe.
    #[error("too many entries for one frame: {0} (max {MAX_FRAME_ENTRIES})")]
    TooManyEntries(usize),
}

// ── Client → server ───────────────────────────────────────────────────────────

/// Encodes a client handshake: `[major][minor][patch][name]`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidName`] if the name is empty or longer
/// than 255 bytes.
///
/// # Examples
///
/// ```rust
/// use barrel_core::protocol::codec::{decode_client_handshake, encode_client_handshake};
/// use barrel_core::protocol::messages::ClientHandshake;
/// use barrel_core::protocol::semver::SemVer;
///
/// let hs = ClientHandshake { version: SemVer::new(0, 5, 0), name: "alice".to_string() };
/// let bytes = encode_client_handshake(&hs).unwrap();
/// assert_eq!(bytes, [0, 5, 0, b'a', b'l', b'i', b'c', b'e']);
/// assert_eq!(decode_client_handshake(&bytes).unwrap(), hs);
/// ```
pub fn encode_client_handshake(handshake: &ClientHandshake) -> Result<Vec<u8>, ProtocolError> {
    check_name_len(handshake.name.len())?;
    let mut buf = Vec::with_capacity(HANDSHAKE_PREFIX_SIZE + handshake.name.len());
    buf.extend_from_slice(&handshake.version.to_bytes());
    buf.extend_from_slice(handshake.name.as_bytes());
    Ok(buf)
}

/// Decodes a client handshake.  The name is the remainder of the message.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if fewer than 3 bytes are present.
/// - [`ProtocolError::InvalidName`] if the name is empty, longer than 255
///   bytes, or not valid UTF-8.
pub fn decode_client_handshake(bytes: &[u8]) -> Result<ClientHandshake, ProtocolError> {
    if bytes.len() < HANDSHAKE_PREFIX_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HANDSHAKE_PREFIX_SIZE,
            available: bytes.len(),
        });
    }
    let version = SemVer::from_bytes([bytes[0], bytes[1], bytes[2]]);

    let raw_name = &bytes[HANDSHAKE_PREFIX_SIZE..];
    check_name_len(raw_name.len())?;
    let name = std::str::from_utf8(raw_name)
        .map_err(|e| ProtocolError::InvalidName(format!("not UTF-8: {e}")))?
        .to_string();

    Ok(ClientHandshake { version, name })
}

/// Encodes a client status update: `[offset_hi][offset_lo][player_state]`.
pub fn encode_client_status(offset: u16, player_state: PlayerState) -> [u8; CLIENT_STATUS_SIZE] {
    let [hi, lo] = offset.to_be_bytes();
    [hi, lo, player_state as u8]
}

/// Decodes a 3-byte client status update and tags it with the sender's slot.
///
/// # Errors
///
/// - [`ProtocolError::WrongSize`] if `bytes` is not exactly 3 bytes long.
/// - [`ProtocolError::MalformedPayload`] if the player state byte is unknown.
pub fn decode_client_status(bytes: &[u8], id: SlotId) -> Result<ClientStatusMessage, ProtocolError> {
    if bytes.len() != CLIENT_STATUS_SIZE {
        return Err(ProtocolError::WrongSize {
            expected: CLIENT_STATUS_SIZE,
            actual: bytes.len(),
        });
    }
    let offset = read_u16(bytes, 0)?;
    let player_state = read_player_state(bytes, 2)?;
    Ok(ClientStatusMessage {
        offset,
        player_state,
        id,
    })
}

// ── Server → client ───────────────────────────────────────────────────────────

/// Appends a complete ServerStatus frame to `buf`.
///
/// On error `buf` is left exactly as it was before the call.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyEntries`] if more than 255 entries are given.
pub fn encode_server_status_into<I>(buf: &mut Vec<u8>, entries: I) -> Result<(), ProtocolError>
where
    I: IntoIterator<Item = ClientStatusMessage>,
{
    let start = buf.len();
    buf.push(MessageType::Status as u8);
    buf.push(0); // count, patched below

    let mut count = 0usize;
    for entry in entries {
        buf.extend_from_slice(&entry.offset.to_be_bytes());
        buf.push(entry.player_state as u8);
        buf.push(entry.id);
        count += 1;
    }

    finish_count(buf, start, count)
}

/// Allocating convenience wrapper around [`encode_server_status_into`].
///
/// # Errors
///
/// See [`encode_server_status_into`].
pub fn encode_server_status(entries: &[ClientStatusMessage]) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(2 + entries.len() * STATUS_ENTRY_SIZE);
    encode_server_status_into(&mut buf, entries.iter().copied())?;
    Ok(buf)
}

/// Appends a complete ServerAnnounce frame to `buf`.
///
/// Records are written in the order given; callers pass them in ascending
/// slot order.  On error `buf` is left exactly as it was before the call.
///
/// # Errors
///
/// - [`ProtocolError::TooManyEntries`] if more than 255 records are given.
/// - [`ProtocolError::InvalidName`] if a name is empty or longer than 255 bytes.
pub fn encode_server_announce_into<'a, I>(buf: &mut Vec<u8>, records: I) -> Result<(), ProtocolError>
where
    I: IntoIterator<Item = (SlotId, &'a str)>,
{
    let start = buf.len();
    buf.push(MessageType::Announce as u8);
    buf.push(0); // count, patched below

    let mut count = 0usize;
    for (id, name) in records {
        if let Err(e) = check_name_len(name.len()) {
            buf.truncate(start);
            return Err(e);
        }
        buf.push(id);
        buf.push(name.len() as u8);
        buf.extend_from_slice(name.as_bytes());
        count += 1;
    }

    finish_count(buf, start, count)
}

/// Allocating convenience wrapper around [`encode_server_announce_into`].
///
/// # Errors
///
/// See [`encode_server_announce_into`].
pub fn encode_server_announce(records: &[AnnounceRecord]) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    encode_server_announce_into(&mut buf, records.iter().map(|r| (r.id, r.name.as_str())))?;
    Ok(buf)
}

/// Encodes an Error frame: `[0x03][utf8 message]`.
pub fn encode_error_frame(message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + message.len());
    buf.push(MessageType::Error as u8);
    buf.extend_from_slice(message.as_bytes());
    buf
}

/// Decodes one complete server → client frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is empty, has an unknown type, is
/// truncated, or its count byte disagrees with its entries.
///
/// # Examples
///
/// ```rust
/// use barrel_core::protocol::codec::{decode_server_frame, encode_error_frame};
/// use barrel_core::protocol::messages::ServerFrame;
///
/// let bytes = encode_error_frame("room is full");
/// assert_eq!(
///     decode_server_frame(&bytes).unwrap(),
///     ServerFrame::Error("room is full".to_string())
/// );
/// ```
pub fn decode_server_frame(bytes: &[u8]) -> Result<ServerFrame, ProtocolError> {
    let Some((&type_byte, body)) = bytes.split_first() else {
        return Err(ProtocolError::InsufficientData {
            needed: 1,
            available: 0,
        });
    };
    let msg_type =
        MessageType::try_from(type_byte).map_err(|_| ProtocolError::UnknownMessageType(type_byte))?;

    match msg_type {
        MessageType::Empty => Ok(ServerFrame::Empty),
        MessageType::Status => decode_status_body(body).map(ServerFrame::Status),
        MessageType::Announce => decode_announce_body(body).map(ServerFrame::Announce),
        MessageType::Error => {
            let message = std::str::from_utf8(body)
                .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?;
            Ok(ServerFrame::Error(message.to_string()))
        }
    }
}

// ── Per-frame decode helpers ──────────────────────────────────────────────────

fn decode_status_body(p: &[u8]) -> Result<Vec<ClientStatusMessage>, ProtocolError> {
    require_len(p, 1, "Status.count")?;
    let declared = p[0] as usize;
    let entries = &p[1..];
    if entries.len() % STATUS_ENTRY_SIZE != 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "Status: {} trailing bytes after last entry",
            entries.len() % STATUS_ENTRY_SIZE
        )));
    }
    let actual = entries.len() / STATUS_ENTRY_SIZE;
    if actual != declared {
        return Err(ProtocolError::CountMismatch { declared, actual });
    }

    let mut out = Vec::with_capacity(actual);
    for chunk in entries.chunks_exact(STATUS_ENTRY_SIZE) {
        out.push(ClientStatusMessage {
            offset: read_u16(chunk, 0)?,
            player_state: read_player_state(chunk, 2)?,
            id: chunk[3],
        });
    }
    Ok(out)
}

fn decode_announce_body(p: &[u8]) -> Result<Vec<AnnounceRecord>, ProtocolError> {
    require_len(p, 1, "Announce.count")?;
    let declared = p[0] as usize;

    let mut records = Vec::with_capacity(declared);
    let mut off = 1;
    while off < p.len() {
        // [slot][name_len]
        require_len(p, off + 2, "Announce.record")?;
        let id = p[off];
        let name_len = p[off + 1] as usize;
        let start = off + 2;
        require_len(p, start + name_len, "Announce.name")?;
        let name = std::str::from_utf8(&p[start..start + name_len])
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
            .to_string();
        records.push(AnnounceRecord { id, name });
        off = start + name_len;
    }

    if records.len() != declared {
        return Err(ProtocolError::CountMismatch {
            declared,
            actual: records.len(),
        });
    }
    Ok(records)
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn finish_count(buf: &mut Vec<u8>, start: usize, count: usize) -> Result<(), ProtocolError> {
    if count > MAX_FRAME_ENTRIES {
        buf.truncate(start);
        return Err(ProtocolError::TooManyEntries(count));
    }
    buf[start + 1] = count as u8;
    Ok(())
}

fn check_name_len(len: usize) -> Result<(), ProtocolError> {
    if len == 0 || len > MAX_NAME_LEN {
        Err(ProtocolError::InvalidName(format!(
            "length {len} outside 1..={MAX_NAME_LEN}"
        )))
    } else {
        Ok(())
    }
}

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 2,
            available: buf.len(),
        });
    }
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

fn read_player_state(buf: &[u8], offset: usize) -> Result<PlayerState, ProtocolError> {
    let Some(&raw) = buf.get(offset) else {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 1,
            available: buf.len(),
        });
    };
    PlayerState::try_from(raw)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown player state: {raw}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
