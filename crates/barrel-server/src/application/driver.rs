//! The transport capability trait and the handshake rules shared by every transport.
//!
//! # What is a Driver? (for beginners)
//!
//! Grog barrel speaks the same protocol over two very different transports:
//! WebSocket (message-framed) and Unix domain sockets (a raw byte stream).
//! The only things the connection logic needs from a transport *before* a
//! client is seated are:
//!
//! 1. Read the handshake and turn it into a [`Client`] ([`Driver::parse_client`]).
//! 2. Tell the client why it is being turned away ([`Driver::write_error`]).
//!
//! Each transport implements this trait; [`accept_client`] runs the shared
//! "parse, or report and refuse" step on top of it.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use barrel_core::domain::client::Client;
use barrel_core::protocol::codec::{decode_client_handshake, ProtocolError};
use barrel_core::protocol::messages::HANDSHAKE_PREFIX_SIZE;
use barrel_core::protocol::semver::SemVer;

/// Longest room name accepted, in bytes.
pub const MAX_ROOM_NAME_LEN: usize = 256;

/// Why a handshake (or the rendezvous room-name step) was refused.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The client's version cannot be served by this server.
    #[error("incompatible version: server {server}, client {client}")]
    IncompatibleVersion { server: SemVer, client: SemVer },

    /// The client name is empty, too long, not UTF-8, or not a usable path segment.
    #[error("invalid client name")]
    InvalidName,

    /// The room name is empty, too long, not UTF-8, or not a usable path segment.
    #[error("invalid room name")]
    InvalidRoomName,

    /// The handshake bytes could not be decoded.
    #[error("malformed handshake: {0}")]
    Malformed(ProtocolError),

    /// The peer closed the connection before sending a complete message.
    #[error("unexpected end of message")]
    UnexpectedEof,

    /// The peer did not send the named message before the deadline.
    #[error("took too long to send {0}")]
    Timeout(&'static str),

    /// The transport failed underneath the handshake.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl HandshakeError {
    /// Text for the Error frame sent to the client, or `None` when the
    /// connection is already unusable.
    pub fn client_message(&self) -> Option<String> {
        match self {
            HandshakeError::Transport(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// The two capabilities every transport provides.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send {
    /// Sends an Error frame carrying `message`.  The caller closes afterwards.
    async fn write_error(&mut self, message: &str) -> std::io::Result<()>;

    /// Reads exactly one handshake message and returns the client it describes.
    async fn parse_client(&mut self) -> Result<Client, HandshakeError>;
}

// ── Shared handshake rules ────────────────────────────────────────────────────

/// Decodes a handshake message received from `addr`.
///
/// The version is checked before the name, so an incompatible client is told
/// so even if its name is also bad.
///
/// # Errors
///
/// - [`HandshakeError::Malformed`] if fewer than 3 bytes arrived.
/// - [`HandshakeError::IncompatibleVersion`] if `server` cannot serve the client.
/// - [`HandshakeError::InvalidName`] if the name is empty, longer than 255
///   bytes, or not UTF-8.
pub fn parse_handshake(bytes: &[u8], addr: &str, server: SemVer) -> Result<Client, HandshakeError> {
    if bytes.len() < HANDSHAKE_PREFIX_SIZE {
        return Err(HandshakeError::Malformed(ProtocolError::InsufficientData {
            needed: HANDSHAKE_PREFIX_SIZE,
            available: bytes.len(),
        }));
    }
    let client = SemVer::from_bytes([bytes[0], bytes[1], bytes[2]]);
    if !server.is_compatible_with(client) {
        info!(addr = %addr, server = %server, version = %client, "incompatible client version");
        return Err(HandshakeError::IncompatibleVersion { server, client });
    }

    let handshake = decode_client_handshake(bytes).map_err(|e| match e {
        ProtocolError::InvalidName(_) => HandshakeError::InvalidName,
        other => HandshakeError::Malformed(other),
    })?;

    Ok(Client::new(handshake.name, addr, handshake.version))
}

/// Validates a rendezvous room-name message and returns it as a `&str`.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidRoomName`] unless the name is 1..=256
/// bytes of UTF-8 that form a single path segment.
pub fn parse_room_name(bytes: &[u8]) -> Result<&str, HandshakeError> {
    if bytes.is_empty() || bytes.len() > MAX_ROOM_NAME_LEN {
        return Err(HandshakeError::InvalidRoomName);
    }
    let name = std::str::from_utf8(bytes).map_err(|_| HandshakeError::InvalidRoomName)?;
    if !is_path_segment(name) {
        return Err(HandshakeError::InvalidRoomName);
    }
    Ok(name)
}

/// Returns `true` if `name` can be used as one component of a filesystem path.
pub fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(|c: char| c == '/' || c == '\0')
}

/// Runs the driver's handshake, reporting any refusal to the client.
///
/// # Errors
///
/// Returns the [`HandshakeError`] after the client has been told about it;
/// the caller only has to close and log.
pub async fn accept_client<D>(driver: &mut D) -> Result<Client, HandshakeError>
where
    D: Driver + ?Sized,
{
    match driver.parse_client().await {
        Ok(client) => {
            debug!(client = %client.name, addr = %client.addr, version = %client.version, "version negotiated");
            Ok(client)
        }
        Err(e) => {
            reject(driver, &e).await;
            Err(e)
        }
    }
}

/// Sends `error`'s client message, if it has one.
pub async fn reject<D>(driver: &mut D, error: &HandshakeError)
where
    D: Driver + ?Sized,
{
    if let Some(message) = error.client_message() {
        if let Err(e) = driver.write_error(&message).await {
            debug!(error = %e, "failed to deliver error frame");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: SemVer = SemVer::new(0, 5, 0);

    #[test]
    fn test_parse_handshake_accepts_compatible_client() {
        // Arrange
        let bytes = [0, 5, 0, b'a', b'l', b'i', b'c', b'e'];

        // Act
        let client = parse_handshake(&bytes, "127.0.0.1:4000", SERVER).unwrap();

        // Assert
        assert_eq!(client.name, "alice");
        assert_eq!(client.addr, "127.0.0.1:4000");
        assert_eq!(client.version, SemVer::new(0, 5, 0));
    }

    #[test]
    fn test_parse_handshake_rejects_newer_minor() {
        let result = parse_handshake(&[0, 6, 0, b'x'], "a", SERVER);
        assert!(matches!(result, Err(HandshakeError::IncompatibleVersion { .. })));
    }

    #[test]
    fn test_version_is_checked_before_name() {
        let result = parse_handshake(&[1, 0, 0], "a", SERVER);
        assert!(matches!(result, Err(HandshakeError::IncompatibleVersion { .. })));
    }

    #[test]
    fn test_parse_handshake_rejects_empty_name() {
        let result = parse_handshake(&[0, 5, 0], "a", SERVER);
        assert!(matches!(result, Err(HandshakeError::InvalidName)));
    }

    #[test]
    fn test_parse_handshake_rejects_short_message() {
        let result = parse_handshake(&[0, 5], "a", SERVER);
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }

    #[test]
    fn test_room_name_rules() {
        assert_eq!(parse_room_name(b"movie-night").unwrap(), "movie-night");
        assert!(parse_room_name(b"").is_err());
        assert!(parse_room_name(b"..").is_err());
        assert!(parse_room_name(b"a/b").is_err());
        assert!(parse_room_name(&[0xFF]).is_err());
        assert!(parse_room_name(&[b'x'; 256]).is_ok());
        assert!(parse_room_name(&[b'x'; 257]).is_err());
    }

    #[test]
    fn test_path_segment_rejects_nul() {
        assert!(!is_path_segment("a\0b"));
        assert!(is_path_segment("alice"));
    }

    #[test]
    fn test_client_message_hides_transport_errors() {
        let io = HandshakeError::Transport(std::io::Error::other("reset"));
        assert_eq!(io.client_message(), None);
        assert_eq!(
            HandshakeError::Timeout("room name").client_message().as_deref(),
            Some("took too long to send room name")
        );
    }

    #[tokio::test]
    async fn test_accept_client_returns_parsed_client() {
        // Arrange
        let mut driver = MockDriver::new();
        driver
            .expect_parse_client()
            .times(1)
            .returning(|| Ok(Client::new("alice", "a", SemVer::new(0, 5, 0))));
        driver.expect_write_error().never();

        // Act
        let client = accept_client(&mut driver).await;

        // Assert
        assert_eq!(client.ok().map(|c| c.name), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_accept_client_reports_incompatible_version() {
        // Arrange
        let mut driver = MockDriver::new();
        driver.expect_parse_client().times(1).returning(|| {
            Err(HandshakeError::IncompatibleVersion {
                server: SemVer::new(0, 5, 0),
                client: SemVer::new(1, 0, 0),
            })
        });
        driver
            .expect_write_error()
            .withf(|msg: &str| msg.starts_with("incompatible version"))
            .times(1)
            .returning(|_| Ok(()));

        // Act
        let client = accept_client(&mut driver).await;

        // Assert
        assert!(matches!(client, Err(HandshakeError::IncompatibleVersion { .. })));
    }

    #[tokio::test]
    async fn test_accept_client_skips_error_frame_on_transport_failure() {
        let mut driver = MockDriver::new();
        driver
            .expect_parse_client()
            .returning(|| Err(HandshakeError::Transport(std::io::Error::other("reset"))));
        driver.expect_write_error().never();

        assert!(matches!(
            accept_client(&mut driver).await,
            Err(HandshakeError::Transport(_))
        ));
    }
}
