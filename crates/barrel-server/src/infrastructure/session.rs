//! Per-connection plumbing shared by both transports.
//!
//! Every connection loop ends in a [`SessionError`] (or `Ok` for a clean
//! close).  The error's category decides two things: whether the client is
//! sent an Error frame first, and how loudly the exit is logged.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::driver::HandshakeError;
use crate::application::room::{Room, RoomError};

/// Number of `check` polls made right after joining.
const FIRST_ANNOUNCE_ATTEMPTS: usize = 5;

/// Delay between first-announce polls.
const FIRST_ANNOUNCE_STEP: Duration = Duration::from_millis(10);

/// Why a connection ended.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The client broke the protocol (bad handshake, bad status update).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The handshake was refused; the client has already been told why.
    #[error("handshake rejected: {0}")]
    Rejected(#[from] HandshakeError),

    /// The room had no free slot.
    #[error(transparent)]
    Capacity(#[from] RoomError),

    /// A local resource (directory, socket file, listener) could not be set up.
    #[error("resource error: {context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The peer went quiet for longer than the named deadline allows.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The underlying connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The room was force-closed while the client was seated.
    #[error("room closed")]
    Evicted,

    /// The server is shutting down.
    #[error("server shutting down")]
    Cancelled,
}

impl SessionError {
    /// Wraps an I/O error from local setup with a description of what failed.
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        SessionError::Resource {
            context: context.into(),
            source,
        }
    }

    /// Text for the Error frame sent before closing, if one should be sent.
    ///
    /// Refused handshakes are reported by the handshake step itself and
    /// transport failures have nobody left to tell.
    pub fn client_message(&self) -> Option<String> {
        match self {
            SessionError::Protocol(_) | SessionError::Capacity(_) | SessionError::Evicted => {
                Some(self.to_string())
            }
            SessionError::Resource { .. } => Some("internal server error".to_string()),
            SessionError::Timeout(what) => Some(format!("took too long to send {what}")),
            SessionError::Rejected(_) | SessionError::Transport(_) | SessionError::Cancelled => {
                None
            }
        }
    }
}

/// Polls `room` briefly until its first roster is published.
///
/// Lets a freshly joined connection push the Announce frame before it blocks
/// on its first read.  Giving up is not an error; the loop picks the roster
/// up on a later pass.
pub async fn wait_for_first_announce(room: &Room, last_seen: u64) {
    for _ in 0..FIRST_ANNOUNCE_ATTEMPTS {
        if room.check(last_seen).1 {
            return;
        }
        tokio::time::sleep(FIRST_ANNOUNCE_STEP).await;
    }
}

/// Logs how a session ended, at a level matching its category.
pub fn log_session_end(transport: &str, addr: &str, result: &Result<(), SessionError>) {
    match result {
        Ok(()) => info!(transport, addr = %addr, "connection closed"),
        Err(e @ (SessionError::Cancelled | SessionError::Evicted)) => {
            info!(transport, addr = %addr, reason = %e, "connection closed")
        }
        Err(e @ SessionError::Timeout(_)) => {
            info!(transport, addr = %addr, error = %e, "connection timed out")
        }
        Err(e @ (SessionError::Protocol(_) | SessionError::Rejected(_) | SessionError::Capacity(_))) => {
            warn!(transport, addr = %addr, error = %e, "connection closed with error")
        }
        Err(e @ SessionError::Resource { .. }) => {
            error!(transport, addr = %addr, error = %e, "resource failure")
        }
        Err(e @ SessionError::Transport(_)) => {
            debug!(transport, addr = %addr, error = %e, "connection dropped")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
