//! WebSocket server: accept loop and per-connection room session.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each connection to WebSocket, accepting only `/barrel/{room}`.
//! 3. Reading the handshake and seating the client in its room.
//! 4. Running the per-connection loop:
//!    push the Announce frame when the roster changed → read one status
//!    update → record it → reply with the room's Status frame.
//! 5. Stopping when the shared [`CancellationToken`] is cancelled.
//!
//! Every client message is one binary WebSocket message.  Errors are sent as
//! the Close frame: code 1008 (policy violation) with the reason
//! `"\u{3}" + message`, which puts exactly `[Error][utf8 message]` after the
//! close code on the wire.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use barrel_core::domain::client::Client;
use barrel_core::protocol::codec::decode_client_status;
use barrel_core::protocol::messages::MessageType;

use crate::application::driver::{accept_client, parse_handshake, Driver, HandshakeError};
use crate::application::registry::RoomRegistry;
use crate::application::room::Membership;
use crate::domain::config::ServerConfig;
use crate::infrastructure::session::{log_session_end, wait_for_first_announce, SessionError};

/// Path prefix of the room route.
pub const ROUTE_PREFIX: &str = "/barrel/";

/// Longest close reason a control frame can carry (125 minus the 2-byte code).
const MAX_CLOSE_REASON: usize = 123;

type Ws = WebSocketStream<TcpStream>;

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound WebSocket listener, ready to [`run`](WsServer::run).
pub struct WsServer {
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    config: Arc<ServerConfig>,
}

impl WsServer {
    /// Binds the listener on `config.ws_bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound (e.g., the port is
    /// already in use or the process lacks permission to bind).
    pub async fn bind(config: Arc<ServerConfig>, registry: Arc<RoomRegistry>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;
        Ok(Self {
            listener,
            registry,
            config,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// Each connection runs in its own task; cancelling `shutdown` also ends
    /// every running connection, which releases its slot.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "WebSocket server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; stopping WebSocket accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!(addr = %peer_addr, "new WebSocket connection");
                        let registry = Arc::clone(&self.registry);
                        let config = Arc::clone(&self.config);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_ws_session(stream, peer_addr, registry, config, shutdown).await;
                        });
                    }
                    Err(e) => {
                        // Transient accept error (e.g., too many open file descriptors).
                        error!(error = %e, "accept error");
                    }
                },
            }
        }

        Ok(())
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Top-level handler for a single WebSocket connection: runs it and logs the outcome.
async fn handle_ws_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let addr = peer_addr.to_string();
    let result = run_session(stream, &addr, &registry, &config, &shutdown).await;
    log_session_end("websocket", &addr, &result);
}

/// Runs the complete lifecycle of one WebSocket client.
async fn run_session(
    stream: TcpStream,
    addr: &str,
    registry: &RoomRegistry,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> Result<(), SessionError> {
    // ── Step 1: Upgrade, accepting only the room route ─────────────────────────
    let mut room_name = None;
    let mut ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        match room_from_path(request.uri().path()) {
            Some(name) => {
                room_name = Some(name.to_string());
                Ok(response)
            }
            None => Err(not_found()),
        }
    })
    .await
    .map_err(|e| SessionError::Transport(format!("WebSocket upgrade failed: {e}")))?;
    let room_name = room_name.ok_or_else(|| SessionError::Protocol("missing room name".to_string()))?;

    // ── Step 2: Handshake ──────────────────────────────────────────────────────
    let client = {
        let mut driver = WsDriver {
            ws: &mut ws,
            addr,
            config,
        };
        accept_client(&mut driver).await?
    };

    // ── Step 3: Join ───────────────────────────────────────────────────────────
    let room = registry.get_or_create(&room_name);
    let membership = match Membership::join(room, client) {
        Ok(membership) => membership,
        Err(e) => {
            let e = SessionError::from(e);
            close_with_error(&mut ws, &e, config.error_write_timeout).await;
            return Err(e);
        }
    };

    // ── Step 4: Status loop ────────────────────────────────────────────────────
    let result = status_loop(&mut ws, &membership, config, shutdown).await;
    match &result {
        Err(SessionError::Cancelled) => {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "server shutting down".into(),
            };
            let _ = timeout(config.error_write_timeout, ws.send(WsMessage::Close(Some(frame)))).await;
        }
        Err(e) => close_with_error(&mut ws, e, config.error_write_timeout).await,
        Ok(()) => {}
    }
    result
    // `membership` drops here and frees the slot.
}

/// The read / update / write loop for a seated client.
async fn status_loop(
    ws: &mut Ws,
    membership: &Membership,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> Result<(), SessionError> {
    let room = Arc::clone(membership.room());
    let mut last_seen = membership.announce_baseline();
    wait_for_first_announce(&room, last_seen).await;

    loop {
        let (seen, changed) = room.check(last_seen);
        last_seen = seen;
        if changed {
            send_frame(ws, room.announce_frame().to_vec()).await?;
        }

        let next = tokio::select! {
            _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
            _ = membership.evicted() => return Err(SessionError::Evicted),
            next = timeout(config.idle_read_timeout, ws.next()) => next,
        };

        let data = match next {
            Err(_) => return Err(SessionError::Timeout("status update")),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return read_error(e),
            Ok(Some(Ok(WsMessage::Binary(data)))) => data,
            Ok(Some(Ok(WsMessage::Close(_)))) => return Ok(()),
            Ok(Some(Ok(WsMessage::Text(_)))) => {
                return Err(SessionError::Protocol("text frames are not supported".to_string()))
            }
            Ok(Some(Ok(_))) => continue,
        };

        let msg = decode_client_status(&data, membership.id())
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        membership.update(msg);

        send_frame(ws, room.status_frame().to_vec()).await?;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// [`Driver`] over an upgraded WebSocket.
struct WsDriver<'a> {
    ws: &'a mut Ws,
    addr: &'a str,
    config: &'a ServerConfig,
}

#[async_trait]
impl<'a> Driver for WsDriver<'a> {
    async fn write_error(&mut self, message: &str) -> io::Result<()> {
        write_error_close(self.ws, message, self.config.error_write_timeout).await
    }

    async fn parse_client(&mut self) -> Result<Client, HandshakeError> {
        let read = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
                    Some(Ok(WsMessage::Text(_))) => {
                        return Err(HandshakeError::Malformed(
                            barrel_core::ProtocolError::MalformedPayload("text handshake".to_string()),
                        ))
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Err(HandshakeError::UnexpectedEof),
                    Some(Err(e)) => return Err(HandshakeError::Transport(io::Error::other(e))),
                }
            }
        };
        let data = timeout(self.config.handshake_timeout, read)
            .await
            .map_err(|_| HandshakeError::Timeout("client handshake"))??;

        parse_handshake(&data, self.addr, self.config.server_version)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Extracts the room name from a `/barrel/{room}` request path.
fn room_from_path(path: &str) -> Option<&str> {
    let name = path.strip_prefix(ROUTE_PREFIX)?;
    (!name.is_empty() && !name.contains('/')).then_some(name)
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("not found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Builds the close reason carrying an Error frame, cut to fit a control frame.
fn error_close_reason(message: &str) -> String {
    let mut reason = String::with_capacity(1 + message.len());
    reason.push(MessageType::Error as u8 as char);
    reason.push_str(message);
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

async fn write_error_close(ws: &mut Ws, message: &str, deadline: Duration) -> io::Result<()> {
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: error_close_reason(message).into(),
    };
    match timeout(deadline, ws.send(WsMessage::Close(Some(frame)))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(io::Error::other(e)),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "error frame write timed out")),
    }
}

async fn close_with_error(ws: &mut Ws, error: &SessionError, deadline: Duration) {
    if let Some(message) = error.client_message() {
        if let Err(e) = write_error_close(ws, &message, deadline).await {
            debug!(error = %e, "failed to deliver error frame");
        }
    }
}

async fn send_frame(ws: &mut Ws, frame: Vec<u8>) -> Result<(), SessionError> {
    ws.send(WsMessage::Binary(frame))
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))
}

fn read_error(e: WsError) -> Result<(), SessionError> {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(()),
        other => Err(SessionError::Transport(other.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
