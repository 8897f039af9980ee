//! Unix-socket transport with a two-step rendezvous.
//!
//! A byte stream has no message boundaries, and one listening socket cannot
//! cleanly serve many long-lived local clients, so local players connect in
//! two steps:
//!
//! ```text
//! Client                                  Server
//! ──────                                  ──────
//! connect {base}/join.sock          ──►
//! [major][minor][patch][name]       ──►   parse + version check
//! [room name]                       ──►   get-or-create room, mkdir {base}/{room}
//!                                         bind {base}/{room}/{name}
//!                                   ◄──   "{base}/{room}/{name}"   (then close)
//! connect {base}/{room}/{name}      ──►   accept (within the rendezvous timeout)
//!                                   ◄──   Announce frame when the roster changed
//! [offset:2][state]                 ──►   record status
//!                                   ◄──   Status frame
//! ...
//! ```
//!
//! Each read on the private socket is one `read` call into an 8-byte buffer
//! that must return exactly 3 bytes; anything else is a protocol error.  Reads are bounded by
//! the idle timeout and writes by the write timeout, so a stalled peer loses
//! its slot.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use barrel_core::domain::client::Client;
use barrel_core::protocol::codec::{decode_client_status, encode_error_frame};
use barrel_core::protocol::messages::{CLIENT_STATUS_SIZE, HANDSHAKE_PREFIX_SIZE, MAX_NAME_LEN};

use crate::application::driver::{
    accept_client, is_path_segment, parse_handshake, parse_room_name, reject, Driver,
    HandshakeError, MAX_ROOM_NAME_LEN,
};
use crate::application::registry::RoomRegistry;
use crate::application::room::{Membership, Room};
use crate::domain::config::ServerConfig;
use crate::infrastructure::session::{log_session_end, wait_for_first_announce, SessionError};

/// Mode of the per-room directories under the base directory.
const ROOM_DIR_MODE: u32 = 0o775;

/// Read buffer for status updates; larger than one update so an oversized
/// write shows up as a wrong-sized read instead of being split.
const STATUS_READ_BUF: usize = 8;

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound join socket, ready to [`run`](UnixServer::run).
pub struct UnixServer {
    listener: UnixListener,
    // Declared after the listener so the file is removed once it is closed.
    socket: SocketFile,
    registry: Arc<RoomRegistry>,
    config: Arc<ServerConfig>,
}

impl UnixServer {
    /// Creates the base directory and binds `{base}/join.sock`.
    ///
    /// A leftover socket file from a previous run is replaced; a socket some
    /// other live server still answers on is not.  Private sockets left in
    /// room directories by a previous run are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, another server
    /// owns the join socket, or the bind fails.
    pub async fn bind(config: Arc<ServerConfig>, registry: Arc<RoomRegistry>) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.unix_base_dir)
            .await
            .with_context(|| format!("failed to create {}", config.unix_base_dir.display()))?;

        let path = config.join_socket_path();
        let (listener, socket) = bind_join_socket(&path)
            .await
            .with_context(|| format!("failed to bind join socket {}", path.display()))?;

        let stale = clear_stale_sockets(&config.unix_base_dir)
            .await
            .with_context(|| format!("failed to clean {}", config.unix_base_dir.display()))?;
        if stale > 0 {
            info!(removed = stale, "removed stale private sockets");
        }

        Ok(Self {
            listener,
            socket,
            registry,
            config,
        })
    }

    /// Path of the join socket.
    pub fn join_path(&self) -> &Path {
        self.socket.path()
    }

    /// Accepts join connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(path = %self.join_path().display(), "Unix socket server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; stopping Unix accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        debug!("new join connection");
                        let registry = Arc::clone(&self.registry);
                        let config = Arc::clone(&self.config);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_unix_session(stream, registry, config, shutdown).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
            }
        }

        Ok(())
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_unix_session(
    stream: UnixStream,
    registry: Arc<RoomRegistry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let Some((client, room, listener)) = rendezvous(stream, &registry, &config).await else {
        return;
    };
    let addr = client.addr.clone();
    let result = serve_private(listener, client, room, &config, &shutdown).await;
    log_session_end("unix", &addr, &result);
}

/// Runs the join-socket half of the rendezvous.
///
/// On success the private socket is already bound and its path has been sent
/// to the client.  Failures are reported to the client and logged here.
async fn rendezvous(
    stream: UnixStream,
    registry: &RoomRegistry,
    config: &ServerConfig,
) -> Option<(Client, Arc<Room>, PrivateListener)> {
    let mut driver = StreamDriver::new(stream, config);

    let mut client = match accept_client(&mut driver).await {
        Ok(client) => client,
        Err(e) => {
            log_session_end("unix", "join", &Err(e.into()));
            return None;
        }
    };
    if !is_path_segment(&client.name) {
        let e = HandshakeError::InvalidName;
        reject(&mut driver, &e).await;
        log_session_end("unix", &client.name, &Err(e.into()));
        return None;
    }

    let room_name = match driver.read_room_name().await {
        Ok(name) => name,
        Err(e) => {
            reject(&mut driver, &e).await;
            log_session_end("unix", &client.name, &Err(e.into()));
            return None;
        }
    };

    let room = registry.get_or_create(&room_name);
    let dir = config.unix_base_dir.join(&room_name);
    let path = dir.join(&client.name);
    client.addr = path.to_string_lossy().into_owned();

    let listener = match open_private_socket(&dir, &path).await {
        Ok(listener) => listener,
        Err(e) => {
            let message = match &e {
                SessionError::Resource { source, .. } if source.kind() == io::ErrorKind::AddrInUse => {
                    "client name already in use in this room".to_string()
                }
                other => other.client_message().unwrap_or_default(),
            };
            log_session_end("unix", &client.addr, &Err(e));
            let _ = driver.write_error(&message).await;
            return None;
        }
    };

    if let Err(e) = driver.write_all(client.addr.as_bytes()).await {
        log_session_end("unix", &client.addr, &Err(e));
        return None;
    }
    debug!(room = %room_name, client = %client.name, addr = %client.addr, "private socket handed off");

    Some((client, room, listener))
}

/// Waits for the client on its private socket, then runs the status loop.
async fn serve_private(
    listener: PrivateListener,
    client: Client,
    room: Arc<Room>,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> Result<(), SessionError> {
    let PrivateListener { listener, socket } = listener;
    let accepted = tokio::select! {
        _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
        accepted = timeout(config.rendezvous_timeout, listener.accept()) => accepted,
    };
    let mut stream = match accepted {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => return Err(SessionError::resource("accept on private socket", e)),
        Err(_) => {
            warn!(addr = %client.addr, "rendezvous timeout");
            return Err(SessionError::Timeout("private connection"));
        }
    };
    // Only one connection is accepted per private socket.  The socket file
    // stays until the session ends so the name cannot be claimed twice.
    drop(listener);

    let membership = match Membership::join(room, client) {
        Ok(membership) => membership,
        Err(e) => {
            let e = SessionError::from(e);
            send_error_frame(&mut stream, &e, config.error_write_timeout).await;
            return Err(e);
        }
    };

    let result = status_loop(&mut stream, &membership, config, shutdown).await;
    if let Err(e) = &result {
        send_error_frame(&mut stream, e, config.error_write_timeout).await;
    }
    drop(membership);
    drop(socket);
    result
}

/// The read / update / write loop for a seated client on any byte stream.
pub async fn status_loop<S>(
    stream: &mut S,
    membership: &Membership,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let room = Arc::clone(membership.room());
    let mut last_seen = membership.announce_baseline();
    let mut buf = [0u8; STATUS_READ_BUF];
    wait_for_first_announce(&room, last_seen).await;

    loop {
        let (seen, changed) = room.check(last_seen);
        last_seen = seen;
        if changed {
            write_frame(stream, &room.announce_frame(), config.write_timeout).await?;
        }

        let read = tokio::select! {
            _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
            _ = membership.evicted() => return Err(SessionError::Evicted),
            read = timeout(config.idle_read_timeout, stream.read(&mut buf)) => read,
        };
        let n = match read {
            Err(_) => return Err(SessionError::Timeout("status update")),
            Ok(Err(e)) => return Err(SessionError::Transport(e.to_string())),
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(n)) => n,
        };
        if n != CLIENT_STATUS_SIZE {
            return Err(SessionError::Protocol(format!(
                "status update must be {CLIENT_STATUS_SIZE} bytes, got {n}"
            )));
        }

        let msg = decode_client_status(&buf[..n], membership.id())
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        membership.update(msg);

        write_frame(stream, &room.status_frame(), config.write_timeout).await?;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// [`Driver`] over a raw byte stream (the join socket).
///
/// Each message is expected in a single `read`, bounded by the handshake
/// timeout.
pub struct StreamDriver<S> {
    stream: S,
    handshake_timeout: Duration,
    error_write_timeout: Duration,
    server_version: barrel_core::SemVer,
}

impl<S> StreamDriver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, config: &ServerConfig) -> Self {
        Self {
            stream,
            handshake_timeout: config.handshake_timeout,
            error_write_timeout: config.error_write_timeout,
            server_version: config.server_version,
        }
    }

    /// Reads and validates the room-name message.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] on timeout, EOF, transport failure, or an
    /// invalid room name.
    pub async fn read_room_name(&mut self) -> Result<String, HandshakeError> {
        let mut buf = [0u8; MAX_ROOM_NAME_LEN];
        let n = self.read_message(&mut buf, "room name").await?;
        parse_room_name(&buf[..n]).map(str::to_string)
    }

    async fn read_message(&mut self, buf: &mut [u8], what: &'static str) -> Result<usize, HandshakeError> {
        match timeout(self.handshake_timeout, self.stream.read(buf)).await {
            Err(_) => Err(HandshakeError::Timeout(what)),
            Ok(Err(e)) => Err(HandshakeError::Transport(e)),
            Ok(Ok(0)) => Err(HandshakeError::UnexpectedEof),
            Ok(Ok(n)) => Ok(n),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        match timeout(self.handshake_timeout, self.stream.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
            Err(_) => Err(SessionError::Timeout("private socket path delivery")),
        }
    }
}

#[async_trait]
impl<S> Driver for StreamDriver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_error(&mut self, message: &str) -> io::Result<()> {
        let frame = encode_error_frame(message);
        timeout(self.error_write_timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "error frame write timed out"))?
    }

    async fn parse_client(&mut self) -> Result<Client, HandshakeError> {
        let mut buf = [0u8; HANDSHAKE_PREFIX_SIZE + MAX_NAME_LEN + 1];
        let n = self.read_message(&mut buf, "client handshake").await?;
        // The address is the private socket path, assigned once the room is known.
        parse_handshake(&buf[..n], "", self.server_version)
    }
}

// ── Socket files ──────────────────────────────────────────────────────────────

/// Removes a Unix socket file when dropped.
#[derive(Debug)]
pub struct SocketFile {
    path: PathBuf,
}

impl SocketFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "failed to remove socket file");
            }
        }
    }
}

/// A bound private socket plus its file guard.
struct PrivateListener {
    listener: UnixListener,
    socket: SocketFile,
}

/// Binds the join socket, replacing a stale socket file nobody answers on.
async fn bind_join_socket(path: &Path) -> io::Result<(UnixListener, SocketFile)> {
    if tokio::fs::symlink_metadata(path).await.is_ok() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} is in use", path.display()),
            ));
        }
        tokio::fs::remove_file(path).await?;
    }
    bind_socket(path)
}

/// Binds `path`; fails with `AddrInUse` if the file already exists.
fn bind_socket(path: &Path) -> io::Result<(UnixListener, SocketFile)> {
    let listener = UnixListener::bind(path)?;
    Ok((
        listener,
        SocketFile {
            path: path.to_path_buf(),
        },
    ))
}

/// Removes socket files left in room directories by a previous run.
///
/// Only called once the join socket is ours, so no other server owns them.
async fn clear_stale_sockets(base: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut rooms = tokio::fs::read_dir(base).await?;
    while let Some(room) = rooms.next_entry().await? {
        if !room.file_type().await?.is_dir() {
            continue;
        }
        let mut entries = tokio::fs::read_dir(room.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_socket() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Creates the room directory and binds the client's private socket in it.
async fn open_private_socket(dir: &Path, path: &Path) -> Result<PrivateListener, SessionError> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(ROOM_DIR_MODE)
        .create(dir)
        .await
        .map_err(|e| SessionError::resource(format!("create {}", dir.display()), e))?;

    let (listener, socket) = bind_socket(path)
        .map_err(|e| SessionError::resource(format!("bind {}", path.display()), e))?;
    Ok(PrivateListener { listener, socket })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn write_frame<S>(stream: &mut S, frame: &[u8], deadline: Duration) -> Result<(), SessionError>
where
    S: AsyncWrite + Unpin,
{
    match timeout(deadline, stream.write_all(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
        Err(_) => Err(SessionError::Timeout("frame write")),
    }
}

async fn send_error_frame<S>(stream: &mut S, error: &SessionError, deadline: Duration)
where
    S: AsyncWrite + Unpin,
{
    if let Some(message) = error.client_message() {
        let frame = encode_error_frame(&message);
        if let Ok(Err(e)) = timeout(deadline, stream.write_all(&frame)).await {
            debug!(error = %e, "failed to deliver error frame");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use barrel_core::protocol::semver::SemVer;
    use tokio_test::io::Builder;

    fn config() -> ServerConfig {
        ServerConfig {
            handshake_timeout: Duration::from_millis(200),
            status_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stream_driver_parses_handshake_from_one_read() {
        // Arrange
        let mock = Builder::new().read(&[0, 5, 0, b'a', b'l', b'i', b'c', b'e']).build();
        let mut driver = StreamDriver::new(mock, &config());

        // Act
        let client = driver.parse_client().await.unwrap();

        // Assert
        assert_eq!(client.name, "alice");
        assert_eq!(client.version, SemVer::new(0, 5, 0));
    }

    #[tokio::test]
    async fn test_incompatible_client_receives_error_frame() {
        // Arrange
        let mut expected = vec![3u8];
        expected.extend_from_slice(b"incompatible version: server v0.5.0, client v1.0.0");
        let mock = Builder::new()
            .read(&[1, 0, 0, b'b', b'o', b'b'])
            .write(&expected)
            .build();
        let mut driver = StreamDriver::new(mock, &config());

        // Act
        let client = accept_client(&mut driver).await;

        // Assert
        assert!(matches!(client, Err(HandshakeError::IncompatibleVersion { .. })));
    }

    #[tokio::test]
    async fn test_eof_before_handshake_is_reported() {
        let mock = Builder::new().build();
        let mut driver = StreamDriver::new(mock, &config());

        let result = driver.parse_client().await;

        assert!(matches!(result, Err(HandshakeError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_room_name_is_read_and_validated() {
        let mock = Builder::new().read(b"movie-night").build();
        let mut driver = StreamDriver::new(mock, &config());

        assert_eq!(driver.read_room_name().await.unwrap(), "movie-night");
    }

    #[tokio::test]
    async fn test_room_name_with_slash_is_rejected() {
        let mock = Builder::new().read(b"../etc").build();
        let mut driver = StreamDriver::new(mock, &config());

        assert!(matches!(
            driver.read_room_name().await,
            Err(HandshakeError::InvalidRoomName)
        ));
    }

    #[tokio::test]
    async fn test_silent_client_times_out_during_handshake() {
        // Arrange: keep the peer open but never write
        let (_peer, server) = tokio::io::duplex(64);
        let mut driver = StreamDriver::new(server, &config());

        // Act
        let result = driver.parse_client().await;

        // Assert
        assert!(matches!(result, Err(HandshakeError::Timeout("client handshake"))));
    }

    #[tokio::test]
    async fn test_status_loop_rejects_short_update() {
        // Arrange
        let cfg = config();
        let room = Arc::new(Room::new("lobby", cfg.status_interval));
        let membership =
            Membership::join(Arc::clone(&room), Client::new("alice", "p", SemVer::new(0, 5, 0)))
                .unwrap();
        let (mut peer, mut server) = tokio::io::duplex(1024);
        peer.write_all(&[0x00, 0x01]).await.unwrap();

        // Act
        let result = status_loop(&mut server, &membership, &cfg, &CancellationToken::new()).await;

        // Assert
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_status_loop_replies_with_status_frame() {
        // Arrange
        let cfg = config();
        let room = Arc::new(Room::new("lobby", cfg.status_interval));
        let membership =
            Membership::join(Arc::clone(&room), Client::new("alice", "p", SemVer::new(0, 5, 0)))
                .unwrap();
        let (mut peer, mut server) = tokio::io::duplex(1024);
        peer.write_all(&[0x03, 0xE8, 0x01]).await.unwrap();

        // Act: the peer closes after one update, ending the loop cleanly
        let shutdown = CancellationToken::new();
        let loop_task = async {
            let result = status_loop(&mut server, &membership, &cfg, &shutdown).await;
            drop(server);
            result
        };
        let reader = async {
            let mut received = Vec::new();
            let mut chunk = [0u8; 256];
            // Announce frame then Status frame; stop reading once both arrived.
            while received.len() < 9 + 2 {
                let n = peer.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            peer.shutdown().await.unwrap();
            received
        };
        let (result, received) = tokio::join!(loop_task, reader);

        // Assert
        assert!(result.is_ok());
        assert_eq!(&received[..9], &[1, 1, 0, 5, b'a', b'l', b'i', b'c', b'e']);
        assert_eq!(received[9], 2);
    }

    #[tokio::test]
    async fn test_status_loop_rejects_oversized_update_without_recording_it() {
        // Arrange
        let cfg = config();
        let room = Arc::new(Room::new("lobby", cfg.status_interval));
        let membership =
            Membership::join(Arc::clone(&room), Client::new("alice", "p", SemVer::new(0, 5, 0)))
                .unwrap();
        let (mut peer, mut server) = tokio::io::duplex(1024);
        peer.write_all(&[0x00, 0x07, 0x01, 0xAA]).await.unwrap();

        // Act
        let result = status_loop(&mut server, &membership, &cfg, &CancellationToken::new()).await;

        // Assert
        match result {
            Err(SessionError::Protocol(message)) => assert!(message.ends_with("got 4"), "{message}"),
            other => panic!("expected protocol error, got {other:?}"),
        }
        let mut statuses = Vec::new();
        room.snapshot_statuses(&mut statuses);
        assert!(statuses.is_empty());
    }

    #[tokio::test]
    async fn test_status_loop_stops_on_shutdown() {
        let cfg = config();
        let room = Arc::new(Room::new("lobby", cfg.status_interval));
        let membership =
            Membership::join(Arc::clone(&room), Client::new("alice", "p", SemVer::new(0, 5, 0)))
                .unwrap();
        let (_peer, mut server) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = status_loop(&mut server, &membership, &cfg, &shutdown).await;

        assert!(matches!(result, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_socket_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.sock");

        let (listener, socket) = bind_socket(&path).unwrap();
        assert!(path.exists());
        drop(listener);
        drop(socket);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        // Arrange: a socket file whose listener is gone
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        // Act / Assert
        assert!(bind_join_socket(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_live_join_socket_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("join.sock");
        let (_listener, _socket) = bind_socket(&path).unwrap();

        let result = bind_join_socket(&path).await;

        assert_eq!(result.err().map(|e| e.kind()), Some(io::ErrorKind::AddrInUse));
    }

    #[tokio::test]
    async fn test_private_socket_name_collision_is_reported() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let room_dir = dir.path().join("movie-night");
        let path = room_dir.join("alice");
        let _first = open_private_socket(&room_dir, &path).await.unwrap();

        // Act
        let second = open_private_socket(&room_dir, &path).await;

        // Assert
        assert!(matches!(
            second,
            Err(SessionError::Resource { ref source, .. }) if source.kind() == io::ErrorKind::AddrInUse
        ));
    }

    #[tokio::test]
    async fn test_stale_private_sockets_are_cleared() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let room_dir = dir.path().join("movie-night");
        std::fs::create_dir(&room_dir).unwrap();
        drop(std::os::unix::net::UnixListener::bind(room_dir.join("alice")).unwrap());
        std::fs::write(room_dir.join("notes.txt"), b"keep").unwrap();

        // Act
        let removed = clear_stale_sockets(dir.path()).await.unwrap();

        // Assert
        assert_eq!(removed, 1);
        assert!(!room_dir.join("alice").exists());
        assert!(room_dir.join("notes.txt").exists());
    }
}
