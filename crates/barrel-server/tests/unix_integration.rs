//! End-to-end test of the Unix-socket rendezvous transport.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use barrel_core::protocol::codec::{decode_server_frame, encode_client_handshake, encode_client_status};
use barrel_core::{AnnounceRecord, ClientHandshake, ClientStatusMessage, PlayerState, SemVer, ServerFrame};
use barrel_server::application::RoomRegistry;
use barrel_server::domain::ServerConfig;
use barrel_server::infrastructure::UnixServer;

const STEP: Duration = Duration::from_secs(5);

/// Pause between the two rendezvous messages; each is read with one `read`.
const MESSAGE_GAP: Duration = Duration::from_millis(100);

async fn start_server(base: PathBuf) -> (PathBuf, CancellationToken) {
    let config = Arc::new(ServerConfig {
        unix_enabled: true,
        unix_base_dir: base,
        status_interval: Duration::from_millis(20),
        ..ServerConfig::default()
    });
    let registry = Arc::new(RoomRegistry::new(config.status_interval));
    let server = UnixServer::bind(config, registry).await.unwrap();
    let join = server.join_path().to_path_buf();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));
    (join, shutdown)
}

/// Runs the join-socket half and returns whatever the server wrote back.
async fn rendezvous(join: &Path, name: &str, version: SemVer, room: &str) -> Vec<u8> {
    let mut stream = UnixStream::connect(join).await.unwrap();
    let handshake = encode_client_handshake(&ClientHandshake {
        version,
        name: name.to_string(),
    })
    .unwrap();
    stream.write_all(&handshake).await.unwrap();
    tokio::time::sleep(MESSAGE_GAP).await;
    // The server may already have closed after rejecting the handshake.
    let _ = stream.write_all(room.as_bytes()).await;

    let mut reply = Vec::new();
    tokio::time::timeout(STEP, stream.read_to_end(&mut reply))
        .await
        .expect("join socket must answer")
        .unwrap();
    reply
}

/// Reads exactly one frame whose size the caller knows.
async fn read_exact_frame(stream: &mut UnixStream, len: usize) -> ServerFrame {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(STEP, stream.read_exact(&mut buf))
        .await
        .expect("server must answer")
        .unwrap();
    decode_server_frame(&buf).unwrap()
}

#[tokio::test]
async fn test_rendezvous_then_status_exchange() {
    // Arrange
    let base = tempfile::tempdir().unwrap();
    let (join, shutdown) = start_server(base.path().to_path_buf()).await;

    // Act: join handshake
    let reply = rendezvous(&join, "alice", SemVer::new(0, 5, 0), "movie-night").await;

    // Assert: the reply is the private socket path
    let private = PathBuf::from(String::from_utf8(reply).unwrap());
    assert_eq!(private, base.path().join("movie-night").join("alice"));

    // Act: connect to the private socket
    let mut stream = UnixStream::connect(&private).await.unwrap();

    // Assert: [Announce][1][slot 0][5]["alice"] arrives first
    assert_eq!(
        read_exact_frame(&mut stream, 4 + 5).await,
        ServerFrame::Announce(vec![AnnounceRecord {
            id: 0,
            name: "alice".to_string(),
        }])
    );

    // Act: report until the producer has sampled the update
    let expected = ClientStatusMessage {
        offset: 1000,
        player_state: PlayerState::Playing,
        id: 0,
    };
    let mut seen = false;
    for _ in 0..100 {
        stream
            .write_all(&encode_client_status(1000, PlayerState::Playing))
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(STEP, stream.read(&mut buf)).await.unwrap().unwrap();
        if let Ok(ServerFrame::Status(entries)) = decode_server_frame(&buf[..n]) {
            if entries.contains(&expected) {
                seen = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Assert
    assert!(seen, "status frame never contained alice's update");
    shutdown.cancel();
}

#[tokio::test]
async fn test_name_stays_reserved_while_its_client_is_seated() {
    // Arrange: the first alice is seated in "r"
    let base = tempfile::tempdir().unwrap();
    let (join, shutdown) = start_server(base.path().to_path_buf()).await;
    let reply = rendezvous(&join, "alice", SemVer::new(0, 5, 0), "r").await;
    let private = PathBuf::from(String::from_utf8(reply).unwrap());
    let mut first = UnixStream::connect(&private).await.unwrap();
    read_exact_frame(&mut first, 4 + 5).await;

    // Act
    let second = rendezvous(&join, "alice", SemVer::new(0, 5, 0), "r").await;

    // Assert
    assert_eq!(
        decode_server_frame(&second).unwrap(),
        ServerFrame::Error("client name already in use in this room".to_string())
    );

    // Act: once the first alice leaves, the name is free again
    drop(first);
    let mut freed = false;
    for _ in 0..100 {
        if !private.exists() {
            freed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Assert
    assert!(freed, "private socket outlived its session");
    let again = rendezvous(&join, "alice", SemVer::new(0, 5, 0), "r").await;
    assert_eq!(PathBuf::from(String::from_utf8(again).unwrap()), private);
    shutdown.cancel();
}

#[tokio::test]
async fn test_incompatible_version_gets_error_frame() {
    // Arrange
    let base = tempfile::tempdir().unwrap();
    let (join, shutdown) = start_server(base.path().to_path_buf()).await;

    // Act
    let reply = rendezvous(&join, "bob", SemVer::new(1, 0, 0), "movie-night").await;

    // Assert
    match decode_server_frame(&reply).unwrap() {
        ServerFrame::Error(message) => assert!(message.starts_with("incompatible version")),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert!(!base.path().join("movie-night").join("bob").exists());
    shutdown.cancel();
}

#[tokio::test]
async fn test_invalid_room_name_gets_error_frame() {
    let base = tempfile::tempdir().unwrap();
    let (join, shutdown) = start_server(base.path().to_path_buf()).await;

    let reply = rendezvous(&join, "carol", SemVer::new(0, 5, 0), "..").await;

    assert_eq!(
        decode_server_frame(&reply).unwrap(),
        ServerFrame::Error("invalid room name".to_string())
    );
    shutdown.cancel();
}

#[tokio::test]
async fn test_join_socket_is_removed_after_shutdown() {
    // Arrange
    let base = tempfile::tempdir().unwrap();
    let (join, shutdown) = start_server(base.path().to_path_buf()).await;
    assert!(join.exists());

    // Act
    shutdown.cancel();

    // Assert: the accept loop returns and drops the listener and its file
    for _ in 0..100 {
        if !join.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("join socket still present after shutdown");
}
