//! Broadcast producers: the two background tasks an open room runs.
//!
//! - The **status producer** samples the status table on a fixed interval and
//!   publishes a fresh Status frame.  It never reacts to individual updates,
//!   so broadcast cost is bounded regardless of how chatty clients are.
//! - The **announce producer** waits for membership-changed signals and
//!   publishes a fresh Announce frame, then bumps the room's announce version
//!   so connection loops know to push it.
//!
//! Both build into a buffer owned by the task and publish a `Bytes` copy, so
//! readers never see a frame that is halfway rebuilt.
//!
//! Frames carry a one-byte count, so a full room of 256 members does not
//! fit.  The status producer then publishes the 255 lowest slots.  An
//! Announce frame that cannot be encoded is skipped and the last good one
//! stays published, so the roster (and its version) only moves again once
//! someone leaves.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use barrel_core::domain::client::{Client, SlotId};
use barrel_core::protocol::codec::{
    encode_server_announce_into, encode_server_status_into, ProtocolError,
};
use barrel_core::protocol::messages::{ClientStatusMessage, MAX_FRAME_ENTRIES};

use crate::application::room::Room;

// ── Frame builders ────────────────────────────────────────────────────────────

/// Encodes `entries` into `buf` (cleared first) and returns a publishable copy.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyEntries`] for more than 255 entries.
pub fn build_status_frame(
    buf: &mut Vec<u8>,
    entries: &[ClientStatusMessage],
) -> Result<Bytes, ProtocolError> {
    buf.clear();
    encode_server_status_into(buf, entries.iter().copied())?;
    Ok(Bytes::copy_from_slice(buf))
}

/// Encodes one record per occupied slot, in slot order, into `buf`.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyEntries`] if more than 255 slots are
/// occupied.
pub fn build_announce_frame(
    buf: &mut Vec<u8>,
    slots: &[Option<Client>],
) -> Result<Bytes, ProtocolError> {
    buf.clear();
    let records = slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.as_ref().map(|c| (index as SlotId, c.name.as_str())));
    encode_server_announce_into(buf, records)?;
    Ok(Bytes::copy_from_slice(buf))
}

// ── Producers ─────────────────────────────────────────────────────────────────

/// Rebuilds the room's Status frame every `status_interval` until cancelled.
pub(crate) async fn run_status_producer(room: Arc<Room>, token: CancellationToken) {
    let mut ticker = interval(room.status_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut snapshot = Vec::new();
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        room.snapshot_statuses(&mut snapshot);
        if snapshot.len() > MAX_FRAME_ENTRIES {
            debug!(room = %room.name(), reported = snapshot.len(), "status frame limited to the lowest slots");
            snapshot.truncate(MAX_FRAME_ENTRIES);
        }
        match build_status_frame(&mut buf, &snapshot) {
            Ok(frame) => room.publish_status_frame(frame),
            Err(e) => warn!(room = %room.name(), error = %e, "status frame build failed; keeping last frame"),
        }
    }

    debug!(room = %room.name(), "status producer stopped");
}

/// Rebuilds the room's Announce frame on every membership change.
///
/// Exits once the open period ends: pending signals are drained first, so
/// the last roster change before closing is still published.
pub(crate) async fn run_announce_producer(
    room: Arc<Room>,
    token: CancellationToken,
    mut changes: mpsc::Receiver<()>,
) {
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            biased;
            signal = changes.recv() => {
                if signal.is_none() {
                    break;
                }
            }
            _ = token.cancelled() => break,
        }

        match room.refresh_announce(|slots| build_announce_frame(&mut buf, slots)) {
            Ok(version) => debug!(room = %room.name(), version, "announce frame rebuilt"),
            Err(e) => warn!(room = %room.name(), error = %e, "announce frame build failed; keeping last frame"),
        }
    }

    debug!(room = %room.name(), "announce producer stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use barrel_core::domain::client::MAX_CONNECTIONS;
    use barrel_core::protocol::messages::PlayerState;
    use barrel_core::protocol::semver::SemVer;

    fn named(name: &str) -> Option<Client> {
        Some(Client::new(name, name, SemVer::new(0, 5, 0)))
    }

    #[test]
    fn test_announce_frame_skips_free_slots() {
        // Arrange
        let slots = vec![named("alice"), None, named("bob")];
        let mut buf = Vec::new();

        // Act
        let frame = build_announce_frame(&mut buf, &slots).unwrap();

        // Assert
        assert_eq!(
            frame.as_ref(),
            [1, 2, 0, 5, b'a', b'l', b'i', b'c', b'e', 2, 3, b'b', b'o', b'b']
        );
    }

    #[test]
    fn test_announce_frame_for_full_room_is_rejected() {
        let slots: Vec<Option<Client>> = (0..MAX_CONNECTIONS).map(|n| named(&format!("u{n}"))).collect();
        let mut buf = Vec::new();

        let result = build_announce_frame(&mut buf, &slots);

        assert_eq!(result, Err(ProtocolError::TooManyEntries(256)));
    }

    #[test]
    fn test_status_frame_builder_reuses_buffer() {
        // Arrange
        let mut buf = Vec::new();
        let first = [ClientStatusMessage { offset: 1, player_state: PlayerState::Paused, id: 0 }];
        build_status_frame(&mut buf, &first).unwrap();

        // Act
        let frame = build_status_frame(&mut buf, &[]).unwrap();

        // Assert
        assert_eq!(frame.as_ref(), [2, 0]);
    }

    #[tokio::test]
    async fn test_status_producer_keeps_publishing_in_a_full_room() {
        // Arrange: every slot is taken and has reported
        let room = Arc::new(Room::new("packed", Duration::from_millis(5)));
        let mut ids = Vec::new();
        for n in 0..MAX_CONNECTIONS {
            let client = Client::new(format!("u{n}"), format!("addr-{n}"), SemVer::new(0, 5, 0));
            let id = room.join(client.clone()).unwrap();
            room.update(&client, ClientStatusMessage { offset: 7, player_state: PlayerState::Playing, id });
            ids.push(id);
        }

        // Act
        let mut count = 0;
        for _ in 0..200 {
            count = room.status_frame()[1];
            if count as usize == MAX_FRAME_ENTRIES {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Assert: the lowest 255 slots are published, slot 255 is left out
        assert_eq!(count as usize, MAX_FRAME_ENTRIES);
        let frame = room.status_frame();
        assert_eq!(frame[frame.len() - 1], 254);
        for id in ids {
            room.leave(id);
        }
    }

    #[tokio::test]
    async fn test_status_producer_stops_on_cancel() {
        // Arrange
        let room = Arc::new(Room::new("lobby", Duration::from_millis(5)));
        let token = CancellationToken::new();
        let task = tokio::spawn(run_status_producer(Arc::clone(&room), token.clone()));

        // Act
        token.cancel();

        // Assert
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("producer must exit after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_announce_producer_drains_pending_signal_before_exit() {
        // Arrange
        let room = Arc::new(Room::new("lobby", Duration::from_secs(1)));
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(5);
        tx.try_send(()).unwrap();
        token.cancel();
        drop(tx);

        // Act
        run_announce_producer(Arc::clone(&room), token, rx).await;

        // Assert
        assert_eq!(room.announce_version(), 1);
    }

    #[tokio::test]
    async fn test_announce_producer_exits_when_sender_dropped() {
        let room = Arc::new(Room::new("lobby", Duration::from_secs(1)));
        let (tx, rx) = mpsc::channel::<()>(5);
        drop(tx);

        tokio::time::timeout(
            Duration::from_secs(1),
            run_announce_producer(Arc::clone(&room), CancellationToken::new(), rx),
        )
        .await
        .expect("producer must exit when the open period ends");
        assert_eq!(room.announce_version(), 0);
    }
}
