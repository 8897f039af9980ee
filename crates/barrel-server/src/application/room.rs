//! Room: membership, status table, and the prepared broadcast frames.
//!
//! # How a room works (for beginners)
//!
//! A room is a fixed table of 256 slots.  Every connected client occupies one
//! slot, and its slot number is how other clients refer to it.  The room also
//! keeps the latest status each client reported, plus two *prepared frames*:
//! fully encoded Status and Announce messages that every connection in the
//! room sends as-is, so nothing is re-serialized per recipient.
//!
//! ```text
//!        join / leave ──► slot table ──signal──► announce producer ──► announce frame
//!                                                                 └──► announce version += 1
//!        update ────────► status table ◄──tick── status producer  ──► status frame
//! ```
//!
//! The two producers (see [`crate::application::broadcast`]) run only while
//! the room is *open*, i.e. while it has at least one member.  Every open
//! period gets a fresh [`CancellationToken`]; the 1→0 transition cancels it,
//! and a later 0→1 transition starts a new pair.
//!
//! # Locking
//!
//! - The slot table is behind a `std::sync::RwLock`.  Join and leave take it
//!   for writing; the announce rebuild takes it for reading.
//! - The status table is a `DashMap` and needs no outer lock.
//! - Each prepared frame has its own `RwLock<Bytes>`; readers clone the
//!   `Bytes` handle and release immediately.
//!
//! No lock is held across an `.await`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

use barrel_core::domain::client::{Client, SlotId, MAX_CONNECTIONS};
use barrel_core::protocol::codec::ProtocolError;
use barrel_core::protocol::messages::{ClientStatusMessage, MessageType};

use crate::application::broadcast;

/// Capacity of the membership-changed queue feeding the announce producer.
///
/// A full queue drops the extra signal; the pending ones already guarantee a
/// rebuild that observes the change.
const CHANGE_QUEUE_CAPACITY: usize = 5;

/// Errors returned by [`Room::join`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// All 256 slots are occupied.
    #[error("room is at capacity")]
    Full,
}

/// State that only exists while the room has members.
struct Lifecycle {
    token: CancellationToken,
    changes: mpsc::Sender<()>,
}

struct SlotTable {
    clients: Vec<Option<Client>>,
    /// `Some` exactly while the room is open.
    lifecycle: Option<Lifecycle>,
}

/// One synchronization session, identified by name.
pub struct Room {
    name: String,
    status_interval: Duration,
    connections: AtomicUsize,
    slots: RwLock<SlotTable>,
    statuses: DashMap<String, ClientStatusMessage>,
    status_frame: RwLock<Bytes>,
    announce_frame: RwLock<Bytes>,
    announce_version: AtomicU64,
}

impl Room {
    /// Creates an empty, closed room.
    ///
    /// `status_interval` is how often the status producer samples the status
    /// table once the room opens.
    pub fn new(name: impl Into<String>, status_interval: Duration) -> Self {
        Self {
            name: name.into(),
            status_interval: status_interval.max(Duration::from_millis(1)),
            connections: AtomicUsize::new(0),
            slots: RwLock::new(SlotTable {
                clients: vec![None; MAX_CONNECTIONS],
                lifecycle: None,
            }),
            statuses: DashMap::new(),
            status_frame: RwLock::new(Bytes::from_static(&[MessageType::Status as u8, 0])),
            announce_frame: RwLock::new(Bytes::from_static(&[MessageType::Announce as u8, 0])),
            announce_version: AtomicU64::new(0),
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// The room's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of occupied slots.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Returns `true` while the room has members and its producers run.
    pub fn is_open(&self) -> bool {
        read(&self.slots).lifecycle.is_some()
    }

    /// Seats `client` in the lowest free slot.
    ///
    /// On the 0→1 transition this opens the room and spawns its broadcast
    /// producers, so it must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Full`] if all slots are taken; nothing else
    /// changes in that case.
    pub fn join(self: &Arc<Self>, client: Client) -> Result<SlotId, RoomError> {
        self.join_inner(client).map(|seat| seat.id)
    }

    /// Frees slot `id`.  Leaving an already free slot does nothing.
    pub fn leave(&self, id: SlotId) {
        self.leave_seat(id, None);
    }

    /// Frees slot `id` unless `period` has already ended.
    ///
    /// The check runs under the slot-table lock that closing also takes, so a
    /// seat from an earlier open period never frees a slot a later client
    /// now holds.
    fn leave_seat(&self, id: SlotId, period: Option<&CancellationToken>) {
        let mut table = write(&self.slots);
        if period.is_some_and(CancellationToken::is_cancelled) {
            return;
        }
        let Some(client) = table.clients[id as usize].take() else {
            return;
        };
        self.statuses.remove(&client.addr);

        let Some(remaining) = self.connection_count().checked_sub(1) else {
            error!(
                room = %self.name,
                slot = id,
                "connection count would go negative; force-closing room"
            );
            self.close_locked(&mut table);
            return;
        };
        self.connections.store(remaining, Ordering::Release);

        info!(
            room = %self.name,
            client = %client.name,
            addr = %client.addr,
            slot = id,
            remaining,
            "client left"
        );

        if let Some(lifecycle) = &table.lifecycle {
            let _ = lifecycle.changes.try_send(());
        }
        if remaining == 0 {
            self.close_locked(&mut table);
        }
    }

    /// Records `msg` as the latest status of `client` (last write wins).
    pub fn update(&self, client: &Client, msg: ClientStatusMessage) {
        if let Some(mut entry) = self.statuses.get_mut(&client.addr) {
            *entry = msg;
            return;
        }
        self.statuses.insert(client.addr.clone(), msg);
    }

    /// Compares the caller's last seen announce version with the room's.
    ///
    /// Returns `(max(current, last_seen), current > last_seen)`.
    pub fn check(&self, last_seen: u64) -> (u64, bool) {
        let current = self.announce_version.load(Ordering::Acquire);
        (current.max(last_seen), current > last_seen)
    }

    /// Current announce version.
    pub fn announce_version(&self) -> u64 {
        self.announce_version.load(Ordering::Acquire)
    }

    /// The prepared Status frame.
    pub fn status_frame(&self) -> Bytes {
        read(&self.status_frame).clone()
    }

    /// The prepared Announce frame.
    pub fn announce_frame(&self) -> Bytes {
        read(&self.announce_frame).clone()
    }

    /// Force-closes the room: every member is evicted and the producers stop.
    ///
    /// Connections holding a [`Membership`] observe this through
    /// [`Membership::evicted`].
    pub fn force_close(&self) {
        let mut table = write(&self.slots);
        if table.lifecycle.is_some() || self.connection_count() > 0 {
            warn!(room = %self.name, "force-closing room");
        }
        self.close_locked(&mut table);
    }

    // ── Producer hooks ────────────────────────────────────────────────────────

    pub(crate) fn status_interval(&self) -> Duration {
        self.status_interval
    }

    /// Copies every reported status into `out`, sorted by slot.
    pub(crate) fn snapshot_statuses(&self, out: &mut Vec<ClientStatusMessage>) {
        out.clear();
        out.extend(self.statuses.iter().map(|entry| *entry.value()));
        out.sort_unstable_by_key(|msg| msg.id);
    }

    pub(crate) fn publish_status_frame(&self, frame: Bytes) {
        *write(&self.status_frame) = frame;
    }

    /// Rebuilds the Announce frame from the slot table and bumps the version.
    ///
    /// The announce frame lock is held for the whole rebuild, so concurrent
    /// rebuilds publish in snapshot order and the frame is always published
    /// before the version that advertises it.  On error the previous frame
    /// and version are kept.
    pub(crate) fn refresh_announce<F>(&self, build: F) -> Result<u64, ProtocolError>
    where
        F: FnOnce(&[Option<Client>]) -> Result<Bytes, ProtocolError>,
    {
        let mut frame = write(&self.announce_frame);
        let fresh = {
            let table = read(&self.slots);
            build(&table.clients)?
        };
        *frame = fresh;
        Ok(self.announce_version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Like [`Room::join`], also returning the eviction token and announce baseline.
    fn join_inner(self: &Arc<Self>, client: Client) -> Result<Seat, RoomError> {
        let mut table = write(&self.slots);
        let announce_baseline = self.announce_version.load(Ordering::Acquire);
        let Some(index) = table.clients.iter().position(Option::is_none) else {
            warn!(room = %self.name, client = %client.name, addr = %client.addr, "room full");
            return Err(RoomError::Full);
        };
        let id = index as SlotId;

        info!(
            room = %self.name,
            client = %client.name,
            addr = %client.addr,
            version = %client.version,
            slot = id,
            "client joined"
        );
        table.clients[index] = Some(client);
        self.connections.fetch_add(1, Ordering::AcqRel);

        let lifecycle = match table.lifecycle.take() {
            Some(lifecycle) => lifecycle,
            None => self.open(),
        };
        let _ = lifecycle.changes.try_send(());
        let evicted = lifecycle.token.clone();
        table.lifecycle = Some(lifecycle);

        Ok(Seat {
            id,
            evicted,
            announce_baseline,
        })
    }

    /// Starts a fresh producer pair for a new open period.
    fn open(self: &Arc<Self>) -> Lifecycle {
        let token = CancellationToken::new();
        let (changes, rx) = mpsc::channel(CHANGE_QUEUE_CAPACITY);

        tokio::spawn(broadcast::run_status_producer(Arc::clone(self), token.clone()));
        tokio::spawn(broadcast::run_announce_producer(Arc::clone(self), token.clone(), rx));

        info!(room = %self.name, "room opened");
        Lifecycle { token, changes }
    }

    fn close_locked(&self, table: &mut SlotTable) {
        for slot in table.clients.iter_mut() {
            *slot = None;
        }
        self.statuses.clear();
        self.connections.store(0, Ordering::Release);

        // Dropping the sender lets the announce producer drain and exit.
        if let Some(lifecycle) = table.lifecycle.take() {
            lifecycle.token.cancel();
            info!(room = %self.name, "room closed");
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("connections", &self.connection_count())
            .field("announce_version", &self.announce_version())
            .finish_non_exhaustive()
    }
}

// ── Membership guard ──────────────────────────────────────────────────────────

/// A seat in a room, released when dropped.
///
/// Transports hold one of these for the lifetime of a connection loop, so the
/// slot is freed exactly once whichever way the loop exits.
#[derive(Debug)]
pub struct Membership {
    room: Arc<Room>,
    client: Client,
    id: SlotId,
    evicted: CancellationToken,
    announce_baseline: u64,
}

/// What [`Room::join_inner`] hands back for a newly seated client.
struct Seat {
    id: SlotId,
    evicted: CancellationToken,
    /// Announce version published before this client was seated.
    announce_baseline: u64,
}

impl Membership {
    /// Joins `client` into `room`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Full`] if the room has no free slot.
    pub fn join(room: Arc<Room>, client: Client) -> Result<Self, RoomError> {
        let seat = room.join_inner(client.clone())?;
        Ok(Self {
            room,
            client,
            id: seat.id,
            evicted: seat.evicted,
            announce_baseline: seat.announce_baseline,
        })
    }

    /// Announce version to start [`Room::check`] from.
    ///
    /// Any roster published before the join cannot list this client, so a
    /// connection waits for a newer one before its first push.
    pub fn announce_baseline(&self) -> u64 {
        self.announce_baseline
    }

    /// Slot assigned to this client.
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Records a status update for this client.  Dropped once evicted.
    pub fn update(&self, msg: ClientStatusMessage) {
        // Closing clears the status table under the write lock.
        let _table = read(&self.room.slots);
        if self.evicted.is_cancelled() {
            return;
        }
        debug!(room = %self.room.name(), slot = self.id, status = %msg, "status update");
        self.room.update(&self.client, msg);
    }

    /// Resolves when the room is force-closed while this client is seated.
    pub fn evicted(&self) -> WaitForCancellationFuture<'_> {
        self.evicted.cancelled()
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.room.leave_seat(self.id, Some(&self.evicted));
    }
}

// ── Lock helpers ──────────────────────────────────────────────────────────────

// Every critical section leaves the guarded state consistent, so a poisoned
// lock is still safe to use.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
