//! Room registry: name → room lookup shared by every transport.
//!
//! Rooms are created lazily the first time a name is seen.  A periodic prune
//! drops rooms that are closed and no longer referenced by any connection,
//! so the registry does not grow for the lifetime of the process.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::room::Room;

/// Owns every live [`Room`], keyed by name.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    status_interval: Duration,
}

impl RoomRegistry {
    /// Creates an empty registry whose rooms sample status every `status_interval`.
    pub fn new(status_interval: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            status_interval,
        }
    }

    /// Returns the room called `name`, creating it if it does not exist.
    pub fn get_or_create(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.get(name) {
            return Arc::clone(room.value());
        }
        let room = self
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(room = %name, "room created");
                Arc::new(Room::new(name, self.status_interval))
            });
        Arc::clone(room.value())
    }

    /// Returns the room called `name` if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.get(name).map(|room| Arc::clone(room.value()))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Removes rooms that are closed and referenced only by the registry.
    ///
    /// Returns how many rooms were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.rooms.len();
        self.rooms
            .retain(|_, room| room.is_open() || Arc::strong_count(room) > 1);
        let pruned = before.saturating_sub(self.rooms.len());
        if pruned > 0 {
            info!(pruned, remaining = self.rooms.len(), "pruned idle rooms");
        }
        pruned
    }

    /// Calls [`Self::prune_idle`] every `every` until `shutdown` fires.
    pub async fn run_pruner(self: Arc<Self>, every: Duration, shutdown: CancellationToken) {
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.prune_idle();
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
