//! Per-run event channels.
//!
//! Each run gets a lazily created broadcast channel keyed by run ID.
//! Events are ephemeral: a publish with no receivers is dropped, and a
//! subscriber only sees events published after it joined. The
//! orchestrator removes a run's channel a short grace window after the
//! run ends so a late subscriber can still catch the stream tail.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use aether_core::events::RunEvent;
use aether_core::ids::RunId;

/// Buffered events per channel. Sized for a full run of chunked output
/// against a subscriber that drains in bursts.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct RunChannelRegistry {
    channels: DashMap<RunId, broadcast::Sender<RunEvent>>,
    capacity: usize,
}

impl Default for RunChannelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl RunChannelRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, run_id: &RunId) -> broadcast::Sender<RunEvent> {
        self.channels
            .entry(run_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event to a run's channel. A run nobody watches still
    /// makes progress; its events are simply dropped.
    pub fn publish(&self, run_id: &RunId, event: RunEvent) {
        let sender = self.sender(run_id);
        if sender.send(event).is_err() {
            debug!(run_id = %run_id, "no event receivers; event dropped");
        }
    }

    /// Subscribe to a run's channel, creating it if needed. Earlier
    /// events are not replayed.
    pub fn subscribe(&self, run_id: &RunId) -> broadcast::Receiver<RunEvent> {
        self.sender(run_id).subscribe()
    }

    /// Drop a run's channel. Existing receivers see the stream close.
    pub fn remove(&self, run_id: &RunId) {
        self.channels.remove(run_id);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
