//! Tracking event feed for observing lifecycle transitions.
//!
//! The feed emits an event for every settled lifecycle transition in a
//! state manager, enabling:
//! - Persistence-layer integration (observe what became dirty or deleted)
//! - Reactive UI updates
//! - Audit logging
//!
//! Events are emitted after the transition (and its fixup) completes, so a
//! subscriber always observes a consistent graph.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

use entitrack_metadata::EntityTypeId;

use crate::entry::{EntityState, EntryId};

/// Kind of tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingEventKind {
    /// The entry left `Detached` and registered with the identity map.
    StartedTracking,
    /// The entry moved between tracked states.
    StateChanged {
        /// State before the transition.
        from: EntityState,
        /// State after the transition.
        to: EntityState,
    },
    /// The entry returned to `Detached` and left the identity map.
    Detached,
}

/// A single event from the tracking feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEvent {
    /// Sequence number of the event, monotonic per manager.
    pub sequence: u64,
    /// The entry the event concerns.
    pub entry: EntryId,
    /// The entry's entity type.
    pub entity_type: EntityTypeId,
    /// What happened.
    pub kind: TrackingEventKind,
}

/// A feed that distributes tracking events to subscribers.
///
/// The feed:
/// - Emits only settled transitions
/// - Preserves transition order
/// - Supports multiple subscribers
/// - Is thread-safe
pub struct TrackingFeed {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<TrackingEvent>>>,
    /// History of recent events for polling.
    history: RwLock<Vec<TrackingEvent>>,
    /// Maximum history size.
    max_history: usize,
}

impl TrackingFeed {
    /// Creates a feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver that will receive all future tracking events.
    /// The receiver should be polled regularly to avoid unbounded memory
    /// growth.
    pub fn subscribe(&self) -> Receiver<TrackingEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers.
    pub fn emit(&self, event: TrackingEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        // Send to subscribers (remove disconnected ones)
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Polls events from a sequence cursor.
    ///
    /// Returns events with sequence > cursor, up to limit.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<TrackingEvent> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number in history.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last().map(|e| e.sequence).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl std::fmt::Debug for TrackingFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingFeed")
            .field("history_len", &self.history_len())
            .field("subscriber_count", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
