//! Progress events pushed to an observer while a search runs.
//!
//! Delivery never blocks and never fails the search. [`Notifier::notify`]
//! reports whether the event reached the observer; a full buffer or a
//! departed observer drops the event and logs once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use artistlink_core::{ArtistId, GraphPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Start,
    Route,
    Selection,
    Complete,
}

/// One update. `graph` is the full graph or the delta since the previous
/// event, depending on `is_full_graph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub update_type: UpdateType,
    pub message: String,
    pub entity_id: Option<ArtistId>,
    pub graph: GraphPayload,
    pub is_full_graph: bool,
}

/// Sink for progress events.
pub trait Notifier: Send + Sync {
    /// Hands `event` to the observer. Returns `false` if it was dropped.
    fn notify(&self, event: ProgressEvent) -> bool;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: ProgressEvent) -> bool {
        true
    }
}

/// Forwards events into a bounded channel.
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ProgressEvent>,
    dropped: AtomicUsize,
    warned: AtomicBool,
}

impl ChannelNotifier {
    /// A notifier and the receiving end for the observer.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let notifier = ChannelNotifier {
            tx,
            dropped: AtomicUsize::new(0),
            warned: AtomicBool::new(false),
        };
        (notifier, rx)
    }

    /// Events that could not be delivered.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the observer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: ProgressEvent) -> bool {
        let reason = match self.tx.try_send(event) {
            Ok(()) => return true,
            Err(TrySendError::Full(_)) => "observer buffer full",
            Err(TrySendError::Closed(_)) => "observer disconnected",
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(reason, "dropping progress events");
        }
        false
    }
}
