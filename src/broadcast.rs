//! Fan-out of session state changes to live subscribers.
//!
//! Each subscriber owns an unbounded channel. Publishing never blocks: a
//! send to a channel whose receiver has been dropped fails immediately and
//! that subscriber is pruned, without affecting delivery to the others.
//! Delivery is best-effort and not persisted; a client that reconnects
//! reconciles through a fresh snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::{ClosedNotice, PollOption, Session};

/// Notification delivered to subscribers.
///
/// Serializes as `{"event": "init" | "update" | "closed", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum BroadcastMessage {
    /// Full snapshot at subscribe time.
    Init(Session),
    /// Current option list after an accepted vote.
    Update(Vec<PollOption>),
    /// Session stopped accepting votes.
    Closed(ClosedNotice),
}

impl BroadcastMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Update(_) => "update",
            Self::Closed(_) => "closed",
        }
    }
}

/// Receiving end of one subscriber channel.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BroadcastMessage>,
}

impl Subscription {
    /// Registry key of this subscriber.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message. Returns `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.try_recv().ok()
    }
}

type SubscriberMap = HashMap<u64, mpsc::UnboundedSender<BroadcastMessage>>;

/// Subscriber registry for one session.
///
/// Guarded by its own lock, independent of the session state.
#[derive(Debug, Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    subscribers: Mutex<SubscriberMap>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber whose first message is `initial`.
    pub fn subscribe(&self, initial: BroadcastMessage) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(initial);

        self.lock_subscribers().insert(id, tx);
        tracing::debug!(subscriber = id, "subscriber registered");

        Subscription { id, rx }
    }

    /// Deliver `message` to every open channel, pruning closed ones.
    ///
    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, message: &BroadcastMessage) -> usize {
        let mut subs = self.lock_subscribers();
        let before = subs.len();
        subs.retain(|_, tx| tx.send(message.clone()).is_ok());
        let pruned = before - subs.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned disconnected subscribers");
        }

        subs.len()
    }

    /// Number of registered subscribers, including not-yet-pruned ones.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Drop every subscriber channel, ending their streams.
    pub fn disconnect_all(&self) {
        self.lock_subscribers().clear();
    }

    // No critical section leaves the map half-updated, so poison is ignored.
    fn lock_subscribers(&self) -> MutexGuard<'_, SubscriberMap> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
