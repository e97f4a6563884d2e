//! Push channel contract.
//!
//! A channel delivers full-row snapshots for one match plus lifecycle
//! events. It never replays: anything changed while disconnected must be
//! recovered by re-fetching.

mod hub;

pub use hub::LocalHub;

use std::sync::{Arc, Weak};

use derive_new::new;
use tokio::sync::mpsc;
use versus_tictactoe::{GameState, MatchId};

/// One event on a match topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Subscription is live (initially or after a reconnect).
    Subscribed,
    /// The row changed; full snapshot, never a delta.
    Changed(GameState),
    /// The channel closed.
    Closed,
    /// The channel failed.
    Errored(String),
}

/// Keeps a subscription registered with its topic. Dropping it
/// unsubscribes at once, even while the receiving side is still alive.
#[derive(Debug)]
pub struct SubscriptionLease {
    _token: Arc<()>,
}

impl SubscriptionLease {
    /// Creates a lease and the handle the publisher checks it through.
    pub fn issue() -> (Self, Weak<()>) {
        let token = Arc::new(());
        let watch = Arc::downgrade(&token);
        (Self { _token: token }, watch)
    }

    /// Checks whether `watch` still belongs to a held lease.
    pub fn is_held(watch: &Weak<()>) -> bool {
        watch.strong_count() > 0
    }
}

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct SubscriptionEvents {
    match_id: MatchId,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl SubscriptionEvents {
    /// The topic's match id.
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Waits for the next event, `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

/// Live subscription to one match topic. Dropping it unsubscribes.
#[derive(Debug, new)]
pub struct Subscription {
    match_id: MatchId,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    lease: SubscriptionLease,
}

impl Subscription {
    /// The topic's match id.
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Waits for the next event, `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Separates the lease from the receiving side, so the owner can
    /// unsubscribe without reaching the task that receives.
    pub fn split(self) -> (SubscriptionLease, SubscriptionEvents) {
        let events = SubscriptionEvents {
            match_id: self.match_id,
            events: self.events,
        };
        (self.lease, events)
    }
}

/// Subscribe/unsubscribe push channel scoped by match id.
pub trait PushChannel: Send + Sync {
    /// Opens a subscription on `match_id`'s topic.
    fn subscribe(&self, match_id: &MatchId) -> Subscription;
}
