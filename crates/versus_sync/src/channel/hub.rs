//! In-process realtime broadcaster.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use versus_tictactoe::{GameState, MatchId, NewMatch};

use crate::{
    ChannelEvent, ConditionalStore, JoinOutcome, MatchPatch, PushChannel, StoreError,
    Subscription, SubscriptionLease, UpdateOutcome,
};

#[derive(Debug)]
struct Subscriber {
    sender: mpsc::UnboundedSender<ChannelEvent>,
    lease: Weak<()>,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        SubscriptionLease::is_held(&self.lease) && !self.sender.is_closed()
    }
}

#[derive(Debug)]
struct Topic {
    connected: bool,
    subscribers: Vec<Subscriber>,
}

impl Default for Topic {
    fn default() -> Self {
        Self {
            connected: true,
            subscribers: Vec::new(),
        }
    }
}

impl Topic {
    fn broadcast(&mut self, event: &ChannelEvent) {
        self.subscribers.retain(|subscriber| {
            subscriber.is_live() && subscriber.sender.send(event.clone()).is_ok()
        });
    }
}

/// Wraps a store and broadcasts every accepted write to the written
/// match's subscribers.
///
/// A topic can be taken offline with [`LocalHub::disconnect`] or
/// [`LocalHub::fail`]; rows changed while offline are not delivered, and
/// [`LocalHub::reconnect`] only announces that the topic is live again.
#[derive(Debug)]
pub struct LocalHub<S> {
    store: S,
    topics: Mutex<HashMap<MatchId, Topic>>,
}

impl<S: ConditionalStore> LocalHub<S> {
    /// Wraps `store`.
    #[instrument(skip(store))]
    pub fn new(store: S) -> Self {
        info!("Creating LocalHub");
        Self {
            store,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the wrapped store, bypassing broadcasts.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Closes the topic; later writes are not delivered until reconnect.
    #[instrument(skip(self))]
    pub fn disconnect(&self, match_id: &MatchId) {
        let mut topics = self.topics();
        let topic = topics.entry(match_id.clone()).or_default();
        topic.connected = false;
        topic.broadcast(&ChannelEvent::Closed);
        info!("Topic disconnected");
    }

    /// Fails the topic; later writes are not delivered until reconnect.
    #[instrument(skip(self))]
    pub fn fail(&self, match_id: &MatchId, reason: &str) {
        let mut topics = self.topics();
        let topic = topics.entry(match_id.clone()).or_default();
        topic.connected = false;
        topic.broadcast(&ChannelEvent::Errored(reason.to_string()));
        warn!("Topic failed");
    }

    /// Brings the topic back and announces it to subscribers.
    #[instrument(skip(self))]
    pub fn reconnect(&self, match_id: &MatchId) {
        let mut topics = self.topics();
        let topic = topics.entry(match_id.clone()).or_default();
        topic.connected = true;
        topic.broadcast(&ChannelEvent::Subscribed);
        info!("Topic reconnected");
    }

    /// Number of live subscriptions on a topic.
    #[instrument(skip(self))]
    pub fn subscriber_count(&self, match_id: &MatchId) -> usize {
        let mut topics = self.topics();
        match topics.get_mut(match_id) {
            Some(topic) => {
                topic.subscribers.retain(Subscriber::is_live);
                topic.subscribers.len()
            }
            None => 0,
        }
    }

    #[instrument(skip(self, state), fields(match_id = %state.id, version = state.version))]
    fn publish(&self, state: &GameState) {
        let mut topics = self.topics();
        let Some(topic) = topics.get_mut(&state.id) else {
            return;
        };
        if !topic.connected {
            debug!("Topic offline, change not delivered");
            return;
        }
        topic.broadcast(&ChannelEvent::Changed(state.clone()));
        debug!(subscribers = topic.subscribers.len(), "Change broadcast");
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<MatchId, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: ConditionalStore> ConditionalStore for LocalHub<S> {
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        self.store.fetch(id).await
    }

    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        let created = self.store.insert(new_match).await?;
        self.publish(&created);
        Ok(created)
    }

    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let outcome = self
            .store
            .conditional_update(id, expected_version, patch)
            .await?;
        if let UpdateOutcome::Applied(state) = &outcome {
            self.publish(state);
        }
        Ok(outcome)
    }

    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        let outcome = self.store.join_second_slot(id, name).await?;
        if let JoinOutcome::Joined(state) = &outcome {
            self.publish(state);
        }
        Ok(outcome)
    }
}

impl<S: ConditionalStore> PushChannel for LocalHub<S> {
    #[instrument(skip(self))]
    fn subscribe(&self, match_id: &MatchId) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (lease, watch) = SubscriptionLease::issue();
        let mut topics = self.topics();
        let topic = topics.entry(match_id.clone()).or_default();
        if topic.connected {
            let _ = sender.send(ChannelEvent::Subscribed);
        }
        topic.subscribers.push(Subscriber {
            sender,
            lease: watch,
        });
        debug!(subscribers = topic.subscribers.len(), "Subscribed");
        Subscription::new(match_id.clone(), receiver, lease)
    }
}
