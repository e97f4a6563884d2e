//! Shared fakes and helpers for engine tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use versus_sync::{
    ConditionalStore, JoinOutcome, LocalHub, MatchPatch, MatchView, MemoryStore, PushChannel,
    StoreError, SyncContext, SyncEngine, SyncOptions, UpdateOutcome,
};
use chrono::Utc;
use versus_tictactoe::{GameState, MatchId, NewMatch, plan_move};

pub type Hub = Arc<LocalHub<MemoryStore>>;

/// Fresh in-memory hub.
pub fn hub() -> Hub {
    Arc::new(LocalHub::new(MemoryStore::new()))
}

/// Engine talking straight to the hub.
pub fn engine(hub: &Hub) -> SyncEngine {
    SyncEngine::new(SyncContext::from_hub(hub.clone(), SyncOptions::default()))
}

/// Engine whose store calls go through `store` but whose pushes come from `hub`.
pub fn engine_via(
    store: Arc<dyn ConditionalStore>,
    hub: &Hub,
    options: SyncOptions,
) -> SyncEngine {
    let channel: Arc<dyn PushChannel> = hub.clone();
    SyncEngine::new(SyncContext::new(store, channel, options))
}

/// Waits until the engine publishes a view matching `pred`.
pub async fn wait_for(engine: &SyncEngine, pred: impl FnMut(&MatchView) -> bool) -> MatchView {
    let mut views = engine.subscribe();
    let view = tokio::time::timeout(Duration::from_secs(2), views.wait_for(pred))
        .await
        .expect("timed out waiting for view")
        .expect("engine dropped");
    view.clone()
}

/// Waits until the engine displays at least `version`.
pub async fn wait_for_version(engine: &SyncEngine, version: u64) -> MatchView {
    wait_for(engine, |view| view.version().is_some_and(|v| v >= version)).await
}

/// Lets spawned tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Alice creates, Bob joins; both engines have seen the joined row.
pub async fn joined_pair(hub: &Hub) -> (SyncEngine, SyncEngine, GameState) {
    let alice = engine(hub);
    let bob = engine(hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob
        .join_match(created.id.clone(), "Bob")
        .await
        .expect("join");
    wait_for_version(&alice, joined.version).await;
    (alice, bob, joined)
}

/// Which store call a [`GatedStore`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Hold the first fetch before reading.
    Fetch,
    /// Hold the first conditional update before writing.
    BeforeWrite,
    /// Hold the first conditional update after writing, before replying.
    AfterWrite,
}

/// Delegates to a hub, holding the first call of one kind until released.
pub struct GatedStore {
    inner: Hub,
    hold: Hold,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new(inner: &Hub, hold: Hold) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            hold,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Waits until the held call has started.
    pub async fn entered(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.entered.notified())
            .await
            .expect("held call never started");
    }

    /// Lets the held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    fn take(&self, kind: Hold) -> bool {
        self.hold == kind && self.armed.swap(false, Ordering::SeqCst)
    }

    async fn hold_here(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[async_trait]
impl ConditionalStore for GatedStore {
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        if self.take(Hold::Fetch) {
            self.hold_here().await;
        }
        self.inner.fetch(id).await
    }

    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        self.inner.insert(new_match).await
    }

    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        if self.take(Hold::BeforeWrite) {
            self.hold_here().await;
            return self.inner.conditional_update(id, expected_version, patch).await;
        }
        if self.take(Hold::AfterWrite) {
            let outcome = self.inner.conditional_update(id, expected_version, patch).await;
            self.hold_here().await;
            return outcome;
        }
        self.inner.conditional_update(id, expected_version, patch).await
    }

    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        self.inner.join_second_slot(id, name).await
    }
}

/// Delegates to a hub, counting calls; optionally fails every write.
pub struct CountingStore {
    inner: Hub,
    fail_writes: bool,
    pub fetches: AtomicUsize,
    pub updates: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: &Hub) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            fail_writes: false,
            fetches: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        })
    }

    pub fn failing(inner: &Hub) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            fail_writes: true,
            fetches: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConditionalStore for CountingStore {
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(id).await
    }

    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        self.inner.insert(new_match).await
    }

    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StoreError::new("connection reset by peer"));
        }
        self.inner.conditional_update(id, expected_version, patch).await
    }

    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        self.inner.join_second_slot(id, name).await
    }
}

/// Delegates to a hub; a successful join is followed by an opening X move
/// at `cell`, committed before the joiner hears back.
pub struct RacingJoin {
    inner: Hub,
    cell: usize,
}

impl RacingJoin {
    pub fn new(inner: &Hub, cell: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            cell,
        })
    }
}

#[async_trait]
impl ConditionalStore for RacingJoin {
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        self.inner.fetch(id).await
    }

    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        self.inner.insert(new_match).await
    }

    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        self.inner.conditional_update(id, expected_version, patch).await
    }

    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        let outcome = self.inner.join_second_slot(id, name).await?;
        if let JoinOutcome::Joined(joined) = &outcome {
            let opening = plan_move(joined, self.cell, joined.turn, Utc::now())
                .map_err(|err| StoreError::new(err.to_string()))?
                .into_state();
            self.inner
                .conditional_update(id, joined.version, MatchPatch::from_state(&opening))
                .await?;
        }
        Ok(outcome)
    }
}
