//! Optimistic submission and realtime reconciliation for one bound match.
//!
//! The engine owns one authoritative snapshot and at most one optimistic
//! overlay. Moves are published locally before the store confirms them,
//! then settled by a version-guarded write:
//!
//! - applied: the store's row becomes authoritative (unless a newer push
//!   already arrived) and the overlay goes away;
//! - not applied: the overlay goes away, the row is re-fetched, and the
//!   caller gets [`SyncErrorKind::Conflict`];
//! - store failure: the overlay goes away with no re-fetch, and the caller
//!   gets [`SyncErrorKind::TransportError`].
//!
//! Pushed snapshots are authoritative and always win over an overlay, but
//! never regress the held version.
//!
//! Engine state sits behind a mutex that is never held across an await, so
//! every transition is atomic with respect to the others.

mod state;
mod view;

pub use view::MatchView;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use versus_tictactoe::{
    GameState, Mark, MatchId, new_match, plan_board_reset, plan_move, plan_score_reset,
};

use crate::engine::state::{Binding, EngineState, Overlay};
use crate::monitor::{ChannelSignal, MonitorAction};
use crate::{
    ChannelEvent, JoinOutcome, MatchPatch, StoreError, SubscriptionEvents, SyncContext,
    SyncError, SyncErrorKind, UpdateOutcome,
};

struct Shared {
    state: Mutex<EngineState>,
    view: watch::Sender<MatchView>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    }
}

/// A planned write waiting on the store.
struct Submission {
    ticket: u64,
    epoch: u64,
    match_id: MatchId,
    expected_version: u64,
    patch: MatchPatch,
}

/// Client-side owner of one match's shared state.
///
/// Clones share the same state; only one engine should manage a given
/// match within a process.
#[derive(Clone)]
pub struct SyncEngine {
    context: SyncContext,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("context", &self.context)
            .field("view", &*self.shared.view.borrow())
            .finish()
    }
}

impl SyncEngine {
    /// Creates an idle engine over the given store and channel.
    #[instrument(skip(context))]
    pub fn new(context: SyncContext) -> Self {
        info!("Creating SyncEngine");
        let (view, _) = watch::channel(MatchView::default());
        Self {
            context,
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                view,
            }),
        }
    }

    /// Returns the engine's dependencies.
    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Observable stream of published views.
    pub fn subscribe(&self) -> watch::Receiver<MatchView> {
        self.shared.view.subscribe()
    }

    /// Latest published view.
    pub fn view(&self) -> MatchView {
        self.shared.view.borrow().clone()
    }

    /// Authoritative snapshot, ignoring any optimistic overlay.
    pub fn authoritative(&self) -> Option<GameState> {
        self.lock().authoritative.clone()
    }

    /// Bound match id.
    pub fn match_id(&self) -> Option<MatchId> {
        self.lock().current().map(|(match_id, _)| match_id)
    }

    /// Creates a match with `display_name` as X and binds to it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncErrorKind::TransportError`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn create_match(&self, display_name: &str) -> Result<GameState, SyncError> {
        let created = self
            .guarded(
                self.context
                    .store()
                    .insert(new_match(display_name, Utc::now())),
            )
            .await?;
        info!(match_id = %created.id, "Match created");
        Ok(self.bind_seeded(created).await)
    }

    /// Claims the O slot of `match_id` and binds to it.
    ///
    /// # Errors
    ///
    /// - [`SyncErrorKind::AlreadyJoined`] if the slot is taken; an engine
    ///   already bound to that match re-synchronizes first.
    /// - [`SyncErrorKind::NotFound`] if the match does not exist.
    /// - [`SyncErrorKind::TransportError`] if the store fails.
    #[instrument(skip(self), fields(match_id = %match_id))]
    pub async fn join_match(
        &self,
        match_id: MatchId,
        display_name: &str,
    ) -> Result<GameState, SyncError> {
        let outcome = self
            .guarded(
                self.context
                    .store()
                    .join_second_slot(&match_id, display_name),
            )
            .await?;

        match outcome {
            JoinOutcome::Joined(joined) => {
                info!(version = joined.version, "Joined match");
                Ok(self.bind_seeded(joined).await)
            }
            JoinOutcome::AlreadyHasOpponent => {
                warn!("Match already has a second player");
                let bound_here = self
                    .match_id()
                    .is_some_and(|bound| bound == match_id);
                if bound_here && let Err(err) = self.resync().await {
                    warn!(error = %err, "Re-sync after rejected join failed");
                }
                Err(SyncError::new(
                    SyncErrorKind::AlreadyJoined,
                    format!("Match {} already has a second player", match_id),
                ))
            }
            JoinOutcome::NotFound => Err(SyncError::new(
                SyncErrorKind::NotFound,
                format!("Match {} not found", match_id),
            )),
        }
    }

    /// Binds to `match_id`: subscribes to its topic and fetches the row.
    ///
    /// Any previous binding is released first. If the engine is rebound or
    /// unbound before the fetch resolves, its result is discarded.
    ///
    /// # Errors
    ///
    /// - [`SyncErrorKind::NotFound`] if the match does not exist; terminal
    ///   for this binding.
    /// - [`SyncErrorKind::TransportError`] if the fetch fails.
    /// - [`SyncErrorKind::Superseded`] if the binding was replaced meanwhile.
    #[instrument(skip(self), fields(match_id = %match_id))]
    pub async fn bind(&self, match_id: MatchId) -> Result<GameState, SyncError> {
        let epoch = self.attach(&match_id);
        self.load(epoch, &match_id).await
    }

    /// Releases the binding and its subscription. No channel event is
    /// applied after this returns.
    #[instrument(skip(self))]
    pub fn unbind(&self) {
        let mut state = self.lock();
        state.release();
        state.monitor.apply(ChannelSignal::Unbind);
        self.publish(&state);
        info!("Match unbound");
    }

    /// Re-fetches the bound match.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::bind`]; [`SyncErrorKind::NotFound`] when
    /// nothing is bound.
    #[instrument(skip(self))]
    pub async fn resync(&self) -> Result<GameState, SyncError> {
        let (match_id, epoch) = {
            let state = self.lock();
            Self::bound(&state)?
        };
        self.load(epoch, &match_id).await
    }

    /// Plays `mark` at `index`.
    ///
    /// The move is validated and published locally before the store is
    /// contacted. Only one write may be outstanding at a time.
    ///
    /// # Errors
    ///
    /// - Validation ([`SyncErrorKind::InvalidIndex`],
    ///   [`SyncErrorKind::GameFinished`], [`SyncErrorKind::OutOfTurn`],
    ///   [`SyncErrorKind::CellOccupied`]) before any store call; state is
    ///   untouched.
    /// - [`SyncErrorKind::Conflict`] if another write landed first; the
    ///   move is dropped and the engine holds the re-fetched row.
    /// - [`SyncErrorKind::TransportError`] if the store fails or times out;
    ///   the overlay is rolled back.
    #[instrument(skip(self))]
    pub async fn submit_move(&self, index: usize, mark: Mark) -> Result<GameState, SyncError> {
        let submission = {
            let mut state = self.lock();
            let (match_id, epoch) = Self::bound(&state)?;
            let base = Self::held(&state)?;
            Self::ensure_idle(&state)?;
            if base.board.is_taken(index) {
                return Err(SyncError::new(
                    SyncErrorKind::CellOccupied,
                    format!("Cell {} is already occupied", index),
                ));
            }

            let optimistic = plan_move(&base, index, mark, Utc::now())?.into_state();
            let ticket = state.issue_ticket();
            state.in_flight = Some(ticket);
            state.overlay = Some(Overlay {
                ticket,
                cell: index,
                snapshot: optimistic.clone(),
            });
            self.publish(&state);
            debug!(ticket, version = optimistic.version, "Optimistic move published");

            Submission {
                ticket,
                epoch,
                match_id,
                expected_version: base.version,
                patch: MatchPatch::from_state(&optimistic),
            }
        };

        self.commit(submission).await
    }

    /// Clears the board, keeping scores. No optimistic preview.
    ///
    /// # Errors
    ///
    /// As [`SyncEngine::submit_move`], minus the move validation kinds.
    #[instrument(skip(self))]
    pub async fn reset_board(&self) -> Result<GameState, SyncError> {
        self.submit_reset(plan_board_reset).await
    }

    /// Returns the match to its waiting shape, keeping player names.
    ///
    /// # Errors
    ///
    /// As [`SyncEngine::reset_board`].
    #[instrument(skip(self))]
    pub async fn reset_scores(&self) -> Result<GameState, SyncError> {
        self.submit_reset(plan_score_reset).await
    }

    async fn submit_reset(
        &self,
        plan: fn(&GameState, DateTime<Utc>) -> GameState,
    ) -> Result<GameState, SyncError> {
        let submission = {
            let mut state = self.lock();
            let (match_id, epoch) = Self::bound(&state)?;
            let base = Self::held(&state)?;
            Self::ensure_idle(&state)?;

            let next = plan(&base, Utc::now());
            let ticket = state.issue_ticket();
            state.in_flight = Some(ticket);

            Submission {
                ticket,
                epoch,
                match_id,
                expected_version: base.version,
                patch: MatchPatch::from_state(&next),
            }
        };

        self.commit(submission).await
    }

    /// Sends a planned write and folds its outcome back in.
    #[instrument(skip(self, submission), fields(
        match_id = %submission.match_id,
        ticket = submission.ticket,
        expected_version = submission.expected_version
    ))]
    async fn commit(&self, submission: Submission) -> Result<GameState, SyncError> {
        let Submission {
            ticket,
            epoch,
            match_id,
            expected_version,
            patch,
        } = submission;

        let outcome = self
            .guarded(
                self.context
                    .store()
                    .conditional_update(&match_id, expected_version, patch),
            )
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied(written)) => {
                let mut state = self.lock();
                if state.is_bound_to(epoch, &match_id) {
                    state.finish(ticket);
                    if !state.adopt(written.clone()) {
                        debug!("Newer pushed state already held, write response not applied");
                    }
                    state.last_error = None;
                    self.publish(&state);
                } else {
                    debug!("Binding changed during write, response not applied");
                }
                info!(version = written.version, "Write applied");
                Ok(written)
            }
            Ok(UpdateOutcome::NotApplied) => {
                let message = format!(
                    "Match {} moved past version {}, write dropped",
                    match_id, expected_version
                );
                {
                    let mut state = self.lock();
                    if state.is_bound_to(epoch, &match_id) {
                        state.finish(ticket);
                        state.last_error = Some(message.clone());
                        self.publish(&state);
                    }
                }
                warn!("Version conflict, re-fetching");

                match self.load(epoch, &match_id).await {
                    Ok(_) => {}
                    Err(err) if err.kind == SyncErrorKind::Superseded => {}
                    Err(err) => return Err(err),
                }
                Err(SyncError::new(SyncErrorKind::Conflict, message))
            }
            Err(err) => {
                warn!(error = %err, "Write failed, rolling back");
                let mut state = self.lock();
                if state.is_bound_to(epoch, &match_id) {
                    state.finish(ticket);
                    state.last_error = Some(err.message.clone());
                    self.publish(&state);
                }
                Err(SyncError::from(err))
            }
        }
    }

    /// Starts a new binding and its subscription pump, returning its epoch.
    fn attach(&self, match_id: &MatchId) -> u64 {
        let epoch = {
            let mut state = self.lock();
            state.release();
            let epoch = state.epoch;
            state.binding = Some(Binding {
                match_id: match_id.clone(),
                epoch,
                pump: None,
                lease: None,
                unavailable: false,
            });
            state.monitor.apply(ChannelSignal::Bind);
            self.publish(&state);
            epoch
        };

        let (lease, events) = self.context.channel().subscribe(match_id).split();
        let pump = tokio::spawn(pump(
            Arc::downgrade(&self.shared),
            self.context.clone(),
            epoch,
            events,
        ));

        let mut state = self.lock();
        match state.binding.as_mut() {
            Some(binding) if binding.epoch == epoch => {
                binding.pump = Some(pump);
                binding.lease = Some(lease);
            }
            _ => pump.abort(),
        }
        info!(epoch, "Match bound");
        epoch
    }

    /// Binds to a snapshot already in hand (fresh insert or join).
    ///
    /// The snapshot is shown at once, then re-fetched: writes that landed
    /// between the store's reply and the subscription are never pushed.
    async fn bind_seeded(&self, snapshot: GameState) -> GameState {
        let match_id = snapshot.id.clone();
        let epoch = self.attach(&match_id);

        {
            let mut state = self.lock();
            if !state.is_bound_to(epoch, &match_id) {
                return snapshot;
            }
            state.adopt(snapshot.clone());
            self.publish(&state);
        }

        match self.load(epoch, &match_id).await {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, "Catch-up fetch after bind failed");
                self.authoritative()
                    .filter(|held| held.id == match_id)
                    .unwrap_or(snapshot)
            }
        }
    }

    /// Fetches the bound row and folds it in.
    #[instrument(skip(self))]
    async fn load(&self, epoch: u64, match_id: &MatchId) -> Result<GameState, SyncError> {
        let fetched = self.guarded(self.context.store().fetch(match_id)).await;

        let mut state = self.lock();
        if !state.is_bound_to(epoch, match_id) {
            debug!("Discarding fetch for a replaced binding");
            return Err(SyncError::new(
                SyncErrorKind::Superseded,
                format!("Binding to {} was replaced", match_id),
            ));
        }

        let result = match fetched {
            Ok(Some(snapshot)) => {
                debug!(version = snapshot.version, "Fetched");
                state.adopt(snapshot);
                state.monitor.apply(ChannelSignal::FetchSucceeded);
                state.authoritative.clone().ok_or_else(|| {
                    SyncError::new(SyncErrorKind::NotFound, "Fetched state was not retained")
                })
            }
            Ok(None) => {
                warn!("Match not found");
                if let Some(binding) = state.binding.as_mut() {
                    binding.unavailable = true;
                    binding.lease = None;
                    if let Some(pump) = binding.pump.take() {
                        pump.abort();
                    }
                }
                state.monitor.apply(ChannelSignal::FetchFailed);
                let err = SyncError::new(
                    SyncErrorKind::NotFound,
                    format!("Match {} not found", match_id),
                );
                state.last_error = Some(err.message.clone());
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "Fetch failed");
                state.monitor.apply(ChannelSignal::FetchFailed);
                state.last_error = Some(err.message.clone());
                Err(SyncError::from(err))
            }
        };

        self.publish(&state);
        result
    }

    /// Applies one channel event. Returns `false` once the binding is gone.
    async fn handle_event(&self, epoch: u64, match_id: &MatchId, event: ChannelEvent) -> bool {
        let action = {
            let mut state = self.lock();
            if !state.is_live(epoch, match_id) {
                debug!(epoch, "Dropping event for a released binding");
                return false;
            }

            let signal = match event {
                ChannelEvent::Subscribed => ChannelSignal::Subscribed,
                ChannelEvent::Closed => ChannelSignal::Closed,
                ChannelEvent::Errored(reason) => {
                    warn!(%reason, "Channel errored");
                    state.last_error = Some(reason);
                    ChannelSignal::Errored
                }
                ChannelEvent::Changed(snapshot) => {
                    if &snapshot.id != match_id {
                        warn!(pushed = %snapshot.id, "Push for another match ignored");
                        return true;
                    }
                    info!(version = snapshot.version, "Push received");
                    state.adopt(snapshot);
                    ChannelSignal::Pushed
                }
            };

            let action = state.monitor.apply(signal);
            self.publish(&state);
            action
        };

        if action == MonitorAction::Refetch {
            info!("Channel live again, re-fetching missed changes");
            if let Err(err) = self.load(epoch, match_id).await {
                warn!(error = %err, "Re-fetch after reconnect failed");
            }
        }
        true
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match self.context.options().submit_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StoreError::new(format!("Store call timed out after {:?}", limit)))?,
            None => call.await,
        }
    }

    fn bound(state: &EngineState) -> Result<(MatchId, u64), SyncError> {
        match &state.binding {
            Some(binding) if !binding.unavailable => {
                Ok((binding.match_id.clone(), binding.epoch))
            }
            Some(binding) => Err(SyncError::new(
                SyncErrorKind::NotFound,
                format!("Match {} is unavailable", binding.match_id),
            )),
            None => Err(SyncError::new(SyncErrorKind::NotFound, "No match is bound")),
        }
    }

    fn held(state: &EngineState) -> Result<GameState, SyncError> {
        state
            .authoritative
            .clone()
            .ok_or_else(|| SyncError::new(SyncErrorKind::NotFound, "Match state not loaded"))
    }

    fn ensure_idle(state: &EngineState) -> Result<(), SyncError> {
        match state.in_flight {
            Some(_) => Err(SyncError::new(
                SyncErrorKind::CellOccupied,
                "Another write is still pending",
            )),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &EngineState) {
        self.shared.view.send_replace(state.view());
    }
}

/// Forwards subscription events to the engine until the binding goes away.
async fn pump(
    shared: Weak<Shared>,
    context: SyncContext,
    epoch: u64,
    mut subscription: SubscriptionEvents,
) {
    while let Some(event) = subscription.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let engine = SyncEngine {
            context: context.clone(),
            shared,
        };
        let match_id = subscription.match_id().clone();
        if !engine.handle_event(epoch, &match_id, event).await {
            break;
        }
    }
    debug!(epoch, "Subscription pump stopped");
}
