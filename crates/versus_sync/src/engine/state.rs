//! In-memory bookkeeping for one engine: the authoritative snapshot, the
//! optional optimistic overlay, and the binding they belong to.
//!
//! Merge rules:
//! - a push or fetch replaces the authoritative copy unless it would
//!   regress the version, and clears an overlay it has caught up with;
//! - a successful write replaces the authoritative copy under the same
//!   version gate and clears its own overlay;
//! - a failed write clears its own overlay, leaving the authoritative copy.

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use versus_tictactoe::{GameState, MatchId};

use crate::SubscriptionLease;
use crate::engine::MatchView;
use crate::monitor::ChannelMonitor;

/// Provisional local result of an outstanding move.
#[derive(Debug, Clone)]
pub(crate) struct Overlay {
    pub(crate) ticket: u64,
    pub(crate) cell: usize,
    pub(crate) snapshot: GameState,
}

/// The match an engine is currently bound to.
#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) match_id: MatchId,
    pub(crate) epoch: u64,
    pub(crate) pump: Option<JoinHandle<()>>,
    /// Dropping it unsubscribes, independently of the pump.
    pub(crate) lease: Option<SubscriptionLease>,
    /// Not-found is terminal for a binding.
    pub(crate) unavailable: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) epoch: u64,
    pub(crate) binding: Option<Binding>,
    pub(crate) authoritative: Option<GameState>,
    pub(crate) overlay: Option<Overlay>,
    pub(crate) in_flight: Option<u64>,
    pub(crate) next_ticket: u64,
    pub(crate) monitor: ChannelMonitor,
    pub(crate) last_error: Option<String>,
}

impl EngineState {
    /// Checks that `epoch`/`match_id` still name the live binding.
    pub(crate) fn is_bound_to(&self, epoch: u64, match_id: &MatchId) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.epoch == epoch && &b.match_id == match_id)
    }

    /// Like [`Self::is_bound_to`], and the match has not been found missing.
    pub(crate) fn is_live(&self, epoch: u64, match_id: &MatchId) -> bool {
        self.is_bound_to(epoch, match_id)
            && self.binding.as_ref().is_some_and(|b| !b.unavailable)
    }

    /// Current binding's id and epoch.
    pub(crate) fn current(&self) -> Option<(MatchId, u64)> {
        self.binding
            .as_ref()
            .map(|b| (b.match_id.clone(), b.epoch))
    }

    /// Drops the binding and everything derived from it.
    ///
    /// The subscription lease is dropped here, so the topic forgets this
    /// subscriber before `release` returns. The pump task is aborted and the
    /// epoch advanced, so an event already dequeued by the pump fails its
    /// epoch check and is never applied.
    pub(crate) fn release(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.lease = None;
            if let Some(pump) = binding.pump.take() {
                pump.abort();
            }
        }
        self.epoch += 1;
        self.authoritative = None;
        self.overlay = None;
        self.in_flight = None;
        self.last_error = None;
    }

    pub(crate) fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Takes an authoritative snapshot unless it would regress the version.
    ///
    /// Returns whether the snapshot was taken.
    pub(crate) fn adopt(&mut self, incoming: GameState) -> bool {
        if let Some(held) = &self.authoritative
            && incoming.version < held.version
        {
            warn!(
                held_version = held.version,
                incoming_version = incoming.version,
                "Ignoring snapshot older than the one held"
            );
            return false;
        }

        if self
            .overlay
            .as_ref()
            .is_some_and(|overlay| incoming.version >= overlay.snapshot.version)
        {
            debug!(version = incoming.version, "Snapshot supersedes pending overlay");
            self.overlay = None;
        }

        self.authoritative = Some(incoming);
        true
    }

    /// Ends the write identified by `ticket`: clears the in-flight marker
    /// and the overlay, if they are still that write's.
    pub(crate) fn finish(&mut self, ticket: u64) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        if self
            .overlay
            .as_ref()
            .is_some_and(|overlay| overlay.ticket == ticket)
        {
            self.overlay = None;
        }
    }

    /// Snapshot shown to observers: overlay if present, else authoritative.
    pub(crate) fn displayed(&self) -> Option<&GameState> {
        self.overlay
            .as_ref()
            .map(|overlay| &overlay.snapshot)
            .or(self.authoritative.as_ref())
    }

    pub(crate) fn view(&self) -> MatchView {
        MatchView {
            match_id: self.binding.as_ref().map(|b| b.match_id.clone()),
            state: self.displayed().cloned(),
            pending_cell: self.overlay.as_ref().map(|overlay| overlay.cell),
            connection: self.monitor.status(),
            last_error: self.last_error.clone(),
        }
    }
}
