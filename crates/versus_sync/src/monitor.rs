//! Push-channel lifecycle as an explicit state machine.
//!
//! All connection-status changes go through [`transition`], so the
//! reconnect rule (coming back from `Error` requires a re-fetch because the
//! channel does not replay) is one row of one table.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Three-valued connection status plus `Idle` for "nothing bound".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
    /// No match bound.
    #[default]
    Idle,
    /// Initial fetch and subscribe in flight.
    Connecting,
    /// Snapshot held and channel live.
    Online,
    /// Fetch failed or channel closed/errored.
    Error,
}

/// Inputs to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelSignal {
    /// A match was bound.
    Bind,
    /// A fetch returned the row.
    FetchSucceeded,
    /// A fetch failed or found nothing.
    FetchFailed,
    /// The channel reported a live subscription.
    Subscribed,
    /// The channel delivered a row change.
    Pushed,
    /// The channel closed.
    Closed,
    /// The channel errored.
    Errored,
    /// The match was unbound.
    Unbind,
}

/// Side effect the owner must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorAction {
    /// Nothing to do.
    None,
    /// Re-fetch the bound match; events were possibly missed.
    Refetch,
}

/// Transition table.
#[instrument]
pub fn transition(
    status: ConnectionStatus,
    signal: ChannelSignal,
) -> (ConnectionStatus, MonitorAction) {
    use ChannelSignal as S;
    use ConnectionStatus as C;

    match (status, signal) {
        (_, S::Bind) => (C::Connecting, MonitorAction::None),
        (_, S::Unbind) => (C::Idle, MonitorAction::None),
        (C::Idle, _) => (C::Idle, MonitorAction::None),
        (C::Error, S::Subscribed | S::Pushed) => (C::Online, MonitorAction::Refetch),
        (_, S::Subscribed | S::Pushed | S::FetchSucceeded) => (C::Online, MonitorAction::None),
        (_, S::FetchFailed | S::Closed | S::Errored) => (C::Error, MonitorAction::None),
    }
}

/// Tracks the current status of one bound match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMonitor {
    status: ConnectionStatus,
}

impl ChannelMonitor {
    /// Creates an idle monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Feeds a signal, returning the action the owner must take.
    #[instrument(skip(self), fields(from = %self.status))]
    pub fn apply(&mut self, signal: ChannelSignal) -> MonitorAction {
        let (next, action) = transition(self.status, signal);
        if next != self.status {
            debug!(to = %next, ?action, "Connection status changed");
        }
        self.status = next;
        action
    }
}
