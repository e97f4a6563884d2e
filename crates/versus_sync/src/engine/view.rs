//! What observers of an engine see.

use serde::Serialize;
use versus_tictactoe::{GameState, MatchId};

use crate::ConnectionStatus;

/// Published engine state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MatchView {
    /// Bound match, if any.
    pub match_id: Option<MatchId>,
    /// Displayed snapshot: the optimistic overlay while a move is pending,
    /// the authoritative copy otherwise.
    pub state: Option<GameState>,
    /// Cell of the pending move, shown as provisional.
    pub pending_cell: Option<usize>,
    /// Push-channel status.
    pub connection: ConnectionStatus,
    /// Most recent failure message, cleared by the next accepted write.
    pub last_error: Option<String>,
}

impl MatchView {
    /// Checks whether a snapshot is held while the channel is not live.
    pub fn is_reconnecting(&self) -> bool {
        self.state.is_some()
            && matches!(
                self.connection,
                ConnectionStatus::Connecting | ConnectionStatus::Error
            )
    }

    /// Version of the displayed snapshot.
    pub fn version(&self) -> Option<u64> {
        self.state.as_ref().map(|state| state.version)
    }
}
