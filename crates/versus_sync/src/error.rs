//! Errors surfaced to engine callers.

use derive_more::{Display, Error};
use tracing::instrument;
use versus_tictactoe::PlanError;

use crate::StoreError;

/// Distinguishable failure kinds, so callers branch without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SyncErrorKind {
    /// Match does not exist, or no match state is loaded.
    #[display("NOT_FOUND")]
    NotFound,
    /// Cell index outside `0..9`.
    #[display("INVALID_INDEX")]
    InvalidIndex,
    /// Match already finished.
    #[display("GAME_FINISHED")]
    GameFinished,
    /// Mark moved out of turn.
    #[display("OUT_OF_TURN")]
    OutOfTurn,
    /// Cell already holds a mark, or another write is still pending.
    #[display("CELL_OCCUPIED")]
    CellOccupied,
    /// Second slot already claimed.
    #[display("ALREADY_JOINED")]
    AlreadyJoined,
    /// Expected version no longer current; the write was dropped.
    #[display("CONFLICT")]
    Conflict,
    /// Store or channel failure, including timeouts.
    #[display("TRANSPORT_ERROR")]
    TransportError,
    /// Result discarded because the engine was rebound or unbound meanwhile.
    #[display("SUPERSEDED")]
    Superseded,
}

/// Engine error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("{}: {} at {}:{}", kind, message, file, line)]
pub struct SyncError {
    /// What went wrong.
    pub kind: SyncErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SyncError {
    /// Creates a new sync error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> SyncErrorKind {
        self.kind
    }
}

impl From<PlanError> for SyncError {
    #[track_caller]
    fn from(err: PlanError) -> Self {
        let kind = match err {
            PlanError::InvalidIndex(_) => SyncErrorKind::InvalidIndex,
            PlanError::GameFinished => SyncErrorKind::GameFinished,
            PlanError::OutOfTurn(_) => SyncErrorKind::OutOfTurn,
            PlanError::CellOccupied(_) => SyncErrorKind::CellOccupied,
            PlanError::SlotTaken => SyncErrorKind::AlreadyJoined,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<StoreError> for SyncError {
    #[track_caller]
    fn from(err: StoreError) -> Self {
        Self::new(SyncErrorKind::TransportError, err.message)
    }
}
