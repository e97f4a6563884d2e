//! Errors raised while planning a state transition.

use crate::Mark;

/// A requested transition violates a precondition.
///
/// Checked in declaration order, so a request that breaks several rules
/// reports the first one.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum PlanError {
    /// Cell index is outside `0..9`.
    #[display("Cell index {} is out of range (must be 0-8)", _0)]
    InvalidIndex(usize),

    /// The match is already finished.
    #[display("Game is already finished")]
    GameFinished,

    /// It's not this mark's turn.
    #[display("It's not {}'s turn", _0)]
    OutOfTurn(Mark),

    /// The target cell already holds a mark.
    #[display("Cell {} is already occupied", _0)]
    CellOccupied(usize),

    /// Both player slots are already filled.
    #[display("Match already has a second player")]
    SlotTaken,
}

impl std::error::Error for PlanError {}
