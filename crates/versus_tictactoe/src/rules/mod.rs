//! Game rules for tic-tac-toe.
//!
//! Pure functions over a [`Board`]. Terminal status is derived here and
//! nowhere else, so planners and stores agree on what a finished match is.

pub mod draw;
pub mod win;

pub use draw::is_draw;
pub use win::{WINNING_LINES, winning_line};

use crate::Board;
use crate::Mark;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Terminal-status verdict for a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mark that completed a line.
    pub winner: Option<Mark>,
    /// Indices of the completed line.
    pub line: Option<[usize; 3]>,
    /// Board is full with no completed line.
    pub is_draw: bool,
}

impl Evaluation {
    /// Checks whether the board admits no further moves.
    pub fn is_terminal(&self) -> bool {
        self.winner.is_some() || self.is_draw
    }
}

/// Evaluates a board.
///
/// Lines are checked in [`WINNING_LINES`] order and the first match wins.
/// Without a line, a full board is a draw and anything else continues.
#[instrument(skip(board))]
pub fn evaluate(board: &Board) -> Evaluation {
    if let Some((winner, line)) = winning_line(board) {
        return Evaluation {
            winner: Some(winner),
            line: Some(line),
            is_draw: false,
        };
    }

    Evaluation {
        winner: None,
        line: None,
        is_draw: board.is_full(),
    }
}
