//! Win detection logic for tic-tac-toe.

use crate::{Board, Cell, Mark};
use tracing::instrument;

/// All winning triples: rows, then columns, then diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Returns the first completed line and its mark, if any.
#[instrument(skip(board))]
pub fn winning_line(board: &Board) -> Option<(Mark, [usize; 3])> {
    for line in WINNING_LINES {
        let [a, b, c] = line;
        if let Some(Cell::Taken(mark)) = board.get(a)
            && board.get(b) == Some(Cell::Taken(mark))
            && board.get(c) == Some(Cell::Taken(mark))
        {
            return Some((mark, line));
        }
    }

    None
}
