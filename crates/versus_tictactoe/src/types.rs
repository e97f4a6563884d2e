//! Core domain types for a shared tic-tac-toe match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player mark.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Mark {
    /// Player X (moves first on a fresh match).
    X,
    /// Player O.
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A single board cell.
///
/// Serializes to the stored row shape: `""` when empty, `"X"` or `"O"` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Claimed by a mark.
    Taken(Mark),
}

impl Cell {
    /// Returns the mark in this cell, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Taken(mark) => Some(mark),
        }
    }

    /// Checks if the cell is empty.
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => String::new(),
            Cell::Taken(mark) => mark.to_string(),
        }
    }
}

impl TryFrom<String> for Cell {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(Cell::Empty),
            "X" => Ok(Cell::Taken(Mark::X)),
            "O" => Ok(Cell::Taken(Mark::O)),
            other => Err(format!("Invalid cell value: '{}'", other)),
        }
    }
}

/// Number of cells on a board.
pub const CELL_COUNT: usize = 9;

/// 3x3 board, cells in row-major order (0-8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from explicit cells.
    pub fn from_cells(cells: [Cell; CELL_COUNT]) -> Self {
        Self { cells }
    }

    /// Gets the cell at the given index, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Checks whether the given index holds a mark.
    pub fn is_taken(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Taken(_)))
    }

    /// Writes a mark into a cell. Caller guarantees `index < CELL_COUNT`.
    pub(crate) fn place(&mut self, index: usize, mark: Mark) {
        self.cells[index] = Cell::Taken(mark);
    }

    /// Returns all cells.
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// Checks if every cell holds a mark.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    /// Checks if no cell holds a mark.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }

    /// Formats the board as a human-readable grid, empty cells show their index.
    pub fn render(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let index = row * 3 + col;
                let symbol = match self.cells[index] {
                    Cell::Empty => index.to_string(),
                    Cell::Taken(mark) => mark.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

/// Lifecycle status of a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    /// Fewer than two players have joined.
    Waiting,
    /// Both slots filled and the game is live.
    InProgress,
    /// A line was completed or the board filled up.
    Finished,
}

/// Opaque, stable match identifier.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Wraps a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MatchId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Snapshot of one match at one version.
///
/// Field names match the stored row so a snapshot round-trips through
/// any store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Match identifier.
    pub id: MatchId,
    /// When the match row was created.
    pub created_at: DateTime<Utc>,
    /// When the match row was last written.
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// The board.
    pub board: Board,
    /// Mark whose move is legal next (winner after a win).
    pub turn: Mark,
    /// Display name in the X slot.
    pub player_x: Option<String>,
    /// Display name in the O slot.
    pub player_o: Option<String>,
    /// Wins credited to X.
    pub score_x: u32,
    /// Wins credited to O.
    pub score_o: u32,
    /// Mark that made the most recent accepted move.
    pub last_move_by: Option<Mark>,
    /// When the most recent accepted move was made.
    pub last_move_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, +1 per accepted mutation.
    pub version: u64,
}

impl GameState {
    /// Returns the score for a mark.
    pub fn score(&self, mark: Mark) -> u32 {
        match mark {
            Mark::X => self.score_x,
            Mark::O => self.score_o,
        }
    }

    /// Returns the display name in a mark's slot.
    pub fn player(&self, mark: Mark) -> Option<&str> {
        match mark {
            Mark::X => self.player_x.as_deref(),
            Mark::O => self.player_o.as_deref(),
        }
    }

    /// Checks whether both player slots are filled.
    pub fn has_opponent(&self) -> bool {
        self.player_x.is_some() && self.player_o.is_some()
    }

    /// Checks whether the match is finished.
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }
}
