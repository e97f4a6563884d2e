//! Conditional store contract.
//!
//! The store is the single concurrency-control boundary across clients: a
//! write lands only if the stored version still equals the version the
//! writer read. Stores never report the current row on a failed
//! compare-and-swap; callers re-fetch to observe it.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use versus_tictactoe::{Board, GameState, Mark, MatchId, MatchStatus, NewMatch};

/// Mutable columns written by a conditional update.
///
/// Never carries `id`, player slots or `created_at`; `version` is the new
/// version being written, not the expected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct MatchPatch {
    status: MatchStatus,
    board: Board,
    turn: Mark,
    score_x: u32,
    score_o: u32,
    last_move_by: Option<Mark>,
    last_move_at: Option<DateTime<Utc>>,
    version: u64,
}

impl MatchPatch {
    /// Derives the patch that turns the stored row into `next`.
    #[instrument(skip(next), fields(match_id = %next.id, version = next.version))]
    pub fn from_state(next: &GameState) -> Self {
        Self {
            status: next.status,
            board: next.board.clone(),
            turn: next.turn,
            score_x: next.score_x,
            score_o: next.score_o,
            last_move_by: next.last_move_by,
            last_move_at: next.last_move_at,
            version: next.version,
        }
    }

    /// Applies the patch to a stored row, stamping the store's clock.
    pub fn apply_to(&self, row: &mut GameState, now: DateTime<Utc>) {
        row.status = self.status;
        row.board = self.board.clone();
        row.turn = self.turn;
        row.score_x = self.score_x;
        row.score_o = self.score_o;
        row.last_move_by = self.last_move_by;
        row.last_move_at = self.last_move_at;
        row.version = self.version;
        row.updated_at = now;
    }
}

/// Result of a version-guarded update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The stored version matched; here is the row as written.
    Applied(GameState),
    /// The stored version had moved on (or the row is gone). Nothing changed.
    NotApplied,
}

/// Result of claiming the second player slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Slot claimed; here is the row as written.
    Joined(GameState),
    /// Someone else already holds the slot.
    AlreadyHasOpponent,
    /// No such match.
    NotFound,
}

/// Row store with compare-and-swap on an integer version.
#[async_trait]
pub trait ConditionalStore: Send + Sync {
    /// Fetches a match, `None` when it does not exist.
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError>;

    /// Inserts a new match at version 0 under a fresh id.
    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError>;

    /// Applies `patch` only if the stored version equals `expected_version`.
    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Claims the O slot only if it is currently empty.
    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError>;
}
