//! Pure state-transition planning.
//!
//! Every function here maps a snapshot to its successor without I/O. The
//! caller decides when "now" is and is responsible for persisting the
//! result against the snapshot's version.

use crate::rules::{self, Evaluation};
use crate::{Board, CELL_COUNT, GameState, Mark, MatchStatus, PlanError};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A planned move: the successor snapshot and the rule verdict behind it.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MovePlan {
    state: GameState,
    evaluation: Evaluation,
}

impl MovePlan {
    /// Consumes the plan, returning the successor snapshot.
    pub fn into_state(self) -> GameState {
        self.state
    }
}

/// Insert payload for a brand new match. Stores assign the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct NewMatch {
    player_x: String,
    created_at: DateTime<Utc>,
}

impl NewMatch {
    /// Materializes the initial snapshot under a store-assigned id.
    #[instrument(skip(self), fields(player_x = %self.player_x))]
    pub fn into_state(self, id: crate::MatchId) -> GameState {
        GameState {
            id,
            created_at: self.created_at,
            updated_at: self.created_at,
            status: MatchStatus::Waiting,
            board: Board::new(),
            turn: Mark::X,
            player_x: Some(self.player_x),
            player_o: None,
            score_x: 0,
            score_o: 0,
            last_move_by: None,
            last_move_at: None,
            version: 0,
        }
    }
}

/// Builds the insert payload for a match created by `player_name` as X.
#[instrument]
pub fn new_match(player_name: impl Into<String> + std::fmt::Debug, now: DateTime<Utc>) -> NewMatch {
    NewMatch {
        player_x: player_name.into(),
        created_at: now,
    }
}

/// Plans `mark` playing `index` on `current`.
///
/// # Errors
///
/// Returns the first violated precondition, in [`PlanError`] order.
#[instrument(skip(current, now), fields(match_id = %current.id, version = current.version))]
pub fn plan_move(
    current: &GameState,
    index: usize,
    mark: Mark,
    now: DateTime<Utc>,
) -> Result<MovePlan, PlanError> {
    if index >= CELL_COUNT {
        return Err(PlanError::InvalidIndex(index));
    }
    if current.status == MatchStatus::Finished {
        return Err(PlanError::GameFinished);
    }
    if current.turn != mark {
        return Err(PlanError::OutOfTurn(mark));
    }
    if current.board.is_taken(index) {
        return Err(PlanError::CellOccupied(index));
    }

    let mut next = current.clone();
    next.board.place(index, mark);
    let evaluation = rules::evaluate(&next.board);

    if evaluation.winner.is_some() {
        next.status = MatchStatus::Finished;
        next.turn = mark;
        match mark {
            Mark::X => next.score_x = next.score_x.saturating_add(1),
            Mark::O => next.score_o = next.score_o.saturating_add(1),
        }
    } else if evaluation.is_draw {
        next.status = MatchStatus::Finished;
        next.turn = mark.opponent();
    } else {
        next.status = MatchStatus::InProgress;
        next.turn = mark.opponent();
    }

    next.last_move_by = Some(mark);
    next.last_move_at = Some(now);
    next.updated_at = now;
    next.version = current.version + 1;

    debug!(
        next_version = next.version,
        status = %next.status,
        winner = ?evaluation.winner,
        "Planned move"
    );

    Ok(MovePlan {
        state: next,
        evaluation,
    })
}

/// Plans clearing the board while keeping scores.
///
/// The mark opposite the last mover opens the next game, X if nobody moved.
#[instrument(skip(current, now), fields(match_id = %current.id, version = current.version))]
pub fn plan_board_reset(current: &GameState, now: DateTime<Utc>) -> GameState {
    let mut next = current.clone();
    next.board = Board::new();
    next.status = MatchStatus::InProgress;
    next.turn = current.last_move_by.map_or(Mark::X, Mark::opponent);
    next.last_move_by = None;
    next.last_move_at = None;
    next.updated_at = now;
    next.version = current.version + 1;
    next
}

/// Plans returning the match to its initial, waiting shape while keeping
/// both player identities.
#[instrument(skip(current, now), fields(match_id = %current.id, version = current.version))]
pub fn plan_score_reset(current: &GameState, now: DateTime<Utc>) -> GameState {
    let mut next = current.clone();
    next.board = Board::new();
    next.status = MatchStatus::Waiting;
    next.turn = Mark::X;
    next.score_x = 0;
    next.score_o = 0;
    next.last_move_by = None;
    next.last_move_at = None;
    next.updated_at = now;
    next.version = current.version + 1;
    next
}

/// Plans `player_name` claiming the O slot.
///
/// # Errors
///
/// Returns [`PlanError::SlotTaken`] if the O slot is already filled.
#[instrument(skip(current, now), fields(match_id = %current.id, version = current.version))]
pub fn plan_join(
    current: &GameState,
    player_name: &str,
    now: DateTime<Utc>,
) -> Result<GameState, PlanError> {
    if current.player_o.is_some() {
        return Err(PlanError::SlotTaken);
    }

    let mut next = current.clone();
    next.player_o = Some(player_name.to_string());
    next.status = MatchStatus::InProgress;
    next.updated_at = now;
    next.version = current.version + 1;
    Ok(next)
}
