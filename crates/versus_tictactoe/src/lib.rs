//! Versus tic-tac-toe - the match model shared by every client.
//!
//! # Architecture
//!
//! - **Types**: [`GameState`] snapshot of one match at one version
//! - **Rules**: [`evaluate`] derives win/draw from a board
//! - **Planner**: pure successor computation for moves, joins and resets
//!
//! Nothing in this crate performs I/O; persistence and synchronization live
//! in `versus_sync`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod planner;
pub mod rules;
mod types;

pub use error::PlanError;
pub use planner::{
    MovePlan, NewMatch, new_match, plan_board_reset, plan_join, plan_move, plan_score_reset,
};
pub use rules::{Evaluation, WINNING_LINES, evaluate};
pub use types::{Board, CELL_COUNT, Cell, GameState, Mark, MatchId, MatchStatus};
