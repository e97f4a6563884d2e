//! Row models and their conversion to domain snapshots.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::instrument;
use versus_tictactoe::{Board, GameState, Mark, MatchId, MatchStatus};

use crate::db::schema;
use crate::{MatchPatch, StoreError};

/// Match row as stored.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::matches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MatchRow {
    id: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    status: String,
    board: String,
    turn: String,
    player_x: Option<String>,
    player_o: Option<String>,
    score_x: i32,
    score_o: i32,
    last_move_by: Option<String>,
    last_move_at: Option<NaiveDateTime>,
    version: i64,
}

impl MatchRow {
    /// Encodes a snapshot as a row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a counter does not fit its column.
    #[instrument(skip(state), fields(match_id = %state.id))]
    pub fn from_state(state: &GameState) -> Result<Self, StoreError> {
        Ok(Self {
            id: state.id.as_str().to_string(),
            created_at: state.created_at.naive_utc(),
            updated_at: state.updated_at.naive_utc(),
            status: state.status.to_string(),
            board: serde_json::to_string(&state.board)?,
            turn: state.turn.to_string(),
            player_x: state.player_x.clone(),
            player_o: state.player_o.clone(),
            score_x: to_column(state.score_x, "score_x")?,
            score_o: to_column(state.score_o, "score_o")?,
            last_move_by: state.last_move_by.map(|mark| mark.to_string()),
            last_move_at: state.last_move_at.map(|at| at.naive_utc()),
            version: to_column(state.version, "version")?,
        })
    }

    /// Decodes a row into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any column holds a value outside its domain.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn into_state(self) -> Result<GameState, StoreError> {
        let board: Board = serde_json::from_str(&self.board)?;
        Ok(GameState {
            id: MatchId::new(self.id),
            created_at: self.created_at.and_utc(),
            updated_at: self.updated_at.and_utc(),
            status: parse_status(&self.status)?,
            board,
            turn: parse_mark(&self.turn)?,
            player_x: self.player_x,
            player_o: self.player_o,
            score_x: from_column(self.score_x, "score_x")?,
            score_o: from_column(self.score_o, "score_o")?,
            last_move_by: self.last_move_by.as_deref().map(parse_mark).transpose()?,
            last_move_at: self.last_move_at.map(|at| at.and_utc()),
            version: from_column(self.version, "version")?,
        })
    }
}

/// Changeset for a version-guarded update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = schema::matches)]
#[diesel(treat_none_as_null = true)]
pub struct MatchChangeset {
    updated_at: NaiveDateTime,
    status: String,
    board: String,
    turn: String,
    score_x: i32,
    score_o: i32,
    last_move_by: Option<String>,
    last_move_at: Option<NaiveDateTime>,
    version: i64,
}

impl MatchChangeset {
    /// Encodes a patch, stamped with the store's clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a counter does not fit its column.
    #[instrument(skip(patch, now))]
    pub fn from_patch(patch: &MatchPatch, now: NaiveDateTime) -> Result<Self, StoreError> {
        Ok(Self {
            updated_at: now,
            status: patch.status().to_string(),
            board: serde_json::to_string(patch.board())?,
            turn: patch.turn().to_string(),
            score_x: to_column(*patch.score_x(), "score_x")?,
            score_o: to_column(*patch.score_o(), "score_o")?,
            last_move_by: patch.last_move_by().map(|mark| mark.to_string()),
            last_move_at: patch.last_move_at().map(|at| at.naive_utc()),
            version: to_column(*patch.version(), "version")?,
        })
    }
}

fn parse_status(raw: &str) -> Result<MatchStatus, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::new(format!("Invalid status: '{}'", raw)))
}

fn parse_mark(raw: &str) -> Result<Mark, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::new(format!("Invalid mark: '{}'", raw)))
}

fn to_column<T, C>(value: T, column: &str) -> Result<C, StoreError>
where
    T: Copy + std::fmt::Display,
    C: TryFrom<T>,
{
    C::try_from(value)
        .map_err(|_| StoreError::new(format!("{} = {} does not fit its column", column, value)))
}

fn from_column<T, C>(value: T, column: &str) -> Result<C, StoreError>
where
    T: Copy + std::fmt::Display,
    C: TryFrom<T>,
{
    C::try_from(value)
        .map_err(|_| StoreError::new(format!("Stored {} = {} is out of range", column, value)))
}
