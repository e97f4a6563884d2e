//! SQLite-backed conditional store.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};
use versus_tictactoe::{GameState, MatchId, MatchStatus, NewMatch};

use crate::db::models::{MatchChangeset, MatchRow};
use crate::db::schema::matches;
use crate::{ConditionalStore, JoinOutcome, MatchPatch, StoreError, UpdateOutcome};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Match rows in a SQLite database file.
///
/// Each operation opens its own connection on the blocking pool. The
/// version check lives in the `WHERE` clause of a single `UPDATE ...
/// RETURNING`, so SQLite's statement atomicity is the compare-and-swap.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Opens the database at `db_path`, creating it and applying pending
    /// migrations as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, StoreError> {
        info!(path = %db_path, "Opening SqliteStore");
        let store = Self { db_path };
        let mut conn = store.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::new(format!("Migrations failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(store)
    }

    /// Returns the database path.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::new(format!("Failed to connect to '{}': {}", self.db_path, e))
        })?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .execute(&mut conn)?;
        Ok(conn)
    }

    /// Runs `op` with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connection()?;
            op(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl ConditionalStore for SqliteStore {
    #[instrument(skip(self))]
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        let key = id.as_str().to_string();
        let row = self
            .with_connection(move |conn| {
                Ok(matches::table
                    .find(key)
                    .select(MatchRow::as_select())
                    .first(conn)
                    .optional()?)
            })
            .await?;

        debug!(found = row.is_some(), "Fetched match");
        row.map(MatchRow::into_state).transpose()
    }

    #[instrument(skip(self, new_match))]
    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        let id = MatchId::new(uuid::Uuid::new_v4().to_string());
        let row = MatchRow::from_state(&new_match.into_state(id.clone()))?;
        let stored = self
            .with_connection(move |conn| {
                Ok(diesel::insert_into(matches::table)
                    .values(&row)
                    .returning(MatchRow::as_returning())
                    .get_result(conn)?)
            })
            .await?;

        info!(match_id = %id, "Match inserted");
        stored.into_state()
    }

    #[instrument(skip(self, patch), fields(next_version = patch.version()))]
    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let key = id.as_str().to_string();
        let expected = i64::try_from(expected_version)
            .map_err(|_| StoreError::new(format!("Version {} out of range", expected_version)))?;
        let changes = MatchChangeset::from_patch(&patch, Utc::now().naive_utc())?;

        let written = self
            .with_connection(move |conn| {
                Ok(diesel::update(
                    matches::table
                        .filter(matches::id.eq(key))
                        .filter(matches::version.eq(expected)),
                )
                .set(&changes)
                .returning(MatchRow::as_returning())
                .get_result(conn)
                .optional()?)
            })
            .await?;

        match written {
            Some(row) => {
                let state = row.into_state()?;
                info!(version = state.version, "Update applied");
                Ok(UpdateOutcome::Applied(state))
            }
            None => {
                warn!("Version mismatch, update not applied");
                Ok(UpdateOutcome::NotApplied)
            }
        }
    }

    #[instrument(skip(self))]
    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        let key = id.as_str().to_string();
        let name = name.to_string();
        let now = Utc::now().naive_utc();

        let (joined, exists) = self
            .with_connection(move |conn| {
                let joined = diesel::update(
                    matches::table
                        .filter(matches::id.eq(&key))
                        .filter(matches::player_o.is_null()),
                )
                .set((
                    matches::player_o.eq(Some(name)),
                    matches::status.eq(MatchStatus::InProgress.to_string()),
                    matches::version.eq(matches::version + 1i64),
                    matches::updated_at.eq(now),
                ))
                .returning(MatchRow::as_returning())
                .get_result(conn)
                .optional()?;

                if joined.is_some() {
                    return Ok((joined, true));
                }

                let exists = matches::table
                    .find(&key)
                    .select(matches::id)
                    .first::<String>(conn)
                    .optional()?
                    .is_some();
                Ok((None, exists))
            })
            .await?;

        match (joined, exists) {
            (Some(row), _) => {
                let state = row.into_state()?;
                info!(version = state.version, "Second slot claimed");
                Ok(JoinOutcome::Joined(state))
            }
            (None, true) => {
                warn!("Second slot already taken");
                Ok(JoinOutcome::AlreadyHasOpponent)
            }
            (None, false) => Ok(JoinOutcome::NotFound),
        }
    }
}
