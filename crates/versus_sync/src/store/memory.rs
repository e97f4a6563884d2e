//! In-process store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use versus_tictactoe::{GameState, MatchId, NewMatch, PlanError, plan_join};

use crate::{ConditionalStore, JoinOutcome, MatchPatch, StoreError, UpdateOutcome};

/// Mutex-guarded map of matches.
///
/// Every operation runs under one lock, so the version check and the write
/// are a single atomic step.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<MatchId, GameState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating MemoryStore");
        Self::default()
    }

    /// Number of stored matches.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Checks whether the store holds no matches.
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<MatchId, GameState>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConditionalStore for MemoryStore {
    #[instrument(skip(self))]
    async fn fetch(&self, id: &MatchId) -> Result<Option<GameState>, StoreError> {
        let row = self.rows().get(id).cloned();
        debug!(found = row.is_some(), "Fetched match");
        Ok(row)
    }

    #[instrument(skip(self, new_match))]
    async fn insert(&self, new_match: NewMatch) -> Result<GameState, StoreError> {
        let id = MatchId::new(uuid::Uuid::new_v4().to_string());
        let row = new_match.into_state(id.clone());
        self.rows().insert(id.clone(), row.clone());
        info!(match_id = %id, "Match inserted");
        Ok(row)
    }

    #[instrument(skip(self, patch), fields(next_version = patch.version()))]
    async fn conditional_update(
        &self,
        id: &MatchId,
        expected_version: u64,
        patch: MatchPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut rows = self.rows();
        let Some(row) = rows.get_mut(id) else {
            warn!("Conditional update on missing match");
            return Ok(UpdateOutcome::NotApplied);
        };

        if row.version != expected_version {
            warn!(stored_version = row.version, "Version mismatch, update not applied");
            return Ok(UpdateOutcome::NotApplied);
        }

        patch.apply_to(row, Utc::now());
        info!(version = row.version, "Update applied");
        Ok(UpdateOutcome::Applied(row.clone()))
    }

    #[instrument(skip(self))]
    async fn join_second_slot(&self, id: &MatchId, name: &str) -> Result<JoinOutcome, StoreError> {
        let mut rows = self.rows();
        let Some(row) = rows.get_mut(id) else {
            return Ok(JoinOutcome::NotFound);
        };

        match plan_join(row, name, Utc::now()) {
            Ok(joined) => {
                *row = joined.clone();
                info!(version = joined.version, "Second slot claimed");
                Ok(JoinOutcome::Joined(joined))
            }
            Err(PlanError::SlotTaken) => {
                warn!("Second slot already taken");
                Ok(JoinOutcome::AlreadyHasOpponent)
            }
            Err(other) => Err(StoreError::new(format!("Unexpected join failure: {}", other))),
        }
    }
}
