use crate::{CardId, CardStateRecord, CardStateUpdate, CoreError, DeckId, ReviewLog, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;

#[async_trait]
pub trait CardStateRepository: Send + Sync {
    // Card states
    /// Create `new` records for any of `cards` the user has not seen yet and
    /// return the user's records for all of them.
    async fn ensure_deck_states(
        &self,
        user_id: UserId,
        deck_id: DeckId,
        cards: &[CardId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardStateRecord>, CoreError>;

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardStateRecord>, CoreError>;

    async fn list_states(
        &self,
        user_id: UserId,
        deck_id: Option<DeckId>,
    ) -> Result<Vec<CardStateRecord>, CoreError>;

    /// Merge `update` only if the stored version still equals
    /// `expected_version`; otherwise `CoreError::Conflict`.
    async fn apply_update(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
    ) -> Result<CardStateRecord, CoreError>;

    /// `apply_update` and `insert_log` as one unit: either both are stored
    /// or neither is.
    async fn commit_transition(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<CardStateRecord, CoreError>;

    async fn delete_deck_states(&self, user_id: UserId, deck_id: DeckId) -> Result<u64, CoreError>;

    // Logs
    async fn insert_log(&self, log: &ReviewLog) -> Result<(), CoreError>;
    async fn list_logs(
        &self,
        user_id: UserId,
        card_id: Option<CardId>,
    ) -> Result<Vec<ReviewLog>, CoreError>;
}
