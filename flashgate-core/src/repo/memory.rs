use crate::{CardId, CardStateRecord, CardStateUpdate, CoreError, DeckId, ReviewLog, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

type Key = (UserId, CardId);

#[derive(Default)]
pub struct MemoryRepo {
    states: RwLock<HashMap<Key, CardStateRecord>>,
    logs: RwLock<HashMap<Key, Vec<ReviewLog>>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::CardStateRepository for MemoryRepo {
    async fn ensure_deck_states(
        &self,
        user_id: UserId,
        deck_id: DeckId,
        cards: &[CardId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        let mut m = self.states.write();
        let mut v = Vec::with_capacity(cards.len());
        for &card_id in cards {
            let rec = m
                .entry((user_id, card_id))
                .or_insert_with(|| CardStateRecord::new(user_id, deck_id, card_id, now));
            v.push(rec.clone());
        }
        Ok(v)
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardStateRecord>, CoreError> {
        Ok(self.states.read().get(&(user_id, card_id)).cloned())
    }

    async fn list_states(
        &self,
        user_id: UserId,
        deck_id: Option<DeckId>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        let states = self.states.read();
        let mut v: Vec<CardStateRecord> = states
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        if let Some(did) = deck_id {
            v.retain(|s| s.deck_id == did);
        }
        v.sort_by_key(|s| (s.created_at, s.card_id));
        Ok(v)
    }

    async fn apply_update(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
    ) -> Result<CardStateRecord, CoreError> {
        let mut m = self.states.write();
        let Some(rec) = m.get_mut(&(user_id, card_id)) else {
            return Err(CoreError::NotFound("card state"));
        };
        if rec.version != expected_version {
            return Err(CoreError::Conflict("card state changed concurrently"));
        }
        update.apply_to(rec);
        Ok(rec.clone())
    }

    async fn commit_transition(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<CardStateRecord, CoreError> {
        // Lock order: states, then logs (same as delete_deck_states).
        let mut m = self.states.write();
        let Some(rec) = m.get_mut(&(user_id, card_id)) else {
            return Err(CoreError::NotFound("card state"));
        };
        if rec.version != expected_version {
            return Err(CoreError::Conflict("card state changed concurrently"));
        }
        update.apply_to(rec);
        self.logs
            .write()
            .entry((log.user_id, log.card_id))
            .or_default()
            .push(log.clone());
        Ok(rec.clone())
    }

    async fn delete_deck_states(&self, user_id: UserId, deck_id: DeckId) -> Result<u64, CoreError> {
        let mut states = self.states.write();
        let keys: Vec<Key> = states
            .iter()
            .filter(|(_, s)| s.user_id == user_id && s.deck_id == deck_id)
            .map(|(k, _)| *k)
            .collect();
        let mut logs = self.logs.write();
        for k in &keys {
            states.remove(k);
            logs.remove(k);
        }
        Ok(keys.len() as u64)
    }

    async fn insert_log(&self, log: &ReviewLog) -> Result<(), CoreError> {
        let mut m = self.logs.write();
        m.entry((log.user_id, log.card_id))
            .or_default()
            .push(log.clone());
        Ok(())
    }

    async fn list_logs(
        &self,
        user_id: UserId,
        card_id: Option<CardId>,
    ) -> Result<Vec<ReviewLog>, CoreError> {
        let logs = self.logs.read();
        let mut v: Vec<ReviewLog> = match card_id {
            Some(cid) => logs.get(&(user_id, cid)).cloned().unwrap_or_default(),
            None => logs
                .iter()
                .filter(|((uid, _), _)| *uid == user_id)
                .flat_map(|(_, v)| v.iter().cloned())
                .collect(),
        };
        v.sort_by_key(|l| l.at);
        Ok(v)
    }
}
