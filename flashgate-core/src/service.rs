//! Data-access glue around the engine: load a record, run the transition,
//! then write it back together with its log entry under an optimistic
//! version check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{self, Event};
use crate::filters::{review_queue, testing_queue};
use crate::gate::next_test_type;
use crate::stats::{summarize_states, DeckSummary};
use crate::{
    CardId, CardState, CardStateRecord, CardStateRepository, CardStateUpdate, CheckType, CoreError,
    DeckId, LogKind, Phase, ReviewLog, UserId,
};

/// Attempts made before a version conflict is handed back to the caller.
pub const MAX_SUBMIT_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Serialize)]
pub struct Submission {
    pub record: CardStateRecord,
    pub update: CardStateUpdate,
    pub next_test_type: Option<CheckType>,
    pub log: ReviewLog,
}

pub async fn submit_event<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    card_id: CardId,
    event: Event,
    now: DateTime<Utc>,
) -> Result<Submission, CoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let record = repo
            .get_state(user_id, card_id)
            .await?
            .ok_or(CoreError::NotFound("card state"))?;
        let before = CardState::try_from(&record)?;
        let transition = engine::apply_event(&before, event, now)?;
        let log = log_entry(&before, &transition.state, event, now);

        match repo
            .commit_transition(user_id, card_id, &transition.update, record.version, &log)
            .await
        {
            Ok(saved) => {
                debug!(
                    %user_id,
                    %card_id,
                    from = %before.status(),
                    to = %saved.status,
                    version = saved.version,
                    "applied {:?}",
                    event
                );
                return Ok(Submission {
                    record: saved,
                    update: transition.update,
                    next_test_type: next_test_type(&transition.state),
                    log,
                });
            }
            Err(CoreError::Conflict(reason)) if attempt < MAX_SUBMIT_ATTEMPTS => {
                warn!(%user_id, %card_id, attempt, "retrying after conflict: {reason}");
            }
            Err(e) => return Err(e),
        }
    }
}

fn log_entry(before: &CardState, after: &CardState, event: Event, now: DateTime<Utc>) -> ReviewLog {
    let (kind, check_type, correct) = match event {
        Event::MarkKnow => (LogKind::Study, None, true),
        Event::MarkDontKnow => (LogKind::Study, None, false),
        Event::PrimaryTest { check, correct } => (LogKind::PrimaryTest, Some(check), correct),
        Event::Review { correct } => (LogKind::Review, None, correct),
        Event::SimpleReview { know } if before.status().is_reviewable() => {
            (LogKind::Review, None, know)
        }
        Event::SimpleReview { know } => (LogKind::Study, None, know),
    };
    let interval_after = match &after.phase {
        Phase::Review { interval_days, .. } => Some(*interval_days),
        Phase::New | Phase::Primary { .. } => None,
    };
    ReviewLog::new(
        after.user_id,
        after.card_id,
        kind,
        check_type,
        correct,
        after.status(),
        interval_after,
        after.ease_factor,
        now,
    )
}

/// Start tracking a deck for a user; cards already tracked are left alone.
pub async fn track_deck<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    deck_id: DeckId,
    cards: &[CardId],
    now: DateTime<Utc>,
) -> Result<Vec<CardStateRecord>, CoreError> {
    let states = repo.ensure_deck_states(user_id, deck_id, cards, now).await?;
    info!(%user_id, %deck_id, cards = states.len(), "deck tracked");
    Ok(states)
}

/// A card's stored record plus the check it needs next.
pub async fn load_card<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    card_id: CardId,
) -> Result<(CardStateRecord, Option<CheckType>), CoreError> {
    let record = repo
        .get_state(user_id, card_id)
        .await?
        .ok_or(CoreError::NotFound("card state"))?;
    let next = next_test_type(&CardState::try_from(&record)?);
    Ok((record, next))
}

pub async fn deck_summary<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    deck_id: Option<DeckId>,
    now: DateTime<Utc>,
) -> Result<DeckSummary, CoreError> {
    let states = repo.list_states(user_id, deck_id).await?;
    Ok(summarize_states(&states, now))
}

pub async fn due_for_review<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    deck_id: Option<DeckId>,
    now: DateTime<Utc>,
    max: usize,
) -> Result<Vec<CardStateRecord>, CoreError> {
    let states = repo.list_states(user_id, deck_id).await?;
    Ok(review_queue(&states, now, max))
}

pub async fn ready_for_testing<R: CardStateRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    deck_id: Option<DeckId>,
    max: usize,
) -> Result<Vec<CardStateRecord>, CoreError> {
    let states = repo.list_states(user_id, deck_id).await?;
    Ok(testing_queue(&states, max))
}
