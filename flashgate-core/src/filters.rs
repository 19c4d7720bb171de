use crate::{CardStateRecord, CardStatus};
use chrono::{DateTime, Utc};

pub fn filter_by_status(states: &[CardStateRecord], want: CardStatus) -> Vec<CardStateRecord> {
    states
        .iter()
        .filter(|s| s.status == want)
        .cloned()
        .collect()
}

pub fn filter_due_for_review(states: &[CardStateRecord], now: DateTime<Utc>) -> Vec<CardStateRecord> {
    states
        .iter()
        .filter(|s| s.is_due_for_review(now))
        .cloned()
        .collect()
}

pub fn filter_ready_for_testing(states: &[CardStateRecord]) -> Vec<CardStateRecord> {
    states
        .iter()
        .filter(|s| s.is_ready_for_testing())
        .cloned()
        .collect()
}

/// Cards still waiting for the learner to claim they know them.
pub fn filter_for_study(states: &[CardStateRecord]) -> Vec<CardStateRecord> {
    states
        .iter()
        .filter(|s| {
            matches!(s.status, CardStatus::New | CardStatus::Learning) && s.marked_know_at.is_none()
        })
        .cloned()
        .collect()
}

/// Due cards, most overdue first.
pub fn review_queue(states: &[CardStateRecord], now: DateTime<Utc>, max: usize) -> Vec<CardStateRecord> {
    let mut pool = filter_due_for_review(states, now);
    pool.sort_by_key(|s| (s.next_review_at, s.card_id));
    pool.truncate(max);
    pool
}

/// Cards ready for a primary check, in the order they were marked known.
pub fn testing_queue(states: &[CardStateRecord], max: usize) -> Vec<CardStateRecord> {
    let mut pool = filter_ready_for_testing(states);
    pool.sort_by_key(|s| (s.marked_know_at, s.card_id));
    pool.truncate(max);
    pool
}
