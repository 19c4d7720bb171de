use crate::{CardStateRecord, CardStatus, DeckId, ReviewLog};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub new: u32,
    pub learning: u32,
    pub testing: u32,
    pub young: u32,
    pub mature: u32,
    pub relearning: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: CardStatus) {
        match status {
            CardStatus::New => self.new += 1,
            CardStatus::Learning => self.learning += 1,
            CardStatus::Testing => self.testing += 1,
            CardStatus::Young => self.young += 1,
            CardStatus::Mature => self.mature += 1,
            CardStatus::Relearning => self.relearning += 1,
        }
    }

    pub fn get(&self, status: CardStatus) -> u32 {
        match status {
            CardStatus::New => self.new,
            CardStatus::Learning => self.learning,
            CardStatus::Testing => self.testing,
            CardStatus::Young => self.young,
            CardStatus::Mature => self.mature,
            CardStatus::Relearning => self.relearning,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeckSummary {
    pub total: u32,
    pub by_status: StatusCounts,
    pub due_for_review: u32,
    pub ready_for_testing: u32,
}

impl DeckSummary {
    pub fn record(&mut self, state: &CardStateRecord, now: DateTime<Utc>) {
        self.total += 1;
        self.by_status.record(state.status);
        if state.is_due_for_review(now) {
            self.due_for_review += 1;
        }
        if state.is_ready_for_testing() {
            self.ready_for_testing += 1;
        }
    }
}

pub fn summarize_states(states: &[CardStateRecord], now: DateTime<Utc>) -> DeckSummary {
    let mut summary = DeckSummary::default();
    for s in states {
        summary.record(s, now);
    }
    summary
}

pub fn per_deck_summaries(
    states: &[CardStateRecord],
    now: DateTime<Utc>,
) -> HashMap<DeckId, DeckSummary> {
    let mut map: HashMap<DeckId, DeckSummary> = HashMap::new();
    for s in states {
        map.entry(s.deck_id).or_default().record(s, now);
    }
    map
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Totals {
    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
}

impl Totals {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
    }
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LogSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

pub fn summarize_logs(logs: &[ReviewLog]) -> LogSummary {
    let mut summary = LogSummary::default();
    for l in logs {
        summary.totals.record(l.correct);
        let d = l.at.date_naive();
        summary.per_day.entry(d).or_default().record(l.correct);
    }
    summary
}

pub fn daily_streak(logs: &[ReviewLog], today: NaiveDate) -> u32 {
    let per_day = summarize_logs(logs).per_day;
    let mut streak = 0u32;
    let mut day = today;
    while per_day.get(&day).map(|t| t.total > 0).unwrap_or(false) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}
