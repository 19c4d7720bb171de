//! Card-state transitions. Every function is pure: it takes a snapshot and
//! the current time and returns the next snapshot. Persisting the result is
//! the caller's job (see `service`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::{due_after, grown_interval, lapsed_ease, recovery_interval, stage_after_success};
use crate::{
    CardState, CardStateUpdate, CheckType, CoreError, GateProgress, GateStep, Phase, ReviewStage,
    GRADUATION_INTERVAL_DAYS, LAPSE_INTERVAL_DAYS,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MarkKnow,
    MarkDontKnow,
    PrimaryTest { check: CheckType, correct: bool },
    Review { correct: bool },
    SimpleReview { know: bool },
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub state: CardState,
    pub update: CardStateUpdate,
}

pub fn mark_know(state: &CardState, now: DateTime<Utc>) -> CardState {
    mark(state, Some(now), now)
}

pub fn mark_dont_know(state: &CardState, now: DateTime<Utc>) -> CardState {
    mark(state, None, now)
}

fn mark(state: &CardState, marked_know_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CardState {
    let mut next = state.clone();
    next.last_seen_in_study = Some(now);
    next.updated_at = now;
    next.phase = match &state.phase {
        Phase::New
        | Phase::Review {
            stage: ReviewStage::Relearning,
            ..
        } => Phase::Primary {
            marked_know_at,
            gate: GateProgress::NotStarted,
        },
        Phase::Primary { gate, .. } => Phase::Primary {
            marked_know_at,
            gate: *gate,
        },
        Phase::Review {
            stage,
            interval_days,
            next_review_at,
            ..
        } => Phase::Review {
            stage: *stage,
            interval_days: *interval_days,
            next_review_at: *next_review_at,
            marked_know_at,
        },
    };
    next
}

/// Primary testing needs a learning/testing card the learner has marked known.
fn ready_gate(state: &CardState, op: &'static str) -> Result<(DateTime<Utc>, GateProgress), CoreError> {
    match &state.phase {
        Phase::Primary {
            marked_know_at: Some(at),
            gate,
        } => Ok((*at, *gate)),
        _ => Err(CoreError::IllegalTransition {
            op,
            status: state.status(),
        }),
    }
}

pub fn on_primary_test_correct(
    state: &CardState,
    check: CheckType,
    now: DateTime<Utc>,
) -> Result<CardState, CoreError> {
    let (marked_know_at, gate) = ready_gate(state, "primary test")?;
    let step = gate.pass(check)?;

    let mut next = state.clone();
    next.reviews_count += 1;
    next.correct_streak += 1;
    next.attempts.bump(check);
    next.last_test_type = Some(check);
    next.last_test_result = Some(true);
    next.updated_at = now;
    next.phase = match step {
        GateStep::Advanced(gate) => Phase::Primary {
            marked_know_at: Some(marked_know_at),
            gate,
        },
        GateStep::Graduated => {
            next.graduated_at = Some(now);
            Phase::Review {
                stage: ReviewStage::Young,
                interval_days: GRADUATION_INTERVAL_DAYS,
                next_review_at: due_after(now, GRADUATION_INTERVAL_DAYS),
                marked_know_at: Some(marked_know_at),
            }
        }
    };
    Ok(next)
}

/// A miss on any check forfeits every check passed so far.
pub fn on_primary_test_incorrect(
    state: &CardState,
    check: CheckType,
    now: DateTime<Utc>,
) -> Result<CardState, CoreError> {
    let (_, gate) = ready_gate(state, "primary test")?;

    let mut next = state.clone();
    next.reviews_count += 1;
    next.correct_streak = 0;
    next.attempts.bump(check);
    next.last_test_type = Some(check);
    next.last_test_result = Some(false);
    next.updated_at = now;
    next.phase = Phase::Primary {
        marked_know_at: None,
        gate: gate.fail(),
    };
    Ok(next)
}

pub fn on_review_correct(state: &CardState, now: DateTime<Utc>) -> Result<CardState, CoreError> {
    match &state.phase {
        Phase::Review {
            stage,
            interval_days,
            marked_know_at,
            ..
        } => Ok(review_passed(state, *stage, *interval_days, *marked_know_at, now)),
        _ => Err(CoreError::IllegalTransition {
            op: "review",
            status: state.status(),
        }),
    }
}

pub fn on_review_incorrect(state: &CardState, now: DateTime<Utc>) -> Result<CardState, CoreError> {
    match &state.phase {
        Phase::Review { .. } => Ok(review_lapsed(state, now)),
        _ => Err(CoreError::IllegalTransition {
            op: "review",
            status: state.status(),
        }),
    }
}

fn review_passed(
    state: &CardState,
    stage: ReviewStage,
    interval_days: u32,
    marked_know_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CardState {
    let new_interval = match stage {
        ReviewStage::Relearning => recovery_interval(interval_days),
        ReviewStage::Young | ReviewStage::Mature => grown_interval(interval_days, state.ease_factor),
    };

    let mut next = state.clone();
    next.reviews_count += 1;
    next.correct_streak += 1;
    next.last_test_result = Some(true);
    next.updated_at = now;
    next.phase = Phase::Review {
        stage: stage_after_success(stage, new_interval),
        interval_days: new_interval,
        next_review_at: due_after(now, new_interval),
        marked_know_at,
    };
    next
}

fn review_lapsed(state: &CardState, now: DateTime<Utc>) -> CardState {
    let mut next = state.clone();
    next.reviews_count += 1;
    next.lapses_count += 1;
    next.correct_streak = 0;
    next.ease_factor = lapsed_ease(state.ease_factor);
    next.last_test_result = Some(false);
    next.updated_at = now;
    // Gate flags have no slot in a review phase, so they are cleared here too.
    next.phase = Phase::Review {
        stage: ReviewStage::Relearning,
        interval_days: LAPSE_INTERVAL_DAYS,
        next_review_at: due_after(now, LAPSE_INTERVAL_DAYS),
        marked_know_at: None,
    };
    next
}

/// "I know it" on a flip card: real review math once the card is in review,
/// a study mark before that.
pub fn on_simple_review_know(state: &CardState, now: DateTime<Utc>) -> CardState {
    match &state.phase {
        Phase::Review {
            stage,
            interval_days,
            marked_know_at,
            ..
        } => review_passed(state, *stage, *interval_days, *marked_know_at, now),
        Phase::New | Phase::Primary { .. } => mark_know(state, now),
    }
}

pub fn on_simple_review_dont_know(state: &CardState, now: DateTime<Utc>) -> CardState {
    match &state.phase {
        Phase::Review { .. } => review_lapsed(state, now),
        Phase::New | Phase::Primary { .. } => mark_dont_know(state, now),
    }
}

pub fn apply_event(state: &CardState, event: Event, now: DateTime<Utc>) -> Result<Transition, CoreError> {
    let next = match event {
        Event::MarkKnow => mark_know(state, now),
        Event::MarkDontKnow => mark_dont_know(state, now),
        Event::PrimaryTest { check, correct: true } => on_primary_test_correct(state, check, now)?,
        Event::PrimaryTest { check, correct: false } => on_primary_test_incorrect(state, check, now)?,
        Event::Review { correct: true } => on_review_correct(state, now)?,
        Event::Review { correct: false } => on_review_incorrect(state, now)?,
        Event::SimpleReview { know: true } => on_simple_review_know(state, now),
        Event::SimpleReview { know: false } => on_simple_review_dont_know(state, now),
    };
    let update = CardStateUpdate::between(&state.to_record(), &next.to_record(), now);
    Ok(Transition { state: next, update })
}
