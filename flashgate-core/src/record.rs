//! Flat per-(user, card) record as stored by every backend, and the partial
//! update the engine hands back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardId, CardStatus, CheckType, DeckId, UserId, EF_DEFAULT};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardStateRecord {
    pub user_id: UserId,
    pub card_id: CardId,
    pub deck_id: DeckId,

    pub status: CardStatus,
    pub ease_factor: f32,
    pub interval_days: u32,
    pub next_review_at: Option<DateTime<Utc>>,

    pub reviews_count: u32,
    pub correct_streak: u32,
    pub lapses_count: u32,

    pub test_choice_passed: bool,
    pub test_audio_passed: bool,
    pub test_dictation_passed: bool,
    pub test_choice_attempts: u32,
    pub test_audio_attempts: u32,
    pub test_dictation_attempts: u32,

    pub marked_know_at: Option<DateTime<Utc>>,
    pub last_seen_in_study: Option<DateTime<Utc>>,
    pub last_test_type: Option<CheckType>,
    pub last_test_result: Option<bool>,
    pub graduated_at: Option<DateTime<Utc>>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardStateRecord {
    /// A freshly tracked card: status `new`, default ease, nothing scheduled.
    pub fn new(user_id: UserId, deck_id: DeckId, card_id: CardId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            card_id,
            deck_id,
            status: CardStatus::New,
            ease_factor: EF_DEFAULT,
            interval_days: 1,
            next_review_at: None,
            reviews_count: 0,
            correct_streak: 0,
            lapses_count: 0,
            test_choice_passed: false,
            test_audio_passed: false,
            test_dictation_passed: false,
            test_choice_attempts: 0,
            test_audio_attempts: 0,
            test_dictation_attempts: 0,
            marked_know_at: None,
            last_seen_in_study: None,
            last_test_type: None,
            last_test_result: None,
            graduated_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn passed_flags(&self) -> [bool; 3] {
        [
            self.test_choice_passed,
            self.test_audio_passed,
            self.test_dictation_passed,
        ]
    }

    pub fn is_due_for_review(&self, now: DateTime<Utc>) -> bool {
        self.status.is_reviewable() && self.next_review_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn is_ready_for_testing(&self) -> bool {
        self.status.is_primary()
            && self.marked_know_at.is_some()
            && self.passed_flags().iter().any(|passed| !passed)
    }
}

/// Fields changed by one transition. `None` means "leave as is"; nullable
/// columns use `Some(None)` to clear.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct CardStateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ease_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review_at: Option<Option<DateTime<Utc>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_streak: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lapses_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_choice_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_audio_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_dictation_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_choice_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_audio_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_dictation_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_know_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_in_study: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_test_type: Option<Option<CheckType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_test_result: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduated_at: Option<Option<DateTime<Utc>>>,

    pub updated_at: DateTime<Utc>,
}

fn changed<T: PartialEq + Clone>(before: &T, after: &T) -> Option<T> {
    if before == after {
        None
    } else {
        Some(after.clone())
    }
}

impl CardStateUpdate {
    /// Diff two snapshots of the same record.
    pub fn between(before: &CardStateRecord, after: &CardStateRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: changed(&before.status, &after.status),
            ease_factor: changed(&before.ease_factor, &after.ease_factor),
            interval_days: changed(&before.interval_days, &after.interval_days),
            next_review_at: changed(&before.next_review_at, &after.next_review_at),
            reviews_count: changed(&before.reviews_count, &after.reviews_count),
            correct_streak: changed(&before.correct_streak, &after.correct_streak),
            lapses_count: changed(&before.lapses_count, &after.lapses_count),
            test_choice_passed: changed(&before.test_choice_passed, &after.test_choice_passed),
            test_audio_passed: changed(&before.test_audio_passed, &after.test_audio_passed),
            test_dictation_passed: changed(
                &before.test_dictation_passed,
                &after.test_dictation_passed,
            ),
            test_choice_attempts: changed(&before.test_choice_attempts, &after.test_choice_attempts),
            test_audio_attempts: changed(&before.test_audio_attempts, &after.test_audio_attempts),
            test_dictation_attempts: changed(
                &before.test_dictation_attempts,
                &after.test_dictation_attempts,
            ),
            marked_know_at: changed(&before.marked_know_at, &after.marked_know_at),
            last_seen_in_study: changed(&before.last_seen_in_study, &after.last_seen_in_study),
            last_test_type: changed(&before.last_test_type, &after.last_test_type),
            last_test_result: changed(&before.last_test_result, &after.last_test_result),
            graduated_at: changed(&before.graduated_at, &after.graduated_at),
            updated_at: now,
        }
    }

    /// Merge into a stored record and bump its version.
    pub fn apply_to(&self, rec: &mut CardStateRecord) {
        if let Some(v) = self.status {
            rec.status = v;
        }
        if let Some(v) = self.ease_factor {
            rec.ease_factor = v;
        }
        if let Some(v) = self.interval_days {
            rec.interval_days = v;
        }
        if let Some(v) = self.next_review_at {
            rec.next_review_at = v;
        }
        if let Some(v) = self.reviews_count {
            rec.reviews_count = v;
        }
        if let Some(v) = self.correct_streak {
            rec.correct_streak = v;
        }
        if let Some(v) = self.lapses_count {
            rec.lapses_count = v;
        }
        if let Some(v) = self.test_choice_passed {
            rec.test_choice_passed = v;
        }
        if let Some(v) = self.test_audio_passed {
            rec.test_audio_passed = v;
        }
        if let Some(v) = self.test_dictation_passed {
            rec.test_dictation_passed = v;
        }
        if let Some(v) = self.test_choice_attempts {
            rec.test_choice_attempts = v;
        }
        if let Some(v) = self.test_audio_attempts {
            rec.test_audio_attempts = v;
        }
        if let Some(v) = self.test_dictation_attempts {
            rec.test_dictation_attempts = v;
        }
        if let Some(v) = self.marked_know_at {
            rec.marked_know_at = v;
        }
        if let Some(v) = self.last_seen_in_study {
            rec.last_seen_in_study = v;
        }
        if let Some(v) = self.last_test_type {
            rec.last_test_type = v;
        }
        if let Some(v) = self.last_test_result {
            rec.last_test_result = v;
        }
        if let Some(v) = self.graduated_at {
            rec.graduated_at = v;
        }
        rec.updated_at = self.updated_at;
        rec.version += 1;
    }
}
