//! Typed view of a card-state record. Each phase carries only the fields
//! that mean something in it, so a `new` card has no interval and a card in
//! review has no gate progress.

use chrono::{DateTime, Utc};

use crate::{
    CardId, CardStateRecord, CardStatus, CheckType, CoreError, DeckId, GateProgress, UserId,
    EF_MIN,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewStage {
    Young,
    Mature,
    Relearning,
}

impl ReviewStage {
    pub fn status(self) -> CardStatus {
        match self {
            ReviewStage::Young => CardStatus::Young,
            ReviewStage::Mature => CardStatus::Mature,
            ReviewStage::Relearning => CardStatus::Relearning,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
    New,
    /// `learning` while the gate is untouched, `testing` once a check passed.
    Primary {
        marked_know_at: Option<DateTime<Utc>>,
        gate: GateProgress,
    },
    Review {
        stage: ReviewStage,
        interval_days: u32,
        next_review_at: DateTime<Utc>,
        marked_know_at: Option<DateTime<Utc>>,
    },
}

impl Phase {
    pub fn status(&self) -> CardStatus {
        match self {
            Phase::New => CardStatus::New,
            Phase::Primary { gate, .. } if gate.is_started() => CardStatus::Testing,
            Phase::Primary { .. } => CardStatus::Learning,
            Phase::Review { stage, .. } => stage.status(),
        }
    }

    pub fn marked_know_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Phase::New => None,
            Phase::Primary { marked_know_at, .. } | Phase::Review { marked_know_at, .. } => {
                *marked_know_at
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attempts {
    pub choice: u32,
    pub audio: u32,
    pub dictation: u32,
}

impl Attempts {
    pub fn bump(&mut self, check: CheckType) {
        match check {
            CheckType::Choice => self.choice += 1,
            CheckType::Audio => self.audio += 1,
            CheckType::Dictation => self.dictation += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CardState {
    pub user_id: UserId,
    pub card_id: CardId,
    pub deck_id: DeckId,
    pub phase: Phase,
    pub ease_factor: f32,
    pub reviews_count: u32,
    pub correct_streak: u32,
    pub lapses_count: u32,
    pub attempts: Attempts,
    pub last_seen_in_study: Option<DateTime<Utc>>,
    pub last_test_type: Option<CheckType>,
    pub last_test_result: Option<bool>,
    pub graduated_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardState {
    pub fn status(&self) -> CardStatus {
        self.phase.status()
    }

    pub fn to_record(&self) -> CardStateRecord {
        let (flags, interval_days, next_review_at) = match &self.phase {
            Phase::New => ([false; 3], 1, None),
            Phase::Primary { gate, .. } => (gate.flags(), 1, None),
            Phase::Review {
                interval_days,
                next_review_at,
                ..
            } => ([false; 3], *interval_days, Some(*next_review_at)),
        };
        CardStateRecord {
            user_id: self.user_id,
            card_id: self.card_id,
            deck_id: self.deck_id,
            status: self.status(),
            ease_factor: self.ease_factor,
            interval_days,
            next_review_at,
            reviews_count: self.reviews_count,
            correct_streak: self.correct_streak,
            lapses_count: self.lapses_count,
            test_choice_passed: flags[0],
            test_audio_passed: flags[1],
            test_dictation_passed: flags[2],
            test_choice_attempts: self.attempts.choice,
            test_audio_attempts: self.attempts.audio,
            test_dictation_attempts: self.attempts.dictation,
            marked_know_at: self.phase.marked_know_at(),
            last_seen_in_study: self.last_seen_in_study,
            last_test_type: self.last_test_type,
            last_test_result: self.last_test_result,
            graduated_at: self.graduated_at,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn phase_of(rec: &CardStateRecord) -> Result<Phase, CoreError> {
    let gate = GateProgress::from_flags(rec.passed_flags())?;
    let review = |stage| -> Result<Phase, CoreError> {
        if gate.is_started() {
            return Err(CoreError::Invalid("gate flags set on a card in review"));
        }
        if rec.interval_days == 0 {
            return Err(CoreError::Invalid("interval_days must be at least 1"));
        }
        let next_review_at = rec
            .next_review_at
            .ok_or(CoreError::Invalid("missing next_review_at"))?;
        Ok(Phase::Review {
            stage,
            interval_days: rec.interval_days,
            next_review_at,
            marked_know_at: rec.marked_know_at,
        })
    };

    match rec.status {
        CardStatus::New => {
            if gate.is_started() || rec.marked_know_at.is_some() {
                return Err(CoreError::Invalid("new card with study progress"));
            }
            Ok(Phase::New)
        }
        CardStatus::Learning if gate.is_started() => {
            Err(CoreError::Invalid("learning card with passed checks"))
        }
        CardStatus::Testing if !gate.is_started() => {
            Err(CoreError::Invalid("testing card without passed checks"))
        }
        CardStatus::Learning | CardStatus::Testing => Ok(Phase::Primary {
            marked_know_at: rec.marked_know_at,
            gate,
        }),
        CardStatus::Young => review(ReviewStage::Young),
        CardStatus::Mature => review(ReviewStage::Mature),
        CardStatus::Relearning => review(ReviewStage::Relearning),
    }
}

impl TryFrom<&CardStateRecord> for CardState {
    type Error = CoreError;

    fn try_from(rec: &CardStateRecord) -> Result<Self, Self::Error> {
        // Also rejects NaN.
        if !(rec.ease_factor >= EF_MIN) {
            return Err(CoreError::Invalid("ease_factor below minimum"));
        }
        Ok(Self {
            user_id: rec.user_id,
            card_id: rec.card_id,
            deck_id: rec.deck_id,
            phase: phase_of(rec)?,
            ease_factor: rec.ease_factor,
            reviews_count: rec.reviews_count,
            correct_streak: rec.correct_streak,
            lapses_count: rec.lapses_count,
            attempts: Attempts {
                choice: rec.test_choice_attempts,
                audio: rec.test_audio_attempts,
                dictation: rec.test_dictation_attempts,
            },
            last_seen_in_study: rec.last_seen_in_study,
            last_test_type: rec.last_test_type,
            last_test_result: rec.last_test_result,
            graduated_at: rec.graduated_at,
            version: rec.version,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        })
    }
}
