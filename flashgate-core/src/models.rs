use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

pub type UserId = Uuid;
pub type DeckId = Uuid;
pub type CardId = Uuid;
pub type LogId = Uuid;

pub const EF_MIN: f32 = 1.3;
pub const EF_DEFAULT: f32 = 2.5;
pub const EF_LAPSE_PENALTY: f32 = 0.2;

pub const GRADUATION_INTERVAL_DAYS: u32 = 1;
pub const LAPSE_INTERVAL_DAYS: u32 = 1;
pub const MATURE_INTERVAL_DAYS: u32 = 21;
pub const RECOVERY_FACTOR: f32 = 0.5;
/// Longest interval a review can schedule (about a century).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    New,
    Learning,
    Testing,
    Young,
    Mature,
    Relearning,
}

impl CardStatus {
    pub const ALL: [CardStatus; 6] = [
        CardStatus::New,
        CardStatus::Learning,
        CardStatus::Testing,
        CardStatus::Young,
        CardStatus::Mature,
        CardStatus::Relearning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::New => "new",
            CardStatus::Learning => "learning",
            CardStatus::Testing => "testing",
            CardStatus::Young => "young",
            CardStatus::Mature => "mature",
            CardStatus::Relearning => "relearning",
        }
    }

    /// Statuses that carry a review schedule.
    pub fn is_reviewable(&self) -> bool {
        matches!(
            self,
            CardStatus::Young | CardStatus::Mature | CardStatus::Relearning
        )
    }

    /// Statuses that sit inside the primary-test gate.
    pub fn is_primary(&self) -> bool {
        matches!(self, CardStatus::Learning | CardStatus::Testing)
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(CoreError::Invalid("status"))
    }
}

/// The three checks of the primary-test gate, in priority order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Choice,
    Audio,
    Dictation,
}

impl CheckType {
    pub const ORDER: [CheckType; 3] = [CheckType::Choice, CheckType::Audio, CheckType::Dictation];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Choice => "choice",
            CheckType::Audio => "audio",
            CheckType::Dictation => "dictation",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "c" | "choice" => Ok(CheckType::Choice),
            "a" | "audio" => Ok(CheckType::Audio),
            "d" | "dictation" => Ok(CheckType::Dictation),
            _ => Err(CoreError::Invalid("check type")),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Study,
    PrimaryTest,
    Review,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Study => "study",
            LogKind::PrimaryTest => "primary_test",
            LogKind::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Option<LogKind> {
        match s {
            "study" => Some(LogKind::Study),
            "primary_test" => Some(LogKind::PrimaryTest),
            "review" => Some(LogKind::Review),
            _ => None,
        }
    }
}

/// One applied event, kept for history and statistics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewLog {
    pub id: LogId,
    pub user_id: UserId,
    pub card_id: CardId,
    pub kind: LogKind,
    pub check_type: Option<CheckType>,
    pub correct: bool,
    pub status_after: CardStatus,
    pub interval_after: Option<u32>,
    pub ease_after: f32,
    pub at: DateTime<Utc>,
}

impl ReviewLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        card_id: CardId,
        kind: LogKind,
        check_type: Option<CheckType>,
        correct: bool,
        status_after: CardStatus,
        interval_after: Option<u32>,
        ease_after: f32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            card_id,
            kind,
            check_type,
            correct,
            status_after,
            interval_after,
            ease_after,
            at,
        }
    }
}
