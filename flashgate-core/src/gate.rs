//! Primary-test gate: choice, then audio, then dictation. A card graduates
//! the moment the third check passes; any failure drops back to the start.

use crate::{CardState, CheckType, CoreError, Phase};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateProgress {
    #[default]
    NotStarted,
    ChoicePassed,
    ChoiceAndAudioPassed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateStep {
    Advanced(GateProgress),
    Graduated,
}

impl GateProgress {
    /// The check that must pass next. There is always one: the fully passed
    /// gate is never a resting state.
    pub fn next_check(self) -> CheckType {
        match self {
            GateProgress::NotStarted => CheckType::Choice,
            GateProgress::ChoicePassed => CheckType::Audio,
            GateProgress::ChoiceAndAudioPassed => CheckType::Dictation,
        }
    }

    pub fn pass(self, check: CheckType) -> Result<GateStep, CoreError> {
        let expected = self.next_check();
        if check != expected {
            return Err(CoreError::OutOfOrderCheck {
                expected,
                got: check,
            });
        }
        Ok(match self {
            GateProgress::NotStarted => GateStep::Advanced(GateProgress::ChoicePassed),
            GateProgress::ChoicePassed => GateStep::Advanced(GateProgress::ChoiceAndAudioPassed),
            GateProgress::ChoiceAndAudioPassed => GateStep::Graduated,
        })
    }

    pub fn fail(self) -> GateProgress {
        GateProgress::NotStarted
    }

    /// Storage flags `[choice, audio, dictation]`.
    pub fn flags(self) -> [bool; 3] {
        match self {
            GateProgress::NotStarted => [false, false, false],
            GateProgress::ChoicePassed => [true, false, false],
            GateProgress::ChoiceAndAudioPassed => [true, true, false],
        }
    }

    pub fn from_flags(flags: [bool; 3]) -> Result<Self, CoreError> {
        match flags {
            [false, false, false] => Ok(GateProgress::NotStarted),
            [true, false, false] => Ok(GateProgress::ChoicePassed),
            [true, true, false] => Ok(GateProgress::ChoiceAndAudioPassed),
            [true, true, true] => Err(CoreError::Invalid("all gate flags set")),
            _ => Err(CoreError::Invalid("gate flags out of order")),
        }
    }

    pub fn is_started(self) -> bool {
        self != GateProgress::NotStarted
    }
}

/// Which check a card must take next, if it is inside the gate at all.
/// `new` cards and cards in spaced review have nothing pending.
pub fn next_test_type(state: &CardState) -> Option<CheckType> {
    match &state.phase {
        Phase::Primary { gate, .. } => Some(gate.next_check()),
        Phase::New | Phase::Review { .. } => None,
    }
}
