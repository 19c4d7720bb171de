use chrono::{TimeZone, Utc};
use flashgate_core::{
    mark_know, next_test_type, on_primary_test_correct, CardState, CardStateRecord, CardStatus,
    CheckType, CoreError, GateProgress, GateStep, Phase,
};
use uuid::Uuid;

fn fresh() -> CardStateRecord {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    CardStateRecord::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), now)
}

#[test]
fn gate_walks_choice_audio_dictation() {
    let g = GateProgress::NotStarted;
    assert_eq!(g.next_check(), CheckType::Choice);
    let GateStep::Advanced(g) = g.pass(CheckType::Choice).unwrap() else {
        panic!("choice should advance");
    };
    assert_eq!(g.next_check(), CheckType::Audio);
    let GateStep::Advanced(g) = g.pass(CheckType::Audio).unwrap() else {
        panic!("audio should advance");
    };
    assert_eq!(g.next_check(), CheckType::Dictation);
    assert_eq!(g.pass(CheckType::Dictation).unwrap(), GateStep::Graduated);
}

#[test]
fn gate_failure_always_resets() {
    for g in [
        GateProgress::NotStarted,
        GateProgress::ChoicePassed,
        GateProgress::ChoiceAndAudioPassed,
    ] {
        assert_eq!(g.fail(), GateProgress::NotStarted);
    }
}

#[test]
fn gate_flags_round_trip_only_in_order() {
    assert_eq!(
        GateProgress::from_flags([true, true, false]).unwrap(),
        GateProgress::ChoiceAndAudioPassed
    );
    assert!(matches!(
        GateProgress::from_flags([false, true, false]),
        Err(CoreError::Invalid(_))
    ));
    assert!(matches!(
        GateProgress::from_flags([true, true, true]),
        Err(CoreError::Invalid(_))
    ));
}

#[test]
fn next_test_type_follows_priority() {
    let now = Utc::now();
    let new_card = CardState::try_from(&fresh()).unwrap();
    assert_eq!(next_test_type(&new_card), None);

    let c = mark_know(&new_card, now);
    assert_eq!(next_test_type(&c), Some(CheckType::Choice));
    let c = on_primary_test_correct(&c, CheckType::Choice, now).unwrap();
    assert_eq!(next_test_type(&c), Some(CheckType::Audio));
    let c = on_primary_test_correct(&c, CheckType::Audio, now).unwrap();
    assert_eq!(next_test_type(&c), Some(CheckType::Dictation));
    let c = on_primary_test_correct(&c, CheckType::Dictation, now).unwrap();
    assert_eq!(next_test_type(&c), None);
    assert_eq!(c.status(), CardStatus::Young);
}

#[test]
fn parse_builds_phase_from_flat_record() {
    let mut rec = fresh();
    rec.status = CardStatus::Testing;
    rec.test_choice_passed = true;
    rec.marked_know_at = Some(rec.created_at);
    let state = CardState::try_from(&rec).unwrap();
    assert_eq!(
        state.phase,
        Phase::Primary {
            marked_know_at: Some(rec.created_at),
            gate: GateProgress::ChoicePassed,
        }
    );
    assert_eq!(state.to_record(), rec);
}

#[test]
fn parse_rejects_unreachable_records() {
    let mut testing_without_flags = fresh();
    testing_without_flags.status = CardStatus::Testing;
    assert!(CardState::try_from(&testing_without_flags).is_err());

    let mut learning_with_flags = fresh();
    learning_with_flags.status = CardStatus::Learning;
    learning_with_flags.test_choice_passed = true;
    assert!(CardState::try_from(&learning_with_flags).is_err());

    let mut young_unscheduled = fresh();
    young_unscheduled.status = CardStatus::Young;
    assert!(CardState::try_from(&young_unscheduled).is_err());

    let mut young_with_flags = fresh();
    young_with_flags.status = CardStatus::Young;
    young_with_flags.next_review_at = Some(young_with_flags.created_at);
    young_with_flags.test_choice_passed = true;
    assert!(CardState::try_from(&young_with_flags).is_err());

    let mut new_marked = fresh();
    new_marked.marked_know_at = Some(new_marked.created_at);
    assert!(CardState::try_from(&new_marked).is_err());

    let mut low_ease = fresh();
    low_ease.ease_factor = 1.1;
    assert!(CardState::try_from(&low_ease).is_err());

    let mut nan_ease = fresh();
    nan_ease.ease_factor = f32::NAN;
    assert!(CardState::try_from(&nan_ease).is_err());
}

#[test]
fn status_and_check_parse_from_text() {
    assert_eq!("Relearning".parse::<CardStatus>().unwrap(), CardStatus::Relearning);
    assert_eq!("d".parse::<CheckType>().unwrap(), CheckType::Dictation);
    assert!("speaking".parse::<CheckType>().is_err());
}
