use chrono::{Duration, TimeZone, Utc};
use flashgate_core::{
    daily_streak, filter_by_status, filter_due_for_review, filter_for_study,
    filter_ready_for_testing, per_deck_summaries, review_queue, summarize_logs, summarize_states,
    testing_queue, CardStateRecord, CardStatus, LogKind, ReviewLog,
};
use uuid::Uuid;

fn deck_of(user: Uuid, deck: Uuid) -> Vec<CardStateRecord> {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mk = || CardStateRecord::new(user, deck, Uuid::new_v4(), now);

    let new_card = mk();

    let mut learning_marked = mk();
    learning_marked.status = CardStatus::Learning;
    learning_marked.marked_know_at = Some(now - Duration::hours(2));

    let mut learning_unmarked = mk();
    learning_unmarked.status = CardStatus::Learning;

    let mut testing = mk();
    testing.status = CardStatus::Testing;
    testing.test_choice_passed = true;
    testing.marked_know_at = Some(now - Duration::hours(5));

    let mut young_due = mk();
    young_due.status = CardStatus::Young;
    young_due.next_review_at = Some(now - Duration::days(1));

    let mut mature_future = mk();
    mature_future.status = CardStatus::Mature;
    mature_future.interval_days = 30;
    mature_future.next_review_at = Some(now + Duration::days(10));

    let mut relearning_due_now = mk();
    relearning_due_now.status = CardStatus::Relearning;
    relearning_due_now.next_review_at = Some(now);

    vec![
        new_card,
        learning_marked,
        learning_unmarked,
        testing,
        young_due,
        mature_future,
        relearning_due_now,
    ]
}

#[test]
fn filters_split_cards_by_readiness() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let v = deck_of(Uuid::new_v4(), Uuid::new_v4());

    assert_eq!(filter_by_status(&v, CardStatus::Learning).len(), 2);
    assert_eq!(filter_due_for_review(&v, now).len(), 2);
    assert_eq!(filter_ready_for_testing(&v).len(), 2);
    assert_eq!(filter_for_study(&v).len(), 2);
}

#[test]
fn queues_are_ordered_and_capped() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let v = deck_of(Uuid::new_v4(), Uuid::new_v4());

    let due = review_queue(&v, now, 10);
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].status, CardStatus::Young);
    assert_eq!(due[1].status, CardStatus::Relearning);
    assert_eq!(review_queue(&v, now, 1).len(), 1);

    let testable = testing_queue(&v, 10);
    assert_eq!(testable[0].status, CardStatus::Testing);
    assert_eq!(testable[1].status, CardStatus::Learning);
}

#[test]
fn summaries_count_by_status_and_deck() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let user = Uuid::new_v4();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut v = deck_of(user, a);
    v.extend(deck_of(user, b).into_iter().take(3));

    let s = summarize_states(&v, now);
    assert_eq!(s.total, 10);
    assert_eq!(s.by_status.new, 2);
    assert_eq!(s.by_status.get(CardStatus::Learning), 4);
    assert_eq!(s.due_for_review, 2);
    assert_eq!(s.ready_for_testing, 3);

    let per = per_deck_summaries(&v, now);
    assert_eq!(per[&a].total, 7);
    assert_eq!(per[&b].total, 3);
    assert_eq!(per[&b].due_for_review, 0);
}

#[test]
fn log_stats_and_streak() {
    let now = Utc::now();
    let (user, card) = (Uuid::new_v4(), Uuid::new_v4());
    let log = |correct, at| {
        ReviewLog::new(
            user,
            card,
            LogKind::Review,
            None,
            correct,
            CardStatus::Young,
            Some(3),
            2.5,
            at,
        )
    };
    let logs = vec![
        log(true, now - Duration::days(2)),
        log(false, now - Duration::days(1)),
        log(true, now),
        log(true, now),
    ];

    let s = summarize_logs(&logs);
    assert_eq!(s.totals.total, 4);
    assert_eq!(s.totals.incorrect, 1);
    assert!((s.totals.accuracy() - 0.75).abs() < 1e-6);

    assert_eq!(daily_streak(&logs, now.date_naive()), 3);
    assert_eq!(daily_streak(&logs, (now + Duration::days(1)).date_naive()), 0);
}
