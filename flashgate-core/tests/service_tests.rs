use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use flashgate_core::{
    deck_summary, due_for_review, load_card, memory::MemoryRepo, ready_for_testing, submit_event,
    track_deck, CardId, CardStateRecord, CardStateRepository, CardStateUpdate, CardStatus,
    CheckType, CoreError, DeckId, Event, LogKind, ReviewLog, UserId, MAX_SUBMIT_ATTEMPTS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn test(check: CheckType, correct: bool) -> Event {
    Event::PrimaryTest { check, correct }
}

#[tokio::test]
async fn tracking_is_lazy_and_idempotent() {
    let repo = MemoryRepo::new();
    let (user, deck) = (Uuid::new_v4(), Uuid::new_v4());
    let cards = vec![Uuid::new_v4(), Uuid::new_v4()];

    let first = track_deck(&repo, user, deck, &cards, t0()).await.unwrap();
    assert!(first.iter().all(|s| s.status == CardStatus::New && s.version == 0));

    submit_event(&repo, user, cards[0], Event::MarkKnow, t0())
        .await
        .unwrap();
    let again = track_deck(&repo, user, deck, &cards, t0()).await.unwrap();
    assert_eq!(again[0].status, CardStatus::Learning);
    assert_eq!(repo.list_states(user, Some(deck)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn untracked_card_is_not_found() {
    let repo = MemoryRepo::new();
    let err = submit_event(&repo, Uuid::new_v4(), Uuid::new_v4(), Event::MarkKnow, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn full_lifecycle_through_repo() {
    let repo = MemoryRepo::new();
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();

    let s = submit_event(&repo, user, card, Event::MarkKnow, t0()).await.unwrap();
    assert_eq!(s.next_test_type, Some(CheckType::Choice));
    assert_eq!(s.log.kind, LogKind::Study);

    submit_event(&repo, user, card, test(CheckType::Choice, true), t0())
        .await
        .unwrap();
    submit_event(&repo, user, card, test(CheckType::Audio, true), t0())
        .await
        .unwrap();
    let s = submit_event(&repo, user, card, test(CheckType::Dictation, true), t0())
        .await
        .unwrap();
    assert_eq!(s.record.status, CardStatus::Young);
    assert_eq!(s.next_test_type, None);
    assert_eq!(s.log.interval_after, Some(1));
    assert_eq!(s.record.version, 4);

    assert_eq!(due_for_review(&repo, user, None, t0(), 10).await.unwrap().len(), 0);
    let tomorrow = t0() + Duration::days(1);
    assert_eq!(due_for_review(&repo, user, None, tomorrow, 10).await.unwrap().len(), 1);

    let s = submit_event(&repo, user, card, Event::SimpleReview { know: false }, tomorrow)
        .await
        .unwrap();
    assert_eq!(s.record.status, CardStatus::Relearning);
    assert_eq!(s.log.kind, LogKind::Review);
    assert!(!s.log.correct);

    let logs = repo.list_logs(user, Some(card)).await.unwrap();
    assert_eq!(logs.len(), 5);
    assert_eq!(logs[1].check_type, Some(CheckType::Choice));

    let (record, next) = load_card(&repo, user, card).await.unwrap();
    assert_eq!(record.lapses_count, 1);
    assert_eq!(next, None);
}

#[tokio::test]
async fn rejected_transition_leaves_record_untouched() {
    let repo = MemoryRepo::new();
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();

    let err = submit_event(&repo, user, card, Event::Review { correct: true }, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IllegalTransition { .. }));

    let rec = repo.get_state(user, card).await.unwrap().unwrap();
    assert_eq!(rec.version, 0);
    assert!(repo.list_logs(user, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn summary_and_testing_queue_follow_events() {
    let repo = MemoryRepo::new();
    let (user, deck) = (Uuid::new_v4(), Uuid::new_v4());
    let cards: Vec<CardId> = (0..4).map(|_| Uuid::new_v4()).collect();
    track_deck(&repo, user, deck, &cards, t0()).await.unwrap();

    submit_event(&repo, user, cards[0], Event::MarkKnow, t0()).await.unwrap();
    submit_event(&repo, user, cards[1], Event::MarkDontKnow, t0()).await.unwrap();

    let summary = deck_summary(&repo, user, Some(deck), t0()).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.by_status.new, 2);
    assert_eq!(summary.by_status.learning, 2);
    assert_eq!(summary.ready_for_testing, 1);

    let queue = ready_for_testing(&repo, user, Some(deck), 10).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].card_id, cards[0]);
}

/// Reports a conflict on the first `failures` commits, then behaves normally.
/// Standalone log inserts always fail.
struct FlakyRepo {
    inner: MemoryRepo,
    failures: AtomicUsize,
}

impl FlakyRepo {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryRepo::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl CardStateRepository for FlakyRepo {
    async fn ensure_deck_states(
        &self,
        user_id: UserId,
        deck_id: DeckId,
        cards: &[CardId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        self.inner.ensure_deck_states(user_id, deck_id, cards, now).await
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardStateRecord>, CoreError> {
        self.inner.get_state(user_id, card_id).await
    }

    async fn list_states(
        &self,
        user_id: UserId,
        deck_id: Option<DeckId>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        self.inner.list_states(user_id, deck_id).await
    }

    async fn apply_update(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
    ) -> Result<CardStateRecord, CoreError> {
        self.inner
            .apply_update(user_id, card_id, update, expected_version)
            .await
    }

    async fn commit_transition(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<CardStateRecord, CoreError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(CoreError::Conflict("simulated"));
        }
        self.inner
            .commit_transition(user_id, card_id, update, expected_version, log)
            .await
    }

    async fn delete_deck_states(&self, user_id: UserId, deck_id: DeckId) -> Result<u64, CoreError> {
        self.inner.delete_deck_states(user_id, deck_id).await
    }

    async fn insert_log(&self, _log: &ReviewLog) -> Result<(), CoreError> {
        Err(CoreError::Storage("log table unavailable"))
    }

    async fn list_logs(
        &self,
        user_id: UserId,
        card_id: Option<CardId>,
    ) -> Result<Vec<ReviewLog>, CoreError> {
        self.inner.list_logs(user_id, card_id).await
    }
}

#[tokio::test]
async fn conflicts_are_retried_then_surfaced() {
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let repo = FlakyRepo::new(MAX_SUBMIT_ATTEMPTS - 1);
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();
    let s = submit_event(&repo, user, card, Event::MarkKnow, t0()).await.unwrap();
    assert_eq!(s.record.version, 1);

    let repo = FlakyRepo::new(MAX_SUBMIT_ATTEMPTS);
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();
    let err = submit_event(&repo, user, card, Event::MarkKnow, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn submission_stores_state_and_log_together() {
    let repo = FlakyRepo::new(0);
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();

    let s = submit_event(&repo, user, card, Event::MarkKnow, t0()).await.unwrap();
    assert_eq!(s.record.status, CardStatus::Learning);

    let rec = repo.get_state(user, card).await.unwrap().unwrap();
    assert_eq!(rec.version, 1);
    let logs = repo.list_logs(user, Some(card)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, s.log.id);
}

#[tokio::test]
async fn failed_commit_stores_neither_state_nor_log() {
    let repo = FlakyRepo::new(MAX_SUBMIT_ATTEMPTS);
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();

    assert!(submit_event(&repo, user, card, Event::MarkKnow, t0()).await.is_err());
    let rec = repo.get_state(user, card).await.unwrap().unwrap();
    assert_eq!(rec.version, 0);
    assert_eq!(rec.status, CardStatus::New);
    assert!(repo.list_logs(user, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let repo = MemoryRepo::new();
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();
    submit_event(&repo, user, card, Event::MarkKnow, t0()).await.unwrap();

    let update = CardStateUpdate {
        updated_at: t0(),
        ..Default::default()
    };
    let err = repo.apply_update(user, card, &update, 0).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(repo.apply_update(user, card, &update, 1).await.unwrap().version, 2);

    let log = ReviewLog::new(
        user,
        card,
        LogKind::Study,
        None,
        true,
        CardStatus::Learning,
        None,
        2.5,
        t0(),
    );
    let err = repo
        .commit_transition(user, card, &update, 1, &log)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(repo.list_logs(user, Some(card)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_deck_drops_states_and_logs() {
    let repo = MemoryRepo::new();
    let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    track_deck(&repo, user, deck, &[card], t0()).await.unwrap();
    submit_event(&repo, user, card, Event::MarkKnow, t0()).await.unwrap();

    assert_eq!(repo.delete_deck_states(user, deck).await.unwrap(), 1);
    assert!(repo.get_state(user, card).await.unwrap().is_none());
    assert!(repo.list_logs(user, None).await.unwrap().is_empty());
}
