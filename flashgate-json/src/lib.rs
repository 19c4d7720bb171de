use chrono::{DateTime, Utc};
use flashgate_core::{
    repo::CardStateRepository, CardId, CardStateRecord, CardStateUpdate, CoreError, DeckId,
    ReviewLog, UserId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, warn};

pub mod paths;

const FILE_VERSION: u32 = 1;

type Key = (UserId, CardId);

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    states: Vec<CardStateRecord>,
    logs: Vec<ReviewLog>,
}

#[derive(Default, Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    states: HashMap<Key, CardStateRecord>,
    logs: HashMap<Key, Vec<ReviewLog>>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            states: HashMap::new(),
            logs: HashMap::new(),
        }
    }

    fn to_image(&self) -> FileImage {
        let mut states: Vec<CardStateRecord> = self.states.values().cloned().collect();
        states.sort_by_key(|s| (s.user_id, s.created_at, s.card_id));
        let mut logs: Vec<ReviewLog> = self
            .logs
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        logs.sort_by_key(|l| l.at);
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            states,
            logs,
        }
    }

    fn from_image(img: FileImage) -> Self {
        let mut states = HashMap::new();
        for s in img.states {
            states.insert((s.user_id, s.card_id), s);
        }
        let mut logs: HashMap<Key, Vec<ReviewLog>> = HashMap::new();
        for l in img.logs {
            logs.entry((l.user_id, l.card_id)).or_default().push(l);
        }
        Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            states,
            logs,
        }
    }
}

pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    save_lock: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_with(
        path: PathBuf,
        backups_dir: PathBuf,
        max_backups: usize,
    ) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let max_backups = max_backups.max(1);
        let state = load_or_init(&path, &backups_dir, max_backups).await?;
        debug!(path = %path.display(), states = state.states.len(), "json store opened");
        Ok(Self {
            path,
            backups_dir,
            max_backups,
            state: RwLock::new(state),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `change` on a copy of the state and write that copy to disk; only
    /// a successful write makes it visible. `change` reports whether it
    /// modified anything.
    async fn commit<T, F>(&self, change: F) -> Result<T, CoreError>
    where
        T: Send,
        F: FnOnce(&mut State) -> Result<(T, bool), CoreError> + Send,
    {
        // Held across the write so snapshots hit the disk in commit order.
        let _guard = self.save_lock.lock().await;
        let mut next = self.state.read().clone();
        let (out, dirty) = change(&mut next)?;
        if !dirty {
            return Ok(out);
        }
        next.updated_at = Utc::now();
        let snapshot = next.to_image();
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;

        // Join error -> CoreError, inner io::Error -> CoreError
        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot))
            .await
            .map_err(|_| CoreError::Storage("io"))?
            .map_err(|_| CoreError::Storage("io"))?;
        *self.state.write() = next;
        Ok(out)
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(|_| CoreError::Storage("io"))
}

async fn load_or_init(path: &Path, backups_dir: &Path, keep: usize) -> Result<State, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img: FileImage = task::spawn_blocking(move || {
            let mut f = fs::File::open(&p)?;
            let mut buf = String::new();
            f.read_to_string(&mut buf)?;
            let v = serde_json::from_str::<FileImage>(&buf)?;
            Ok::<FileImage, std::io::Error>(v)
        })
        .await
        .map_err(|_| CoreError::Storage("io"))
        .and_then(|r| r.map_err(|_| CoreError::Storage("io")))?;
        if img.version != FILE_VERSION {
            return Err(CoreError::Invalid("unsupported store file version"));
        }
        Ok(State::from_image(img))
    } else {
        let st = State::new_empty();
        let img = st.to_image();
        write_with_backup(path, backups_dir, keep, &img).map_err(|_| CoreError::Storage("io"))?;
        Ok(st)
    }
}

fn write_with_backup(
    path: &Path,
    backups_dir: &Path,
    max_backups: usize,
    img: &FileImage,
) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(img)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // The store file is the source of truth; a missed backup is not fatal.
    if let Err(e) = write_backup(backups_dir, max_backups, &json) {
        warn!(dir = %backups_dir.display(), error = %e, "backup skipped");
    }
    Ok(())
}

fn write_backup(
    backups_dir: &Path,
    max_backups: usize,
    json: &[u8],
) -> Result<(), std::io::Error> {
    fs::create_dir_all(backups_dir)?;
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("flashgate-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)
}

fn rotate_backups(dir: &Path, keep: usize) -> Result<(), std::io::Error> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    // Names embed the timestamp, so lexical order is age order.
    entries.sort_by_key(|e| e.file_name());
    if entries.len() > keep {
        for e in &entries[0..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

fn checked_record(
    s: &mut State,
    user_id: UserId,
    card_id: CardId,
    expected_version: u64,
) -> Result<&mut CardStateRecord, CoreError> {
    let rec = s
        .states
        .get_mut(&(user_id, card_id))
        .ok_or(CoreError::NotFound("card state"))?;
    if rec.version != expected_version {
        return Err(CoreError::Conflict("card state changed concurrently"));
    }
    Ok(rec)
}

use async_trait::async_trait;

#[async_trait]
impl CardStateRepository for JsonStore {
    async fn ensure_deck_states(
        &self,
        user_id: UserId,
        deck_id: DeckId,
        cards: &[CardId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        self.commit(|s| {
            let mut created = false;
            let mut v = Vec::with_capacity(cards.len());
            for &card_id in cards {
                let rec = s.states.entry((user_id, card_id)).or_insert_with(|| {
                    created = true;
                    CardStateRecord::new(user_id, deck_id, card_id, now)
                });
                v.push(rec.clone());
            }
            Ok((v, created))
        })
        .await
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardStateRecord>, CoreError> {
        let s = self.state.read();
        Ok(s.states.get(&(user_id, card_id)).cloned())
    }

    async fn list_states(
        &self,
        user_id: UserId,
        deck_id: Option<DeckId>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<CardStateRecord> = s
            .states
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        if let Some(did) = deck_id {
            v.retain(|r| r.deck_id == did);
        }
        v.sort_by_key(|r| (r.created_at, r.card_id));
        Ok(v)
    }

    async fn apply_update(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
    ) -> Result<CardStateRecord, CoreError> {
        self.commit(|s| {
            let rec = checked_record(s, user_id, card_id, expected_version)?;
            update.apply_to(rec);
            Ok((rec.clone(), true))
        })
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
        self.commit(|s| {
            let rec = checked_record(s, user_id, card_id, expected_version)?;
            update.apply_to(rec);
            let saved = rec.clone();
            s.logs
                .entry((log.user_id, log.card_id))
                .or_default()
                .push(log.clone());
            Ok((saved, true))
        })
        .await
    }

    async fn delete_deck_states(&self, user_id: UserId, deck_id: DeckId) -> Result<u64, CoreError> {
        self.commit(|s| {
            let keys: Vec<Key> = s
                .states
                .values()
                .filter(|r| r.user_id == user_id && r.deck_id == deck_id)
                .map(|r| (r.user_id, r.card_id))
                .collect();
            for k in &keys {
                s.states.remove(k);
                s.logs.remove(k);
            }
            Ok((keys.len() as u64, !keys.is_empty()))
        })
        .await
    }

    async fn insert_log(&self, log: &ReviewLog) -> Result<(), CoreError> {
        self.commit(|s| {
            s.logs
                .entry((log.user_id, log.card_id))
                .or_default()
                .push(log.clone());
            Ok(((), true))
        })
        .await
    }

    async fn list_logs(
        &self,
        user_id: UserId,
        card_id: Option<CardId>,
    ) -> Result<Vec<ReviewLog>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<ReviewLog> = match card_id {
            Some(cid) => s.logs.get(&(user_id, cid)).cloned().unwrap_or_default(),
            None => s
                .logs
                .iter()
                .filter(|((uid, _), _)| *uid == user_id)
                .flat_map(|(_, v)| v.iter().cloned())
                .collect(),
        };
        v.sort_by_key(|l| l.at);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashgate_core::{submit_event, track_deck, CardStatus, CheckType, Event};
    use uuid::Uuid;

    async fn open_in(dir: &Path) -> JsonStore {
        JsonStore::open_with(dir.join("store.json"), dir.join("backups"), 3)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        {
            let store = open_in(dir.path()).await;
            track_deck(&store, user, deck, &[card], now).await.unwrap();
            submit_event(&store, user, card, Event::MarkKnow, now).await.unwrap();
            submit_event(
                &store,
                user,
                card,
                Event::PrimaryTest {
                    check: CheckType::Choice,
                    correct: true,
                },
                now,
            )
            .await
            .unwrap();
        }

        let store = open_in(dir.path()).await;
        let rec = store.get_state(user, card).await.unwrap().unwrap();
        assert_eq!(rec.status, CardStatus::Testing);
        assert!(rec.test_choice_passed);
        assert_eq!(rec.version, 2);
        assert_eq!(store.list_logs(user, Some(card)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path()).await;
        let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        track_deck(&store, user, deck, &[card], now).await.unwrap();

        let update = CardStateUpdate {
            updated_at: now,
            ..Default::default()
        };
        store.apply_update(user, card, &update, 0).await.unwrap();
        let err = store.apply_update(user, card, &update, 0).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path()).await;
        let (user, deck, card) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        track_deck(&store, user, deck, &[card], now).await.unwrap();
        submit_event(&store, user, card, Event::MarkKnow, now).await.unwrap();

        // A directory where the store file should be makes the rename fail.
        let file = dir.path().join("store.json");
        fs::remove_file(&file).unwrap();
        fs::create_dir(&file).unwrap();

        let test = Event::PrimaryTest {
            check: CheckType::Choice,
            correct: true,
        };
        let err = submit_event(&store, user, card, test, now).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));

        let rec = store.get_state(user, card).await.unwrap().unwrap();
        assert_eq!(rec.version, 1);
        assert_eq!(rec.status, CardStatus::Learning);
        assert_eq!(store.list_logs(user, Some(card)).await.unwrap().len(), 1);

        // The next successful write must not resurrect the failed transition.
        fs::remove_dir(&file).unwrap();
        submit_event(&store, user, card, Event::MarkKnow, now).await.unwrap();
        drop(store);

        let store = open_in(dir.path()).await;
        let rec = store.get_state(user, card).await.unwrap().unwrap();
        assert_eq!(rec.version, 2);
        assert!(!rec.test_choice_passed);
        assert_eq!(store.list_logs(user, Some(card)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn backups_are_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path()).await;
        let user = Uuid::new_v4();
        let deck = Uuid::new_v4();
        for _ in 0..6 {
            track_deck(&store, user, deck, &[Uuid::new_v4()], Utc::now())
                .await
                .unwrap();
        }
        let backups = fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert!(backups <= 3);
        assert!(store.path().exists());
    }
}
