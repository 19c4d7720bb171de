use chrono::{DateTime, Utc};
use flashgate_core::{
    repo::CardStateRepository, CardId, CardStateRecord, CardStateUpdate, CardStatus, CheckType,
    CoreError, DeckId, LogKind, ReviewLog, UserId,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::path::Path;
use tracing::debug;

const STATE_COLUMNS: &str = "user_id,card_id,deck_id,status,ease_factor,interval_days,next_review_at,\
     reviews_count,correct_streak,lapses_count,\
     test_choice_passed,test_audio_passed,test_dictation_passed,\
     test_choice_attempts,test_audio_attempts,test_dictation_attempts,\
     marked_know_at,last_seen_in_study,last_test_type,last_test_result,graduated_at,\
     version,created_at,updated_at";

const LOG_COLUMNS: &str =
    "id,user_id,card_id,kind,check_type,correct,status_after,interval_after,ease_after,at";

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(repo)
    }

    pub async fn open_memory() -> Result<Self, CoreError> {
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        CREATE TABLE IF NOT EXISTS card_states (
          user_id                  TEXT    NOT NULL,
          card_id                  TEXT    NOT NULL,
          deck_id                  TEXT    NOT NULL,
          status                   TEXT    NOT NULL DEFAULT 'new',
          ease_factor              REAL    NOT NULL DEFAULT 2.5,
          interval_days            INTEGER NOT NULL DEFAULT 1,
          next_review_at           TEXT,
          reviews_count            INTEGER NOT NULL DEFAULT 0,
          correct_streak           INTEGER NOT NULL DEFAULT 0,
          lapses_count             INTEGER NOT NULL DEFAULT 0,
          test_choice_passed       INTEGER NOT NULL DEFAULT 0,
          test_audio_passed        INTEGER NOT NULL DEFAULT 0,
          test_dictation_passed    INTEGER NOT NULL DEFAULT 0,
          test_choice_attempts     INTEGER NOT NULL DEFAULT 0,
          test_audio_attempts      INTEGER NOT NULL DEFAULT 0,
          test_dictation_attempts  INTEGER NOT NULL DEFAULT 0,
          marked_know_at           TEXT,
          last_seen_in_study       TEXT,
          last_test_type           TEXT,
          last_test_result         INTEGER,
          graduated_at             TEXT,
          version                  INTEGER NOT NULL DEFAULT 0,
          created_at               TEXT    NOT NULL,
          updated_at               TEXT    NOT NULL,
          PRIMARY KEY (user_id, card_id)
        );

        CREATE TABLE IF NOT EXISTS review_logs (
          id              TEXT PRIMARY KEY,
          user_id         TEXT    NOT NULL,
          card_id         TEXT    NOT NULL,
          kind            TEXT    NOT NULL,
          check_type      TEXT,
          correct         INTEGER NOT NULL,
          status_after    TEXT    NOT NULL,
          interval_after  INTEGER,
          ease_after      REAL    NOT NULL,
          at              TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_states_user_deck ON card_states (user_id, deck_id);
        CREATE INDEX IF NOT EXISTS idx_logs_user_card_time ON review_logs (user_id, card_id, at);
        "#;

        // Execute statements one by one for compatibility.
        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|_| CoreError::Storage("sqlite schema"))?;
        }
        Ok(())
    }
}

async fn fetch_state(
    conn: &mut SqliteConnection,
    user_id: UserId,
    card_id: CardId,
) -> Result<Option<CardStateRecord>, CoreError> {
    let row = sqlx::query(&format!(
        "SELECT {STATE_COLUMNS} FROM card_states WHERE user_id=? AND card_id=?"
    ))
    .bind(user_id.to_string())
    .bind(card_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|_| CoreError::Storage("read card state"))?;
    row.map(row_into_state).transpose()
}

/// Versioned merge of `update`; the caller owns the surrounding transaction.
async fn write_update(
    conn: &mut SqliteConnection,
    user_id: UserId,
    card_id: CardId,
    update: &CardStateUpdate,
    expected_version: u64,
) -> Result<CardStateRecord, CoreError> {
    let mut rec = fetch_state(&mut *conn, user_id, card_id)
        .await?
        .ok_or(CoreError::NotFound("card state"))?;
    if rec.version != expected_version {
        return Err(CoreError::Conflict("card state changed concurrently"));
    }
    update.apply_to(&mut rec);

    let res = sqlx::query(
        r#"
        UPDATE card_states SET
          status=?, ease_factor=?, interval_days=?, next_review_at=?,
          reviews_count=?, correct_streak=?, lapses_count=?,
          test_choice_passed=?, test_audio_passed=?, test_dictation_passed=?,
          test_choice_attempts=?, test_audio_attempts=?, test_dictation_attempts=?,
          marked_know_at=?, last_seen_in_study=?, last_test_type=?, last_test_result=?,
          graduated_at=?, version=?, updated_at=?
        WHERE user_id=? AND card_id=? AND version=?
        "#,
    )
    .bind(rec.status.as_str())
    .bind(rec.ease_factor as f64)
    .bind(rec.interval_days as i64)
    .bind(rec.next_review_at.map(dt_to_str))
    .bind(rec.reviews_count as i64)
    .bind(rec.correct_streak as i64)
    .bind(rec.lapses_count as i64)
    .bind(bool_to_i(rec.test_choice_passed))
    .bind(bool_to_i(rec.test_audio_passed))
    .bind(bool_to_i(rec.test_dictation_passed))
    .bind(rec.test_choice_attempts as i64)
    .bind(rec.test_audio_attempts as i64)
    .bind(rec.test_dictation_attempts as i64)
    .bind(rec.marked_know_at.map(dt_to_str))
    .bind(rec.last_seen_in_study.map(dt_to_str))
    .bind(rec.last_test_type.map(|c| c.as_str()))
    .bind(rec.last_test_result.map(bool_to_i))
    .bind(rec.graduated_at.map(dt_to_str))
    .bind(rec.version as i64)
    .bind(dt_to_str(rec.updated_at))
    .bind(user_id.to_string())
    .bind(card_id.to_string())
    .bind(expected_version as i64)
    .execute(&mut *conn)
    .await
    .map_err(|_| CoreError::Storage("update card state"))?;
    if res.rows_affected() == 0 {
        return Err(CoreError::Conflict("card state changed concurrently"));
    }

    Ok(rec)
}

async fn write_log(conn: &mut SqliteConnection, log: &ReviewLog) -> Result<(), CoreError> {
    sqlx::query(&format!(
        "INSERT INTO review_logs ({LOG_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?)"
    ))
    .bind(log.id.to_string())
    .bind(log.user_id.to_string())
    .bind(log.card_id.to_string())
    .bind(log.kind.as_str())
    .bind(log.check_type.map(|c| c.as_str()))
    .bind(bool_to_i(log.correct))
    .bind(log.status_after.as_str())
    .bind(log.interval_after.map(|i| i as i64))
    .bind(log.ease_after as f64)
    .bind(dt_to_str(log.at))
    .execute(&mut *conn)
    .await
    .map_err(|_| CoreError::Storage("insert log"))?;
    Ok(())
}

#[async_trait::async_trait]
impl CardStateRepository for SqliteRepo {
    // ===== Card states =====
    async fn ensure_deck_states(
        &self,
        user_id: UserId,
        deck_id: DeckId,
        cards: &[CardId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;

        let mut v = Vec::with_capacity(cards.len());
        for &card_id in cards {
            sqlx::query(
                r#"INSERT OR IGNORE INTO card_states (user_id, card_id, deck_id, created_at, updated_at)
                   VALUES (?,?,?,?,?)"#,
            )
            .bind(user_id.to_string())
            .bind(card_id.to_string())
            .bind(deck_id.to_string())
            .bind(dt_to_str(now))
            .bind(dt_to_str(now))
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("insert card state"))?;

            let rec = fetch_state(&mut *tx, user_id, card_id)
                .await?
                .ok_or(CoreError::Storage("card state vanished"))?;
            v.push(rec);
        }

        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(v)
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardStateRecord>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STATE_COLUMNS} FROM card_states WHERE user_id=? AND card_id=?"
        ))
        .bind(user_id.to_string())
        .bind(card_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("read card state"))?;
        row.map(row_into_state).transpose()
    }

    async fn list_states(
        &self,
        user_id: UserId,
        deck_id: Option<DeckId>,
    ) -> Result<Vec<CardStateRecord>, CoreError> {
        let rows = if let Some(did) = deck_id {
            sqlx::query(&format!(
                "SELECT {STATE_COLUMNS} FROM card_states WHERE user_id=? AND deck_id=? \
                 ORDER BY created_at ASC, card_id ASC"
            ))
            .bind(user_id.to_string())
            .bind(did.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list card states"))?
        } else {
            sqlx::query(&format!(
                "SELECT {STATE_COLUMNS} FROM card_states WHERE user_id=? \
                 ORDER BY created_at ASC, card_id ASC"
            ))
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list card states"))?
        };
        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            v.push(row_into_state(row)?);
        }
        Ok(v)
    }

    async fn apply_update(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
    ) -> Result<CardStateRecord, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;
        let rec = write_update(&mut *tx, user_id, card_id, update, expected_version).await?;
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(rec)
    }

    async fn commit_transition(
        &self,
        user_id: UserId,
        card_id: CardId,
        update: &CardStateUpdate,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<CardStateRecord, CoreError> {
        // Dropping `tx` on any error rolls both writes back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;
        let rec = write_update(&mut *tx, user_id, card_id, update, expected_version).await?;
        write_log(&mut *tx, log).await?;
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(rec)
    }

    async fn delete_deck_states(&self, user_id: UserId, deck_id: DeckId) -> Result<u64, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;

        sqlx::query(
            "DELETE FROM review_logs WHERE user_id=? AND card_id IN \
             (SELECT card_id FROM card_states WHERE user_id=? AND deck_id=?)",
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .bind(deck_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("del logs"))?;

        let res = sqlx::query("DELETE FROM card_states WHERE user_id=? AND deck_id=?")
            .bind(user_id.to_string())
            .bind(deck_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del card states"))?;

        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(res.rows_affected())
    }

    // ===== Logs =====
    async fn insert_log(&self, log: &ReviewLog) -> Result<(), CoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        write_log(&mut *conn, log).await
    }

    async fn list_logs(
        &self,
        user_id: UserId,
        card_id: Option<CardId>,
    ) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = if let Some(cid) = card_id {
            sqlx::query(&format!(
                "SELECT {LOG_COLUMNS} FROM review_logs WHERE user_id=? AND card_id=? ORDER BY at ASC, rowid ASC"
            ))
            .bind(user_id.to_string())
            .bind(cid.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list logs"))?
        } else {
            sqlx::query(&format!(
                "SELECT {LOG_COLUMNS} FROM review_logs WHERE user_id=? ORDER BY at ASC, rowid ASC"
            ))
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list logs"))?
        };
        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            v.push(row_into_log(row)?);
        }
        Ok(v)
    }
}

// ===== Helpers =====
fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Invalid("uuid"))
}

// Fixed-width UTC form so text ordering matches time ordering.
fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Invalid("datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>, CoreError> {
    s.map(dt_from_str).transpose()
}

fn bool_to_i(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

// Typed column read; a missing column or a type mismatch is a storage error.
fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, CoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|_| CoreError::Storage("decode row"))
}

fn count(row: &SqliteRow, name: &str) -> Result<u32, CoreError> {
    let v = col::<i64>(row, name)?;
    Ok(u32::try_from(v.max(0)).unwrap_or(u32::MAX))
}

fn flag(row: &SqliteRow, name: &str) -> Result<bool, CoreError> {
    Ok(col::<i64>(row, name)? != 0)
}

fn check_type(s: Option<String>) -> Result<Option<CheckType>, CoreError> {
    s.map(|s| s.parse::<CheckType>()).transpose()
}

fn row_into_state(row: SqliteRow) -> Result<CardStateRecord, CoreError> {
    Ok(CardStateRecord {
        user_id: uuid_from_str(col(&row, "user_id")?)?,
        card_id: uuid_from_str(col(&row, "card_id")?)?,
        deck_id: uuid_from_str(col(&row, "deck_id")?)?,
        status: col::<String>(&row, "status")?.parse::<CardStatus>()?,
        ease_factor: col::<f64>(&row, "ease_factor")? as f32,
        interval_days: count(&row, "interval_days")?,
        next_review_at: opt_dt(col(&row, "next_review_at")?)?,
        reviews_count: count(&row, "reviews_count")?,
        correct_streak: count(&row, "correct_streak")?,
        lapses_count: count(&row, "lapses_count")?,
        test_choice_passed: flag(&row, "test_choice_passed")?,
        test_audio_passed: flag(&row, "test_audio_passed")?,
        test_dictation_passed: flag(&row, "test_dictation_passed")?,
        test_choice_attempts: count(&row, "test_choice_attempts")?,
        test_audio_attempts: count(&row, "test_audio_attempts")?,
        test_dictation_attempts: count(&row, "test_dictation_attempts")?,
        marked_know_at: opt_dt(col(&row, "marked_know_at")?)?,
        last_seen_in_study: opt_dt(col(&row, "last_seen_in_study")?)?,
        last_test_type: check_type(col(&row, "last_test_type")?)?,
        last_test_result: col::<Option<i64>>(&row, "last_test_result")?.map(|i| i != 0),
        graduated_at: opt_dt(col(&row, "graduated_at")?)?,
        version: col::<i64>(&row, "version")?.max(0) as u64,
        created_at: dt_from_str(col(&row, "created_at")?)?,
        updated_at: dt_from_str(col(&row, "updated_at")?)?,
    })
}

fn row_into_log(row: SqliteRow) -> Result<ReviewLog, CoreError> {
    Ok(ReviewLog {
        id: uuid_from_str(col(&row, "id")?)?,
        user_id: uuid_from_str(col(&row, "user_id")?)?,
        card_id: uuid_from_str(col(&row, "card_id")?)?,
        kind: LogKind::parse(&col::<String>(&row, "kind")?).ok_or(CoreError::Invalid("log kind"))?,
        check_type: check_type(col(&row, "check_type")?)?,
        correct: flag(&row, "correct")?,
        status_after: col::<String>(&row, "status_after")?.parse::<CardStatus>()?,
        interval_after: col::<Option<i64>>(&row, "interval_after")?
            .map(|i| u32::try_from(i.max(0)).unwrap_or(u32::MAX)),
        ease_after: col::<f64>(&row, "ease_after")? as f32,
        at: dt_from_str(col(&row, "at")?)?,
    })
}
