//! Speech records owned by a user. STT and TTS rows share one shape and
//! differ only in the table they live in.

use crate::database::{db_error, DatabaseUtils};
use crate::models::SpeechRecord;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use waypoint_common::{Page, PageRequest, Result, WaypointError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechKind {
    Stt,
    Tts,
}

impl SpeechKind {
    fn table(self) -> &'static str {
        match self {
            SpeechKind::Stt => "stt",
            SpeechKind::Tts => "tts",
        }
    }

    /// Message used when a record is missing or belongs to someone else.
    pub fn not_found_message(self) -> &'static str {
        match self {
            SpeechKind::Stt => "STT record not found",
            SpeechKind::Tts => "TTS record not found",
        }
    }
}

#[derive(Clone)]
pub struct SpeechRepository {
    pool: SqlitePool,
    kind: SpeechKind,
}

impl SpeechRepository {
    pub fn new(pool: SqlitePool, kind: SpeechKind) -> Self {
        Self { pool, kind }
    }

    pub fn kind(&self) -> SpeechKind {
        self.kind
    }

    pub async fn create(
        &self,
        user_id: i64,
        text: &str,
        audio: Option<Vec<u8>>,
    ) -> Result<SpeechRecord> {
        validate_text(text)?;

        let record = sqlx::query_as::<_, SpeechRecord>(&format!(
            "INSERT INTO {} (user_id, text, audio, created_at) VALUES (?, ?, ?, ?) \
             RETURNING id, user_id, text, audio, created_at",
            self.kind.table()
        ))
        .bind(user_id)
        .bind(text)
        .bind(audio)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create speech record", e))?;

        info!("Created {} record {} for user {}", self.kind.table(), record.id, user_id);
        Ok(record)
    }

    pub async fn find(&self, user_id: i64, id: i64) -> Result<Option<SpeechRecord>> {
        sqlx::query_as::<_, SpeechRecord>(&format!(
            "SELECT id, user_id, text, audio, created_at FROM {} WHERE id = ? AND user_id = ?",
            self.kind.table()
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load speech record", e))
    }

    /// The user's records, newest first.
    pub async fn list(&self, user_id: i64, page: PageRequest) -> Result<Page<SpeechRecord>> {
        self.fetch_page(user_id, None, page).await
    }

    pub async fn search(
        &self,
        user_id: i64,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<SpeechRecord>> {
        self.fetch_page(user_id, Some(DatabaseUtils::contains_pattern(term)), page)
            .await
    }

    async fn fetch_page(
        &self,
        user_id: i64,
        pattern: Option<String>,
        page: PageRequest,
    ) -> Result<Page<SpeechRecord>> {
        let table = self.kind.table();

        let mut count =
            QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {} WHERE user_id = ", table));
        count.push_bind(user_id);
        push_text_filter(&mut count, pattern.as_deref());
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count speech records", e))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT id, user_id, text, audio, created_at FROM {} WHERE user_id = ",
            table
        ));
        select.push_bind(user_id);
        push_text_filter(&mut select, pattern.as_deref());
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let records = select
            .build_query_as::<SpeechRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list speech records", e))?;

        Ok(Page::new(records, total, page))
    }

    /// Replaces the text and/or audio of one of the user's records.
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        text: Option<&str>,
        audio: Option<Vec<u8>>,
    ) -> Result<Option<SpeechRecord>> {
        if let Some(text) = text {
            validate_text(text)?;
        }

        sqlx::query_as::<_, SpeechRecord>(&format!(
            "UPDATE {} SET text = COALESCE(?, text), audio = COALESCE(?, audio) \
             WHERE id = ? AND user_id = ? RETURNING id, user_id, text, audio, created_at",
            self.kind.table()
        ))
        .bind(text)
        .bind(audio)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update speech record", e))
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ? AND user_id = ?",
            self.kind.table()
        ))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete speech record", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(WaypointError::Validation(
            "text must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn push_text_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, pattern: Option<&'a str>) {
    if let Some(pattern) = pattern {
        builder
            .push(" AND text LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\'");
    }
}
