//! libSQL backend for sessions and questionnaire answers.
//!
//! Sessions are stored as JSON documents keyed by the rendered user id, with
//! the stage and session id duplicated into columns for ad-hoc queries.
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversation::{Session, UserId};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{AnswerSink, SessionStore, StoredAnswer};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    /// Open the database named by a `DATABASE_URL`-style location.
    pub async fn open(location: &str) -> Result<Self, DatabaseError> {
        if location == ":memory:" {
            Self::new_memory().await
        } else {
            Self::new_local(Path::new(location)).await
        }
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime('now') default
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a row of `ANSWER_COLUMNS` to a `StoredAnswer`.
///
/// Column order: 0:id, 1:user_id, 2:session_id, 3:question, 4:answer, 5:created_at
fn row_to_answer(row: &libsql::Row) -> Result<StoredAnswer, DatabaseError> {
    let get_text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("answer column {idx}: {e}")))
    };
    let parse_uuid = |idx: i32| -> Result<Uuid, DatabaseError> {
        let raw = get_text(idx)?;
        Uuid::parse_str(&raw)
            .map_err(|e| DatabaseError::Serialization(format!("answer column {idx} '{raw}': {e}")))
    };
    Ok(StoredAnswer {
        id: parse_uuid(0)?,
        user: get_text(1)?,
        session_id: parse_uuid(2)?,
        question: get_text(3)?,
        answer: get_text(4)?,
        created_at: parse_datetime(&get_text(5)?),
    })
}

const ANSWER_COLUMNS: &str = "id, user_id, session_id, question, answer, created_at";

// ── Sessions ────────────────────────────────────────────────────────

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn get(&self, user: &UserId) -> Result<Option<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT data FROM sessions WHERE user_id = ?1",
                params![user.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;
                let session: Session = serde_json::from_str(&data).map_err(|e| {
                    DatabaseError::Serialization(format!("session for {user}: {e}"))
                })?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn put(&self, session: &Session) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(session)
            .map_err(|e| DatabaseError::Serialization(format!("session {}: {e}", session.id)))?;

        self.conn()
            .execute(
                "INSERT INTO sessions (user_id, session_id, stage, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    session_id = excluded.session_id,
                    stage = excluded.stage,
                    data = excluded.data,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                params![
                    session.user.to_string(),
                    session.id.to_string(),
                    session.stage().to_string(),
                    data,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_session: {e}")))?;

        debug!(user = %session.user, stage = %session.stage(), "Session stored");
        Ok(())
    }

    async fn delete(&self, user: &UserId) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM sessions WHERE user_id = ?1",
                params![user.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(count > 0)
    }
}

// ── Answers ─────────────────────────────────────────────────────────

#[async_trait]
impl AnswerSink for LibSqlBackend {
    async fn persist(
        &self,
        user: &UserId,
        session_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO questionnaire_answers (id, user_id, session_id, question, answer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    user.to_string(),
                    session_id.to_string(),
                    question,
                    answer,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("persist_answer: {e}")))?;
        Ok(())
    }

    async fn answers_for(&self, user: &UserId) -> Result<Vec<StoredAnswer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM questionnaire_answers
                     WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![user.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("answers_for: {e}")))?;

        let mut answers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("answers_for: {e}")))?
        {
            answers.push(row_to_answer(&row)?);
        }
        Ok(answers)
    }
}
