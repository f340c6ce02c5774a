//! Storage traits: the per-user session store and the durable answer sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::conversation::{Session, UserId};
use crate::error::DatabaseError;

/// Keyed store holding at most one session per user.
///
/// The store does no validation and no locking of its own; callers are
/// expected to serialize read-modify-write cycles per user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user: &UserId) -> Result<Option<Session>, DatabaseError>;

    /// Insert or replace the user's session.
    async fn put(&self, session: &Session) -> Result<(), DatabaseError>;

    /// Remove the user's session. Returns whether one existed.
    async fn delete(&self, user: &UserId) -> Result<bool, DatabaseError>;
}

/// A persisted questionnaire answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAnswer {
    pub id: Uuid,
    pub user: String,
    pub session_id: Uuid,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only durable record of questionnaire answers.
#[async_trait]
pub trait AnswerSink: Send + Sync {
    async fn persist(
        &self,
        user: &UserId,
        session_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(), DatabaseError>;

    /// All answers recorded for `user`, oldest first.
    async fn answers_for(&self, user: &UserId) -> Result<Vec<StoredAnswer>, DatabaseError>;
}
