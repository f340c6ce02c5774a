//! In-memory stores, used for tests and when durability is not needed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conversation::{Session, UserId};
use crate::error::DatabaseError;
use crate::store::traits::{AnswerSink, SessionStore, StoredAnswer};

/// Session store backed by a `HashMap` behind a tokio `RwLock`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, user: &UserId) -> Result<Option<Session>, DatabaseError> {
        Ok(self.sessions.read().await.get(user).cloned())
    }

    async fn put(&self, session: &Session) -> Result<(), DatabaseError> {
        self.sessions
            .write()
            .await
            .insert(session.user.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, user: &UserId) -> Result<bool, DatabaseError> {
        Ok(self.sessions.write().await.remove(user).is_some())
    }
}

/// Answer sink that keeps records in a `Vec`.
#[derive(Default)]
pub struct MemoryAnswerSink {
    answers: RwLock<Vec<StoredAnswer>>,
}

impl MemoryAnswerSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnswerSink for MemoryAnswerSink {
    async fn persist(
        &self,
        user: &UserId,
        session_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(), DatabaseError> {
        self.answers.write().await.push(StoredAnswer {
            id: Uuid::new_v4(),
            user: user.to_string(),
            session_id,
            question: question.to_string(),
            answer: answer.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn answers_for(&self, user: &UserId) -> Result<Vec<StoredAnswer>, DatabaseError> {
        let key = user.to_string();
        Ok(self
            .answers
            .read()
            .await
            .iter()
            .filter(|a| a.user == key)
            .cloned()
            .collect())
    }
}
