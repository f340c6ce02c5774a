//! Per-user conversation session and its stage machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identity, scoped by the channel it arrived on.
///
/// Rendered as `"<channel>:<id>"`, e.g. `telegram:123456789`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId {
    pub channel: String,
    pub id: String,
}

impl UserId {
    pub fn new(channel: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
        }
    }

    /// Parse the `"<channel>:<id>"` form. The id may itself contain colons.
    pub fn parse(s: &str) -> Option<Self> {
        let (channel, id) = s.split_once(':')?;
        if channel.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(channel, id))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.id)
    }
}

/// The stages of a conversation.
///
/// Progresses linearly: AwaitingSegment → InQuestionnaire →
/// InAssistedDialog → Ended. `Ended` is also reachable from every stage
/// through a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingSegment,
    InQuestionnaire,
    InAssistedDialog,
    Ended,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (AwaitingSegment, InQuestionnaire)
                | (InQuestionnaire, InAssistedDialog)
                | (AwaitingSegment | InQuestionnaire | InAssistedDialog, Ended)
        )
    }

    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::AwaitingSegment
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingSegment => "awaiting_segment",
            Self::InQuestionnaire => "in_questionnaire",
            Self::InAssistedDialog => "in_assisted_dialog",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// The category a user picks before the questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Company,
    Individual,
}

impl Segment {
    pub const ALL: [Segment; 2] = [Segment::Company, Segment::Individual];

    /// Button payload carried by the category keyboard.
    pub fn callback_data(&self) -> &'static str {
        match self {
            Self::Company => "segment_company",
            Self::Individual => "segment_individual",
        }
    }

    /// Human-facing button label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Company => "Company",
            Self::Individual => "Individual",
        }
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.callback_data() == data)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Individual => write!(f, "individual"),
        }
    }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question: String,
    pub answer: String,
}

/// Persisted conversation state for one user.
///
/// Fields that carry invariants are private: `segment` is written once,
/// `answers` is append-only, and the next question index is always
/// `answers.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user: UserId,
    stage: Stage,
    segment: Option<Segment>,
    answers: Vec<AnswerRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Start a brand-new session in `AwaitingSegment`.
    pub fn new(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            stage: Stage::AwaitingSegment,
            segment: None,
            answers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn segment(&self) -> Option<Segment> {
        self.segment
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// Index of the question the user is expected to answer next.
    pub fn next_question_index(&self) -> usize {
        self.answers.len()
    }

    /// Move to `target`. Fails if the stage machine forbids it.
    pub fn advance_to(&mut self, target: Stage, now: DateTime<Utc>) -> Result<(), String> {
        if !self.stage.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.stage, target));
        }
        self.stage = target;
        self.updated_at = now;
        Ok(())
    }

    /// Record the chosen segment and enter the questionnaire.
    pub fn select_segment(&mut self, segment: Segment, now: DateTime<Utc>) -> Result<(), String> {
        if self.segment.is_some() {
            return Err("Segment already selected".to_string());
        }
        self.advance_to(Stage::InQuestionnaire, now)?;
        self.segment = Some(segment);
        Ok(())
    }

    /// Append the answer to the current question.
    pub fn record_answer(
        &mut self,
        question: &str,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<&AnswerRecord, String> {
        if self.stage != Stage::InQuestionnaire {
            return Err(format!("Cannot record an answer in stage {}", self.stage));
        }
        self.answers.push(AnswerRecord {
            question_index: self.answers.len(),
            question: question.to_string(),
            answer: answer.to_string(),
        });
        self.updated_at = now;
        Ok(&self.answers[self.answers.len() - 1])
    }
}
