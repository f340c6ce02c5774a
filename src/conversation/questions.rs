//! The fixed questionnaire, loaded once at startup.

use std::path::Path;

use crate::error::ConfigError;

/// Built-in questions used when no questions file is configured.
pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "What is your name?",
    "What is your experience in our field?",
    "How did you hear about us?",
];

/// Ordered, non-empty, immutable list of questionnaire prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<String>,
}

// Never empty.
#[allow(clippy::len_without_is_empty)]
impl QuestionSet {
    pub fn new<I, S>(questions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let questions: Vec<String> = questions.into_iter().map(Into::into).collect();
        if questions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "questions".into(),
                message: "the questionnaire needs at least one question".into(),
            });
        }
        if let Some(pos) = questions.iter().position(|q| q.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "questions".into(),
                message: format!("question {pos} is blank"),
            });
        }
        Ok(Self { questions })
    }

    /// Parse a JSON array of strings.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let questions: Vec<String> =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::new(questions)
    }

    /// Load a JSON array of strings from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }
}

impl Default for QuestionSet {
    fn default() -> Self {
        Self {
            questions: DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }
}
