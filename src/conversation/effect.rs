//! Effects produced by state transitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::MessageRef;
use super::session::{AnswerRecord, Segment, UserId};

/// One button of a choice prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Payload sent back when the button is pressed.
    pub id: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One question/answer pair as it appears in the lead payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAnswer {
    pub question: String,
    pub answer: String,
}

/// Completed-questionnaire summary handed to the lead notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSummary {
    pub user: UserId,
    pub segment: Segment,
    pub answers: Vec<LeadAnswer>,
}

impl LeadSummary {
    pub fn new(user: UserId, segment: Segment, answers: &[AnswerRecord]) -> Self {
        Self {
            user,
            segment,
            answers: answers
                .iter()
                .map(|a| LeadAnswer {
                    question: a.question.clone(),
                    answer: a.answer.clone(),
                })
                .collect(),
        }
    }

    /// The answer to the first question, which asks for the user's name.
    pub fn name(&self) -> &str {
        self.answers.first().map(|a| a.answer.as_str()).unwrap_or("")
    }

    /// User-readable deal title.
    pub fn title(&self) -> String {
        format!("Deal from user {}", self.name())
    }

    /// Serialized body stored alongside the deal.
    pub fn comments(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "segment": self.segment,
            "answers": self.answers,
        })
    }
}

/// Contact details a user left before starting the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactDetails {
    /// Blank fields are dropped; `None` if nothing is left.
    pub fn non_empty(self) -> Option<Self> {
        let keep = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        let contact = Self {
            name: keep(self.name),
            email: keep(self.email),
            phone: keep(self.phone),
        };
        (contact != Self::default()).then_some(contact)
    }

    /// User-readable deal title.
    pub fn title(&self) -> String {
        format!("Deal from user {}", self.name.as_deref().unwrap_or(""))
    }
}

/// Effects to be executed after a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a plain text message.
    SendText { user: UserId, text: String },

    /// Send a prompt with buttons.
    SendChoice {
        user: UserId,
        prompt: String,
        options: Vec<ChoiceOption>,
    },

    /// Replace the text of a previously sent message (falls back to a new
    /// message when the transport gave no reference).
    EditMessage {
        user: UserId,
        message_ref: Option<MessageRef>,
        text: String,
    },

    /// Append an answer to the durable answer store.
    PersistAnswer {
        user: UserId,
        session_id: Uuid,
        question: String,
        answer: String,
    },

    /// Forward a completed questionnaire to the CRM.
    NotifyLead { user: UserId, summary: LeadSummary },

    /// Forward contact details as an early lead.
    NotifyContact {
        user: UserId,
        contact: ContactDetails,
    },

    /// Ask the assistant for a reply; the result re-enters as
    /// `Event::AssistantReplied`.
    RequestCompletion {
        user: UserId,
        session_id: Uuid,
        prompt: String,
    },
}

impl Effect {
    pub fn send_text(user: &UserId, text: impl Into<String>) -> Self {
        Effect::SendText {
            user: user.clone(),
            text: text.into(),
        }
    }

    pub fn user(&self) -> &UserId {
        match self {
            Effect::SendText { user, .. }
            | Effect::SendChoice { user, .. }
            | Effect::EditMessage { user, .. }
            | Effect::PersistAnswer { user, .. }
            | Effect::NotifyLead { user, .. }
            | Effect::NotifyContact { user, .. }
            | Effect::RequestCompletion { user, .. } => user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<AnswerRecord> {
        vec![
            AnswerRecord {
                question_index: 0,
                question: "Name?".into(),
                answer: "Alice".into(),
            },
            AnswerRecord {
                question_index: 1,
                question: "Source?".into(),
                answer: "Referral".into(),
            },
        ]
    }

    #[test]
    fn lead_summary_title_uses_first_answer() {
        let summary = LeadSummary::new(UserId::new("web", "u1"), Segment::Company, &records());
        assert_eq!(summary.name(), "Alice");
        assert_eq!(summary.title(), "Deal from user Alice");
    }

    #[test]
    fn lead_summary_comments_shape() {
        let summary = LeadSummary::new(UserId::new("web", "u1"), Segment::Company, &records());
        let comments = summary.comments();
        assert_eq!(comments["segment"], "company");
        assert_eq!(comments["name"], "Alice");
        assert_eq!(comments["answers"][1]["question"], "Source?");
        assert_eq!(comments["answers"][1]["answer"], "Referral");
    }

    #[test]
    fn contact_blank_fields_are_dropped() {
        let contact = ContactDetails {
            name: Some(" Alice ".into()),
            email: Some("  ".into()),
            phone: None,
        };
        let contact = contact.non_empty().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Alice"));
        assert_eq!(contact.email, None);
        assert_eq!(contact.title(), "Deal from user Alice");
        assert_eq!(
            serde_json::to_value(&contact).unwrap(),
            serde_json::json!({"name": "Alice"})
        );

        let blank = ContactDetails {
            phone: Some("".into()),
            ..Default::default()
        };
        assert!(blank.non_empty().is_none());
    }

    #[test]
    fn lead_summary_without_answers_has_empty_name() {
        let summary = LeadSummary::new(UserId::new("web", "u1"), Segment::Individual, &[]);
        assert_eq!(summary.title(), "Deal from user ");
    }
}
