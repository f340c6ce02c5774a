//! Inbound events the engine reacts to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::effect::ContactDetails;
use super::session::{Segment, UserId};

/// Transport reference to a message that carried buttons, so the engine
/// can ask for that message to be edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat / conversation the message lives in.
    pub chat_id: String,
    /// Channel-native message id.
    pub message_id: String,
}

impl MessageRef {
    pub fn new(chat_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// Post-dialog actions offered after each assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ContactManager,
    ProceedPayment,
    AdditionalQuestion,
    /// Any payload that is not one of the above.
    Unrecognized(String),
}

impl Action {
    /// The actions shown on the keyboard, in display order.
    pub const OFFERED: [Action; 3] = [
        Action::ContactManager,
        Action::ProceedPayment,
        Action::AdditionalQuestion,
    ];

    pub fn parse(id: &str) -> Self {
        match id {
            "contact_manager" => Self::ContactManager,
            "proceed_payment" => Self::ProceedPayment,
            "additional_question" => Self::AdditionalQuestion,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::ContactManager => "contact_manager",
            Self::ProceedPayment => "proceed_payment",
            Self::AdditionalQuestion => "additional_question",
            Self::Unrecognized(id) => id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::ContactManager => "Contact a manager",
            Self::ProceedPayment => "Proceed to payment",
            Self::AdditionalQuestion => "Ask another question",
            Self::Unrecognized(id) => id,
        }
    }
}

/// Events that trigger state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The user invoked the entry command.
    StartRequested,
    /// The user pressed a category button.
    SegmentSelected {
        segment: Segment,
        message_ref: Option<MessageRef>,
    },
    /// The user sent free text.
    TextReceived { text: String },
    /// The user pressed a post-dialog action button.
    ActionSelected {
        action: Action,
        message_ref: Option<MessageRef>,
    },
    /// The user invoked the cancel command.
    CancelRequested,
    /// The user sent a command other than start or cancel.
    UnknownCommand { command: String },
    /// The user left contact details together with a start.
    ContactProvided { contact: ContactDetails },
    /// The transport connection behind this user is gone for good.
    Disconnected,
    /// The assistant finished a completion requested by `session_id`.
    AssistantReplied {
        session_id: Uuid,
        reply: Result<String, String>,
    },
}

impl Event {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextReceived { text: text.into() }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartRequested => "start_requested",
            Self::SegmentSelected { .. } => "segment_selected",
            Self::TextReceived { .. } => "text_received",
            Self::ActionSelected { .. } => "action_selected",
            Self::CancelRequested => "cancel_requested",
            Self::UnknownCommand { .. } => "unknown_command",
            Self::ContactProvided { .. } => "contact_provided",
            Self::Disconnected => "disconnected",
            Self::AssistantReplied { .. } => "assistant_replied",
        }
    }
}

/// An event tagged with the user it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: UserId,
    pub event: Event,
}

impl InboundEvent {
    pub fn new(user: UserId, event: Event) -> Self {
        Self { user, event }
    }
}
