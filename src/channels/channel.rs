//! Channel trait and the outbound message vocabulary.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::conversation::{ChoiceOption, Effect, InboundEvent, MessageRef, UserId};
use crate::error::ChannelError;

/// Stream of normalized events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A message to deliver to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    Choice {
        prompt: String,
        options: Vec<ChoiceOption>,
    },
    /// Replace an earlier message; sent as a new one when `message_ref` is
    /// absent or the edit fails.
    Edit {
        message_ref: Option<MessageRef>,
        text: String,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Split a transport effect into recipient and message.
    pub fn from_effect(effect: Effect) -> Option<(UserId, Self)> {
        match effect {
            Effect::SendText { user, text } => Some((user, Self::Text { text })),
            Effect::SendChoice {
                user,
                prompt,
                options,
            } => Some((user, Self::Choice { prompt, options })),
            Effect::EditMessage {
                user,
                message_ref,
                text,
            } => Some((user, Self::Edit { message_ref, text })),
            Effect::PersistAnswer { .. }
            | Effect::NotifyLead { .. }
            | Effect::NotifyContact { .. }
            | Effect::RequestCompletion { .. } => None,
        }
    }
}

/// A chat transport.
///
/// Implementations turn raw platform input into [`InboundEvent`]s and
/// deliver [`OutboundMessage`]s. User ids they emit carry the channel's
/// `name()` so replies can be routed back.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, also the `UserId::channel` of its users.
    fn name(&self) -> &str;

    /// Start listening. Called once.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver a message to `user`.
    async fn send(&self, user: &UserId, message: OutboundMessage) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ContactDetails;
    use uuid::Uuid;

    #[test]
    fn transport_effects_convert() {
        let user = UserId::new("web", "u");
        let (to, msg) = OutboundMessage::from_effect(Effect::send_text(&user, "hi")).unwrap();
        assert_eq!(to, user);
        assert_eq!(msg, OutboundMessage::text("hi"));

        let edit = Effect::EditMessage {
            user: user.clone(),
            message_ref: None,
            text: "done".into(),
        };
        assert!(matches!(
            OutboundMessage::from_effect(edit),
            Some((_, OutboundMessage::Edit { message_ref: None, .. }))
        ));
    }

    #[test]
    fn non_transport_effects_are_skipped() {
        let user = UserId::new("web", "u");
        let effect = Effect::RequestCompletion {
            user: user.clone(),
            session_id: Uuid::new_v4(),
            prompt: "q".into(),
        };
        assert!(OutboundMessage::from_effect(effect).is_none());

        let effect = Effect::NotifyContact {
            user,
            contact: ContactDetails::default(),
        };
        assert!(OutboundMessage::from_effect(effect).is_none());
    }
}
