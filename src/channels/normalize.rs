//! Mapping of raw transport input onto the conversation's event vocabulary.

use crate::conversation::{Action, Event, MessageRef, Segment};

/// Command that starts (or restarts) a conversation.
pub const START_COMMAND: &str = "/start";
/// Command that ends the current conversation.
pub const CANCEL_COMMAND: &str = "/cancel";

/// Interpret a free-text message. Commands are recognized with or without
/// a `@botname` suffix. Any other `/word` is an unknown command and never
/// reaches the questionnaire; remaining text is passed through verbatim.
pub fn text_event(text: &str) -> Event {
    let command = text
        .split_whitespace()
        .next()
        .map(|word| word.split('@').next().unwrap_or(word));

    match command {
        Some(START_COMMAND) => Event::StartRequested,
        Some(CANCEL_COMMAND) => Event::CancelRequested,
        Some(word) if word.len() > 1 && word.starts_with('/') => Event::UnknownCommand {
            command: word.to_string(),
        },
        _ => Event::text(text),
    }
}

/// Interpret a button payload.
pub fn button_event(data: &str, message_ref: Option<MessageRef>) -> Event {
    match Segment::from_callback_data(data) {
        Some(segment) => Event::SegmentSelected {
            segment,
            message_ref,
        },
        None => Event::ActionSelected {
            action: Action::parse(data),
            message_ref,
        },
    }
}
