//! User-facing texts of the conversation.

use super::effect::ChoiceOption;
use super::event::Action;
use super::session::{Segment, Stage};

pub const WELCOME: &str = "Welcome! Please choose a category:";
pub const DIALOG_START: &str =
    "Thank you for your answers! Starting the dialog with the assistant. Ask your question.";
pub const ASSISTANT_FAILURE: &str = "An error occurred while contacting the assistant.";
pub const CHOOSE_ACTION: &str = "Choose an action:";
pub const CLOSING: &str = "Dialog finished.";
pub const CONTACT_MANAGER: &str = "A manager will contact you shortly.";
pub const ADDITIONAL_QUESTION: &str = "Please ask your additional question.";
pub const ACTION_NOT_RECOGNIZED: &str = "Action not recognized.";
pub const NO_SESSION: &str = "Send /start to begin.";
pub const CHOOSE_SEGMENT_FIRST: &str = "Please choose a category using the buttons above.";
pub const SESSION_ENDED: &str = "This dialog has ended. Send /start to begin again.";

/// Payment link used when none is configured.
pub const DEFAULT_PAYMENT_URL: &str = "https://your-payment-link.example.com";

/// Acknowledgement shown in place of the category keyboard.
pub fn segment_selected(segment: Segment) -> String {
    format!("You selected: {segment}. Let's start the questionnaire.")
}

/// Diagnostic for a button or text that does not apply to `stage`.
pub fn not_applicable(what: &str, stage: Stage) -> String {
    let hint = match stage {
        Stage::AwaitingSegment => CHOOSE_SEGMENT_FIRST,
        Stage::InQuestionnaire => "Please answer the current question.",
        Stage::InAssistedDialog => "Ask the assistant a question or pick an action.",
        Stage::Ended => SESSION_ENDED,
    };
    format!("{what} is not available right now, no action taken. {hint}")
}

/// Reply to a command the bot does not know.
pub fn unknown_command(command: &str) -> String {
    format!("Unknown command {command}. Use /start to begin or /cancel to finish.")
}

pub fn proceed_payment(payment_url: &str) -> String {
    format!("Proceed to payment: [link]({payment_url})")
}

pub fn segment_options() -> Vec<ChoiceOption> {
    Segment::ALL
        .iter()
        .map(|s| ChoiceOption::new(s.callback_data(), s.label()))
        .collect()
}

pub fn action_options() -> Vec<ChoiceOption> {
    Action::OFFERED
        .iter()
        .map(|a| ChoiceOption::new(a.id(), a.label()))
        .collect()
}
