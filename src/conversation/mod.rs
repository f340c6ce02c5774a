//! Conversation core: session model, events, effects and the pure engine.
//!
//! Nothing in here performs I/O. The runtime feeds inbound events through
//! [`Engine::transition`], commits the resulting session, then executes the
//! effects.

pub mod effect;
pub mod engine;
pub mod event;
pub mod prompts;
pub mod questions;
pub mod session;

#[cfg(test)]
mod proptests;

pub use effect::{ChoiceOption, ContactDetails, Effect, LeadAnswer, LeadSummary};
pub use engine::{Engine, SessionChange, Transition};
pub use event::{Action, Event, InboundEvent, MessageRef};
pub use questions::QuestionSet;
pub use session::{AnswerRecord, Segment, Session, Stage, UserId};
