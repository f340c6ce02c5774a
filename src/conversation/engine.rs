//! Pure transition function of the conversation.
//!
//! Given the user's current session (if any) and one inbound event, the
//! engine decides the next session state and the effects to run. It performs
//! no I/O: the caller commits the new session first and only then executes
//! the effects, so a failed commit leaves nothing half-applied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::effect::{Effect, LeadSummary};
use super::event::{Action, Event, InboundEvent, MessageRef};
use super::prompts;
use super::questions::QuestionSet;
use super::session::{Segment, Session, Stage, UserId};

/// What happens to the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// Leave the store untouched.
    Unchanged,
    /// Write this session, replacing any previous one for the user.
    Put(Session),
    /// Remove the user's session.
    Delete,
}

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub session: SessionChange,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged() -> Self {
        Self {
            session: SessionChange::Unchanged,
            effects: Vec::new(),
        }
    }

    fn put(session: Session) -> Self {
        Self {
            session: SessionChange::Put(session),
            effects: Vec::new(),
        }
    }

    fn delete() -> Self {
        Self {
            session: SessionChange::Delete,
            effects: Vec::new(),
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// The session as it will be after commit, given the one before.
    pub fn resulting<'a>(&'a self, before: Option<&'a Session>) -> Option<&'a Session> {
        match &self.session {
            SessionChange::Unchanged => before,
            SessionChange::Put(session) => Some(session),
            SessionChange::Delete => None,
        }
    }
}

/// The conversation state machine.
#[derive(Debug, Clone)]
pub struct Engine {
    questions: Arc<QuestionSet>,
    payment_url: String,
}

impl Engine {
    pub fn new(questions: Arc<QuestionSet>, payment_url: impl Into<String>) -> Self {
        Self {
            questions,
            payment_url: payment_url.into(),
        }
    }

    /// Decide the next state for `inbound` against the user's `current`
    /// session. Same inputs always give the same output, apart from the
    /// random id of a newly started session.
    pub fn transition(
        &self,
        current: Option<&Session>,
        inbound: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Transition {
        let user = &inbound.user;
        debug!(
            user = %user,
            event = inbound.event.kind(),
            stage = ?current.map(Session::stage),
            "Conversation transition"
        );

        match (current, &inbound.event) {
            // A start always supersedes whatever came before.
            (_, Event::StartRequested) => Transition::put(Session::new(user.clone(), now))
                .with_effect(Effect::SendChoice {
                    user: user.clone(),
                    prompt: prompts::WELCOME.to_string(),
                    options: prompts::segment_options(),
                }),

            // Commands are never answers or questions.
            (_, Event::UnknownCommand { command }) => Transition::unchanged()
                .with_effect(Effect::send_text(user, prompts::unknown_command(command))),

            // Nobody can reach this session any more.
            (Some(_), Event::Disconnected) => Transition::delete(),
            (None, Event::Disconnected) => Transition::unchanged(),

            (Some(session), Event::ContactProvided { contact }) if !session.stage().is_terminal() => {
                Transition::unchanged().with_effect(Effect::NotifyContact {
                    user: user.clone(),
                    contact: contact.clone(),
                })
            }
            (_, Event::ContactProvided { .. }) => {
                debug!(user = %user, "Contact details without an active session ignored");
                Transition::unchanged()
            }

            (None, Event::CancelRequested) => {
                Transition::unchanged().with_effect(Effect::send_text(user, prompts::CLOSING))
            }
            // Reply for a session that no longer exists.
            (None, Event::AssistantReplied { .. }) => Transition::unchanged(),
            (None, _) => {
                Transition::unchanged().with_effect(Effect::send_text(user, prompts::NO_SESSION))
            }

            (Some(session), Event::CancelRequested) => self.cancel(session, now),
            (Some(session), Event::SegmentSelected { segment, message_ref }) => {
                self.select_segment(session, *segment, message_ref.as_ref(), now)
            }
            (Some(session), Event::TextReceived { text }) => self.text(session, text, now),
            (Some(session), Event::ActionSelected { action, message_ref }) => {
                self.action(session, action, message_ref.as_ref())
            }
            (Some(session), Event::AssistantReplied { session_id, reply }) => {
                if session.id != *session_id || session.stage() != Stage::InAssistedDialog {
                    debug!(user = %user, "Dropping assistant reply for a superseded dialog");
                    return Transition::unchanged();
                }
                let text = match reply {
                    Ok(text) => text.clone(),
                    Err(_) => prompts::ASSISTANT_FAILURE.to_string(),
                };
                Transition::unchanged()
                    .with_effect(Effect::send_text(user, text))
                    .with_effect(Effect::SendChoice {
                        user: user.clone(),
                        prompt: prompts::CHOOSE_ACTION.to_string(),
                        options: prompts::action_options(),
                    })
            }
        }
    }

    fn cancel(&self, session: &Session, now: DateTime<Utc>) -> Transition {
        let closing = Effect::send_text(&session.user, prompts::CLOSING);
        if session.stage().is_terminal() {
            return Transition::unchanged().with_effect(closing);
        }
        let mut next = session.clone();
        match next.advance_to(Stage::Ended, now) {
            Ok(()) => Transition::put(next).with_effect(closing),
            Err(e) => invariant_violation(&session.user, &e),
        }
    }

    fn select_segment(
        &self,
        session: &Session,
        segment: Segment,
        message_ref: Option<&MessageRef>,
        now: DateTime<Utc>,
    ) -> Transition {
        let user = &session.user;
        if session.stage() != Stage::AwaitingSegment {
            return Transition::unchanged().with_effect(Effect::send_text(
                user,
                prompts::not_applicable("Category selection", session.stage()),
            ));
        }
        let Some(first_question) = self.questions.get(0) else {
            return invariant_violation(user, "question set is empty");
        };

        let mut next = session.clone();
        if let Err(e) = next.select_segment(segment, now) {
            return invariant_violation(user, &e);
        }
        Transition::put(next)
            .with_effect(Effect::EditMessage {
                user: user.clone(),
                message_ref: message_ref.cloned(),
                text: prompts::segment_selected(segment),
            })
            .with_effect(Effect::send_text(user, first_question))
    }

    fn text(&self, session: &Session, text: &str, now: DateTime<Utc>) -> Transition {
        let user = &session.user;
        match session.stage() {
            Stage::AwaitingSegment => Transition::unchanged()
                .with_effect(Effect::send_text(user, prompts::CHOOSE_SEGMENT_FIRST)),
            Stage::Ended => {
                Transition::unchanged().with_effect(Effect::send_text(user, prompts::SESSION_ENDED))
            }
            Stage::InAssistedDialog => Transition::unchanged().with_effect(Effect::RequestCompletion {
                user: user.clone(),
                session_id: session.id,
                prompt: text.to_string(),
            }),
            Stage::InQuestionnaire => self.answer(session, text, now),
        }
    }

    fn answer(&self, session: &Session, text: &str, now: DateTime<Utc>) -> Transition {
        let user = &session.user;
        let index = session.next_question_index();
        let Some(question) = self.questions.get(index) else {
            return invariant_violation(user, "questionnaire already complete");
        };
        let Some(segment) = session.segment() else {
            return invariant_violation(user, "questionnaire started without a segment");
        };

        let mut next = session.clone();
        if let Err(e) = next.record_answer(question, text, now) {
            return invariant_violation(user, &e);
        }
        let persist = Effect::PersistAnswer {
            user: user.clone(),
            session_id: session.id,
            question: question.to_string(),
            answer: text.to_string(),
        };

        if let Some(next_question) = self.questions.get(index + 1) {
            return Transition::put(next)
                .with_effect(persist)
                .with_effect(Effect::send_text(user, next_question));
        }

        if let Err(e) = next.advance_to(Stage::InAssistedDialog, now) {
            return invariant_violation(user, &e);
        }
        let summary = LeadSummary::new(user.clone(), segment, next.answers());
        Transition::put(next)
            .with_effect(persist)
            .with_effect(Effect::NotifyLead {
                user: user.clone(),
                summary,
            })
            .with_effect(Effect::send_text(user, prompts::DIALOG_START))
    }

    fn action(
        &self,
        session: &Session,
        action: &Action,
        message_ref: Option<&MessageRef>,
    ) -> Transition {
        let user = &session.user;
        if session.stage() != Stage::InAssistedDialog {
            return Transition::unchanged().with_effect(Effect::send_text(
                user,
                prompts::not_applicable("This action", session.stage()),
            ));
        }
        let text = match action {
            Action::ContactManager => prompts::CONTACT_MANAGER.to_string(),
            Action::ProceedPayment => prompts::proceed_payment(&self.payment_url),
            Action::AdditionalQuestion => prompts::ADDITIONAL_QUESTION.to_string(),
            Action::Unrecognized(_) => prompts::ACTION_NOT_RECOGNIZED.to_string(),
        };
        Transition::unchanged().with_effect(Effect::EditMessage {
            user: user.clone(),
            message_ref: message_ref.cloned(),
            text,
        })
    }
}

fn invariant_violation(user: &UserId, reason: &str) -> Transition {
    error!(user = %user, reason, "Session invariant violated, event ignored");
    Transition::unchanged()
}
