//! Property-based tests for the conversation engine
//!
//! Random event sequences are replayed against a single user's session and
//! the session/effect invariants are checked after every step.

use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use super::effect::Effect;
use super::engine::{Engine, SessionChange};
use super::event::{Action, Event, InboundEvent, MessageRef};
use super::questions::QuestionSet;
use super::session::{Segment, Session, Stage, UserId};

// ============================================================================
// Test Helpers
// ============================================================================

fn user() -> UserId {
    UserId::new("telegram", "77")
}

fn engine(question_count: usize) -> Engine {
    let questions = (0..question_count).map(|i| format!("Question {i}?"));
    Engine::new(
        Arc::new(QuestionSet::new(questions).expect("non-empty question set")),
        "https://pay.example.com",
    )
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_segment() -> impl Strategy<Value = Segment> {
    prop_oneof![Just(Segment::Company), Just(Segment::Individual)]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::ContactManager),
        Just(Action::ProceedPayment),
        Just(Action::AdditionalQuestion),
        "[a-z_]{1,12}".prop_map(|id| Action::parse(&id)),
    ]
}

fn arb_message_ref() -> impl Strategy<Value = Option<MessageRef>> {
    proptest::option::of((1u32..1000).prop_map(|id| MessageRef::new("77", id.to_string())))
}

/// Events without assistant replies; replies are generated from the
/// session id in the driver so they can match or go stale.
fn arb_user_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        1 => Just(Event::StartRequested),
        2 => (arb_segment(), arb_message_ref())
            .prop_map(|(segment, message_ref)| Event::SegmentSelected { segment, message_ref }),
        5 => "[a-zA-Z ]{0,20}".prop_map(Event::text),
        2 => (arb_action(), arb_message_ref())
            .prop_map(|(action, message_ref)| Event::ActionSelected { action, message_ref }),
        1 => Just(Event::CancelRequested),
        1 => "/[a-z]{1,8}".prop_map(|command| Event::UnknownCommand { command }),
        1 => Just(Event::Disconnected),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    User(Event),
    /// Assistant reply for the current session (`true`) or a random one.
    Reply { current: bool, ok: bool },
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => arb_user_event().prop_map(Step::User),
        1 => (any::<bool>(), any::<bool>()).prop_map(|(current, ok)| Step::Reply { current, ok }),
    ]
}

fn to_event(step: Step, session: Option<&Session>) -> Event {
    match step {
        Step::User(event) => event,
        Step::Reply { current, ok } => Event::AssistantReplied {
            session_id: match (current, session) {
                (true, Some(s)) => s.id,
                _ => uuid::Uuid::new_v4(),
            },
            reply: if ok { Ok("reply".into()) } else { Err("failed".into()) },
        },
    }
}

// ============================================================================
// Invariant Checkers
// ============================================================================

fn session_is_valid(session: &Session, question_count: usize) -> Result<(), String> {
    if session.next_question_index() > question_count {
        return Err(format!("answered {} of {question_count}", session.next_question_index()));
    }
    for (i, answer) in session.answers().iter().enumerate() {
        if answer.question_index != i {
            return Err(format!("answer {i} has index {}", answer.question_index));
        }
    }
    match session.stage() {
        Stage::AwaitingSegment if session.segment().is_some() => {
            Err("segment set while awaiting segment".into())
        }
        Stage::InQuestionnaire | Stage::InAssistedDialog if session.segment().is_none() => {
            Err("questionnaire without segment".into())
        }
        Stage::InQuestionnaire if session.next_question_index() >= question_count => {
            Err("questionnaire stage with all questions answered".into())
        }
        Stage::InAssistedDialog if session.next_question_index() != question_count => {
            Err("dialog stage with unanswered questions".into())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Sessions stay valid and progress monotonically within one session id.
    #[test]
    fn prop_sessions_stay_valid(
        question_count in 1usize..5,
        steps in proptest::collection::vec(arb_step(), 0..40),
    ) {
        let engine = engine(question_count);
        let mut current: Option<Session> = None;

        for step in steps {
            let event = to_event(step, current.as_ref());
            let is_start = matches!(event, Event::StartRequested);
            let is_cancel = matches!(event, Event::CancelRequested);
            let is_disconnect = matches!(event, Event::Disconnected);
            let t = engine.transition(current.as_ref(), &InboundEvent::new(user(), event), Utc::now());

            for effect in &t.effects {
                prop_assert_eq!(effect.user(), &user());
            }

            if let SessionChange::Put(next) = &t.session {
                prop_assert_eq!(&next.user, &user());
                if let Err(reason) = session_is_valid(next, question_count) {
                    prop_assert!(false, "{}: {:?}", reason, next);
                }
                match &current {
                    Some(prev) if prev.id == next.id => {
                        prop_assert!(next.stage() >= prev.stage(), "stage went backward");
                        prop_assert!(next.answers().starts_with(prev.answers()), "answers rewritten");
                        if prev.segment().is_some() {
                            prop_assert_eq!(prev.segment(), next.segment());
                        }
                        if next.stage() == Stage::Ended {
                            prop_assert!(is_cancel, "ended without cancel");
                        }
                    }
                    _ => prop_assert!(is_start, "new session without start"),
                }
                current = Some(next.clone());
            }
            if t.session == SessionChange::Delete {
                prop_assert!(is_disconnect, "session deleted without disconnect");
                prop_assert!(t.effects.is_empty());
                current = None;
            }
        }
    }

    // Exactly one lead notification per session that completed the questionnaire.
    #[test]
    fn prop_one_notification_per_completed_session(
        question_count in 1usize..5,
        steps in proptest::collection::vec(arb_step(), 0..60),
    ) {
        let engine = engine(question_count);
        let mut current: Option<Session> = None;
        let mut notified: std::collections::HashMap<uuid::Uuid, usize> = Default::default();
        let mut completed = std::collections::HashSet::new();

        for step in steps {
            let event = to_event(step, current.as_ref());
            let t = engine.transition(current.as_ref(), &InboundEvent::new(user(), event), Utc::now());
            let after = t.resulting(current.as_ref()).cloned();

            let notifications = t
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::NotifyLead { .. }))
                .count();
            if notifications > 0 {
                let session = after.as_ref().expect("notification without session");
                prop_assert_eq!(session.stage(), Stage::InAssistedDialog);
                *notified.entry(session.id).or_default() += notifications;
            }
            if let Some(session) = &after {
                if session.next_question_index() == question_count {
                    completed.insert(session.id);
                }
            }
            current = after;
        }

        for (id, count) in &notified {
            prop_assert_eq!(*count, 1, "session {} notified {} times", id, count);
        }
        for id in &completed {
            prop_assert!(notified.contains_key(id), "completed session {} never notified", id);
        }
    }

    // Once ended, only a start or a disconnect changes the session or touches the store.
    #[test]
    fn prop_ended_is_inert(events in proptest::collection::vec(arb_user_event(), 1..20)) {
        let engine = engine(3);
        let now = Utc::now();
        let mut ended = Session::new(user(), now);
        ended.advance_to(Stage::Ended, now).expect("cancel from awaiting");

        for event in events {
            let resets = matches!(event, Event::StartRequested | Event::Disconnected);
            let t = engine.transition(Some(&ended), &InboundEvent::new(user(), event), now);
            if resets {
                continue;
            }
            prop_assert_eq!(&t.session, &SessionChange::Unchanged);
            for effect in &t.effects {
                prop_assert!(
                    !matches!(
                        effect,
                        Effect::PersistAnswer { .. }
                            | Effect::NotifyLead { .. }
                            | Effect::NotifyContact { .. }
                            | Effect::RequestCompletion { .. }
                    ),
                    "ended session produced {:?}",
                    effect
                );
            }
        }
    }

    // Every persisted answer corresponds to the question at the recorded index.
    #[test]
    fn prop_persisted_answers_match_questions(
        segment in arb_segment(),
        answers in proptest::collection::vec("[a-zA-Z ]{0,20}", 1..6),
    ) {
        let engine = engine(3);
        let now = Utc::now();
        let start = engine.transition(None, &InboundEvent::new(user(), Event::StartRequested), now);
        let mut current = t_session(start.session);
        let seg = engine.transition(
            current.as_ref(),
            &InboundEvent::new(user(), Event::SegmentSelected { segment, message_ref: None }),
            now,
        );
        current = seg.resulting(current.as_ref()).cloned();

        let mut persisted = Vec::new();
        for answer in answers {
            let t = engine.transition(current.as_ref(), &InboundEvent::new(user(), Event::text(answer)), now);
            for effect in &t.effects {
                if let Effect::PersistAnswer { question, answer, .. } = effect {
                    persisted.push((question.clone(), answer.clone()));
                }
            }
            current = t.resulting(current.as_ref()).cloned();
        }

        prop_assert!(persisted.len() <= 3);
        for (i, (question, _)) in persisted.iter().enumerate() {
            prop_assert_eq!(question, &format!("Question {i}?"));
        }
        let session = current.expect("session exists");
        let stored: Vec<(String, String)> = session
            .answers()
            .iter()
            .map(|a| (a.question.clone(), a.answer.clone()))
            .collect();
        prop_assert_eq!(stored, persisted);
    }
}

fn t_session(change: SessionChange) -> Option<Session> {
    match change {
        SessionChange::Put(session) => Some(session),
        SessionChange::Unchanged | SessionChange::Delete => None,
    }
}
