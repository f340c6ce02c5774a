//! Event loop wiring: channels in, per-user lanes, effects out.

pub mod dispatch;
pub mod lanes;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tokio::sync::mpsc;
use tracing::info;

use crate::channels::{ChannelManager, EventStream};
use crate::conversation::{Engine, InboundEvent, UserId};
use crate::crm::LeadNotifier;
use crate::llm::Assistant;
use crate::store::{AnswerSink, SessionStore};

pub use dispatch::{EffectDispatcher, EffectRunner};
pub use lanes::{LaneHandler, Lanes};
pub use service::ConversationService;

/// Shared components the runtime drives.
pub struct RuntimeDeps {
    pub engine: Engine,
    pub store: Arc<dyn SessionStore>,
    pub sink: Arc<dyn AnswerSink>,
    pub notifier: Arc<dyn LeadNotifier>,
    pub assistant: Arc<dyn Assistant>,
    pub channels: Arc<ChannelManager>,
}

/// Routes inbound events to per-user lanes and feeds assistant replies back.
pub struct Runtime {
    inbound: Lanes<UserId, InboundEvent>,
    feedback_rx: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Runtime {
    pub fn new(deps: RuntimeDeps, idle_timeout: Duration) -> Self {
        let (feedback, feedback_rx) = mpsc::unbounded_channel();

        let runner = EffectRunner {
            channels: deps.channels,
            sink: deps.sink,
            notifier: deps.notifier,
            assistant: deps.assistant,
            feedback,
        };
        let effects = EffectDispatcher::new(Arc::new(runner), idle_timeout);
        let service = ConversationService::new(deps.engine, deps.store, effects);

        Self {
            inbound: Lanes::new("inbound", Arc::new(service), idle_timeout),
            feedback_rx,
        }
    }

    /// Drain `streams` and assistant replies until the task is cancelled.
    pub async fn run(self, streams: Vec<EventStream>) {
        info!(streams = streams.len(), "Runtime started");

        let feedback: EventStream = Box::pin(stream::unfold(self.feedback_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }));

        let mut merged = stream::select_all(streams.into_iter().chain(std::iter::once(feedback)));
        while let Some(event) = merged.next().await {
            self.inbound.submit(event.user.clone(), event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::OutboundMessage;
    use crate::conversation::{Event, QuestionSet, Segment, Stage, prompts};
    use crate::runtime::testing::{Recorded, StubAssistant, StubNotifier, recording_channels};
    use crate::store::{MemoryAnswerSink, MemorySessionStore};

    struct Harness {
        tx: mpsc::UnboundedSender<InboundEvent>,
        store: Arc<MemorySessionStore>,
        sink: Arc<MemoryAnswerSink>,
        notifier: Arc<StubNotifier>,
        recorded: Recorded,
    }

    async fn harness(assistant: StubAssistant) -> Harness {
        let (channels, recorded) = recording_channels("web").await;
        let store = Arc::new(MemorySessionStore::new());
        let sink = Arc::new(MemoryAnswerSink::new());
        let notifier = Arc::new(StubNotifier::ok());
        let questions = QuestionSet::new(["Name?", "Experience?", "Source?"]).unwrap();

        let runtime = Runtime::new(
            RuntimeDeps {
                engine: Engine::new(Arc::new(questions), "https://pay.example"),
                store: store.clone(),
                sink: sink.clone(),
                notifier: notifier.clone(),
                assistant: Arc::new(assistant),
                channels,
            },
            Duration::from_secs(60),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let input: EventStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }));
        tokio::spawn(runtime.run(vec![input]));

        Harness {
            tx,
            store,
            sink,
            notifier,
            recorded,
        }
    }

    impl Harness {
        fn send(&self, user: &UserId, event: Event) {
            self.tx.send(InboundEvent::new(user.clone(), event)).unwrap();
        }

        async fn messages_for(&self, user: &UserId, count: usize) -> Vec<OutboundMessage> {
            for _ in 0..400 {
                let messages: Vec<OutboundMessage> = self
                    .recorded
                    .lock()
                    .await
                    .iter()
                    .filter(|(u, _)| u == user)
                    .map(|(_, m)| m.clone())
                    .collect();
                if messages.len() >= count {
                    return messages;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("expected {count} messages for {user}");
        }
    }

    fn text_of(message: &OutboundMessage) -> &str {
        match message {
            OutboundMessage::Text { text } | OutboundMessage::Edit { text, .. } => text,
            OutboundMessage::Choice { prompt, .. } => prompt,
        }
    }

    #[tokio::test]
    async fn full_conversation_reaches_assisted_dialog() {
        let h = harness(StubAssistant::replying("Paris.")).await;
        let user = UserId::new("web", "alice");

        h.send(&user, Event::StartRequested);
        h.send(
            &user,
            Event::SegmentSelected {
                segment: Segment::Company,
                message_ref: None,
            },
        );
        h.send(&user, Event::text("Alice"));
        h.send(&user, Event::text("5 years"));
        h.send(&user, Event::text("Referral"));
        h.send(&user, Event::text("Capital of France?"));

        // welcome, segment ack, Q1, Q2, Q3, dialog start, reply, action choice
        let messages = h.messages_for(&user, 8).await;
        assert_eq!(text_of(&messages[0]), prompts::WELCOME);
        assert_eq!(text_of(&messages[2]), "Name?");
        assert_eq!(text_of(&messages[5]), prompts::DIALOG_START);
        assert_eq!(text_of(&messages[6]), "Paris.");
        assert!(matches!(messages[7], OutboundMessage::Choice { .. }));

        let session = h.store.get(&user).await.unwrap().unwrap();
        assert_eq!(session.stage(), Stage::InAssistedDialog);
        assert_eq!(h.sink.answers_for(&user).await.unwrap().len(), 3);
        assert_eq!(h.notifier.calls(), 1);
        assert_eq!(h.notifier.received.lock().unwrap()[0].name(), "Alice");
    }

    #[tokio::test]
    async fn assistant_failure_sends_generic_reply() {
        let h = harness(StubAssistant::failing()).await;
        let user = UserId::new("web", "bob");

        h.send(&user, Event::StartRequested);
        h.send(
            &user,
            Event::SegmentSelected {
                segment: Segment::Individual,
                message_ref: None,
            },
        );
        for answer in ["Bob", "none", "ads", "hello?"] {
            h.send(&user, Event::text(answer));
        }

        let messages = h.messages_for(&user, 7).await;
        assert_eq!(text_of(&messages[6]), prompts::ASSISTANT_FAILURE);
    }

    #[tokio::test]
    async fn users_do_not_interfere() {
        let h = harness(StubAssistant::replying("ok")).await;
        let users: Vec<UserId> = (0..5).map(|i| UserId::new("web", format!("u{i}"))).collect();

        for user in &users {
            h.send(user, Event::StartRequested);
            h.send(
                user,
                Event::SegmentSelected {
                    segment: Segment::Company,
                    message_ref: None,
                },
            );
            h.send(user, Event::text(format!("name-{}", user.id)));
        }

        for user in &users {
            h.messages_for(user, 4).await;
            let session = h.store.get(user).await.unwrap().unwrap();
            assert_eq!(session.answers().len(), 1);
            assert_eq!(session.answers()[0].answer, format!("name-{}", user.id));
        }
    }
}
