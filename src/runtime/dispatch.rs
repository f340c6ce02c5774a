//! Effect execution.
//!
//! Effects of a committed transition are queued on the user's effect lane
//! and run in order there, off the inbound lane, so a slow transport or CRM
//! never holds up the next transition. Collaborator failures are logged and
//! do not stop the remaining effects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::channels::{ChannelManager, OutboundMessage};
use crate::conversation::{Effect, Event, InboundEvent, UserId};
use crate::crm::LeadNotifier;
use crate::llm::Assistant;
use crate::runtime::lanes::{LaneHandler, Lanes};
use crate::store::AnswerSink;

/// Runs single effects against the collaborators.
pub struct EffectRunner {
    pub channels: Arc<ChannelManager>,
    pub sink: Arc<dyn AnswerSink>,
    pub notifier: Arc<dyn LeadNotifier>,
    pub assistant: Arc<dyn Assistant>,
    /// Where assistant replies re-enter the conversation.
    pub feedback: mpsc::UnboundedSender<InboundEvent>,
}

impl EffectRunner {
    pub async fn run(&self, effect: Effect) {
        match effect {
            Effect::PersistAnswer {
                user,
                session_id,
                question,
                answer,
            } => {
                if let Err(e) = self.sink.persist(&user, session_id, &question, &answer).await {
                    error!(user = %user, question = %question, error = %e, "Failed to persist answer");
                }
            }
            Effect::NotifyLead { user, summary } => {
                match self.notifier.notify(&summary).await {
                    Ok(()) => debug!(user = %user, notifier = self.notifier.name(), "Lead delivered"),
                    Err(e) => error!(
                        user = %user,
                        notifier = self.notifier.name(),
                        error = %e,
                        "Lead notification failed"
                    ),
                }
            }
            Effect::NotifyContact { user, contact } => {
                match self.notifier.notify_contact(&user, &contact).await {
                    Ok(()) => debug!(user = %user, notifier = self.notifier.name(), "Contact delivered"),
                    Err(e) => error!(
                        user = %user,
                        notifier = self.notifier.name(),
                        error = %e,
                        "Contact notification failed"
                    ),
                }
            }
            Effect::RequestCompletion {
                user,
                session_id,
                prompt,
            } => self.spawn_completion(user, session_id, prompt),
            transport => {
                if let Some((user, message)) = OutboundMessage::from_effect(transport) {
                    if let Err(e) = self.channels.send(&user, message).await {
                        warn!(user = %user, error = %e, "Failed to deliver message");
                    }
                }
            }
        }
    }

    fn spawn_completion(&self, user: UserId, session_id: uuid::Uuid, prompt: String) {
        let assistant = Arc::clone(&self.assistant);
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            debug!(user = %user, model = assistant.model_name(), "Requesting completion");
            let reply = assistant.complete(&prompt).await.map_err(|e| {
                warn!(user = %user, error = %e, "Assistant request failed");
                e.to_string()
            });
            let event = InboundEvent::new(user, Event::AssistantReplied { session_id, reply });
            if feedback.send(event).is_err() {
                debug!("Runtime stopped; assistant reply discarded");
            }
        });
    }
}

#[async_trait]
impl LaneHandler<UserId, Effect> for EffectRunner {
    async fn handle(&self, _user: &UserId, effect: Effect) {
        self.run(effect).await;
    }
}

/// Queues effects on per-user lanes.
#[derive(Clone)]
pub struct EffectDispatcher {
    lanes: Lanes<UserId, Effect>,
}

impl EffectDispatcher {
    pub fn new(runner: Arc<EffectRunner>, idle_timeout: Duration) -> Self {
        Self {
            lanes: Lanes::new("effects", runner, idle_timeout),
        }
    }

    /// Queue `effects` in order. Returns once they are queued, not run.
    pub async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.lanes.submit(effect.user().clone(), effect).await;
        }
    }
}
