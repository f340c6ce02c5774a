//! Stub collaborators for runtime tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use crate::channels::{Channel, ChannelManager, EventStream, OutboundMessage};
use crate::conversation::{ContactDetails, LeadSummary, UserId};
use crate::crm::LeadNotifier;
use crate::error::{ChannelError, LlmError, NotifierError};
use crate::llm::Assistant;

pub type Recorded = Arc<Mutex<Vec<(UserId, OutboundMessage)>>>;

pub struct RecordingChannel {
    name: String,
    sent: Recorded,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(stream::empty()))
    }

    async fn send(&self, user: &UserId, message: OutboundMessage) -> Result<(), ChannelError> {
        self.sent.lock().await.push((user.clone(), message));
        Ok(())
    }
}

/// A channel manager with one recording channel named `name`.
pub async fn recording_channels(name: &str) -> (Arc<ChannelManager>, Recorded) {
    let sent: Recorded = Arc::default();
    let manager = Arc::new(ChannelManager::new());
    manager
        .add(Arc::new(RecordingChannel {
            name: name.to_string(),
            sent: Arc::clone(&sent),
        }))
        .await;
    (manager, sent)
}

pub struct StubAssistant {
    reply: Option<String>,
}

impl StubAssistant {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl Assistant for StubAssistant {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        self.reply.clone().ok_or_else(|| LlmError::RequestFailed {
            provider: "stub".into(),
            reason: "unavailable".into(),
        })
    }
}

pub struct StubNotifier {
    fail: bool,
    calls: AtomicUsize,
    pub received: std::sync::Mutex<Vec<LeadSummary>>,
    pub contacts: std::sync::Mutex<Vec<(UserId, ContactDetails)>>,
}

impl StubNotifier {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
            received: std::sync::Mutex::new(Vec::new()),
            contacts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn outcome(&self) -> Result<(), NotifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotifierError::Rejected {
                status: 500,
                body: "down".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LeadNotifier for StubNotifier {
    fn name(&self) -> &str {
        "stub"
    }

    async fn notify(&self, summary: &LeadSummary) -> Result<(), NotifierError> {
        self.received.lock().unwrap().push(summary.clone());
        self.outcome()
    }

    async fn notify_contact(
        &self,
        user: &UserId,
        contact: &ContactDetails,
    ) -> Result<(), NotifierError> {
        self.contacts.lock().unwrap().push((user.clone(), contact.clone()));
        self.outcome()
    }
}
