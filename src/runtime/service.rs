//! Inbound event handling: load, transition, commit, dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::conversation::{Engine, InboundEvent, SessionChange, UserId};
use crate::error::DatabaseError;
use crate::runtime::dispatch::EffectDispatcher;
use crate::runtime::lanes::LaneHandler;
use crate::store::SessionStore;

/// Applies inbound events to stored sessions.
///
/// Must only be driven through a per-user lane: `process` is a
/// read-modify-write on the user's session with no locking of its own.
pub struct ConversationService {
    engine: Engine,
    store: Arc<dyn SessionStore>,
    effects: EffectDispatcher,
}

impl ConversationService {
    pub fn new(engine: Engine, store: Arc<dyn SessionStore>, effects: EffectDispatcher) -> Self {
        Self {
            engine,
            store,
            effects,
        }
    }

    /// Apply one event. On a store error nothing is dispatched and the event
    /// can be redelivered.
    pub async fn process(&self, inbound: InboundEvent) -> Result<(), DatabaseError> {
        let current = self.store.get(&inbound.user).await?;
        let transition = self
            .engine
            .transition(current.as_ref(), &inbound, Utc::now());

        match &transition.session {
            SessionChange::Unchanged => {}
            SessionChange::Put(session) => {
                self.store.put(session).await?;
                debug!(user = %inbound.user, stage = %session.stage(), "Session committed");
            }
            SessionChange::Delete => {
                let removed = self.store.delete(&inbound.user).await?;
                debug!(user = %inbound.user, removed, "Session deleted");
            }
        }

        self.effects.dispatch(transition.effects).await;
        Ok(())
    }
}

#[async_trait]
impl LaneHandler<UserId, InboundEvent> for ConversationService {
    async fn handle(&self, user: &UserId, inbound: InboundEvent) {
        let kind = inbound.event.kind();
        if let Err(e) = self.process(inbound).await {
            error!(user = %user, event = kind, error = %e, "Event not applied");
        }
    }
}
