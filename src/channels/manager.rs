//! Registry of running channels; routes outbound messages by user channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::channels::{Channel, EventStream, OutboundMessage};
use crate::conversation::UserId;
use crate::error::ChannelError;

/// Holds all channels and routes replies to the one a user arrived on.
#[derive(Default)]
pub struct ChannelManager {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its name, replacing any previous one.
    pub async fn add(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        tracing::debug!(channel = %name, "Channel registered");
        self.channels.write().await.insert(name, channel);
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every registered channel. Channels that fail to start are
    /// logged and skipped.
    pub async fn start_all(&self) -> Vec<EventStream> {
        let channels: Vec<Arc<dyn Channel>> =
            self.channels.read().await.values().cloned().collect();

        let mut streams = Vec::with_capacity(channels.len());
        for channel in channels {
            match channel.start().await {
                Ok(stream) => {
                    tracing::info!(channel = channel.name(), "Channel started");
                    streams.push(stream);
                }
                Err(e) => tracing::error!(channel = channel.name(), error = %e, "Channel failed to start"),
            }
        }
        streams
    }

    /// Deliver `message` on the channel `user` belongs to.
    pub async fn send(&self, user: &UserId, message: OutboundMessage) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .read()
            .await
            .get(&user.channel)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(user.channel.clone()))?;
        channel.send(user, message).await
    }

    /// Health of every channel, by name.
    pub async fn health_check_all(&self) -> Vec<(String, Result<(), ChannelError>)> {
        let channels: Vec<Arc<dyn Channel>> =
            self.channels.read().await.values().cloned().collect();
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            results.push((channel.name().to_string(), channel.health_check().await));
        }
        results
    }

    pub async fn shutdown_all(&self) {
        let channels: Vec<Arc<dyn Channel>> =
            self.channels.read().await.values().cloned().collect();
        for channel in channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }
}
