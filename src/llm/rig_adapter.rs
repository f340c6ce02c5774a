//! Bridges a rig-core agent to the [`Assistant`] trait.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};

use super::provider::Assistant;
use crate::error::LlmError;

/// An [`Assistant`] backed by a rig `Agent`.
pub struct RigAdapter<M: CompletionModel> {
    agent: Agent<M>,
    provider: &'static str,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(agent: Agent<M>, provider: &'static str, model_name: &str) -> Self {
        Self {
            agent,
            provider,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> Assistant for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let reply: String =
            self.agent
                .prompt(prompt)
                .await
                .map_err(|e| LlmError::RequestFailed {
                    provider: self.provider.to_string(),
                    reason: e.to_string(),
                })?;
        normalize_reply(self.provider, &reply)
    }
}

/// Trim the model output and reject empty completions.
pub(crate) fn normalize_reply(provider: &str, reply: &str) -> Result<String, LlmError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "empty completion".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
