//! The assistant seam: free text in, free text out.

use async_trait::async_trait;

use crate::error::LlmError;

/// A completion backend answering one user prompt at a time.
///
/// The conversation keeps no history; every call is independent.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Sampling parameters passed to the completion model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}
