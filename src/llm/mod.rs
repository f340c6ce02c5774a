//! LLM integration for the assisted dialog.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core
//! - **Anthropic**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `Agent` to our `Assistant` trait.

pub mod provider;
mod rig_adapter;

pub use provider::{Assistant, CompletionParams};
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown LLM backend '{other}' (expected openai or anthropic)")),
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Configuration for creating an assistant.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub params: CompletionParams,
}

/// Create an assistant from configuration.
pub fn create_assistant(config: &LlmConfig) -> Result<Arc<dyn Assistant>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_assistant(config),
        LlmBackend::OpenAi => create_openai_assistant(config),
    }
}

fn create_anthropic_assistant(config: &LlmConfig) -> Result<Arc<dyn Assistant>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .temperature(config.params.temperature)
        .max_tokens(config.params.max_tokens)
        .build();
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(agent, "anthropic", &config.model)))
}

fn create_openai_assistant(config: &LlmConfig) -> Result<Arc<dyn Assistant>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .temperature(config.params.temperature)
        .max_tokens(config.params.max_tokens)
        .build();
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(agent, "openai", &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_anthropic_assistant() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
            params: CompletionParams::default(),
        };
        let assistant = create_assistant(&config);
        assert!(assistant.is_ok());
        assert_eq!(assistant.unwrap().model_name(), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn test_create_openai_assistant() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4".to_string(),
            params: CompletionParams::default(),
        };
        let assistant = create_assistant(&config);
        assert!(assistant.is_ok());
        assert_eq!(assistant.unwrap().model_name(), "gpt-4");
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("openai".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!(" Anthropic ".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert!("mistral".parse::<LlmBackend>().is_err());
        assert_eq!(LlmBackend::OpenAi.default_model(), "gpt-4");
        assert_eq!(LlmBackend::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn default_params() {
        let params = CompletionParams::default();
        assert_eq!(params.max_tokens, 150);
        assert!((params.temperature - 0.7).abs() < f64::EPSILON);
    }
}
