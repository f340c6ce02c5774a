//! Configuration types.
//!
//! Everything is read once at startup from the environment (after an
//! optional `.env` has been loaded) and stays immutable afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::conversation::prompts::DEFAULT_PAYMENT_URL;
use crate::error::ConfigError;
use crate::llm::{CompletionParams, LlmBackend, LlmConfig};

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids allowed to talk to the bot; `*` allows all.
    pub allowed_users: Vec<String>,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// `None` disables the Telegram channel.
    pub telegram: Option<TelegramConfig>,
    pub llm: LlmConfig,
    /// Bitrix24 incoming webhook; leads are only logged without it.
    pub bitrix24_webhook: Option<SecretString>,
    /// libSQL database path, or `:memory:`.
    pub database_url: String,
    /// JSON file with the questionnaire; built-in questions when unset.
    pub questions_path: Option<PathBuf>,
    pub payment_url: String,
    /// Port of the HTTP server (web chat and API).
    pub port: u16,
    pub web_chat_enabled: bool,
    pub cli_enabled: bool,
    /// Per-user lanes retire after this long without events.
    pub lane_idle_timeout: Duration,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram = get("TELEGRAM_BOT_TOKEN").map(|token| TelegramConfig {
            bot_token: SecretString::from(token),
            allowed_users: get("TELEGRAM_ALLOWED_USERS")
                .map(|list| {
                    list.split(',')
                        .map(|u| u.trim().to_string())
                        .filter(|u| !u.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["*".to_string()]),
        });

        let backend = match get("LEAD_ASSIST_LLM_BACKEND") {
            Some(raw) => LlmBackend::from_str(&raw).map_err(|message| ConfigError::InvalidValue {
                key: "LEAD_ASSIST_LLM_BACKEND".into(),
                message,
            })?,
            None => LlmBackend::OpenAi,
        };
        let api_key = get(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: get("LEAD_ASSIST_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
            params: CompletionParams::default(),
        };

        Ok(Self {
            telegram,
            llm,
            bitrix24_webhook: get("BITRIX24_WEBHOOK").map(SecretString::from),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "./data/lead-assist.db".to_string()),
            questions_path: get("LEAD_ASSIST_QUESTIONS_PATH").map(PathBuf::from),
            payment_url: get("LEAD_ASSIST_PAYMENT_URL")
                .unwrap_or_else(|| DEFAULT_PAYMENT_URL.to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            web_chat_enabled: parse_bool_or(&get, "LEAD_ASSIST_WEB_CHAT", true)?,
            cli_enabled: parse_bool_or(&get, "LEAD_ASSIST_CLI", false)?,
            lane_idle_timeout: Duration::from_secs(parse_or(
                &get,
                "LEAD_ASSIST_LANE_IDLE_SECS",
                600,
            )?),
            log_dir: get("LEAD_ASSIST_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}
