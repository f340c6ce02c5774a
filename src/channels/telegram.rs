//! Telegram channel: long-polls the Bot API for updates.
//!
//! Handles text messages and inline-keyboard callbacks. Conversations are
//! keyed by chat id, which equals the user id in private chats.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::normalize;
use crate::channels::{Channel, EventStream, OutboundMessage};
use crate::conversation::{ChoiceOption, Event, InboundEvent, MessageRef, UserId};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const CHANNEL_NAME: &str = "telegram";

/// Telegram channel, connected to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.allowed_users, identities)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            self.post_with_markdown_fallback("sendMessage", body).await?;
        }
        Ok(())
    }

    /// Send a prompt with an inline keyboard.
    async fn send_choice(
        &self,
        chat_id: &str,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": prompt,
            "reply_markup": inline_keyboard(options),
        });
        self.post_with_markdown_fallback("sendMessage", body).await
    }

    /// Edit the text of an earlier message in place.
    async fn edit_message(&self, message_ref: &MessageRef, text: &str) -> Result<(), ChannelError> {
        let message_id: Value = message_ref
            .message_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(message_ref.message_id.clone()));
        let body = serde_json::json!({
            "chat_id": message_ref.chat_id,
            "message_id": message_id,
            "text": text,
        });
        self.post_with_markdown_fallback("editMessageText", body).await
    }

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) {
        let result = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!("Telegram answerCallbackQuery failed: {e}");
        }
    }

    /// Call `method` with `parse_mode: Markdown`, retrying once without a
    /// parse mode if Telegram rejects the markup.
    async fn post_with_markdown_fallback(
        &self,
        method: &str,
        body: Value,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = body.clone();
        markdown_body["parse_mode"] = Value::from("Markdown");

        let markdown_resp = self
            .client
            .post(self.api_url(method))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram {method} with Markdown failed; retrying without parse_mode"
        );

        let plain_resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!(
                    "{method} failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let poller = TelegramChannel {
            bot_token: self.bot_token.clone(),
            allowed_users: self.allowed_users.clone(),
            client: self.client.clone(),
        };

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match poller
                    .client
                    .post(poller.api_url("getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!("Telegram getUpdates returned no result: {data}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    if let Some(callback_id) = &parsed.callback_id {
                        poller.answer_callback(callback_id).await;
                    }

                    if !poller.is_any_user_allowed(parsed.identities.iter().map(String::as_str)) {
                        tracing::warn!(
                            "Telegram: ignoring update from unauthorized user: identities={:?}",
                            parsed.identities
                        );
                        continue;
                    }

                    let inbound =
                        InboundEvent::new(UserId::new(CHANNEL_NAME, parsed.chat_id), parsed.event);
                    if tx.send(inbound).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, user: &UserId, message: OutboundMessage) -> Result<(), ChannelError> {
        match message {
            OutboundMessage::Text { text } => self.send_message(&user.id, &text).await,
            OutboundMessage::Choice { prompt, options } => {
                self.send_choice(&user.id, &prompt, &options).await
            }
            OutboundMessage::Edit {
                message_ref: Some(message_ref),
                text,
            } => match self.edit_message(&message_ref, &text).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!("Telegram edit failed, sending as new message: {e}");
                    self.send_message(&user.id, &text).await
                }
            },
            OutboundMessage::Edit {
                message_ref: None,
                text,
            } => self.send_message(&user.id, &text).await,
        }
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// A Telegram update reduced to what the conversation needs.
#[derive(Debug, PartialEq, Eq)]
struct ParsedUpdate {
    chat_id: String,
    /// Username and numeric user id, for the allow-list.
    identities: Vec<String>,
    event: Event,
    callback_id: Option<String>,
}

/// Extract a text message or a callback query from a raw update.
fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        let chat_id = chat_id_of(message)?;
        return Some(ParsedUpdate {
            chat_id,
            identities: identities_of(message.get("from")),
            event: normalize::text_event(text),
            callback_id: None,
        });
    }

    let query = update.get("callback_query")?;
    let data = query.get("data").and_then(Value::as_str)?;
    let message = query.get("message")?;
    let chat_id = chat_id_of(message)?;
    let message_ref = message
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|id| MessageRef::new(chat_id.clone(), id.to_string()));

    Some(ParsedUpdate {
        identities: identities_of(query.get("from")),
        event: normalize::button_event(data, message_ref),
        callback_id: query.get("id").and_then(Value::as_str).map(String::from),
        chat_id,
    })
}

fn chat_id_of(message: &Value) -> Option<String> {
    message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
}

fn identities_of(from: Option<&Value>) -> Vec<String> {
    let Some(from) = from else {
        return Vec::new();
    };
    let mut identities = Vec::with_capacity(2);
    if let Some(username) = from.get("username").and_then(Value::as_str) {
        identities.push(username.to_string());
    }
    if let Some(id) = from.get("id").and_then(Value::as_i64) {
        identities.push(id.to_string());
    }
    identities
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        bot_token.expose_secret()
    )
}

fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason: e.to_string(),
    }
}

/// Build `reply_markup` for a choice. Two or fewer options share a row,
/// longer lists get one button per row.
fn inline_keyboard(options: &[ChoiceOption]) -> Value {
    let button = |o: &ChoiceOption| serde_json::json!({ "text": o.label, "callback_data": o.id });
    let rows: Vec<Vec<Value>> = if options.len() <= 2 {
        vec![options.iter().map(button).collect()]
    } else {
        options.iter().map(|o| vec![button(o)]).collect()
    };
    serde_json::json!({ "inline_keyboard": rows })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char
/// boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
