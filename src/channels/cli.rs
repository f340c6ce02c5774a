//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Buttons are rendered as a numbered list; typing a number (or the
//! option id) presses the button.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::normalize;
use crate::channels::{Channel, EventStream, OutboundMessage};
use crate::conversation::{ChoiceOption, Event, InboundEvent, MessageRef, UserId};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "cli";
const LOCAL_USER: &str = "local";

/// Choice prompt currently displayed, with a counter used as message id.
#[derive(Debug, Default)]
struct PendingChoice {
    message_id: u64,
    options: Vec<ChoiceOption>,
}

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    pending: Arc<Mutex<PendingChoice>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user() -> UserId {
        UserId::new(CHANNEL_NAME, LOCAL_USER)
    }
}

/// Turn one input line into an event, resolving numbered picks against the
/// last offered choice. A pick consumes the choice, so later numbers are
/// plain text again.
fn line_event(line: &str, pending: &mut PendingChoice) -> Event {
    let trimmed = line.trim();
    let picked = match trimmed.parse::<usize>() {
        Ok(n) => n.checked_sub(1).filter(|&i| i < pending.options.len()),
        Err(_) => pending.options.iter().position(|o| o.id == trimmed),
    };

    match picked {
        Some(index) => {
            let option = std::mem::take(&mut pending.options).swap_remove(index);
            let message_ref = MessageRef::new(LOCAL_USER, pending.message_id.to_string());
            normalize::button_event(&option.id, Some(message_ref))
        }
        None => normalize::text_event(line),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprintln!("Type /start to begin, /cancel to finish.");
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let event = {
                            let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
                            line_event(&line, &mut pending)
                        };
                        if tx.send(InboundEvent::new(CliChannel::user(), event)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _user: &UserId, message: OutboundMessage) -> Result<(), ChannelError> {
        match message {
            OutboundMessage::Text { text } | OutboundMessage::Edit { text, .. } => {
                println!("\n{text}\n");
            }
            OutboundMessage::Choice { prompt, options } => {
                println!("\n{prompt}");
                for (i, option) in options.iter().enumerate() {
                    println!("  {}. {}", i + 1, option.label);
                }
                println!();
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                pending.message_id += 1;
                pending.options = options;
            }
        }
        eprint!("> ");
        Ok(())
    }
}
