//! Telegram Bot API client over plain reqwest.
//!
//! Updates arrive either through `getUpdates` long-polling or through the
//! webhook route; both paths funnel into [`parse_update`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use shared::models::ChatId;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::commands::CommandRouter;
use crate::notifier::{NotifyError, NotifyFuture, Notifier, OutboundMessage, ReplyMarkup};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages over 4096 characters; stay below that.
const MAX_MESSAGE_LEN: usize = 4000;
const LONG_POLL_TIMEOUT_SECONDS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("failed to build telegram http client: {0}")]
    ClientBuild(String),
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram {method} failed: {description}")]
    Api {
        method: &'static str,
        description: String,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command {
        chat_id: ChatId,
        command: String,
    },
    Message {
        chat_id: ChatId,
        text: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Command { chat_id, .. } | Self::Message { chat_id, .. } => *chat_id,
        }
    }
}

/// Turns an update into an event. Updates without message text yield `None`.
pub fn parse_update(update: &Update) -> Option<InboundEvent> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }

    let chat_id = message.chat.id;
    let Some(rest) = text.strip_prefix('/') else {
        return Some(InboundEvent::Message {
            chat_id,
            text: text.to_owned(),
        });
    };

    // Arguments are ignored; no command takes any.
    let command = rest.split_whitespace().next().unwrap_or(rest);
    // "/list@appointment_bot" in group chats
    let command = command.split('@').next().unwrap_or(command);
    Some(InboundEvent::Command {
        chat_id,
        command: command.to_ascii_lowercase(),
    })
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, TelegramError> {
        // Long polls hold the request open for LONG_POLL_TIMEOUT_SECONDS.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECONDS * 2))
            .build()
            .map_err(|err| TelegramError::ClientBuild(err.to_string()))?;

        Ok(Self {
            client,
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    async fn call<T>(&self, method: &'static str, payload: &Value) -> Result<T, TelegramError>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(payload)
            .send()
            .await?;
        let body: ApiResponse<T> = response.json().await?;

        if !body.ok {
            return Err(TelegramError::Api {
                method,
                description: body.description.unwrap_or_default(),
            });
        }

        Ok(body.result.unwrap_or_default())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECONDS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), TelegramError> {
        let _: Value = self.call("setWebhook", &json!({ "url": url })).await?;
        info!("telegram webhook registered");
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let _: Value = self.call("deleteWebhook", &json!({})).await?;
        Ok(())
    }

    /// Sends a message, split into chunks when it is too long. A keyboard is
    /// attached to the last chunk only.
    pub async fn send_message(&self, message: &OutboundMessage) -> Result<(), TelegramError> {
        let chunks = chunk_message(&message.text);
        let last_index = chunks.len().saturating_sub(1);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut payload = json!({
                "chat_id": message.chat_id,
                "text": chunk,
            });
            if index == last_index
                && let Some(markup) = reply_markup_json(&message.markup)
            {
                payload["reply_markup"] = markup;
            }

            let _: Value = self.call("sendMessage", &payload).await?;
        }

        Ok(())
    }

    /// Polls `getUpdates` forever, handing every update to the router in order.
    pub async fn run_long_polling(&self, router: &CommandRouter) {
        let mut offset: i64 = 0;
        info!("telegram long polling started");

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(error = %err, "telegram poll failed");
                    sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = update.update_id + 1;
                match parse_update(&update) {
                    Some(event) => router.handle(event).await,
                    None => debug!(update_id = update.update_id, "skipping non-text update"),
                }
            }
        }
    }
}

impl Notifier for TelegramClient {
    fn send<'a>(&'a self, message: OutboundMessage) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.send_message(&message).await.map_err(|err| match err {
                TelegramError::Api { description, .. } => NotifyError::Rejected(description),
                other => NotifyError::Transport(other.to_string()),
            })
        })
    }
}

fn reply_markup_json(markup: &ReplyMarkup) -> Option<Value> {
    match markup {
        ReplyMarkup::Unchanged => None,
        ReplyMarkup::Choices(options) => {
            let rows: Vec<Vec<Value>> = options
                .iter()
                .map(|option| vec![json!({ "text": option })])
                .collect();
            Some(json!({
                "keyboard": rows,
                "resize_keyboard": true,
                "one_time_keyboard": true,
            }))
        }
        ReplyMarkup::RemoveKeyboard => Some(json!({ "remove_keyboard": true })),
    }
}

fn chunk_message(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > MAX_MESSAGE_LEN {
        let mut limit = MAX_MESSAGE_LEN;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let split_at = remaining[..limit]
            .rfind('\n')
            .filter(|&index| index > 0)
            .unwrap_or(limit);
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks.push(remaining);
    chunks
}
