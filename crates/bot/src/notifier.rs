use std::future::Future;
use std::pin::Pin;

use shared::models::ChatId;
use thiserror::Error;

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyMarkup {
    /// Leave whatever keyboard the client shows.
    #[default]
    Unchanged,
    /// One-time reply keyboard, one option per row.
    Choices(Vec<String>),
    RemoveKeyboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub markup: ReplyMarkup,
}

impl OutboundMessage {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markup: ReplyMarkup::Unchanged,
        }
    }

    pub fn with_markup(mut self, markup: ReplyMarkup) -> Self {
        self.markup = markup;
        self
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("chat api request failed: {0}")]
    Transport(String),
    #[error("chat api rejected the message: {0}")]
    Rejected(String),
}

pub trait Notifier: Send + Sync {
    fn send<'a>(&'a self, message: OutboundMessage) -> NotifyFuture<'a>;
}
