pub mod telegram;

#[cfg(test)]
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode, Recipient, UserId};

/// Update kinds the webhook subscribes to.
pub const ALLOWED_UPDATES: [&str; 2] = ["message", "channel_post"];

/// What kind of content a message carries. Only the listed media kinds are
/// relayed; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    VideoNote,
    Animation,
    Sticker,
    Other,
}

impl ContentKind {
    pub fn is_relayable(self) -> bool {
        !matches!(self, ContentKind::Other)
    }
}

/// A message received in the control chat, reduced to what the relay needs
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender: Option<UserId>,
    pub chat: ChatId,
    pub id: MessageId,
    /// Set when the message carries forward metadata
    pub forwarded: bool,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub caption: Option<String>,
}

impl InboundMessage {
    /// Caption followed by text, the way the trigger marker is searched.
    pub fn combined_text(&self) -> String {
        let mut out = self.caption.clone().unwrap_or_default();
        out.push_str(self.text.as_deref().unwrap_or_default());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The message no longer exists; treated the same as a deletion.
    AlreadyGone,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupOutcome {
    Attached,
    /// The platform refused to put markup on this message.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub markup: Option<InlineKeyboardMarkup>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            markup: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::plain(text)
        }
    }

    pub fn with_markup(mut self, markup: InlineKeyboardMarkup) -> Self {
        self.markup = Some(markup);
        self
    }
}

/// Webhook state as reported by the platform. Never carries the URL.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookStatus {
    pub pending_updates: u32,
    pub last_error_date: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
}

/// Outbound actions the relay performs against the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Best-effort deletion; never fails loudly.
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> DeleteOutcome;

    /// Forward preserving attribution. Returns the new message id.
    async fn forward_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
    ) -> Result<MessageId>;

    /// Copy without attribution. Returns the new message id.
    async fn copy_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
        silent: bool,
    ) -> Result<MessageId>;

    async fn edit_reply_markup(
        &self,
        chat: &Recipient,
        message: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> MarkupOutcome;

    async fn send_message(&self, chat: &Recipient, message: OutgoingMessage) -> Result<MessageId>;

    /// Succeeds when the bot can see the chat.
    async fn check_chat(&self, chat: &Recipient) -> Result<()>;
}

/// Webhook registration with the platform.
#[async_trait]
pub trait WebhookRegistry: Send + Sync + 'static {
    /// Replace any existing webhook with `url` and report the new state.
    async fn register(&self, url: Url) -> Result<WebhookStatus>;

    async fn status(&self) -> Result<WebhookStatus>;
}
