use anyhow::Result;
use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use tracing::{error, info, warn};

use super::RelaySettings;
use crate::platform::{ChatPlatform, InboundMessage, MarkupOutcome, OutgoingMessage};

/// Follow-up text carrying the button when it cannot go on a forwarded batch.
pub const BATCH_FALLBACK_TEXT: &str = "👆 Смотрите выше";
/// Same, for a copied post.
pub const POST_FALLBACK_TEXT: &str = "👆 Смотрите пост выше";

pub fn action_button(text: &str, url: Url) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(text.to_string(), url)]])
}

/// Case-insensitive search for the trigger in caption followed by text.
pub fn matches_trigger(msg: &InboundMessage, trigger: &str) -> bool {
    let needle = trigger.to_lowercase();
    !needle.is_empty() && msg.combined_text().to_lowercase().contains(&needle)
}

/// Channel message ids produced by one relay operation, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedPost {
    ids: Vec<MessageId>,
}

impl PublishedPost {
    pub fn push(&mut self, id: MessageId) {
        self.ids.push(id);
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// The message that receives the action button.
    pub fn last(&self) -> Option<MessageId> {
        self.ids.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPlacement {
    /// Edited into the published message itself
    Inline(MessageId),
    /// Sent as a separate message after the markup edit was refused
    FollowUp(MessageId),
    /// Both the edit and the follow-up failed
    Lost,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub published: PublishedPost,
    /// A forward failed and the rest of the batch was skipped.
    pub aborted: bool,
    pub button: Option<ButtonPlacement>,
}

/// Moves content into the public channel and attaches the action button.
pub struct Publisher<'a> {
    platform: &'a dyn ChatPlatform,
    settings: &'a RelaySettings,
}

impl<'a> Publisher<'a> {
    pub fn new(platform: &'a dyn ChatPlatform, settings: &'a RelaySettings) -> Self {
        Self { platform, settings }
    }

    /// Edit the button into `message`; if the platform refuses, send it as a
    /// standalone message right after.
    pub async fn attach_button(&self, message: MessageId, fallback_text: &str) -> ButtonPlacement {
        let channel = self.settings.channel.recipient();
        match self
            .platform
            .edit_reply_markup(channel, message, self.settings.button.clone())
            .await
        {
            MarkupOutcome::Attached => {
                info!("Button attached to published message");
                ButtonPlacement::Inline(message)
            }
            MarkupOutcome::Rejected => {
                warn!("Could not attach button in place, sending it separately");
                let follow_up =
                    OutgoingMessage::plain(fallback_text).with_markup(self.settings.button.clone());
                match self.platform.send_message(channel, follow_up).await {
                    Ok(id) => ButtonPlacement::FollowUp(id),
                    Err(e) => {
                        error!("Failed to send standalone button: {:#}", e);
                        ButtonPlacement::Lost
                    }
                }
            }
        }
    }

    /// Forward every message of the batch in order. The first failure stops
    /// the loop; what was already forwarded stays published.
    pub async fn publish_batch(&self, batch: &[InboundMessage]) -> BatchReport {
        let channel = self.settings.channel.recipient();
        let mut published = PublishedPost::default();
        let mut aborted = false;

        for msg in batch {
            match self.platform.forward_message(channel, msg.chat, msg.id).await {
                Ok(id) => published.push(id),
                Err(e) => {
                    error!("Failed to forward batch to channel: {:#}", e);
                    aborted = true;
                    break;
                }
            }
        }

        let button = match published.last() {
            Some(last) if !aborted => {
                info!("Forwarded {} message(s) to the channel", published.len());
                Some(self.attach_button(last, BATCH_FALLBACK_TEXT).await)
            }
            _ => None,
        };

        BatchReport {
            published,
            aborted,
            button,
        }
    }

    /// Copy a single post without forward attribution and silently.
    pub async fn publish_tagged(&self, msg: &InboundMessage) -> Result<(MessageId, ButtonPlacement)> {
        let channel = self.settings.channel.recipient();
        let id = self
            .platform
            .copy_message(channel, msg.chat, msg.id, true)
            .await?;
        info!("Post copied to channel");
        let button = self.attach_button(id, POST_FALLBACK_TEXT).await;
        Ok((id, button))
    }
}
