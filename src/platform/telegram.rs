use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::{
    payloads::{
        CopyMessageSetters, EditMessageReplyMarkupSetters, SendMessageSetters, SetWebhookSetters,
    },
    prelude::*,
    types::{
        AllowedUpdate, ChatId, InlineKeyboardMarkup, MediaKind, MessageId, MessageKind, Recipient,
    },
    ApiError, RequestError,
};
use tracing::{debug, info};

use super::{
    ChatPlatform, ContentKind, DeleteOutcome, InboundMessage, MarkupOutcome, OutgoingMessage,
    WebhookRegistry, WebhookStatus,
};

/// Reduce a Telegram message to the fields the relay works with.
pub fn inbound_from(msg: &Message) -> InboundMessage {
    InboundMessage {
        sender: msg.from.as_ref().map(|user| user.id),
        chat: msg.chat.id,
        id: msg.id,
        forwarded: msg.forward_origin().is_some(),
        kind: content_kind(msg),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
    }
}

fn content_kind(msg: &Message) -> ContentKind {
    let MessageKind::Common(common) = &msg.kind else {
        return ContentKind::Other;
    };
    match &common.media_kind {
        MediaKind::Text(_) => ContentKind::Text,
        MediaKind::Photo(_) => ContentKind::Photo,
        MediaKind::Video(_) => ContentKind::Video,
        MediaKind::Document(_) => ContentKind::Document,
        MediaKind::Audio(_) => ContentKind::Audio,
        MediaKind::Voice(_) => ContentKind::Voice,
        MediaKind::VideoNote(_) => ContentKind::VideoNote,
        MediaKind::Animation(_) => ContentKind::Animation,
        MediaKind::Sticker(_) => ContentKind::Sticker,
        _ => ContentKind::Other,
    }
}

/// [`ChatPlatform`] and [`WebhookRegistry`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> DeleteOutcome {
        match self.bot.delete_message(chat, message).await {
            Ok(_) => DeleteOutcome::Deleted,
            Err(RequestError::Api(ApiError::MessageToDeleteNotFound)) => DeleteOutcome::AlreadyGone,
            Err(e) => {
                debug!(error = %e, "delete_message failed");
                DeleteOutcome::Failed
            }
        }
    }

    async fn forward_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
    ) -> Result<MessageId> {
        let sent = self
            .bot
            .forward_message(to.clone(), from, message)
            .await
            .context("Failed to forward message")?;
        Ok(sent.id)
    }

    async fn copy_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
        silent: bool,
    ) -> Result<MessageId> {
        let mut request = self.bot.copy_message(to.clone(), from, message);
        if silent {
            request = request.disable_notification(true);
        }
        request.await.context("Failed to copy message")
    }

    async fn edit_reply_markup(
        &self,
        chat: &Recipient,
        message: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> MarkupOutcome {
        match self
            .bot
            .edit_message_reply_markup(chat.clone(), message)
            .reply_markup(markup)
            .await
        {
            Ok(_) => MarkupOutcome::Attached,
            Err(e) => {
                debug!(error = %e, "edit_message_reply_markup refused");
                MarkupOutcome::Rejected
            }
        }
    }

    async fn send_message(&self, chat: &Recipient, message: OutgoingMessage) -> Result<MessageId> {
        let mut request = self.bot.send_message(chat.clone(), message.text);
        if let Some(mode) = message.parse_mode {
            request = request.parse_mode(mode);
        }
        if let Some(markup) = message.markup {
            request = request.reply_markup(markup);
        }
        let sent = request.await.context("Failed to send message")?;
        Ok(sent.id)
    }

    async fn check_chat(&self, chat: &Recipient) -> Result<()> {
        self.bot
            .get_chat(chat.clone())
            .await
            .context("Failed to look up chat")?;
        Ok(())
    }
}

#[async_trait]
impl WebhookRegistry for TelegramPlatform {
    async fn register(&self, url: Url) -> Result<WebhookStatus> {
        self.bot
            .delete_webhook()
            .await
            .context("Failed to remove old webhook")?;
        info!("Old webhook removed");

        self.bot
            .set_webhook(url)
            .drop_pending_updates(true)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
            .await
            .context("Failed to set webhook")?;
        info!("Webhook set");

        self.status().await
    }

    async fn status(&self) -> Result<WebhookStatus> {
        let info = self
            .bot
            .get_webhook_info()
            .await
            .context("Failed to fetch webhook info")?;
        Ok(WebhookStatus {
            pending_updates: info.pending_update_count,
            last_error_date: info.last_error_date,
            last_error_message: info.last_error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use teloxide::types::UserId;

    fn message(extra: serde_json::Value) -> Message {
        let mut base = json!({
            "message_id": 17,
            "date": 1_700_000_000,
            "chat": { "id": 4242, "type": "private", "first_name": "Admin" },
            "from": { "id": 4242, "is_bot": false, "first_name": "Admin" }
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn test_text_message() {
        let inbound = inbound_from(&message(json!({ "text": "Special offer #агрорф" })));
        assert_eq!(inbound.sender, Some(UserId(4242)));
        assert_eq!(inbound.chat, ChatId(4242));
        assert_eq!(inbound.id, MessageId(17));
        assert_eq!(inbound.kind, ContentKind::Text);
        assert!(!inbound.forwarded);
        assert_eq!(inbound.text.as_deref(), Some("Special offer #агрорф"));
        assert_eq!(inbound.caption, None);
    }

    #[test]
    fn test_forwarded_message() {
        let inbound = inbound_from(&message(json!({
            "text": "news",
            "forward_origin": {
                "type": "user",
                "date": 1_699_999_000,
                "sender_user": { "id": 77, "is_bot": false, "first_name": "Author" }
            }
        })));
        assert!(inbound.forwarded);
    }

    #[test]
    fn test_photo_with_caption() {
        let inbound = inbound_from(&message(json!({
            "photo": [{
                "file_id": "file-a",
                "file_unique_id": "uniq-a",
                "width": 90,
                "height": 90,
                "file_size": 1024
            }],
            "caption": "Harvest #АгроРФ"
        })));
        assert_eq!(inbound.kind, ContentKind::Photo);
        assert_eq!(inbound.combined_text(), "Harvest #АгроРФ");
    }

    #[test]
    fn test_location_is_not_relayable() {
        let inbound = inbound_from(&message(json!({
            "location": { "latitude": 55.75, "longitude": 37.61 }
        })));
        assert_eq!(inbound.kind, ContentKind::Other);
        assert!(!inbound.kind.is_relayable());
    }
}
