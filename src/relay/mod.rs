pub mod batch;
pub mod commands;
pub mod gate;
pub mod publish;

use std::sync::Arc;
use std::time::Duration;

use teloxide::types::{
    ChatId, InlineKeyboardMarkup, MessageId, Recipient, Update, UpdateKind, UserId,
};
use tracing::{debug, error, info, warn};

use crate::config::{ChannelRef, Config};
use crate::platform::telegram::inbound_from;
use crate::platform::{ChatPlatform, DeleteOutcome, InboundMessage, OutgoingMessage};
use crate::tasks::BackgroundTasks;

use self::batch::BatchCollector;
use self::commands::Command;
use self::gate::Access;
use self::publish::Publisher;

const CONFIRMATION_TEXT: &str = "✅ <b>Пост опубликован!</b>";
const FAILURE_TEXT: &str = "❌ <b>Ошибка публикации</b>\nПопробуйте ещё раз";

/// Everything the relay needs from the configuration
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub admin: UserId,
    pub channel: ChannelRef,
    pub button: InlineKeyboardMarkup,
    pub trigger: String,
    pub flush_delay: Duration,
    pub confirmation_ttl: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admin: config.telegram.admin_id,
            channel: config.telegram.channel.clone(),
            button: publish::action_button(
                &config.publish.button_text,
                config.publish.button_url.clone(),
            ),
            trigger: config.publish.trigger.clone(),
            flush_delay: config.publish.flush_delay,
            confirmation_ttl: config.publish.confirmation_ttl,
        }
    }
}

/// Routes admin messages from the control chat into the public channel.
pub struct Relay {
    platform: Arc<dyn ChatPlatform>,
    settings: RelaySettings,
    batches: BatchCollector,
    tasks: Arc<BackgroundTasks>,
}

impl Relay {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        settings: RelaySettings,
        tasks: Arc<BackgroundTasks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            settings,
            batches: BatchCollector::new(),
            tasks,
        })
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    fn publisher(&self) -> Publisher<'_> {
        Publisher::new(self.platform.as_ref(), &self.settings)
    }

    pub async fn handle_update(self: &Arc<Self>, update: Update) {
        match update.kind {
            UpdateKind::Message(message) => self.handle_message(inbound_from(&message)).await,
            _ => debug!("Ignoring non-message update {:?}", update.id),
        }
    }

    pub async fn handle_message(self: &Arc<Self>, msg: InboundMessage) {
        let sender = match gate::authorize(&msg, self.settings.admin) {
            Access::Admin(sender) => sender,
            Access::Denied => {
                warn!("Unauthorized message removed (details hidden)");
                self.delete_quietly(msg.chat, msg.id).await;
                return;
            }
        };

        if let Some(command) = commands::parse(&msg) {
            self.run_command(msg.chat, command).await;
            return;
        }

        if !msg.kind.is_relayable() {
            debug!("Admin message of unsupported kind left untouched");
            return;
        }

        if msg.forwarded {
            self.stage_forward(sender, msg).await;
        } else if publish::matches_trigger(&msg, &self.settings.trigger) {
            self.publish_tagged(msg).await;
        }
    }

    async fn run_command(&self, chat: ChatId, command: Command) {
        info!("Admin command {:?}", command);
        let text = match command {
            Command::Start => commands::start_text(&self.settings),
            Command::Status => {
                let reachable = match self
                    .platform
                    .check_chat(self.settings.channel.recipient())
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Channel check failed: {:#}", e);
                        false
                    }
                };
                commands::status_text(&self.settings, reachable)
            }
        };
        if let Err(e) = self
            .platform
            .send_message(&Recipient::Id(chat), OutgoingMessage::html(text))
            .await
        {
            warn!("Failed to answer command: {:#}", e);
        }
    }

    /// Buffer a forwarded message and schedule a flush. Every forward gets its
    /// own timer; timers that find the batch already drained do nothing.
    async fn stage_forward(self: &Arc<Self>, sender: UserId, msg: InboundMessage) {
        let pending = self.batches.push(sender, msg).await;
        info!("Forwarded message received ({} pending)", pending);

        let relay = Arc::clone(self);
        self.tasks.spawn_after(self.settings.flush_delay, async move {
            relay.flush(sender).await;
        });
    }

    async fn flush(&self, sender: UserId) {
        let batch = self.batches.take(sender).await;
        if batch.is_empty() {
            debug!("Flush found nothing pending");
            return;
        }

        let report = self.publisher().publish_batch(&batch).await;

        // Originals can only go once they are in the channel: a message
        // already deleted from the control chat can no longer be forwarded.
        for (original, _) in batch.iter().zip(report.published.ids()) {
            self.delete_quietly(original.chat, original.id).await;
        }

        if report.aborted {
            self.notify_failure(batch[0].chat).await;
        }
    }

    async fn publish_tagged(&self, msg: InboundMessage) {
        info!("Publishing post with trigger {}", self.settings.trigger);
        if let Err(e) = self.publisher().publish_tagged(&msg).await {
            error!("Failed to publish post: {:#}", e);
            self.notify_failure(msg.chat).await;
            return;
        }

        self.delete_quietly(msg.chat, msg.id).await;
        self.confirm(msg.chat).await;
    }

    /// Show a short-lived confirmation in the control chat.
    async fn confirm(&self, chat: ChatId) {
        let sent = self
            .platform
            .send_message(&Recipient::Id(chat), OutgoingMessage::html(CONFIRMATION_TEXT))
            .await;
        match sent {
            Ok(confirmation) => {
                let platform = Arc::clone(&self.platform);
                self.tasks
                    .spawn_after(self.settings.confirmation_ttl, async move {
                        platform.delete_message(chat, confirmation).await;
                    });
            }
            Err(e) => warn!("Failed to send publish confirmation: {:#}", e),
        }
    }

    async fn notify_failure(&self, chat: ChatId) {
        if let Err(e) = self
            .platform
            .send_message(&Recipient::Id(chat), OutgoingMessage::html(FAILURE_TEXT))
            .await
        {
            error!("Failed to notify admin about publish failure: {:#}", e);
        }
    }

    async fn delete_quietly(&self, chat: ChatId, message: MessageId) {
        match self.platform.delete_message(chat, message).await {
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyGone => {}
            DeleteOutcome::Failed => debug!("Message could not be deleted"),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> RelaySettings {
    RelaySettings {
        admin: UserId(4242),
        channel: ChannelRef::parse("@agro_news").unwrap(),
        button: publish::action_button(
            "Каталог продукции",
            reqwest::Url::parse("https://shop.example.com/catalog").unwrap(),
        ),
        trigger: "#агрорф".to_string(),
        flush_delay: Duration::from_secs(1),
        confirmation_ttl: Duration::from_secs(3),
    }
}
