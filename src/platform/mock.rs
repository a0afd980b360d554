//! Recording platform used by the relay and server tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId, Recipient};

use super::{
    ChatPlatform, DeleteOutcome, MarkupOutcome, OutgoingMessage, WebhookRegistry, WebhookStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Delete(ChatId, MessageId),
    Forward {
        to: Recipient,
        from: ChatId,
        message: MessageId,
    },
    Copy {
        to: Recipient,
        from: ChatId,
        message: MessageId,
        silent: bool,
    },
    EditMarkup(Recipient, MessageId),
    Send(Recipient, OutgoingMessage),
    CheckChat(Recipient),
    RegisterWebhook(Url),
}

#[derive(Default)]
pub(crate) struct State {
    calls: Vec<Call>,
    next_id: i32,
    deleted: HashSet<(ChatId, MessageId)>,
}

/// Knobs select which capability fails.
#[derive(Default)]
pub struct MockPlatform {
    pub(crate) state: Mutex<State>,
    /// Number of forwards that succeed before every further forward fails.
    pub forward_budget: Option<usize>,
    pub fail_copy: bool,
    pub reject_markup: bool,
    pub fail_send: bool,
    pub chat_unreachable: bool,
    pub fail_webhook: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deletes(&self) -> Vec<(ChatId, MessageId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(chat, id) => Some((chat, id)),
                _ => None,
            })
            .collect()
    }

    pub fn forwards(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Forward { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn sends(&self) -> Vec<(Recipient, OutgoingMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(to, msg) => Some((to, msg)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Published ids start at 1000 so they never collide with inbound ids.
    fn fresh_id(&self) -> MessageId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        MessageId(1000 + state.next_id)
    }

    fn forwards_so_far(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Forward { .. }))
            .count()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> DeleteOutcome {
        self.record(Call::Delete(chat, message));
        let mut state = self.state.lock().unwrap();
        if state.deleted.insert((chat, message)) {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::AlreadyGone
        }
    }

    async fn forward_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
    ) -> Result<MessageId> {
        let allowed = self
            .forward_budget
            .map_or(true, |budget| self.forwards_so_far() < budget);
        self.record(Call::Forward {
            to: to.clone(),
            from,
            message,
        });
        if !allowed {
            bail!("forward refused");
        }
        Ok(self.fresh_id())
    }

    async fn copy_message(
        &self,
        to: &Recipient,
        from: ChatId,
        message: MessageId,
        silent: bool,
    ) -> Result<MessageId> {
        self.record(Call::Copy {
            to: to.clone(),
            from,
            message,
            silent,
        });
        if self.fail_copy {
            bail!("copy refused");
        }
        Ok(self.fresh_id())
    }

    async fn edit_reply_markup(
        &self,
        chat: &Recipient,
        message: MessageId,
        _markup: InlineKeyboardMarkup,
    ) -> MarkupOutcome {
        self.record(Call::EditMarkup(chat.clone(), message));
        if self.reject_markup {
            MarkupOutcome::Rejected
        } else {
            MarkupOutcome::Attached
        }
    }

    async fn send_message(&self, chat: &Recipient, message: OutgoingMessage) -> Result<MessageId> {
        self.record(Call::Send(chat.clone(), message));
        if self.fail_send {
            bail!("send refused");
        }
        Ok(self.fresh_id())
    }

    async fn check_chat(&self, chat: &Recipient) -> Result<()> {
        self.record(Call::CheckChat(chat.clone()));
        if self.chat_unreachable {
            bail!("chat not found");
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookRegistry for MockPlatform {
    async fn register(&self, url: Url) -> Result<WebhookStatus> {
        self.record(Call::RegisterWebhook(url));
        self.status().await
    }

    async fn status(&self) -> Result<WebhookStatus> {
        if self.fail_webhook {
            bail!("webhook info unavailable");
        }
        Ok(WebhookStatus {
            pending_updates: 2,
            last_error_date: None,
            last_error_message: None,
        })
    }
}
