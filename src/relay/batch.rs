use std::collections::HashMap;

use teloxide::types::UserId;
use tokio::sync::Mutex;

use crate::platform::InboundMessage;

/// Forwarded messages waiting for their flush, one ordered batch per sender.
///
/// `push` and `take` are the only ways in; both hold the lock for the whole
/// operation so concurrent flushes can never see the same message twice.
#[derive(Default)]
pub struct BatchCollector {
    pending: Mutex<HashMap<UserId, Vec<InboundMessage>>>,
}

impl BatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the sender's batch, returning how many messages it now holds.
    pub async fn push(&self, sender: UserId, msg: InboundMessage) -> usize {
        let mut pending = self.pending.lock().await;
        let batch = pending.entry(sender).or_default();
        batch.push(msg);
        batch.len()
    }

    /// Take the sender's batch and clear it. Empty when already drained.
    pub async fn take(&self, sender: UserId) -> Vec<InboundMessage> {
        self.pending
            .lock()
            .await
            .remove(&sender)
            .unwrap_or_default()
    }
}
