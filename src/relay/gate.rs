use teloxide::types::UserId;

use crate::platform::InboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin(UserId),
    Denied,
}

/// Single-entry allow-list: only the configured administrator passes.
/// Messages without a sender are denied.
pub fn authorize(msg: &InboundMessage, admin: UserId) -> Access {
    match msg.sender {
        Some(sender) if sender == admin => Access::Admin(sender),
        _ => Access::Denied,
    }
}
