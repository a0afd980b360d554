use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

use super::RelaySettings;
use crate::platform::InboundMessage;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Admin commands")]
pub enum Command {
    #[command(description = "Usage help")]
    Start,
    #[command(description = "Bot and channel status")]
    Status,
}

/// Commands are only recognised in the admin's own (non-forwarded) text.
pub fn parse(msg: &InboundMessage) -> Option<Command> {
    if msg.forwarded {
        return None;
    }
    let text = msg.text.as_deref()?;
    Command::parse(text, "").ok()
}

pub fn start_text(settings: &RelaySettings) -> String {
    let trigger = html::escape(&settings.trigger);
    let channel = html::escape(&settings.channel.to_string());
    format!(
        "✅ <b>Привет, админ!</b>\n\n\
         📋 <b>Как публиковать:</b>\n\
         1️⃣ Отправь пост (текст/фото/видео)\n\
         2️⃣ Добавь хэштег <code>{trigger}</code>\n\
         3️⃣ Пост опубликуется с кнопкой!\n\n\
         <b>Или:</b>\n\
         • Перешли сообщения в бот\n\
         • Они автоматически опубликуются в канале\n\n\
         📢 Канал: {channel}\n\n\
         <b>Команды:</b>\n\
         /start - Это сообщение\n\
         /status - Статус бота"
    )
}

pub fn status_text(settings: &RelaySettings, channel_reachable: bool) -> String {
    let trigger = html::escape(&settings.trigger);
    let channel = html::escape(&settings.channel.to_string());
    let state = if channel_reachable {
        "✅ Подключён"
    } else {
        "❌ Ошибка подключения"
    };
    format!(
        "🤖 <b>Статус бота</b>\n\n\
         <b>Канал:</b> {channel}\n\
         <b>Статус:</b> {state}\n\
         <b>Триггер:</b> <code>{trigger}</code>\n\n\
         ✅ Бот активен и готов к работе"
    )
}
