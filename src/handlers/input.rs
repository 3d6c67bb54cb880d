use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::{debug, warn};

use crate::handlers::media::{download_file, image_file_id};
use crate::handlers::responses::TelegramDelivery;
use crate::session::machine::SessionKey;
use crate::session::{messages, Event};
use crate::state::AppState;

/// Sessions belong to one user in one chat. Messages without a sender share the chat's slot.
pub fn session_key(chat_id: ChatId, user: Option<&User>) -> SessionKey {
    SessionKey::new(chat_id.0, user.map_or(0, |user| user.id.0))
}

/// Queues `event` on the sender's session; replies go back to the chat it came from.
pub fn dispatch_event(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user: Option<&User>,
    event: Event,
) {
    let key = session_key(chat_id, user);
    debug!("Dispatching {} for session {key}", event.kind());
    let delivery = Arc::new(TelegramDelivery::new(bot.clone(), chat_id));
    state.sessions.dispatch(key, event, delivery);
}

/// Reply for slash-prefixed text that matched no registered command.
pub fn unknown_command_reply(text: &str) -> Option<&'static str> {
    text.trim_start()
        .starts_with('/')
        .then_some(messages::UNKNOWN_COMMAND)
}

pub async fn text_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(text) = message.text() else {
        return Ok(());
    };
    if let Some(reply) = unknown_command_reply(text) {
        bot.send_message(message.chat.id, reply).await?;
        return Ok(());
    }
    let event = Event::Text(text.to_string());
    dispatch_event(&bot, &state, message.chat.id, message.from.as_ref(), event);
    Ok(())
}

pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(file_id) = image_file_id(&message) else {
        return Ok(());
    };
    let Some(bytes) = download_file(&bot, &file_id).await else {
        bot.send_message(message.chat.id, messages::PHOTO_DOWNLOAD_FAILED)
            .await?;
        return Ok(());
    };
    let caption = message.caption().map(str::to_string);
    dispatch_event(
        &bot,
        &state,
        message.chat.id,
        message.from.as_ref(),
        Event::Photo { bytes, caption },
    );
    Ok(())
}

pub async fn unsupported_media_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let event = Event::UnsupportedMedia;
    dispatch_event(&bot, &state, message.chat.id, message.from.as_ref(), event);
    Ok(())
}

pub async fn choice_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    bot.answer_callback_query(query.id.clone()).await?;
    let Some(data) = query.data.clone() else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        warn!("Choice '{data}' arrived without a message");
        return Ok(());
    };

    let chat_id = message.chat().id;
    if let Err(err) = bot.edit_message_reply_markup(chat_id, message.id()).await {
        debug!("Could not clear keyboard: {err}");
    }
    dispatch_event(&bot, &state, chat_id, Some(&query.from), Event::Button(data));
    Ok(())
}
