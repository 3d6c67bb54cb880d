use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

use crate::handlers::input::dispatch_event;
use crate::session::{messages, Event};
use crate::state::AppState;

pub async fn start_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let user = message.from.as_ref();
    dispatch_event(&bot, &state, message.chat.id, user, Event::Start);
    Ok(())
}

pub async fn cancel_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let user = message.from.as_ref();
    dispatch_event(&bot, &state, message.chat.id, user, Event::Cancel);
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, messages::HELP)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}
