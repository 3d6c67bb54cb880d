use std::error::Error;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod card;
mod config;
mod handlers;
mod llm;
mod product;
mod session;
mod state;
mod utils;

use config::{Config, CONFIG};
use handlers::media::{has_unsupported_media, image_file_id};
use handlers::{commands, input};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды бота:")]
enum Command {
    #[command(description = "создать карточку товара")]
    Start,
    #[command(description = "как пользоваться ботом")]
    Help,
    #[command(description = "отменить текущую карточку")]
    Cancel,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _guards = init_logging(&log_level);

    if let Err(err) = Config::load() {
        error!("Configuration error: {err}");
        return Err(err.into());
    }

    for dir in [&CONFIG.cards_dir, &CONFIG.cache_dir] {
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!("Failed to create {}: {err}", dir.display());
        }
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting ProductCardBot");

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {err}");
    }

    let state = AppState::from_config(&CONFIG);

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| image_file_id(&msg).is_some())
                .endpoint(handle_photo),
        )
        .branch(
            dptree::filter(|msg: Message| has_unsupported_media(&msg))
                .endpoint(handle_unsupported),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, state, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Cancel => commands::cancel_handler(bot, state, message).await?,
    }
    Ok(())
}

async fn handle_photo(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    if let Err(err) = input::photo_handler(bot, state, message).await {
        error!("photo handler failed: {err}");
    }
    Ok(())
}

async fn handle_unsupported(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    input::unsupported_media_handler(bot, state, message).await?;
    Ok(())
}

async fn handle_text(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    input::text_handler(bot, state, message).await?;
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    if let Err(err) = input::choice_callback(bot, state, query).await {
        error!("choice callback failed: {err}");
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
