use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile};
use teloxide::RequestError;
use tracing::warn;

use crate::session::machine::Choice;
use crate::session::{Delivery, Outbound};

const SEND_ATTEMPTS: usize = 3;
const BUTTONS_PER_ROW: usize = 2;

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

async fn send_with_retry<T, F, Fut>(label: &str, mut send: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match send().await {
            Ok(value) => return Ok(value),
            Err(err) if telegram_retryable_error(&err) && attempt < SEND_ATTEMPTS => {
                warn!("{label} attempt {attempt} failed: {err}");
                if let RequestError::RetryAfter(wait) = err {
                    tokio::time::sleep(wait.duration()).await;
                } else {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

pub fn choice_keyboard(options: &[Choice]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = options
        .chunks(BUTTONS_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|choice| InlineKeyboardButton::callback(choice.label.clone(), choice.id.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Delivers session replies to one Telegram chat.
#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        TelegramDelivery { bot, chat_id }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(&self, outbound: Outbound) -> Result<()> {
        match outbound {
            Outbound::Text(text) => {
                send_with_retry("send_message", || {
                    self.bot.send_message(self.chat_id, text.clone()).send()
                })
                .await?;
            }
            Outbound::ChoicePrompt { text, options } => {
                let keyboard = choice_keyboard(&options);
                send_with_retry("send_message", || {
                    self.bot
                        .send_message(self.chat_id, text.clone())
                        .reply_markup(keyboard.clone())
                        .send()
                })
                .await?;
            }
            Outbound::Image { path, caption } => {
                send_with_retry("send_photo", || {
                    self.bot
                        .send_photo(self.chat_id, InputFile::file(path.clone()))
                        .caption(caption.clone())
                        .send()
                })
                .await?;
            }
        }
        Ok(())
    }
}
