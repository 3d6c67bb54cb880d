use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::warn;

use crate::config::CONFIG;
use crate::llm::media::download_media;

pub async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token,
        file.path
    ))
}

/// The image attached to a message: the largest photo size, or a document with an image MIME type.
pub fn image_file_id(message: &Message) -> Option<FileId> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some(photo.file.id.clone());
    }
    message
        .document()
        .filter(|document| {
            document
                .mime_type
                .as_ref()
                .is_some_and(|mime| mime.essence_str().starts_with("image/"))
        })
        .map(|document| document.file.id.clone())
}

/// Media the bot cannot turn into a product card.
pub fn has_unsupported_media(message: &Message) -> bool {
    message.video().is_some()
        || message.audio().is_some()
        || message.voice().is_some()
        || message.video_note().is_some()
        || message.sticker().is_some()
        || message.animation().is_some()
        || message.document().is_some()
}

pub async fn download_file(bot: &Bot, file_id: &FileId) -> Option<Vec<u8>> {
    match get_file_url(bot, file_id).await {
        Ok(url) => download_media(&url).await,
        Err(err) => {
            warn!("Failed to resolve Telegram file: {err}");
            None
        }
    }
}
