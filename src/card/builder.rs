use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::card::canvas::{CARD_HEIGHT, CARD_WIDTH};
use crate::card::fonts::CardFonts;
use crate::card::templates::{template_for, CardContent};
use crate::card::{BuildError, GeneratedCard, StyleId};
use crate::product::ProductRecord;

/// Renders a card to PNG bytes. Pure and deterministic for identical input.
pub fn render_png(
    content: &CardContent,
    style: StyleId,
    fonts: Option<&CardFonts>,
) -> Result<Vec<u8>, BuildError> {
    let image = template_for(style).render(content, fonts);
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| BuildError::RenderFailure(err.to_string()))?;
    Ok(buffer.into_inner())
}

fn decode_photo(path: &Path, bytes: &[u8]) -> Option<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(photo) => Some(photo),
        Err(err) => {
            warn!("Skipping undecodable product photo {}: {err}", path.display());
            None
        }
    }
}

pub struct CardBuilder {
    output_dir: PathBuf,
    fonts: Option<Arc<CardFonts>>,
}

impl CardBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, fonts: Option<Arc<CardFonts>>) -> Self {
        CardBuilder {
            output_dir: output_dir.into(),
            fonts,
        }
    }

    /// Validates the record, renders `style` and writes a new uniquely named PNG.
    pub async fn build(
        &self,
        record: &ProductRecord,
        style: &str,
    ) -> Result<GeneratedCard, BuildError> {
        if !record.is_confirmable() {
            return Err(BuildError::InvalidRecord);
        }
        let style: StyleId = style.parse()?;

        let photo_bytes = match &record.source_image {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some((path.clone(), bytes)),
                Err(err) => {
                    warn!("Product photo {} unavailable: {err}", path.display());
                    None
                }
            },
            None => None,
        };

        let record = record.clone();
        let fonts = self.fonts.clone();
        let png = tokio::task::spawn_blocking(move || {
            let photo = photo_bytes.and_then(|(path, bytes)| decode_photo(&path, &bytes));
            let content = CardContent::from_record(&record, photo);
            render_png(&content, style, fonts.as_deref())
        })
        .await
        .map_err(|err| BuildError::RenderFailure(format!("render task failed: {err}")))??;

        let path = self.write_unique(style, &png).await?;
        info!("Card '{}' written to {}", style, path.display());
        Ok(GeneratedCard {
            path,
            style,
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
        })
    }

    async fn write_unique(&self, style: StyleId, png: &[u8]) -> Result<PathBuf, BuildError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| BuildError::RenderFailure(format!("create output dir: {err}")))?;

        let path = self
            .output_dir
            .join(format!("card_{}_{}.png", style, Uuid::new_v4().simple()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|err| BuildError::RenderFailure(format!("create {}: {err}", path.display())))?;
        file.write_all(png)
            .await
            .map_err(|err| BuildError::RenderFailure(format!("write {}: {err}", path.display())))?;
        file.flush()
            .await
            .map_err(|err| BuildError::RenderFailure(format!("flush {}: {err}", path.display())))?;
        Ok(path)
    }
}
