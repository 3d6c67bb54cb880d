use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::IMAGE_GENERATION_STYLE_HINT;
use crate::llm::analysis::ModelSettings;
use crate::llm::media::detect_mime_type;
use crate::llm::ports::{ChatCompletion, CompletionRequest, GenerationError, ImageGeneration};
use crate::product::ProductRecord;

const IMAGE_MAX_TOKENS: u32 = 4096;

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/[a-zA-Z0-9.+-]+;base64,[A-Za-z0-9+/=]+").expect("valid data url regex")
});

/// Builds the product photo prompt from a confirmed record.
pub fn image_prompt(record: &ProductRecord) -> String {
    let mut parts = vec![format!(
        "Generate a professional realistic product photography of {}",
        record.name.trim()
    )];
    if let Some(color) = &record.color {
        parts.push(format!("in {color} color"));
    }
    if let Some(size) = &record.size {
        parts.push(format!("{size} size"));
    }
    if let Some(category) = &record.category {
        parts.push(format!("({category})"));
    }
    parts.push(IMAGE_GENERATION_STYLE_HINT.to_string());
    parts.join(", ")
}

fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, data) = url.split_once(',')?;
    if !header.starts_with("data:image") || !header.ends_with(";base64") {
        return None;
    }
    general_purpose::STANDARD.decode(data.trim()).ok()
}

fn image_part_url(part: &Value) -> Option<&str> {
    part.pointer("/image_url/url").and_then(|v| v.as_str())
}

/// Finds generated image bytes in a chat completion message.
///
/// Checks the `images` field, then multipart content (`image_url` and `inline_data` parts),
/// then a data URL embedded in text content.
pub fn extract_image_from_message(message: &Value) -> Option<Vec<u8>> {
    if let Some(images) = message.get("images").and_then(|v| v.as_array()) {
        if let Some(bytes) = images
            .iter()
            .filter_map(image_part_url)
            .find_map(decode_data_url)
        {
            return Some(bytes);
        }
    }

    match message.get("content") {
        Some(Value::Array(parts)) => parts.iter().find_map(|part| {
            if let Some(url) = image_part_url(part) {
                return decode_data_url(url);
            }
            let inline = part.get("inline_data")?;
            let data = inline.get("data").and_then(|v| v.as_str())?;
            general_purpose::STANDARD.decode(data.trim()).ok()
        }),
        Some(Value::String(text)) => DATA_URL_RE
            .find(text)
            .and_then(|found| decode_data_url(found.as_str())),
        _ => None,
    }
}

pub struct ModelImageGenerator {
    client: Arc<dyn ChatCompletion>,
    settings: ModelSettings,
}

impl ModelImageGenerator {
    pub fn new(client: Arc<dyn ChatCompletion>, settings: ModelSettings) -> Self {
        ModelImageGenerator { client, settings }
    }
}

#[async_trait]
impl ImageGeneration for ModelImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let mut request =
            CompletionRequest::new(&self.settings.model, "", prompt, "generate_image");
        request.modalities = vec!["image".to_string(), "text".to_string()];
        request.max_tokens = Some(IMAGE_MAX_TOKENS);
        request.temperature = self.settings.temperature;
        request.timeout = self.settings.timeout;

        let message = self.client.complete(&request).await?;
        let Some(bytes) = extract_image_from_message(&message) else {
            warn!("Image model returned no image data");
            return Err(GenerationError::RemoteError(
                "response contained no image".to_string(),
            ));
        };
        if detect_mime_type(&bytes).map_or(true, |mime| !mime.starts_with("image/")) {
            return Err(GenerationError::RemoteError(
                "response image is not decodable".to_string(),
            ));
        }
        info!("Generated product image ({} bytes)", bytes.len());
        Ok(bytes)
    }
}
