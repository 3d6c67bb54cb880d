use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::media::detect_mime_type;
use crate::llm::ports::{CallError, ChatCompletion, CompletionRequest};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let modalities = payload
        .get("modalities")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();

    format!(
        "model={}, messages={}, modalities=[{}]",
        model, message_count, modalities
    )
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn build_message_content(user_content: &str, image_data_list: &[Vec<u8>]) -> Value {
    if image_data_list.is_empty() {
        return Value::String(user_content.to_string());
    }

    let mut parts = Vec::new();
    parts.push(json!({
        "type": "text",
        "text": user_content
    }));

    for image_data in image_data_list {
        let mime_type = detect_mime_type(image_data).unwrap_or_else(|| "image/png".to_string());
        let encoded = general_purpose::STANDARD.encode(image_data);
        let data_url = format!("data:{};base64,{}", mime_type, encoded);
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": data_url }
        }));
    }

    Value::Array(parts)
}

pub(crate) fn build_payload(request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if !request.system_prompt.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
    }
    messages.push(json!({
        "role": "user",
        "content": build_message_content(&request.prompt, &request.images)
    }));

    let mut payload = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });
    if let Some(max_tokens) = request.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if !request.modalities.is_empty() {
        payload["modalities"] = json!(request.modalities);
    }
    payload
}

fn map_transport_error(err: reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::Timeout
    } else if err.is_decode() {
        CallError::Parse(err.to_string())
    } else {
        CallError::Remote(err.to_string())
    }
}

/// Pulls the first choice's message out of a chat completion response.
pub(crate) fn first_message(response: &Value) -> Result<Value, CallError> {
    if let Some(message) = response.pointer("/error/message").and_then(|v| v.as_str()) {
        return Err(CallError::Remote(message.to_string()));
    }
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .cloned()
        .ok_or_else(|| {
            CallError::Parse(format!(
                "response has no choices: {}",
                truncate_for_log(&response.to_string(), 300)
            ))
        })
}

/// Returns the text content of a message, joining text parts when content is an array.
pub fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

/// OpenRouter-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        OpenRouterClient {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call_api(&self, payload: &Value, request: &CompletionRequest) -> Result<Value, CallError> {
        debug!("OpenRouter request: {}", summarize_payload(payload));

        let response = get_http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://github.com/product-card-bot")
            .header("X-Title", "ProductCardBot")
            .timeout(request.timeout)
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "OpenRouter API error: status={}, body={}",
                status, body_summary
            );
            let detail = message.unwrap_or(body_summary);
            return Err(CallError::Remote(format!(
                "request failed with status {}: {}",
                status, detail
            )));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(map_transport_error)?;
        debug!("OpenRouter response received for model={}", request.model);
        first_message(&value)
    }
}

#[async_trait]
impl ChatCompletion for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, CallError> {
        if request.model.trim().is_empty() {
            return Err(CallError::Remote("model identifier is required".to_string()));
        }
        let payload = build_payload(request);
        let operation = format!("openrouter:{}", request.operation);
        log_llm_timing(
            "openrouter",
            &request.model,
            &operation,
            Some(json!({ "images": request.images.len() })),
            || self.call_api(&payload, request),
        )
        .await
    }
}
