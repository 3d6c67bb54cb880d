use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::product::ProductRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis timed out")]
    Timeout,
    #[error("remote analysis failed: {0}")]
    RemoteError(String),
    #[error("could not read a product from the response: {0}")]
    ParseFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("image generation timed out")]
    Timeout,
    #[error("remote image generation failed: {0}")]
    RemoteError(String),
}

/// Failure of a single chat completion call, before it is interpreted by a port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Remote(String),
    #[error("malformed response: {0}")]
    Parse(String),
}

impl From<CallError> for AnalysisError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout => AnalysisError::Timeout,
            CallError::Remote(detail) => AnalysisError::RemoteError(detail),
            CallError::Parse(detail) => AnalysisError::ParseFailure(detail),
        }
    }
}

impl From<CallError> for GenerationError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout => GenerationError::Timeout,
            CallError::Remote(detail) | CallError::Parse(detail) => {
                GenerationError::RemoteError(detail)
            }
        }
    }
}

#[async_trait]
pub trait TextAnalysis: Send + Sync {
    async fn analyze_text(&self, description: &str) -> Result<ProductRecord, AnalysisError>;
}

#[async_trait]
pub trait VisionAnalysis: Send + Sync {
    async fn analyze_image(
        &self,
        image: &[u8],
        caption: Option<&str>,
    ) -> Result<ProductRecord, AnalysisError>;
}

#[async_trait]
pub trait ImageGeneration: Send + Sync {
    /// Returns encoded image bytes (PNG or JPEG) for the prompt.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub images: Vec<Vec<u8>>,
    /// Output modalities, e.g. `["image", "text"]` for image models.
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub operation: String,
}

impl CompletionRequest {
    pub fn new(model: &str, system_prompt: &str, prompt: &str, operation: &str) -> Self {
        CompletionRequest {
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            prompt: prompt.to_string(),
            images: Vec::new(),
            modalities: Vec::new(),
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(60),
            operation: operation.to_string(),
        }
    }
}

/// Chat completion transport. Returns the first choice's `message` object.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, CallError>;
}
