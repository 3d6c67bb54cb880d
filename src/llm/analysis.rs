use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{TEXT_ANALYSIS_SYSTEM_PROMPT, VISION_ANALYSIS_SYSTEM_PROMPT};
use crate::llm::extract::{extract_json_from_text, extract_product_locally, record_from_json};
use crate::llm::openrouter::{message_text, truncate_for_log};
use crate::llm::ports::{
    AnalysisError, ChatCompletion, CompletionRequest, TextAnalysis, VisionAnalysis,
};
use crate::product::ProductRecord;

const ANALYSIS_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

fn parse_model_output(content: &str) -> Result<ProductRecord, AnalysisError> {
    if content.trim().is_empty() {
        return Err(AnalysisError::ParseFailure("empty model response".to_string()));
    }
    let value = extract_json_from_text(content).ok_or_else(|| {
        AnalysisError::ParseFailure(format!(
            "no JSON object in response: {}",
            truncate_for_log(content, 200)
        ))
    })?;
    record_from_json(&value)
        .ok_or_else(|| AnalysisError::ParseFailure("response names no product".to_string()))
}

/// Text analysis: local heuristics first, the model only when they fall short.
pub struct ModelTextAnalyzer {
    client: Arc<dyn ChatCompletion>,
    settings: ModelSettings,
}

impl ModelTextAnalyzer {
    pub fn new(client: Arc<dyn ChatCompletion>, settings: ModelSettings) -> Self {
        ModelTextAnalyzer { client, settings }
    }
}

#[async_trait]
impl TextAnalysis for ModelTextAnalyzer {
    async fn analyze_text(&self, description: &str) -> Result<ProductRecord, AnalysisError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AnalysisError::ParseFailure("empty description".to_string()));
        }

        let local = extract_product_locally(description);
        if local.is_confirmable() && (local.price.is_some() || local.category.is_some()) {
            debug!("Heuristic extraction sufficient for '{}'", local.name);
            return Ok(local);
        }

        let mut request = CompletionRequest::new(
            &self.settings.model,
            TEXT_ANALYSIS_SYSTEM_PROMPT,
            description,
            "analyze_text",
        );
        request.temperature = self.settings.temperature;
        request.max_tokens = Some(ANALYSIS_MAX_TOKENS);
        request.timeout = self.settings.timeout;

        let message = self.client.complete(&request).await?;
        let mut record = parse_model_output(&message_text(&message))?;
        record.fill_missing_from(&local);
        info!("Text analysis extracted product '{}'", record.name);
        Ok(record)
    }
}

pub struct ModelVisionAnalyzer {
    client: Arc<dyn ChatCompletion>,
    settings: ModelSettings,
}

impl ModelVisionAnalyzer {
    pub fn new(client: Arc<dyn ChatCompletion>, settings: ModelSettings) -> Self {
        ModelVisionAnalyzer { client, settings }
    }
}

#[async_trait]
impl VisionAnalysis for ModelVisionAnalyzer {
    async fn analyze_image(
        &self,
        image: &[u8],
        caption: Option<&str>,
    ) -> Result<ProductRecord, AnalysisError> {
        if image.is_empty() {
            return Err(AnalysisError::ParseFailure("empty image".to_string()));
        }

        let prompt = match caption.map(str::trim).filter(|text| !text.is_empty()) {
            Some(caption) => format!(
                "Проанализируй товар на фото. Подпись пользователя: \"{}\"",
                caption
            ),
            None => "Проанализируй товар на фото.".to_string(),
        };
        let mut request = CompletionRequest::new(
            &self.settings.model,
            VISION_ANALYSIS_SYSTEM_PROMPT,
            &prompt,
            "analyze_image",
        );
        request.images.push(image.to_vec());
        request.temperature = self.settings.temperature;
        request.max_tokens = Some(ANALYSIS_MAX_TOKENS);
        request.timeout = self.settings.timeout;

        let message = self.client.complete(&request).await?;
        let content = message_text(&message);
        match parse_model_output(&content) {
            Ok(record) => {
                info!("Vision analysis identified product '{}'", record.name);
                Ok(record)
            }
            Err(err) => {
                warn!("Vision response could not be parsed: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use super::*;
    use crate::llm::ports::CallError;
    use crate::product::Price;

    /// Completion stub returning scripted results and recording requests.
    pub(crate) struct ScriptedCompletion {
        replies: Mutex<Vec<Result<Value, CallError>>>,
        pub calls: AtomicUsize,
        pub last_request: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        pub(crate) fn new(replies: Vec<Result<Value, CallError>>) -> Arc<Self> {
            Arc::new(ScriptedCompletion {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        pub(crate) fn content(text: &str) -> Result<Value, CallError> {
            Ok(json!({ "role": "assistant", "content": text }))
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<Value, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request.clone());
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Err(CallError::Remote("no scripted reply".into()));
            }
            replies.remove(0)
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "test-model".to_string(),
            temperature: 0.1,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn structured_description_skips_the_model() {
        let completion = ScriptedCompletion::new(vec![]);
        let analyzer = ModelTextAnalyzer::new(completion.clone(), settings());
        let record = analyzer
            .analyze_text("Беспроводные наушники Sony, цена 15990, категория электроника")
            .await
            .expect("record");
        assert_eq!(record.name, "Беспроводные наушники Sony");
        assert_eq!(record.price, Some(Price::rub(15990)));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn vague_description_asks_the_model_and_fills_gaps() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::content(
            "```json\n{\"name\": \"Настольная лампа\", \"category\": \"освещение\"}\n```",
        )]);
        let analyzer = ModelTextAnalyzer::new(completion.clone(), settings());
        let record = analyzer
            .analyze_text("лампа для чтения, тёплый свет, размер 30 см")
            .await
            .expect("record");
        assert_eq!(record.name, "Настольная лампа");
        assert_eq!(record.category.as_deref(), Some("освещение"));
        assert_eq!(record.size.as_deref(), Some("30 см"));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_text_is_a_parse_failure() {
        let analyzer = ModelTextAnalyzer::new(ScriptedCompletion::new(vec![]), settings());
        let result = analyzer.analyze_text("   ").await;
        assert!(matches!(result, Err(AnalysisError::ParseFailure(_))));
    }

    #[tokio::test]
    async fn prose_without_json_is_a_parse_failure() {
        let completion =
            ScriptedCompletion::new(vec![ScriptedCompletion::content("Sorry, I can't help.")]);
        let analyzer = ModelTextAnalyzer::new(completion, settings());
        let result = analyzer.analyze_text("что-то непонятное").await;
        assert!(matches!(result, Err(AnalysisError::ParseFailure(_))));
    }

    #[tokio::test]
    async fn transport_timeout_becomes_analysis_timeout() {
        let completion = ScriptedCompletion::new(vec![Err(CallError::Timeout)]);
        let analyzer = ModelTextAnalyzer::new(completion, settings());
        let result = analyzer.analyze_text("что-то непонятное").await;
        assert_eq!(result, Err(AnalysisError::Timeout));
    }

    #[tokio::test]
    async fn vision_sends_image_and_caption_hint() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::content(
            "{\"name\": \"Кружка\", \"category\": \"посуда\", \"price\": null}",
        )]);
        let analyzer = ModelVisionAnalyzer::new(completion.clone(), settings());
        let record = analyzer
            .analyze_image(&[0xFF, 0xD8, 0xFF, 0xE0], Some("1200"))
            .await
            .expect("record");
        assert_eq!(record.name, "Кружка");
        assert_eq!(record.price, None);

        let request = completion.last_request.lock().clone().expect("request");
        assert_eq!(request.images.len(), 1);
        assert!(request.prompt.contains("1200"));
    }
}
