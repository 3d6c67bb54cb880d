use std::sync::Arc;

use tracing::{info, warn};

use crate::card::{CardBuilder, CardFonts};
use crate::config::Config;
use crate::llm::ports::ChatCompletion;
use crate::llm::{
    ImageGeneration, ModelImageGenerator, ModelSettings, ModelTextAnalyzer, ModelVisionAnalyzer,
    OpenRouterClient,
};
use crate::session::{SessionDriver, SessionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(sessions: SessionRegistry) -> Self {
        AppState {
            sessions: Arc::new(sessions),
        }
    }

    /// Wires the OpenRouter-backed ports, the card builder and the session registry.
    pub fn from_config(config: &Config) -> Self {
        let client: Arc<dyn ChatCompletion> = Arc::new(OpenRouterClient::new(
            &config.openrouter_api_key,
            &config.openrouter_base_url,
        ));
        let settings = |model: &str, timeout| ModelSettings {
            model: model.to_string(),
            temperature: config.openrouter_temperature,
            timeout,
        };

        let text = Arc::new(ModelTextAnalyzer::new(
            client.clone(),
            settings(&config.model_name, config.ai_timeout()),
        ));
        let vision = Arc::new(ModelVisionAnalyzer::new(
            client.clone(),
            settings(&config.vision_model_name, config.ai_timeout()),
        ));
        let image_gen: Option<Arc<dyn ImageGeneration>> = if config.enable_image_generation {
            Some(Arc::new(ModelImageGenerator::new(
                client,
                settings(&config.image_model_name, config.image_timeout()),
            )))
        } else {
            info!("Image generation disabled; text cards render without a photo");
            None
        };

        let fonts = match CardFonts::discover(
            config.card_font_path.as_deref(),
            config.card_bold_font_path.as_deref(),
        ) {
            Ok(fonts) => Some(fonts),
            Err(err) => {
                warn!("No usable card font ({err}); card text will not be drawn");
                None
            }
        };
        let builder = CardBuilder::new(&config.cards_dir, fonts.map(Arc::new));

        let driver = SessionDriver::new(text, vision, image_gen, builder, &config.cache_dir)
            .with_timeouts(config.ai_timeout(), config.image_timeout());
        AppState::new(SessionRegistry::new(
            Arc::new(driver),
            config.session_idle_timeout(),
        ))
    }
}
