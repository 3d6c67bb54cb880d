use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub openrouter_temperature: f32,
    pub model_name: String,
    pub vision_model_name: String,
    pub image_model_name: String,
    pub ai_timeout_seconds: u64,
    pub image_timeout_seconds: u64,
    pub enable_image_generation: bool,
    pub cards_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub card_font_path: Option<PathBuf>,
    pub card_bold_font_path: Option<PathBuf>,
    pub session_idle_seconds: u64,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

impl Config {
    pub fn load() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN")
            .or_else(|_| env::var("TELEGRAM_BOT_TOKEN"))
            .unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("BOT_TOKEN is required"));
        }

        let openrouter_api_key = env_string("OPENROUTER_API_KEY", "");
        if openrouter_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("OPENROUTER_API_KEY is required"));
        }

        let model_name = env_string("MODEL_NAME", "google/gemini-2.5-flash");
        let vision_model_name = env::var("VISION_MODEL_NAME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| model_name.clone());

        Ok(Config {
            bot_token,
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            openrouter_api_key,
            openrouter_base_url: env_string("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
            openrouter_temperature: env_f32("OPENROUTER_TEMPERATURE", 0.3),
            model_name,
            vision_model_name,
            image_model_name: env_string(
                "IMAGE_MODEL_NAME",
                "google/gemini-2.5-flash-image-preview",
            ),
            ai_timeout_seconds: env_u64("AI_TIMEOUT_SECONDS", 60).max(1),
            image_timeout_seconds: env_u64("IMAGE_TIMEOUT_SECONDS", 120).max(1),
            enable_image_generation: env_bool("ENABLE_IMAGE_GENERATION", true),
            cards_dir: PathBuf::from(env_string("CARDS_DIR", "generated_cards")),
            cache_dir: PathBuf::from(env_string("CACHE_DIR", "cache")),
            card_font_path: env_path("CARD_FONT_PATH"),
            card_bold_font_path: env_path("CARD_BOLD_FONT_PATH"),
            session_idle_seconds: env_u64("SESSION_IDLE_SECONDS", 1800).max(1),
        })
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_seconds)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_seconds)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_seconds)
    }
}

pub const TEXT_ANALYSIS_SYSTEM_PROMPT: &str = r#"Ты помощник продавца маркетплейса. Из описания товара извлеки структурированные данные.

Ответь ТОЛЬКО JSON-объектом без пояснений:
{
  "name": "короткое название товара",
  "price": "цена числом или null",
  "category": "категория или null",
  "size": "размер или null",
  "color": "цвет или null",
  "description": "краткое описание до 200 символов или null"
}

Правила:
- Не придумывай цену, если её нет в тексте.
- Название пиши с заглавной буквы, без цены и категории.
- Если товар определить невозможно, верни {"name": null}."#;

pub const VISION_ANALYSIS_SYSTEM_PROMPT: &str = r#"Ты эксперт по товарам для маркетплейсов. По фотографии определи товар.

Ответь ТОЛЬКО JSON-объектом без пояснений:
{
  "name": "короткое название товара",
  "estimated_price": "примерная цена в рублях числом или null",
  "category": "категория",
  "size": "размер, если его можно оценить, или null",
  "color": "основной цвет",
  "description": "краткое описание внешнего вида до 200 символов"
}

Если пользователь добавил подпись, используй её как подсказку. Если на фото нет товара, верни {"name": null}."#;

pub const IMAGE_GENERATION_STYLE_HINT: &str = "on a clean white or light gradient background, studio lighting, high resolution, centered composition, no text or watermarks, product only, professional e-commerce style";
