pub mod analysis;
pub mod extract;
pub mod imagegen;
pub mod media;
pub mod openrouter;
pub mod ports;
pub mod retry;

pub use analysis::{ModelSettings, ModelTextAnalyzer, ModelVisionAnalyzer};
pub use imagegen::{image_prompt, ModelImageGenerator};
pub use openrouter::OpenRouterClient;
pub use ports::ImageGeneration;
