pub mod builder;
pub mod canvas;
pub mod fonts;
pub mod templates;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub use builder::CardBuilder;
pub use fonts::CardFonts;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("product record has no name")]
    InvalidRecord,
    #[error("unknown card style '{0}'")]
    UnknownStyle(String),
    #[error("card rendering failed: {0}")]
    RenderFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleId {
    Minimal,
    Dark,
    Marketplace,
}

impl StyleId {
    pub const ALL: [StyleId; 3] = [StyleId::Minimal, StyleId::Dark, StyleId::Marketplace];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleId::Minimal => "minimal",
            StyleId::Dark => "dark",
            StyleId::Marketplace => "marketplace",
        }
    }

    /// Button label shown in the style keyboard.
    pub fn title(&self) -> &'static str {
        match self {
            StyleId::Minimal => "📱 Минимал",
            StyleId::Dark => "🌙 Тёмный",
            StyleId::Marketplace => "🛒 Маркетплейс",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StyleId::Minimal => "Чистый светлый дизайн с большим количеством воздуха",
            StyleId::Dark => "Тёмный премиальный фон с яркими акцентами",
            StyleId::Marketplace => "Карточка в стиле маркетплейса с бейджами",
        }
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StyleId {
    type Err = BuildError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StyleId::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| BuildError::UnknownStyle(value.to_string()))
    }
}

/// A rendered card on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCard {
    pub path: PathBuf,
    pub style: StyleId,
    pub width: u32,
    pub height: u32,
}
