use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use thiserror::Error;
use tracing::{info, warn};

const REGULAR_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a usable TrueType/OpenType font")]
    Invalid(PathBuf),
    #[error("bundled card font is not usable")]
    Bundled,
}

static BUNDLED_REGULAR: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
static BUNDLED_BOLD: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");

/// Regular and bold faces used for card text.
pub struct CardFonts {
    pub regular: FontVec,
    pub bold: FontVec,
}

fn read_font(path: &Path) -> Result<FontVec, FontError> {
    let bytes = fs::read(path).map_err(|source| FontError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|_| FontError::Invalid(path.to_path_buf()))
}

impl CardFonts {
    /// Loads the regular face and, when given, a bold face. Without one the regular face is reused.
    pub fn load(regular: &Path, bold: Option<&Path>) -> Result<Self, FontError> {
        let regular_font = read_font(regular)?;
        let bold_font = match bold {
            Some(path) => read_font(path)?,
            None => read_font(regular)?,
        };
        Ok(CardFonts {
            regular: regular_font,
            bold: bold_font,
        })
    }

    /// DejaVu Sans compiled into the binary.
    pub fn bundled() -> Result<Self, FontError> {
        let parse = |bytes: &[u8]| {
            FontVec::try_from_vec(bytes.to_vec()).map_err(|_| FontError::Bundled)
        };
        Ok(CardFonts {
            regular: parse(BUNDLED_REGULAR)?,
            bold: parse(BUNDLED_BOLD)?,
        })
    }

    /// Tries the configured paths, then common system locations, then the bundled faces.
    pub fn discover(regular: Option<&Path>, bold: Option<&Path>) -> Result<Self, FontError> {
        if let Some(path) = regular {
            match CardFonts::load(path, bold) {
                Ok(fonts) => {
                    info!("Loaded card fonts from {}", path.display());
                    return Ok(fonts);
                }
                Err(err) => warn!("Configured card font unusable: {err}"),
            }
        }

        if let Some(regular_path) = REGULAR_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.is_file())
        {
            let bold_path = BOLD_CANDIDATES
                .iter()
                .map(Path::new)
                .find(|path| path.is_file());
            match CardFonts::load(regular_path, bold_path) {
                Ok(fonts) => {
                    info!("Loaded card fonts from {}", regular_path.display());
                    return Ok(fonts);
                }
                Err(err) => warn!("System font unusable: {err}"),
            }
        }

        info!("Using bundled DejaVu Sans for card text");
        CardFonts::bundled()
    }
}
