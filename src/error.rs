use ab_glyph::InvalidFont;
use image::ImageError;
use thiserror::Error;

use std::io::Error as IOError;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct LprError(LprErrorKind);

#[derive(Debug, Error)]
pub enum LprErrorKind {
    #[error(transparent)]
    IOError(#[from] IOError),
    #[error(transparent)]
    ImageError(#[from] ImageError),
    #[error("invalid config: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("invalid font: {0}")]
    FontError(#[from] InvalidFont),
    /// one OCR engine invocation failed, callers in the core skip the profile
    #[error("ocr engine: {0}")]
    OcrError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LprError {
    pub fn kind(&self) -> &LprErrorKind {
        &self.0
    }

    pub fn ocr(msg: impl Into<String>) -> Self {
        Self(LprErrorKind::OcrError(msg.into()))
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self(LprErrorKind::InvalidInput(msg.into()))
    }
}

impl<T> From<T> for LprError
where T: Into<LprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}
