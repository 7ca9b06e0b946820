//! Detector and recognizer settings.
//!
//! Everything here is resolved once by the application (defaults, optionally
//! overridden from a TOML file) and handed to the pipeline at construction.
//! The core only ever reads these values.

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LprError;
use crate::ocr::OcrProfile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LprConfig {
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
}

impl LprConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, LprError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LprError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Geometric plausibility filters shared by both detection strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// pixel² in the working resolution, inclusive
    pub min_plate_area: f64,
    pub max_plate_area: f64,
    pub canny_low: f32,
    pub canny_high: f32,
    /// how many of the largest contours are examined per strategy
    pub max_contours: usize,
    /// polygon approximation tolerance as a fraction of the perimeter
    pub approx_epsilon: f64,
    /// structuring element of the morphological strategy, width x height
    pub dilate_width: u32,
    pub dilate_height: u32,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// margin added around contour candidates before cropping
    pub padding: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_plate_area: 1000.0,
            max_plate_area: 50000.0,
            canny_low: 30.0,
            canny_high: 200.0,
            max_contours: 10,
            approx_epsilon: 0.018,
            dilate_width: 13,
            dilate_height: 5,
            min_aspect_ratio: 2.0,
            max_aspect_ratio: 5.0,
            padding: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// tesseract executable, a bare name is looked up in PATH
    pub tesseract: PathBuf,
    /// tried in order, earlier profiles win confidence ties
    pub profiles: Vec<OcrProfile>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract: PathBuf::from("tesseract"),
            profiles: OcrProfile::defaults(),
        }
    }
}
