//! Plate text recognition.
//!
//! A cropped plate is binarized once, then read under every configured
//! profile. Each profile run becomes an [`OcrAttempt`]; [`select_best`] keeps
//! the most confident attempt whose cleaned text looks like a plate. Failures
//! of single runs are recorded and skipped, never raised.

use image::{ DynamicImage, GenericImageView, GrayImage };

use crate::image_process::{ clahe, enhance_plate_region, otsu_binarize, smooth_3x3 };
use crate::ocr::{ OcrEngine, OcrProfile, OcrToken };

pub const MIN_PLATE_LEN: usize = 5;
pub const MAX_PLATE_LEN: usize = 8;

/// Outcome of one profile run. `profile` indexes the recognizer's profile list.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrAttempt {
    Scored { profile: usize, text: String, confidence: f32 },
    Unscored { profile: usize, text: String },
    Failed { profile: usize, reason: String },
}

impl OcrAttempt {
    pub fn profile(&self) -> usize {
        match self {
            OcrAttempt::Scored { profile, .. }
            | OcrAttempt::Unscored { profile, .. }
            | OcrAttempt::Failed { profile, .. } => *profile,
        }
    }
}

/// Text read from one plate crop.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// empty, or a cleaned string that passed [`is_valid_plate_format`]
    pub text: String,
    /// None when the text came from the text-only pass
    pub confidence: Option<f32>,
    /// the image handed to the engine
    pub processed: DynamicImage,
}

impl Recognition {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct CharacterRecognizer<E> {
    engine: E,
    profiles: Vec<OcrProfile>,
}

impl<E: OcrEngine> CharacterRecognizer<E> {

    pub fn new(engine: E, profiles: Vec<OcrProfile>) -> Self {
        Self { engine, profiles }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn profiles(&self) -> &[OcrProfile] {
        &self.profiles
    }

    /// Read a plate crop. Total failure is an empty text, not an error.
    pub fn recognize_characters(&self, plate: &DynamicImage) -> Recognition {
        let (width, height) = plate.dimensions();
        if width == 0 || height == 0 {
            return Recognition { text: String::new(), confidence: None, processed: plate.clone() };
        }
        let processed = preprocess_for_ocr(plate);

        // every profile is heard before a winner is picked
        let attempts: Vec<OcrAttempt> = self.profiles.iter()
            .enumerate()
            .map(|(index, profile)| self.scored_attempt(index, profile, &processed))
            .collect();
        if let Some((text, confidence)) = select_best(&attempts) {
            tracing::debug!(%text, confidence, "plate read");
            return Recognition { text, confidence: Some(confidence), processed: DynamicImage::ImageLuma8(processed) };
        }

        let text = self.text_only_pass(&processed).unwrap_or_default();
        Recognition { text, confidence: None, processed: DynamicImage::ImageLuma8(processed) }
    }

    // one profile, asking for per-word confidence
    fn scored_attempt(&self, index: usize, profile: &OcrProfile, image: &GrayImage) -> OcrAttempt {
        match self.engine.image_to_data(image, profile) {
            Ok(tokens) => {
                let text = join_tokens(&tokens);
                match average_confidence(&tokens) {
                    Some(confidence) => OcrAttempt::Scored { profile: index, text, confidence },
                    None => OcrAttempt::Unscored { profile: index, text },
                }
            }
            Err(e) => {
                tracing::debug!(profile = %profile, error = %e, "ocr profile skipped");
                OcrAttempt::Failed { profile: index, reason: e.to_string() }
            }
        }
    }

    // first valid plain-text reading in profile order
    fn text_only_pass(&self, image: &GrayImage) -> Option<String> {
        for profile in &self.profiles {
            match self.engine.image_to_string(image, profile) {
                Ok(raw) => {
                    let cleaned = clean_text(&raw);
                    if is_valid_plate_format(&cleaned) {
                        tracing::debug!(text = %cleaned, "plate read without confidence");
                        return Some(cleaned);
                    }
                }
                Err(e) => tracing::debug!(profile = %profile, error = %e, "ocr profile skipped"),
            }
        }
        None
    }
}

/// Binarized, contrast-normalized image for the OCR engine.
pub fn preprocess_for_ocr(plate: &DynamicImage) -> GrayImage {
    let enhanced = enhance_plate_region(plate);
    let smoothed = smooth_3x3(&enhanced);
    let equalized = clahe(&smoothed, 2.0, (8, 8));
    otsu_binarize(&equalized)
}

/// Mean confidence of the words that carry both a confidence and some text.
pub fn average_confidence(tokens: &[OcrToken]) -> Option<f32> {
    let confident: Vec<i32> = tokens.iter()
        .filter(|t| t.confidence > 0 && !t.text.trim().is_empty())
        .map(|t| t.confidence)
        .collect();
    if confident.is_empty() {
        return None;
    }
    Some(confident.iter().sum::<i32>() as f32 / confident.len() as f32)
}

/// Non-blank words joined by a space
pub fn join_tokens(tokens: &[OcrToken]) -> String {
    tokens.iter()
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase, keep only A-Z and 0-9
pub fn clean_text(text: &str) -> String {
    text.to_uppercase().chars().filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit()).collect()
}

/// 5 to 8 characters with at least two letters and two digits.
pub fn is_valid_plate_format(text: &str) -> bool {
    let len = text.chars().count();
    if !(MIN_PLATE_LEN..=MAX_PLATE_LEN).contains(&len) {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    letters >= 2 && digits >= 2
}

/// Highest confidence among scored attempts whose cleaned text is a valid
/// plate; earlier attempts win ties. Returns the cleaned text.
pub fn select_best(attempts: &[OcrAttempt]) -> Option<(String, f32)> {
    let mut best: Option<(String, f32)> = None;
    for attempt in attempts {
        if let OcrAttempt::Scored { text, confidence, .. } = attempt {
            let cleaned = clean_text(text);
            if !is_valid_plate_format(&cleaned) {
                continue;
            }
            match &best {
                Some((_, best_confidence)) if *confidence <= *best_confidence => {}
                _ => best = Some((cleaned, *confidence)),
            }
        }
    }
    best
}
