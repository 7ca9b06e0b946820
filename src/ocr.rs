//! OCR engine seam.
//!
//! The recognizer talks to any [`OcrEngine`]. [`TesseractCli`] drives the
//! `tesseract` executable, feeding the image as PNG on stdin; its location is
//! fixed when the engine is built.

use image::{ GrayImage, ImageFormat };
use serde::{ Deserialize, Serialize };

use std::fmt;
use std::io::{ Cursor, Write };
use std::path::{ Path, PathBuf };
use std::process::{ Command, Stdio };

use crate::error::LprError;

pub const PLATE_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One engine configuration: engine mode, page segmentation mode and the
/// characters the engine may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrProfile {
    pub oem: u8,
    pub psm: u8,
    pub whitelist: String,
}

impl OcrProfile {

    pub fn new(psm: u8) -> Self {
        Self { oem: 3, psm, whitelist: PLATE_WHITELIST.to_string() }
    }

    /// single word, single line, raw line; in priority order
    pub fn defaults() -> Vec<Self> {
        vec![Self::new(8), Self::new(7), Self::new(13)]
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "--oem".to_string(),
            self.oem.to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", self.whitelist),
        ]
    }
}

impl fmt::Display for OcrProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

/// A word reported by the engine. Confidence is 0..=100, -1 or 0 when the
/// engine has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: i32,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, confidence: i32) -> Self {
        Self { text: text.into(), confidence }
    }
}

pub trait OcrEngine {
    /// Words with per-word confidence.
    fn image_to_data(&self, image: &GrayImage, profile: &OcrProfile) -> Result<Vec<OcrToken>, LprError>;

    /// Plain text only.
    fn image_to_string(&self, image: &GrayImage, profile: &OcrProfile) -> Result<String, LprError>;
}

impl<E: OcrEngine + ?Sized> OcrEngine for &E {
    fn image_to_data(&self, image: &GrayImage, profile: &OcrProfile) -> Result<Vec<OcrToken>, LprError> {
        (**self).image_to_data(image, profile)
    }

    fn image_to_string(&self, image: &GrayImage, profile: &OcrProfile) -> Result<String, LprError> {
        (**self).image_to_string(image, profile)
    }
}

#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: PathBuf,
}

impl TesseractCli {

    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// First line of `tesseract --version`, an error when the executable cannot be run.
    pub fn version(&self) -> Result<String, LprError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .map_err(|e| LprError::ocr(format!("cannot run {}: {}", self.command.display(), e)))?;
        if !output.status.success() {
            return Err(LprError::ocr(format!("{} --version exited with {}", self.command.display(), output.status)));
        }
        // older releases print the banner on stderr
        let banner = if output.stdout.is_empty() { output.stderr } else { output.stdout };
        let banner = String::from_utf8_lossy(&banner);
        Ok(banner.lines().next().unwrap_or_default().trim().to_string())
    }

    fn run(&self, image: &GrayImage, profile: &OcrProfile, tsv: bool) -> Result<String, LprError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.command)
            .arg("stdin")
            .arg("stdout")
            .args(profile.args())
            .args(tsv.then_some("tsv"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LprError::ocr(format!("cannot run {}: {}", self.command.display(), e)))?;
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        };
        // reap the child even when it stopped reading early
        let output = child.wait_with_output()
            .map_err(|e| LprError::ocr(format!("{} did not finish: {}", self.command.display(), e)))?;
        if let Err(e) = written {
            return Err(LprError::ocr(format!(
                "{} stopped reading the image: {}: {}",
                self.command.display(),
                e,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !output.status.success() {
            return Err(LprError::ocr(format!(
                "{} exited with {}: {}",
                self.command.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractCli {
    fn image_to_data(&self, image: &GrayImage, profile: &OcrProfile) -> Result<Vec<OcrToken>, LprError> {
        let tsv = self.run(image, profile, true)?;
        Ok(parse_tsv(&tsv))
    }

    fn image_to_string(&self, image: &GrayImage, profile: &OcrProfile) -> Result<String, LprError> {
        self.run(image, profile, false)
    }
}

/// Words of a tesseract TSV report.
///
/// Columns: level page block par line word left top width height conf text.
/// The header and rows whose confidence does not parse are dropped; decimal
/// confidences are truncated.
pub fn parse_tsv(tsv: &str) -> Vec<OcrToken> {
    tsv.lines().filter_map(|line| {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            return None;
        }
        let confidence = fields[10].trim().parse::<f32>().ok()? as i32;
        let text = fields.get(11).copied().unwrap_or_default();
        Some(OcrToken::new(text, confidence))
    }).collect()
}
