//! Synthetic frames and a scripted OCR engine for unit tests.

use image::{ GrayImage, Rgb, RgbImage };
use imageproc::drawing::{ draw_filled_ellipse_mut, draw_filled_rect_mut };

use std::cell::Cell;
use std::collections::HashMap;

use crate::error::LprError;
use crate::ocr::{ OcrEngine, OcrProfile, OcrToken };
use crate::utils::BoundingBox;

/// White plate rectangle on a uniform background.
pub(crate) fn plate_scene(width: u32, height: u32, plate: BoundingBox, background: Rgb<u8>) -> RgbImage {
    let mut frame = RgbImage::from_pixel(width, height, background);
    draw_filled_rect_mut(&mut frame, plate.to_rect(), Rgb([255, 255, 255]));
    frame
}

/// Wide bright ellipse on black: a plate-like blob without corners.
pub(crate) fn ellipse_scene(width: u32, height: u32) -> RgbImage {
    let mut frame = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let center = (width as i32 / 2, height as i32 / 2);
    draw_filled_ellipse_mut(&mut frame, center, 90, 30, Rgb([200, 200, 200]));
    frame
}

/// Answers by page segmentation mode; unscripted modes fail like a missing engine.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    data: HashMap<u8, Result<Vec<OcrToken>, String>>,
    strings: HashMap<u8, Result<String, String>>,
    data_calls: Cell<usize>,
    string_calls: Cell<usize>,
}

impl ScriptedEngine {

    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn data(mut self, psm: u8, reply: Result<Vec<OcrToken>, String>) -> Self {
        self.data.insert(psm, reply);
        self
    }

    pub(crate) fn string(mut self, psm: u8, reply: Result<String, String>) -> Self {
        self.strings.insert(psm, reply);
        self
    }

    pub(crate) fn data_calls(&self) -> usize {
        self.data_calls.get()
    }

    pub(crate) fn string_calls(&self) -> usize {
        self.string_calls.get()
    }
}

impl OcrEngine for ScriptedEngine {
    fn image_to_data(&self, _image: &GrayImage, profile: &OcrProfile) -> Result<Vec<OcrToken>, LprError> {
        self.data_calls.set(self.data_calls.get() + 1);
        match self.data.get(&profile.psm) {
            Some(Ok(tokens)) => Ok(tokens.clone()),
            Some(Err(msg)) => Err(LprError::ocr(msg.clone())),
            None => Err(LprError::ocr("not scripted")),
        }
    }

    fn image_to_string(&self, _image: &GrayImage, profile: &OcrProfile) -> Result<String, LprError> {
        self.string_calls.set(self.string_calls.get() + 1);
        match self.strings.get(&profile.psm) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(msg)) => Err(LprError::ocr(msg.clone())),
            None => Err(LprError::ocr("not scripted")),
        }
    }
}
