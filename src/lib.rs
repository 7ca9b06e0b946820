use ab_glyph::{ FontVec, PxScale };
use image::{ DynamicImage, GenericImageView, Rgb, RgbImage };
use imageproc::{ drawing, rect };

use std::fs;
use std::path::Path;

use error::LprError;

pub mod config;
pub mod detect;
pub mod error;
pub mod image_process;
pub mod ocr;
pub mod recognize;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ DetectorConfig, LprConfig, RecognizerConfig };
pub use detect::{ Candidate, DetectionStrategy, PlateDetector, StrategyState };
pub use ocr::{ OcrEngine, OcrProfile, OcrToken, TesseractCli };
pub use recognize::{ CharacterRecognizer, Recognition };
pub use utils::BoundingBox;

/// A candidate whose padded box overlaps an already read plate this much is the same plate
const DUPLICATE_IOU: f64 = 0.8;
const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_SCALE: f32 = 24.0;

/// One plate read from a frame.
#[derive(Debug, Clone)]
pub struct PlateReading {
    pub text: String,
    pub confidence: Option<f32>,
    /// clamped crop box in frame coordinates
    pub bbox: BoundingBox,
    pub strategy: DetectionStrategy,
    /// the image the text was read from
    pub processed: DynamicImage,
}

pub struct Lpr<E = TesseractCli> {
    detector: PlateDetector,
    recognizer: CharacterRecognizer<E>,
}

impl Lpr<TesseractCli> {

    pub fn new(config: LprConfig) -> Self {
        let engine = TesseractCli::new(config.recognizer.tesseract.clone());
        Self::with_engine(config, engine)
    }
}

impl<E: OcrEngine> Lpr<E> {

    pub fn with_engine(config: LprConfig, engine: E) -> Self {
        let detector = PlateDetector::new(config.detector);
        let recognizer = CharacterRecognizer::new(engine, config.recognizer.profiles);
        Lpr { detector, recognizer }
    }

    pub fn detector(&self) -> &PlateDetector {
        &self.detector
    }

    pub fn recognizer(&self) -> &CharacterRecognizer<E> {
        &self.recognizer
    }

    /// Recognize every plate in one image.
    ///
    /// The contour strategy runs first; the morphological one only gets the
    /// frame when no contour candidate produced a valid plate. An empty result
    /// means no plate, only an empty frame is an error.
    pub fn recognize(&self, img: &DynamicImage) -> Result<Vec<PlateReading>, LprError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(LprError::invalid_input(format!("empty frame {}x{}", width, height)));
        }
        let frame = img.to_rgb8();

        let mut state = StrategyState::start();
        while let Some(strategy) = state.strategy() {
            let readings = self.read_candidates(&frame, strategy);
            if !readings.is_empty() {
                return Ok(readings);
            }
            tracing::debug!(?strategy, "no plate validated");
            state = state.advance();
        }
        Ok(Vec::new())
    }

    fn read_candidates(&self, frame: &RgbImage, strategy: DetectionStrategy) -> Vec<PlateReading> {
        let mut readings: Vec<PlateReading> = Vec::new();
        for candidate in self.detector.detect(frame, strategy) {
            let (plate, bbox) = match self.detector.extract_plate_region(frame, &candidate) {
                Some(region) => region,
                None => continue,
            };
            if readings.iter().any(|r| r.bbox.iou(&bbox) >= DUPLICATE_IOU) {
                continue;
            }
            let recognition = self.recognizer.recognize_characters(&DynamicImage::ImageRgb8(plate));
            if recognition.is_empty() {
                continue;
            }
            readings.push(PlateReading {
                text: recognition.text,
                confidence: recognition.confidence,
                bbox,
                strategy,
                processed: recognition.processed,
            });
        }
        readings
    }
}

impl Default for Lpr<TesseractCli> {
    fn default() -> Self {
        Self::new(LprConfig::default())
    }
}

/// Draw a 2 px box around every reading, and its text above the box when a font is given.
pub fn annotate(img: &DynamicImage, readings: &[PlateReading], font: Option<&FontVec>) -> RgbImage {
    let mut annotated = img.to_rgb8();
    for reading in readings {
        let BoundingBox { x, y, width, height } = reading.bbox;
        let outer = rect::Rect::at(x as i32, y as i32).of_size(width.max(1), height.max(1));
        drawing::draw_hollow_rect_mut(&mut annotated, outer, ANNOTATION_COLOR);
        if width > 2 && height > 2 {
            let inner = rect::Rect::at(x as i32 + 1, y as i32 + 1).of_size(width - 2, height - 2);
            drawing::draw_hollow_rect_mut(&mut annotated, inner, ANNOTATION_COLOR);
        }
        if let Some(font) = font {
            let text_y = (y as i32 - 10 - TEXT_SCALE as i32).max(0);
            drawing::draw_text_mut(&mut annotated, ANNOTATION_COLOR, x as i32, text_y, PxScale::from(TEXT_SCALE), font, &reading.text);
        }
    }
    annotated
}

pub fn load_font(path: impl AsRef<Path>) -> Result<FontVec, LprError> {
    let data = fs::read(path)?;
    Ok(FontVec::try_from_vec(data)?)
}


#[cfg(test)]
mod test {

    use super::*;
    use crate::test_utils::{ ellipse_scene, plate_scene, ScriptedEngine };

    use std::error::Error;

    const PLATE: BoundingBox = BoundingBox { x: 100, y: 150, width: 200, height: 50 };

    fn reading_engine() -> ScriptedEngine {
        ScriptedEngine::new().data(8, Ok(vec![OcrToken::new("AB1234", 90)]))
    }

    #[test]
    fn contour_strategy_reads_the_plate() -> Result<(), Box<dyn Error>> {
        let engine = reading_engine();
        let lpr = Lpr::with_engine(LprConfig::default(), &engine);
        let img = DynamicImage::ImageRgb8(plate_scene(400, 300, PLATE, Rgb([128, 128, 128])));
        let readings = lpr.recognize(&img)?;
        assert!(!readings.is_empty());
        for reading in &readings {
            assert_eq!(reading.text, "AB1234");
            assert_eq!(reading.strategy, DetectionStrategy::Contour);
            assert!(reading.bbox.iou(&PLATE) >= 0.6);
            assert!(reading.bbox.right() <= 400 && reading.bbox.bottom() <= 300);
        }
        Ok(())
    }

    #[test]
    fn falls_back_to_morphological_strategy() -> Result<(), Box<dyn Error>> {
        let engine = reading_engine();
        let lpr = Lpr::with_engine(LprConfig::default(), &engine);
        let img = DynamicImage::ImageRgb8(ellipse_scene(400, 300));
        let readings = lpr.recognize(&img)?;
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].strategy, DetectionStrategy::Morphological);
        assert_eq!(readings[0].text, "AB1234");
        Ok(())
    }

    #[test]
    fn unreadable_plate_tries_both_strategies() -> Result<(), Box<dyn Error>> {
        // the white plate is found by both strategies on black, none of the reads validate
        let engine = ScriptedEngine::new();
        let lpr = Lpr::with_engine(LprConfig::default(), &engine);
        let img = DynamicImage::ImageRgb8(plate_scene(400, 300, PLATE, Rgb([0, 0, 0])));
        let contour = lpr.detector().detect_plates_contour(&img.to_rgb8()).0.len();
        let morphological = lpr.detector().detect_plates_morphological(&img.to_rgb8()).len();

        let readings = lpr.recognize(&img)?;
        assert!(readings.is_empty());
        assert!(morphological > 0);
        // the recognizer asks each profile once per distinct crop
        assert!(engine.data_calls() >= 3 * morphological);
        assert!(engine.data_calls() <= 3 * (contour + morphological));
        Ok(())
    }

    #[test]
    fn blank_frame_reads_nothing() -> Result<(), Box<dyn Error>> {
        let engine = reading_engine();
        let lpr = Lpr::with_engine(LprConfig::default(), &engine);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([128, 128, 128])));
        assert!(lpr.recognize(&img)?.is_empty());
        assert_eq!(engine.data_calls(), 0);
        Ok(())
    }

    #[test]
    fn empty_frame_is_an_error() {
        let engine = reading_engine();
        let lpr = Lpr::with_engine(LprConfig::default(), &engine);
        let err = lpr.recognize(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
        assert!(matches!(err.kind(), error::LprErrorKind::InvalidInput(_)));
    }

    #[test]
    fn annotation_outlines_the_plate() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, Rgb([0, 0, 0])));
        let reading = PlateReading {
            text: "AB1234".to_string(),
            confidence: Some(90.0),
            bbox: BoundingBox::new(10, 20, 50, 30),
            strategy: DetectionStrategy::Contour,
            processed: DynamicImage::new_luma8(100, 60),
        };
        let annotated = annotate(&img, &[reading], None);
        assert_eq!(*annotated.get_pixel(10, 20), ANNOTATION_COLOR);
        assert_eq!(*annotated.get_pixel(11, 21), ANNOTATION_COLOR);
        assert_eq!(*annotated.get_pixel(59, 49), ANNOTATION_COLOR);
        assert_eq!(*annotated.get_pixel(30, 35), Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(load_font("/nonexistent/font.ttf").is_err());
    }

    /// Needs a tesseract install and `LPR_TEST_FONT` pointing at a TrueType font.
    #[test]
    #[ignore]
    fn reads_rendered_plate_end_to_end() -> Result<(), Box<dyn Error>> {
        let font = load_font(std::env::var("LPR_TEST_FONT")?)?;
        let mut frame = plate_scene(400, 300, PLATE, Rgb([128, 128, 128]));
        drawing::draw_text_mut(&mut frame, Rgb([0, 0, 0]), 118, 158, PxScale::from(36.0), &font, "DL5622");
        let img = DynamicImage::ImageRgb8(frame);

        let lpr: Lpr = Lpr::default();
        let mut candidates = lpr.detector().detect_plates_contour(&img.to_rgb8()).0;
        candidates.extend(lpr.detector().detect_plates_morphological(&img.to_rgb8()));
        assert!(candidates.iter().any(|c| c.bbox.iou(&PLATE) >= 0.8));

        let readings = lpr.recognize(&img)?;
        assert!(readings.iter().any(|r| r.text.contains("5622") || r.text.contains("DL56")), "{:?}",
            readings.iter().map(|r| &r.text).collect::<Vec<_>>());
        Ok(())
    }
}
