//! Plate region proposals.
//!
//! Two independent geometric strategies look for plate-shaped regions in a
//! frame. Neither decides whether a region really is a plate; that is left
//! to OCR validation, which also drives the fallback from one strategy to the
//! next through [`StrategyState`].

use image::{ GrayImage, RgbImage };
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::point::Point;

use crate::config::DetectorConfig;
use crate::image_process::{ dilate_rect, preprocess_image };
use crate::utils::{ self, BoundingBox };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionStrategy {
    /// quadrilaterals in the Canny edge map
    Contour,
    /// elongated blobs in the dilated frame
    Morphological,
}

/// Which strategy runs next. A strategy is left only when none of its
/// candidates produced a validated plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Contour,
    Morphological,
    Exhausted,
}

impl StrategyState {

    pub fn start() -> Self {
        StrategyState::Contour
    }

    pub fn strategy(&self) -> Option<DetectionStrategy> {
        match self {
            StrategyState::Contour => Some(DetectionStrategy::Contour),
            StrategyState::Morphological => Some(DetectionStrategy::Morphological),
            StrategyState::Exhausted => None,
        }
    }

    pub fn advance(self) -> Self {
        match self {
            StrategyState::Contour => StrategyState::Morphological,
            StrategyState::Morphological | StrategyState::Exhausted => StrategyState::Exhausted,
        }
    }
}

/// A region proposed by one of the strategies, not yet read.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub strategy: DetectionStrategy,
    /// raw bounding rectangle, before any padding
    pub bbox: BoundingBox,
    /// enclosed area of the source contour or blob
    pub area: f64,
    /// the 4 simplified vertices, only for contour candidates
    pub polygon: Option<Vec<Point<i32>>>,
}

pub struct PlateDetector {
    config: DetectorConfig,
}

impl PlateDetector {

    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, frame: &RgbImage, strategy: DetectionStrategy) -> Vec<Candidate> {
        match strategy {
            DetectionStrategy::Contour => self.detect_plates_contour(frame).0,
            DetectionStrategy::Morphological => self.detect_plates_morphological(frame),
        }
    }

    /// Strategy A. Returns the accepted quadrilaterals and the edge map they came from.
    pub fn detect_plates_contour(&self, frame: &RgbImage) -> (Vec<Candidate>, GrayImage) {
        let config = &self.config;
        let (_, blurred) = preprocess_image(frame);
        let edged = canny(&blurred, config.canny_low, config.canny_high);

        let mut candidates = Vec::new();
        for (contour, area) in largest_contours(&edged, config.max_contours) {
            let perimeter = utils::arc_length(&contour);
            if perimeter == 0.0 {
                continue;
            }
            let polygon = utils::approximate_polygon(&contour, config.approx_epsilon * perimeter);
            if polygon.len() != 4 || !self.area_in_bounds(area) {
                continue;
            }
            if let Some(bbox) = BoundingBox::of_points(&polygon) {
                candidates.push(Candidate {
                    strategy: DetectionStrategy::Contour,
                    bbox,
                    area,
                    polygon: Some(polygon),
                });
            }
        }
        tracing::debug!(candidates = candidates.len(), "contour strategy");
        (candidates, edged)
    }

    /// Strategy B. Dilation merges the characters of a plate into one wide blob.
    pub fn detect_plates_morphological(&self, frame: &RgbImage) -> Vec<Candidate> {
        let config = &self.config;
        let (_, blurred) = preprocess_image(frame);
        let dilated = dilate_rect(&blurred, config.dilate_width, config.dilate_height);

        let mut candidates = Vec::new();
        for (contour, area) in largest_contours(&dilated, config.max_contours) {
            let bbox = match BoundingBox::of_points(&contour) {
                Some(bbox) => bbox,
                None => continue,
            };
            let aspect_ratio = bbox.aspect_ratio();
            if aspect_ratio > config.min_aspect_ratio
                && aspect_ratio < config.max_aspect_ratio
                && self.area_in_bounds(area)
            {
                candidates.push(Candidate {
                    strategy: DetectionStrategy::Morphological,
                    bbox,
                    area,
                    polygon: None,
                });
            }
        }
        tracing::debug!(candidates = candidates.len(), "morphological strategy");
        candidates
    }

    /// Crop a candidate out of the frame.
    ///
    /// Contour candidates get `padding` pixels on every side; blob candidates
    /// are cropped as they are. The returned box is clamped to the frame and is
    /// the one to draw. None when the clamped region is empty.
    pub fn extract_plate_region(&self, frame: &RgbImage, candidate: &Candidate) -> Option<(RgbImage, BoundingBox)> {
        let (width, height) = frame.dimensions();
        let padding = match candidate.strategy {
            DetectionStrategy::Contour => self.config.padding,
            DetectionStrategy::Morphological => 0,
        };
        let bbox = candidate.bbox.padded(padding, width, height)?;
        Some((utils::crop(frame, &bbox), bbox))
    }

    fn area_in_bounds(&self, area: f64) -> bool {
        self.config.min_plate_area <= area && area <= self.config.max_plate_area
    }
}

impl Default for PlateDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

// every border in the mask (non-zero is foreground), largest area first
fn largest_contours(mask: &GrayImage, limit: usize) -> Vec<(Vec<Point<i32>>, f64)> {
    let mut contours: Vec<(Vec<Point<i32>>, f64)> = find_contours::<i32>(mask)
        .into_iter()
        .map(|contour| {
            let area = utils::contour_area(&contour.points);
            (contour.points, area)
        })
        .collect();
    contours.sort_by(|a, b| b.1.total_cmp(&a.1));
    contours.truncate(limit);
    contours
}


#[cfg(test)]
mod test {

    use super::*;
    use crate::test_utils::{ ellipse_scene, plate_scene };

    use image::Rgb;

    const PLATE: BoundingBox = BoundingBox { x: 100, y: 150, width: 200, height: 50 };

    #[test]
    fn strategy_states_run_in_order() {
        let mut state = StrategyState::start();
        assert_eq!(state.strategy(), Some(DetectionStrategy::Contour));
        state = state.advance();
        assert_eq!(state.strategy(), Some(DetectionStrategy::Morphological));
        state = state.advance();
        assert_eq!(state, StrategyState::Exhausted);
        assert_eq!(state.strategy(), None);
        assert_eq!(state.advance(), StrategyState::Exhausted);
    }

    #[test]
    fn uniform_frame_has_no_candidates() {
        let frame = RgbImage::from_pixel(400, 300, Rgb([128, 128, 128]));
        let detector = PlateDetector::default();
        let (candidates, edges) = detector.detect_plates_contour(&frame);
        assert!(candidates.is_empty());
        assert!(edges.pixels().all(|p| p[0] == 0));
        assert!(detector.detect_plates_morphological(&frame).is_empty());
    }

    #[test]
    fn contour_strategy_finds_white_plate_on_gray() {
        let frame = plate_scene(400, 300, PLATE, Rgb([128, 128, 128]));
        let detector = PlateDetector::default();
        let (candidates, _) = detector.detect_plates_contour(&frame);
        let best = candidates.iter().map(|c| c.bbox.iou(&PLATE)).fold(0.0, f64::max);
        assert!(best >= 0.8, "best iou {} in {:?}", best, candidates);
        for candidate in &candidates {
            assert_eq!(candidate.polygon.as_ref().map(|p| p.len()), Some(4));
            assert!(candidate.area >= 1000.0 && candidate.area <= 50000.0);
        }
    }

    #[test]
    fn either_strategy_finds_plate_on_dark_background() {
        let frame = plate_scene(400, 300, PLATE, Rgb([0, 0, 0]));
        let detector = PlateDetector::default();
        let mut candidates = detector.detect_plates_contour(&frame).0;
        candidates.extend(detector.detect_plates_morphological(&frame));
        assert!(candidates.iter().any(|c| c.bbox.iou(&PLATE) >= 0.8), "{:?}", candidates);
    }

    #[test]
    fn morphological_strategy_finds_wide_blob() {
        let frame = plate_scene(400, 300, PLATE, Rgb([0, 0, 0]));
        let candidates = PlateDetector::default().detect_plates_morphological(&frame);
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.strategy, DetectionStrategy::Morphological);
        assert!(candidate.bbox.iou(&PLATE) >= 0.8);
        let ratio = candidate.bbox.aspect_ratio();
        assert!(ratio > 2.0 && ratio < 5.0);
    }

    #[test]
    fn ellipse_is_not_a_quadrilateral() {
        let frame = ellipse_scene(400, 300);
        let detector = PlateDetector::default();
        assert!(detector.detect_plates_contour(&frame).0.is_empty());
        assert_eq!(detector.detect_plates_morphological(&frame).len(), 1);
    }

    #[test]
    fn oversized_blob_is_rejected() {
        let big = BoundingBox::new(10, 10, 380, 200);
        let frame = plate_scene(400, 300, big, Rgb([0, 0, 0]));
        let detector = PlateDetector::default();
        assert!(detector.detect_plates_contour(&frame).0.is_empty());
        assert!(detector.detect_plates_morphological(&frame).is_empty());
    }

    #[test]
    fn undersized_plate_is_rejected() {
        let small = BoundingBox::new(175, 144, 50, 12);
        let frame = plate_scene(400, 300, small, Rgb([0, 0, 0]));
        let detector = PlateDetector::default();
        assert!(detector.detect_plates_contour(&frame).0.is_empty());
        assert!(detector.detect_plates_morphological(&frame).is_empty());

        // the same blob passes once the lower bound allows it
        let relaxed = PlateDetector::new(DetectorConfig { min_plate_area: 100.0, ..DetectorConfig::default() });
        let candidates = relaxed.detect_plates_morphological(&frame);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].area < 1000.0);
    }

    #[test]
    fn square_blob_is_rejected() {
        let square = BoundingBox::new(140, 90, 120, 120);
        let frame = plate_scene(400, 300, square, Rgb([0, 0, 0]));
        assert!(PlateDetector::default().detect_plates_morphological(&frame).is_empty());
    }

    #[test]
    fn overlong_blob_is_rejected() {
        let strip = BoundingBox::new(80, 135, 240, 30);
        let frame = plate_scene(400, 300, strip, Rgb([0, 0, 0]));
        assert!(PlateDetector::default().detect_plates_morphological(&frame).is_empty());
    }

    #[test]
    fn extracted_regions_stay_inside_the_frame() {
        let corner = BoundingBox::new(0, 0, 150, 40);
        let frame = plate_scene(320, 240, corner, Rgb([0, 0, 0]));
        let detector = PlateDetector::default();
        let mut candidates = detector.detect_plates_contour(&frame).0;
        candidates.extend(detector.detect_plates_morphological(&frame));
        for candidate in &candidates {
            let (plate, bbox) = detector.extract_plate_region(&frame, candidate).unwrap();
            assert!(bbox.right() <= 320 && bbox.bottom() <= 240);
            assert_eq!(plate.dimensions(), (bbox.width, bbox.height));
        }
    }

    #[test]
    fn contour_candidates_are_padded() {
        let frame = RgbImage::from_pixel(400, 300, Rgb([0, 0, 0]));
        let candidate = Candidate {
            strategy: DetectionStrategy::Contour,
            bbox: PLATE,
            area: 10000.0,
            polygon: None,
        };
        let detector = PlateDetector::default();
        let (plate, bbox) = detector.extract_plate_region(&frame, &candidate).unwrap();
        assert_eq!(bbox, BoundingBox::new(95, 145, 210, 60));
        assert_eq!(plate.dimensions(), (210, 60));

        let blob = Candidate { strategy: DetectionStrategy::Morphological, ..candidate };
        let (_, bbox) = detector.extract_plate_region(&frame, &blob).unwrap();
        assert_eq!(bbox, PLATE);
    }
}
