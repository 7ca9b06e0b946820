use imageproc::drawing;
use image::Rgb;

use std::error::Error;
use std::env::args;
use std::path::Path;
use std::process;

use lpr_rust::{ DetectionStrategy, PlateDetector };

// draws every candidate of both strategies without reading them,
// red for quadrilaterals and blue for blobs, and saves the edge map next to it
fn main() -> Result<(), Box<dyn Error>> {
    let mut args = args();
    args.next();
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("didn't get a image from args");
            process::exit(1);
        }
    };

    let detector = PlateDetector::default();
    let frame = image::open(&path)?.to_rgb8();
    let (contour_candidates, edges) = detector.detect_plates_contour(&frame);
    let blob_candidates = detector.detect_plates_morphological(&frame);

    let mut img = frame.clone();
    for candidate in contour_candidates.iter().chain(blob_candidates.iter()) {
        let color = match candidate.strategy {
            DetectionStrategy::Contour => Rgb([255, 0, 0]),
            DetectionStrategy::Morphological => Rgb([0, 0, 255]),
        };
        drawing::draw_hollow_rect_mut(&mut img, candidate.bbox.to_rect(), color);
        println!("{:?}: {:?}, area: {:.0}", candidate.strategy, candidate.bbox, candidate.area);
    }

    let stem = Path::new(&path).file_stem().ok_or("input has no file name")?.to_string_lossy().into_owned();
    img.save(format!("detect_{}.png", stem))?;
    edges.save(format!("edges_{}.png", stem))?;
    println!("contour: {}, morphological: {}", contour_candidates.len(), blob_candidates.len());
    Ok(())
}
