//! Raster filters shared by plate detection and OCR preparation.
//!
//! Smoothing, morphology, edges and Otsu levels come from imageproc. The
//! Gaussian kernels are built with OpenCV's tap counts so an "11x11" window
//! really spans 11 pixels; CLAHE is written out here over `GrayImage`.

use image::{ imageops::FilterType, DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, RgbImage };
use imageproc::morphology::{ self, Mask };
use imageproc::{ contrast, filter };

/// Window diameter and sigmas of the frame-level bilateral filter
pub const BILATERAL_DIAMETER: u32 = 11;
pub const BILATERAL_SIGMA: f32 = 17.0;

type GrayFloat = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Grayscale + edge preserving smoothing of a whole frame.
/// Returns (gray, blurred).
pub fn preprocess_image(frame: &RgbImage) -> (GrayImage, GrayImage) {
    let gray = image::imageops::grayscale(frame);
    if gray.width() == 0 || gray.height() == 0 {
        return (gray.clone(), gray);
    }
    let blurred = filter::bilateral_filter(&gray, BILATERAL_DIAMETER, BILATERAL_SIGMA, BILATERAL_SIGMA);
    (gray, blurred)
}

/// Upscale 2x (cubic), binarize under uneven light and clean speckles.
/// A zero sized crop gives back an empty image.
pub fn enhance_plate_region(plate: &DynamicImage) -> GrayImage {
    let (width, height) = plate.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(0, 0);
    }
    let upscaled = plate.resize_exact(width * 2, height * 2, FilterType::CatmullRom);
    let gray = upscaled.to_luma8();
    let binary = adaptive_threshold_gaussian(&gray, 11, 2);
    let closed = morph_close(&binary, 1, 1);
    morph_open(&closed, 1, 1)
}

/// Sigma OpenCV derives for a Gaussian kernel of `size` taps
pub fn kernel_sigma(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized Gaussian taps the way OpenCV's `getGaussianKernel(size, 0)`
/// builds them: fixed binomial tables up to 7 taps, sampled from
/// [`kernel_sigma`] above. Even sizes grow to the next odd one.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) | 1;
    match size {
        1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {
            let sigma = kernel_sigma(size);
            let radius = (size / 2) as i32;
            let taps: Vec<f32> = (-radius..=radius)
                .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
                .collect();
            let sum: f32 = taps.iter().sum();
            taps.into_iter().map(|t| t / sum).collect()
        }
    }
}

// separable Gaussian over a float copy, so the horizontal pass is not rounded
fn gaussian_smooth(image: &GrayImage, size: u32) -> GrayFloat {
    let float: GrayFloat = ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] as f32])
    });
    filter::separable_filter_equal(&float, &gaussian_kernel(size))
}

fn round_to_gray(image: &GrayFloat) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Gaussian-weighted local threshold: a pixel turns white when it is brighter
/// than the mean of its `block_size` x `block_size` neighbourhood minus `offset`.
pub fn adaptive_threshold_gaussian(image: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let mean = round_to_gray(&gaussian_smooth(image, block_size));
    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as i16;
        let local = mean.get_pixel(x, y)[0] as i16;
        if value - local > -offset { Luma([255]) } else { Luma([0]) }
    })
}

/// 3-tap Gaussian smoothing
pub fn smooth_3x3(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    round_to_gray(&gaussian_smooth(image, 3))
}

/// Global binarization at the Otsu level, pixels strictly above it become 255.
/// An image that is already two-valued comes back unchanged.
pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let level = contrast::otsu_level(image);
    let mut binary = image.clone();
    for pixel in binary.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    binary
}

/// `width` x `height` rectangle anchored at its centre, sides capped at 511.
pub fn rect_mask(width: u32, height: u32) -> Mask {
    let (width, height) = (width.clamp(1, 511), height.clamp(1, 511));
    let shape = GrayImage::from_pixel(width, height, Luma([255]));
    Mask::from_image(&shape, (width / 2) as u8, (height / 2) as u8)
}

/// Grayscale dilation with a `width` x `height` rectangle anchored at its centre
pub fn dilate_rect(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    morphology::grayscale_dilate(image, &rect_mask(width, height))
}

/// Grayscale erosion with a `width` x `height` rectangle anchored at its centre
pub fn erode_rect(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    morphology::grayscale_erode(image, &rect_mask(width, height))
}

pub fn morph_close(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    morphology::grayscale_close(image, &rect_mask(width, height))
}

pub fn morph_open(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    morphology::grayscale_open(image, &rect_mask(width, height))
}

/// Contrast limited adaptive histogram equalization.
///
/// The image is cut into `tiles` (columns, rows); every tile gets its own
/// equalization curve with histogram bins clipped at `clip_limit` times the
/// average bin height, the clipped excess spread over all bins. Pixels blend
/// the curves of the four nearest tile centres.
pub fn clahe(image: &GrayImage, clip_limit: f32, tiles: (u32, u32)) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tile_w = width.div_ceil(tiles.0.clamp(1, width));
    let tile_h = height.div_ceil(tiles.1.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(width), (y0 + tile_h).min(height));
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut_at = |tx: i64, ty: i64, value: u8| -> f32 {
        let tx = tx.clamp(0, tiles_x as i64 - 1) as u32;
        let ty = ty.clamp(0, tiles_y as i64 - 1) as u32;
        luts[(ty * tiles_x + tx) as usize][value as usize] as f32
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0];
        let fx = x as f32 / tile_w as f32 - 0.5;
        let fy = y as f32 / tile_h as f32 - 0.5;
        let (tx, ty) = (fx.floor(), fy.floor());
        let (ax, ay) = (fx - tx, fy - ty);
        let (tx, ty) = (tx as i64, ty as i64);

        let top = lut_at(tx, ty, value) * (1.0 - ax) + lut_at(tx + 1, ty, value) * ax;
        let bottom = lut_at(tx, ty + 1, value) * (1.0 - ax) + lut_at(tx + 1, ty + 1, value) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let bonus = excess / 256;
        let residual = excess % 256;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += bonus;
            if (i as u32) < residual {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[i] = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}
