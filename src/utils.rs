use image::RgbImage;
use imageproc::point::Point;
use imageproc::rect::Rect;

/// Axis-aligned rectangle in frame coordinates, x,y,width,height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest rectangle holding every point, both ends inclusive.
    /// Negative coordinates are clipped to the frame origin.
    pub fn of_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let min_x = min_x.max(0);
        let min_y = min_y.max(0);
        if max_x < min_x || max_y < min_y {
            return None;
        }
        Some(Self::new(min_x as u32, min_y as u32, (max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grow by `padding` on each side, then clamp to a `frame_width` x `frame_height` frame.
    /// None when nothing of the box is left inside the frame.
    pub fn padded(&self, padding: u32, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x_start = self.x.saturating_sub(padding);
        let y_start = self.y.saturating_sub(padding);
        let x_end = self.right().saturating_add(padding).min(frame_width);
        let y_end = self.bottom().saturating_add(padding).min(frame_height);
        if x_end <= x_start || y_end <= y_start {
            return None;
        }
        Some(Self::new(x_start, y_start, x_end - x_start, y_end - y_start))
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Self::new(x, y, right - x, bottom - y))
    }

    /// intersection over union, 0 for disjoint boxes
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = match self.intersection(other) {
            Some(inter) => inter.area(),
            None => return 0.0,
        };
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }

    pub fn to_rect(&self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width.max(1), self.height.max(1))
    }
}

/// Copy the pixels under `bbox`. The box must already be clamped to the frame.
pub fn crop(frame: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    image::imageops::crop_imm(frame, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}

/// Enclosed area of a closed point sequence (shoelace formula), always >= 0
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points.iter().zip(points.iter().cycle().skip(1)).map(|(a, b)| {
        a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
    }).sum();
    (twice as f64 / 2.0).abs()
}

/// Perimeter of a closed point sequence
pub fn arc_length(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points.iter().zip(points.iter().cycle().skip(1)).map(|(a, b)| distance(*a, *b)).sum()
}

/// Douglas-Peucker simplification of a closed curve.
///
/// The curve is split at two mutually distant points and each half is simplified
/// on its own, so the result has no repeated closing vertex: a rectangle comes back
/// as exactly four corners.
pub fn approximate_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let far = farthest_from(points, points[0]);
    let far2 = farthest_from(points, points[far]);
    let (a, b) = (far.min(far2), far.max(far2));
    if a == b {
        return vec![points[a]];
    }

    let second_half: Vec<Point<i32>> = points[b..].iter().chain(points[..=a].iter()).copied().collect();
    let mut polygon = simplify_open(&points[a..=b], epsilon);
    // b opens the second half
    polygon.pop();
    let mut tail = simplify_open(&second_half, epsilon);
    // a already opens the polygon
    tail.pop();
    polygon.append(&mut tail);
    polygon
}

fn simplify_open(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    let first = points[0];
    let last = points[points.len() - 1];
    let mut dmax = 0.0;
    let mut index = 0;
    for (i, p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = segment_distance(first, last, *p);
        if d > dmax {
            dmax = d;
            index = i;
        }
    }
    if dmax > epsilon {
        let mut left = simplify_open(&points[..=index], epsilon);
        left.pop();
        left.append(&mut simplify_open(&points[index..], epsilon));
        left
    } else {
        vec![first, last]
    }
}

fn farthest_from(points: &[Point<i32>], origin: Point<i32>) -> usize {
    let mut best = 0;
    let mut best_d = -1.0;
    for (i, p) in points.iter().enumerate() {
        let d = distance(origin, *p);
        if d > best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

fn distance(a: Point<i32>, b: Point<i32>) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

// distance from p to the line through a and b
fn segment_distance(a: Point<i32>, b: Point<i32>, p: Point<i32>) -> f64 {
    let len = distance(a, b);
    if len == 0.0 {
        return distance(a, p);
    }
    let cross = (b.x - a.x) as f64 * (p.y - a.y) as f64 - (b.y - a.y) as f64 * (p.x - a.x) as f64;
    cross.abs() / len
}
