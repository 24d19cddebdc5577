use tracing::debug;

use crate::image_impl::{get_perspective_transform, rotate_90_clockwise, warp_perspective, Mat, Point2f, Size};

/// Crops taller than this multiple of their width are treated as vertical text.
const VERTICAL_RATIO: f32 = 1.5;

/// Order four corners as top-left, top-right, bottom-right, bottom-left:
/// stable sort by y, then fix the left/right order of each pair.
pub fn order_points(pts: [Point2f; 4]) -> [Point2f; 4] {
    let mut sorted = pts;
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));

    if sorted[0].x > sorted[1].x {
        sorted.swap(0, 1);
    }
    if sorted[2].x < sorted[3].x {
        sorted.swap(2, 3);
    }
    sorted
}

pub fn clamp_points(mut pts: [Point2f; 4], width: f32, height: f32) -> [Point2f; 4] {
    for p in &mut pts {
        p.x = p.x.clamp(0.0, width);
        p.y = p.y.clamp(0.0, height);
    }
    pts
}

/// Perspective-rectify the region under `points` into an upright crop.
///
/// Returns `None` when the region has no area inside the image. Crops much
/// taller than wide are rotated 90° clockwise so text runs horizontally.
pub fn crop_text_region(img: &Mat, points: &[Point2f; 4]) -> Option<Mat> {
    if img.empty() {
        return None;
    }

    // Degenerate check on whole-pixel extents inside the image.
    let x_min = points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let x_max = points.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let y_min = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let y_max = points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
    let (x1, y1) = (x_min.max(0.0) as i32, y_min.max(0.0) as i32);
    let (x2, y2) = (x_max.min(img.cols() as f32) as i32, y_max.min(img.rows() as f32) as i32);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let width = points[0].distance(&points[1]).max(1.0);
    let height = points[0].distance(&points[3]).max(1.0);

    let dst = [
        Point2f::new(0.0, 0.0),
        Point2f::new(width, 0.0),
        Point2f::new(width, height),
        Point2f::new(0.0, height),
    ];

    let crop = get_perspective_transform(points, &dst)
        .and_then(|m| warp_perspective(img, &m, Size::new(width as i32, height as i32)));
    let crop = match crop {
        Ok(crop) => crop,
        Err(err) => {
            debug!("Skipping region {:?}: {}", points, err);
            return None;
        }
    };

    if crop.rows() as f32 > crop.cols() as f32 * VERTICAL_RATIO {
        Some(rotate_90_clockwise(&crop))
    } else {
        Some(crop)
    }
}
