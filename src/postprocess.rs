use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::contours::{find_contours, BinaryMask};
use crate::geometry::{clamp_points, order_points};
use crate::image_impl::{min_area_rect, Point2f};
use crate::types::ScaleFactor;

/// Maximum difference in mean top-edge y for two boxes to count as one line.
const SAME_ROW_TOLERANCE: f32 = 10.0;

/// A text region: four corners ordered top-left, top-right, bottom-right,
/// bottom-left, plus the mean probability under its contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polygon {
    pub points: [Point2f; 4],
    pub score: f32,
}

impl Polygon {
    /// Axis-aligned extrema as `(x1, y1, x2, y2)`.
    pub fn bounding_rect(&self) -> (f32, f32, f32, f32) {
        let xs = self.points.iter().map(|p| p.x);
        let ys = self.points.iter().map(|p| p.y);
        (
            xs.clone().fold(f32::INFINITY, f32::min),
            ys.clone().fold(f32::INFINITY, f32::min),
            xs.fold(f32::NEG_INFINITY, f32::max),
            ys.fold(f32::NEG_INFINITY, f32::max),
        )
    }

    fn top_y(&self) -> f32 {
        (self.points[0].y + self.points[1].y) / 2.0
    }
}

/// Differentiable-binarization decoder: probability map in, ordered text
/// polygons in original-image coordinates out.
#[derive(Debug, Clone)]
pub struct DbPostProcess {
    pub thresh: f32,
    pub box_thresh: f32,
    pub min_size: f32,
}

impl Default for DbPostProcess {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.3,
            min_size: 3.0,
        }
    }
}

impl DbPostProcess {
    pub fn new(thresh: f32, box_thresh: f32, min_size: f32) -> Self {
        Self {
            thresh,
            box_thresh,
            min_size,
        }
    }

    pub fn decode(
        &self,
        pred: ArrayView2<'_, f32>,
        scale: ScaleFactor,
        ori_w: u32,
        ori_h: u32,
    ) -> Vec<Polygon> {
        let (h, w) = pred.dim();
        if h == 0 || w == 0 {
            return Vec::new();
        }

        let prob = activate(pred);
        let mask = BinaryMask::from_fn(w, h, |x, y| prob[[y, x]] > self.thresh);
        let contours = find_contours(&mask);

        let mut too_few_points = 0usize;
        let mut low_score = 0usize;
        let mut too_small = 0usize;
        let mut polygons = Vec::with_capacity(contours.len());

        for contour in &contours {
            if contour.points.len() < 4 {
                too_few_points += 1;
                continue;
            }

            let pts: Vec<Point2f> = contour
                .points
                .iter()
                .map(|&(x, y)| Point2f::new(x as f32, y as f32))
                .collect();
            let Some(rect) = min_area_rect(&pts) else {
                continue;
            };

            let score = region_mean(&prob, &contour.interior);
            if score < self.box_thresh {
                low_score += 1;
                continue;
            }

            if rect.min_side() < self.min_size {
                too_small += 1;
                continue;
            }

            let mapped = rect.points().map(|p| {
                let (x, y) = scale.to_original(p.x, p.y);
                Point2f::new(x, y)
            });
            let points = order_points(clamp_points(mapped, ori_w as f32, ori_h as f32));
            polygons.push(Polygon { points, score });
        }

        debug!(
            "DB decode: {} contours, {} kept (skipped: {} short, {} low score, {} small)",
            contours.len(),
            polygons.len(),
            too_few_points,
            low_score,
            too_small
        );

        sort_reading_order(&mut polygons);
        polygons
    }
}

/// Apply a sigmoid when the map's value range says it holds logits.
fn activate(pred: ArrayView2<'_, f32>) -> Array2<f32> {
    let (min, max) = pred
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if min < -0.1 || max > 1.1 {
        debug!("Probability map range [{min}, {max}], applying sigmoid");
        pred.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    } else {
        pred.to_owned()
    }
}

fn region_mean(prob: &Array2<f32>, pixels: &[(i32, i32)]) -> f32 {
    if pixels.is_empty() {
        return 0.0;
    }
    let sum: f64 = pixels
        .iter()
        .map(|&(x, y)| prob[[y as usize, x as usize]] as f64)
        .sum();
    (sum / pixels.len() as f64) as f32
}

/// Boxes whose top edges lie within the row tolerance read left to right,
/// otherwise top to bottom. Insertion sort keeps equal boxes in detection
/// order and only ever compares neighbours, so the non-transitive row test
/// is safe.
pub fn sort_reading_order(polygons: &mut [Polygon]) {
    fn before(a: &Polygon, b: &Polygon) -> bool {
        let (ay, by) = (a.top_y(), b.top_y());
        if (ay - by).abs() <= SAME_ROW_TOLERANCE {
            a.points[0].x < b.points[0].x
        } else {
            ay < by
        }
    }

    for i in 1..polygons.len() {
        let mut j = i;
        while j > 0 && before(&polygons[j], &polygons[j - 1]) {
            polygons.swap(j, j - 1);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_map(w: usize, h: usize, blocks: &[(usize, usize, usize, usize, f32)]) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            blocks
                .iter()
                .find(|&&(x0, y0, x1, y1, _)| (x0..=x1).contains(&x) && (y0..=y1).contains(&y))
                .map_or(0.0, |b| b.4)
        })
    }

    fn polygon_at(x: f32, y: f32) -> Polygon {
        Polygon {
            points: [
                Point2f::new(x, y),
                Point2f::new(x + 20.0, y),
                Point2f::new(x + 20.0, y + 8.0),
                Point2f::new(x, y + 8.0),
            ],
            score: 0.9,
        }
    }

    #[test]
    fn single_blob_yields_one_polygon() {
        let map = blob_map(4, 4, &[(1, 1, 2, 2, 0.95)]);
        let db = DbPostProcess::new(0.5, 0.5, 1.0);
        let polys = db.decode(map.view(), ScaleFactor::IDENTITY, 4, 4);

        assert_eq!(polys.len(), 1);
        let (x1, y1, x2, y2) = polys[0].bounding_rect();
        assert!((x1 - 1.0).abs() < 1e-3 && (y1 - 1.0).abs() < 1e-3);
        assert!((x2 - 2.0).abs() < 1e-3 && (y2 - 2.0).abs() < 1e-3);
        assert!((polys[0].score - 0.95).abs() < 1e-5);
    }

    #[test]
    fn default_min_size_drops_tiny_blob() {
        let map = blob_map(4, 4, &[(1, 1, 2, 2, 0.95)]);
        let db = DbPostProcess::new(0.5, 0.5, 3.0);
        assert!(db.decode(map.view(), ScaleFactor::IDENTITY, 4, 4).is_empty());
    }

    #[test]
    fn polygons_map_back_and_stay_in_bounds() {
        // 40x20 map of an image that was scaled by 2 in both directions.
        let map = blob_map(40, 20, &[(4, 4, 35, 15, 0.9)]);
        let db = DbPostProcess::default();
        let polys = db.decode(map.view(), ScaleFactor::new(2.0, 2.0), 20, 10);

        assert_eq!(polys.len(), 1);
        let p = &polys[0];
        assert!((p.points[0].x - 2.0).abs() < 1e-3 && (p.points[0].y - 2.0).abs() < 1e-3);
        assert!((p.points[2].x - 17.5).abs() < 1e-3 && (p.points[2].y - 7.5).abs() < 1e-3);
        for pt in &p.points {
            assert!(pt.x >= 0.0 && pt.x <= 20.0 && pt.y >= 0.0 && pt.y <= 10.0);
        }
    }

    #[test]
    fn corners_are_canonically_ordered() {
        let map = blob_map(30, 30, &[(5, 8, 24, 14, 0.9)]);
        let polys = DbPostProcess::default().decode(map.view(), ScaleFactor::IDENTITY, 30, 30);
        assert_eq!(polys.len(), 1);
        let [tl, tr, br, bl] = polys[0].points;
        assert!(tl.x < tr.x && bl.x < br.x);
        assert!(tl.y <= bl.y && tr.y <= br.y);
    }

    #[test]
    fn logits_are_squashed_before_thresholding() {
        let map = Array2::from_shape_fn((12, 12), |(y, x)| {
            if (2..=9).contains(&x) && (3..=8).contains(&y) {
                4.0
            } else {
                -4.0
            }
        });
        let polys = DbPostProcess::default().decode(map.view(), ScaleFactor::IDENTITY, 12, 12);
        assert_eq!(polys.len(), 1);
        let expected = 1.0 / (1.0 + (-4.0f32).exp());
        assert!((polys[0].score - expected).abs() < 1e-5);
    }

    #[test]
    fn box_threshold_is_monotone() {
        let map = blob_map(
            60,
            30,
            &[(2, 2, 20, 10, 0.95), (30, 2, 50, 10, 0.6), (2, 18, 40, 26, 0.45)],
        );
        let loose = DbPostProcess::new(0.3, 0.4, 3.0).decode(map.view(), ScaleFactor::IDENTITY, 60, 30);
        let strict = DbPostProcess::new(0.3, 0.7, 3.0).decode(map.view(), ScaleFactor::IDENTITY, 60, 30);

        assert_eq!(loose.len(), 3);
        assert_eq!(strict.len(), 1);
        for p in &strict {
            assert!(loose.contains(p));
        }
    }

    #[test]
    fn reading_order_groups_rows() {
        let mut polys = vec![
            polygon_at(100.0, 52.0),
            polygon_at(200.0, 5.0),
            polygon_at(10.0, 50.0),
            polygon_at(50.0, 0.0),
        ];
        sort_reading_order(&mut polys);
        let order: Vec<(f32, f32)> = polys.iter().map(|p| (p.points[0].x, p.points[0].y)).collect();
        assert_eq!(order, vec![(50.0, 0.0), (200.0, 5.0), (10.0, 50.0), (100.0, 52.0)]);
    }

    #[test]
    fn empty_map_yields_nothing() {
        let map = Array2::<f32>::zeros((0, 0));
        assert!(DbPostProcess::default().decode(map.view(), ScaleFactor::IDENTITY, 0, 0).is_empty());
        let blank = Array2::<f32>::zeros((8, 8));
        assert!(DbPostProcess::default().decode(blank.view(), ScaleFactor::IDENTITY, 8, 8).is_empty());
    }
}
