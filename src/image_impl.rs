//! Image container and the raster geometry primitives the pipeline needs.

use std::path::Path;

use image::{imageops, ImageReader, Rgb, RgbImage};
use nalgebra::{Matrix3, SMatrix, SVector};

use crate::engine::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2f) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size2f {
    pub width: f32,
    pub height: f32,
}

/// 8-bit, 3-channel image. Pixels are always held in RGB order.
#[derive(Clone)]
pub struct Mat {
    image: RgbImage,
}

impl Default for Mat {
    fn default() -> Self {
        Self {
            image: RgbImage::new(0, 0),
        }
    }
}

impl Mat {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EngineError> {
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| EngineError::ImageError("RGB buffer does not match dimensions".to_string()))?;
        Ok(Self { image })
    }

    /// Camera frames arrive as BGRA rows that may carry padding at the end of
    /// each row, so `stride` is the byte distance between row starts.
    pub fn from_bgra(width: u32, height: u32, stride: usize, data: &[u8]) -> Result<Self, EngineError> {
        let row_bytes = width as usize * 4;
        if width == 0 || height == 0 {
            return Err(EngineError::ImageError("empty BGRA buffer".to_string()));
        }
        if stride < row_bytes {
            return Err(EngineError::ImageError(format!(
                "stride {stride} shorter than row of {row_bytes} bytes"
            )));
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return Err(EngineError::ImageError(format!(
                "BGRA buffer holds {} bytes, need {needed}",
                data.len()
            )));
        }

        let mut image = RgbImage::new(width, height);
        for y in 0..height {
            let row = &data[y as usize * stride..y as usize * stride + row_bytes];
            for (x, px) in row.chunks_exact(4).enumerate() {
                image.put_pixel(x as u32, y, Rgb([px[2], px[1], px[0]]));
            }
        }
        Ok(Self { image })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, EngineError> {
        let img = ImageReader::new(std::io::Cursor::new(data))
            .with_guessed_format()?
            .decode()?;
        Ok(Self { image: img.to_rgb8() })
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let mut f = f;
        Self {
            image: RgbImage::from_fn(width, height, |x, y| Rgb(f(x, y))),
        }
    }

    pub fn rows(&self) -> i32 {
        self.image.height() as i32
    }

    pub fn cols(&self) -> i32 {
        self.image.width() as i32
    }

    pub fn size(&self) -> Size {
        Size::new(self.cols(), self.rows())
    }

    pub fn empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }
}

pub fn imread<P: AsRef<Path>>(path: P) -> Result<Mat, EngineError> {
    let img = image::open(path)?;
    Ok(Mat::new(img.to_rgb8()))
}

/// Bilinear resize to exactly `dsize`.
pub fn resize(src: &Mat, dsize: Size) -> Mat {
    let resized = imageops::resize(
        &src.image,
        dsize.width.max(1) as u32,
        dsize.height.max(1) as u32,
        imageops::FilterType::Triangle,
    );
    Mat::new(resized)
}

pub fn rotate_90_clockwise(src: &Mat) -> Mat {
    Mat::new(imageops::rotate90(&src.image))
}

/// Homography taking each `src_pts[i]` onto `dst_pts[i]`, with `m[2][2] == 1`.
pub fn get_perspective_transform(
    src_pts: &[Point2f; 4],
    dst_pts: &[Point2f; 4],
) -> Result<[[f64; 3]; 3], EngineError> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let x = src_pts[i].x as f64;
        let y = src_pts[i].y as f64;
        let u = dst_pts[i].x as f64;
        let v = dst_pts[i].y as f64;

        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[i] = u;

        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[i + 4] = v;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| EngineError::Preprocess("degenerate quadrilateral".to_string()))?;

    Ok([
        [h[0], h[1], h[2]],
        [h[3], h[4], h[5]],
        [h[6], h[7], 1.0],
    ])
}

/// Inverse-mapped warp with bilinear sampling. Destination pixels whose source
/// falls outside the image stay black.
pub fn warp_perspective(src: &Mat, matrix: &[[f64; 3]; 3], dsize: Size) -> Result<Mat, EngineError> {
    let mat = Matrix3::new(
        matrix[0][0], matrix[0][1], matrix[0][2],
        matrix[1][0], matrix[1][1], matrix[1][2],
        matrix[2][0], matrix[2][1], matrix[2][2],
    );
    let inv = mat
        .try_inverse()
        .ok_or_else(|| EngineError::Preprocess("perspective matrix is not invertible".to_string()))?;

    let width = dsize.width.max(0) as u32;
    let height = dsize.height.max(0) as u32;
    let mut out = RgbImage::new(width, height);
    let src_img = &src.image;
    let src_cols = src.cols();
    let src_rows = src.rows();

    for y in 0..height {
        let y_f = y as f64;
        for x in 0..width {
            let x_f = x as f64;
            let w = inv[(2, 0)] * x_f + inv[(2, 1)] * y_f + inv[(2, 2)];
            if w.abs() < f64::EPSILON {
                continue;
            }
            let sx = (inv[(0, 0)] * x_f + inv[(0, 1)] * y_f + inv[(0, 2)]) / w;
            let sy = (inv[(1, 0)] * x_f + inv[(1, 1)] * y_f + inv[(1, 2)]) / w;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let x1 = x0 + 1;
            let y1 = y0 + 1;

            if x0 >= 0 && x1 < src_cols && y0 >= 0 && y1 < src_rows {
                let fx = sx - x0 as f64;
                let fy = sy - y0 as f64;

                let p00 = src_img.get_pixel(x0 as u32, y0 as u32);
                let p10 = src_img.get_pixel(x1 as u32, y0 as u32);
                let p01 = src_img.get_pixel(x0 as u32, y1 as u32);
                let p11 = src_img.get_pixel(x1 as u32, y1 as u32);

                let mut px = [0u8; 3];
                for (c, slot) in px.iter_mut().enumerate() {
                    let v = (1.0 - fx) * (1.0 - fy) * p00[c] as f64
                        + fx * (1.0 - fy) * p10[c] as f64
                        + (1.0 - fx) * fy * p01[c] as f64
                        + fx * fy * p11[c] as f64;
                    *slot = v.round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x, y, Rgb(px));
            } else if x0 >= 0 && x0 < src_cols && y0 >= 0 && y0 < src_rows {
                // Last row/column: no right or lower neighbour to blend with.
                out.put_pixel(x, y, *src_img.get_pixel(x0 as u32, y0 as u32));
            }
        }
    }

    Ok(Mat::new(out))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotatedRect {
    pub center: Point2f,
    pub size: Size2f,
    /// Degrees, direction of the `width` side.
    pub angle: f32,
}

impl RotatedRect {
    pub fn points(&self) -> [Point2f; 4] {
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();
        let w = self.size.width / 2.0;
        let h = self.size.height / 2.0;

        [(-w, -h), (w, -h), (w, h), (-w, h)].map(|(dx, dy)| {
            Point2f::new(
                self.center.x + dx * cos_a - dy * sin_a,
                self.center.y + dx * sin_a + dy * cos_a,
            )
        })
    }

    pub fn min_side(&self) -> f32 {
        self.size.width.min(self.size.height)
    }
}

/// Minimum-area enclosing rectangle via rotating calipers over the convex hull.
pub fn min_area_rect(points: &[Point2f]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return None,
        1 => {
            return Some(RotatedRect {
                center: hull[0],
                ..RotatedRect::default()
            })
        }
        _ => {}
    }

    let n = hull.len();
    let mut best: Option<(f32, RotatedRect)> = None;

    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];
        let edge_x = p2.x - p1.x;
        let edge_y = p2.y - p1.y;
        let edge_len = edge_x.hypot(edge_y);
        if edge_len < 1e-6 {
            continue;
        }

        let (ux, uy) = (edge_x / edge_len, edge_y / edge_len);
        let (vx, vy) = (-uy, ux);

        let mut min_u = f32::MAX;
        let mut max_u = f32::MIN;
        let mut min_v = f32::MAX;
        let mut max_v = f32::MIN;
        for pt in &hull {
            let u = pt.x * ux + pt.y * uy;
            let v = pt.x * vx + pt.y * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;
        if best.as_ref().map_or(true, |(a, _)| area < *a) {
            let cu = (min_u + max_u) / 2.0;
            let cv = (min_v + max_v) / 2.0;
            best = Some((
                area,
                RotatedRect {
                    center: Point2f::new(cu * ux + cv * vx, cu * uy + cv * vy),
                    size: Size2f { width, height },
                    angle: uy.atan2(ux).to_degrees(),
                },
            ));
        }
    }

    best.map(|(_, rect)| rect)
}

/// Andrew's monotone chain. Collinear points are dropped.
fn convex_hull(points: &[Point2f]) -> Vec<Point2f> {
    let mut pts: Vec<Point2f> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point2f, a: Point2f, b: Point2f) -> f32 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut lower: Vec<Point2f> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point2f> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}
