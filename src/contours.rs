//! Connected-component contours on a binary mask.
//!
//! Each 8-connected foreground component yields one contour made of its
//! boundary pixels, plus the component's filled interior (holes included) so
//! callers can average a score map over the region the contour encloses.

#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
    /// Pixels enclosed by the outer border, in raster order.
    pub interior: Vec<(i32, i32)>,
}

/// Row-major binary mask.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn from_fn<F: FnMut(usize, usize) -> bool>(width: usize, height: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }
}

/// Find every outer contour in the mask, one per 8-connected component,
/// ordered by each component's first pixel in raster order.
pub fn find_contours(mask: &BinaryMask) -> Vec<Contour> {
    let (width, height) = (mask.width as i32, mask.height as i32);
    let mut labels = vec![0u32; mask.data.len()];
    let mut contours = Vec::new();
    let mut next_label = 1u32;

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if !mask.data[idx] || labels[idx] != 0 {
                continue;
            }

            let (min, max) = flood_fill_label(mask, &mut labels, x, y, next_label);
            let points = extract_boundary(&labels, next_label, width, height, min, max);
            let interior = fill_interior(&labels, next_label, width, min, max);
            contours.push(Contour { points, interior });
            next_label += 1;
        }
    }

    contours
}

/// Label one component, returning its bounding box corners.
fn flood_fill_label(
    mask: &BinaryMask,
    labels: &mut [u32],
    start_x: i32,
    start_y: i32,
    label: u32,
) -> ((i32, i32), (i32, i32)) {
    let (width, height) = (mask.width as i32, mask.height as i32);
    let mut min = (start_x, start_y);
    let mut max = (start_x, start_y);
    let mut stack = vec![(start_x, start_y)];
    labels[(start_y * width + start_x) as usize] = label;

    while let Some((x, y)) = stack.pop() {
        min = (min.0.min(x), min.1.min(y));
        max = (max.0.max(x), max.1.max(y));

        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || nx >= width || ny < 0 || ny >= height {
                    continue;
                }
                let idx = (ny * width + nx) as usize;
                if mask.data[idx] && labels[idx] == 0 {
                    labels[idx] = label;
                    stack.push((nx, ny));
                }
            }
        }
    }

    (min, max)
}

/// A pixel sits on the border if any 4-neighbour lies outside the image or the component.
fn is_boundary_pixel(labels: &[u32], x: i32, y: i32, label: u32, width: i32, height: i32) -> bool {
    [(0, -1), (1, 0), (0, 1), (-1, 0)].iter().any(|(dx, dy)| {
        let nx = x + dx;
        let ny = y + dy;
        nx < 0 || nx >= width || ny < 0 || ny >= height || labels[(ny * width + nx) as usize] != label
    })
}

fn extract_boundary(
    labels: &[u32],
    label: u32,
    width: i32,
    height: i32,
    min: (i32, i32),
    max: (i32, i32),
) -> Vec<(i32, i32)> {
    let mut boundary = Vec::new();
    for y in min.1..=max.1 {
        for x in min.0..=max.0 {
            if labels[(y * width + x) as usize] == label
                && is_boundary_pixel(labels, x, y, label, width, height)
            {
                boundary.push((x, y));
            }
        }
    }
    boundary
}

/// Component pixels plus any holes they enclose. Works on the bounding box
/// padded by one pixel: whatever the background flood from the padding cannot
/// reach is inside the contour.
fn fill_interior(labels: &[u32], label: u32, width: i32, min: (i32, i32), max: (i32, i32)) -> Vec<(i32, i32)> {
    let box_w = (max.0 - min.0 + 3) as usize;
    let box_h = (max.1 - min.1 + 3) as usize;
    let is_component = |bx: usize, by: usize| -> bool {
        if bx == 0 || by == 0 || bx == box_w - 1 || by == box_h - 1 {
            return false;
        }
        let x = min.0 + bx as i32 - 1;
        let y = min.1 + by as i32 - 1;
        labels[(y * width + x) as usize] == label
    };

    // 4-connected background flood so it cannot leak through diagonal gaps
    // that the 8-connected component closes.
    let mut outside = vec![false; box_w * box_h];
    let mut stack = vec![(0usize, 0usize)];
    outside[0] = true;
    while let Some((bx, by)) = stack.pop() {
        let neighbours = [
            (bx.wrapping_sub(1), by),
            (bx + 1, by),
            (bx, by.wrapping_sub(1)),
            (bx, by + 1),
        ];
        for (nx, ny) in neighbours {
            if nx >= box_w || ny >= box_h {
                continue;
            }
            let idx = ny * box_w + nx;
            if !outside[idx] && !is_component(nx, ny) {
                outside[idx] = true;
                stack.push((nx, ny));
            }
        }
    }

    let mut interior = Vec::new();
    for by in 1..box_h - 1 {
        for bx in 1..box_w - 1 {
            if !outside[by * box_w + bx] {
                interior.push((min.0 + bx as i32 - 1, min.1 + by as i32 - 1));
            }
        }
    }
    interior
}
