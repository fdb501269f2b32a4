//! Flips, rotation, resampling, crop and affine warps.
//!
//! Rotation uses inverse mapping: for each pixel in the output image we
//! calculate which source location lands there and interpolate bilinearly.
//! For rotation by angle θ about the centers:
//!
//! ```text
//! src_x = (dst_x - dst_cx) * cos(θ) - (dst_y - dst_cy) * sin(θ) + src_cx
//! src_y = (dst_x - dst_cx) * sin(θ) + (dst_y - dst_cy) * cos(θ) + src_cy
//! ```
//!
//! Rows grow downward, so this inverts a visually counter-clockwise turn.
//!
//! Quarter turns skip interpolation entirely and remap indices exactly.
//!
//! Translation and general affine warps keep the input size and sample the
//! same way, with pixel centers at integer coordinates.

use image::imageops::FilterType;
use image::DynamicImage;

use crate::buffer::ImageBuffer;

use super::OpsError;

const ANGLE_EPSILON: f64 = 0.001;
const BOUNDS_EPSILON: f64 = 1e-9;
const DEGENERATE_EPSILON: f64 = 1e-9;

pub(crate) fn flip_horizontal(image: &ImageBuffer) -> ImageBuffer {
    let ch = image.channels().count();
    let row_len = image.width() as usize * ch;
    let mut pixels = Vec::with_capacity(image.byte_size());
    for row in image.pixels().chunks_exact(row_len) {
        for px in row.chunks_exact(ch).rev() {
            pixels.extend_from_slice(px);
        }
    }
    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), pixels)
}

pub(crate) fn flip_vertical(image: &ImageBuffer) -> ImageBuffer {
    let row_len = image.width() as usize * image.channels().count();
    let mut pixels = Vec::with_capacity(image.byte_size());
    for row in image.pixels().chunks_exact(row_len).rev() {
        pixels.extend_from_slice(row);
    }
    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), pixels)
}

/// Compute the dimensions of the bounding box for a rotated image.
///
/// # Arguments
///
/// * `width` - Original image width
/// * `height` - Original image height
/// * `angle_degrees` - Rotation angle in degrees (positive = counter-clockwise)
///
/// # Returns
///
/// Tuple of (new_width, new_height), truncated toward zero and never smaller
/// than 1x1.
pub fn compute_rotated_bounds(width: u32, height: u32, angle_degrees: f64) -> (u32, u32) {
    match QuarterTurn::from_degrees(angle_degrees) {
        Some(QuarterTurn::None | QuarterTurn::Half) => return (width, height),
        Some(QuarterTurn::Ccw | QuarterTurn::Cw) => return (height, width),
        None => {}
    }

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos().abs();
    let sin = angle_rad.sin().abs();

    let w = width as f64;
    let h = height as f64;

    // The epsilon keeps exact products like 100 * cos(60°) from losing a pixel.
    let new_w = (w * cos + h * sin + BOUNDS_EPSILON) as u32;
    let new_h = (w * sin + h * cos + BOUNDS_EPSILON) as u32;

    (new_w.max(1), new_h.max(1))
}

/// Rotations that map the pixel grid onto itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuarterTurn {
    None,
    Ccw,
    Half,
    Cw,
}

impl QuarterTurn {
    fn from_degrees(angle_degrees: f64) -> Option<Self> {
        let normalized = angle_degrees.rem_euclid(360.0);
        let near = |target: f64| (normalized - target).abs() < ANGLE_EPSILON;
        if near(0.0) || near(360.0) {
            Some(QuarterTurn::None)
        } else if near(90.0) {
            Some(QuarterTurn::Ccw)
        } else if near(180.0) {
            Some(QuarterTurn::Half)
        } else if near(270.0) {
            Some(QuarterTurn::Cw)
        } else {
            None
        }
    }
}

/// Rotate counter-clockwise about the center. The canvas grows to hold every
/// source pixel and uncovered areas are filled with black.
pub(crate) fn rotate(image: &ImageBuffer, angle_degrees: f64) -> ImageBuffer {
    match QuarterTurn::from_degrees(angle_degrees) {
        Some(QuarterTurn::None) => image.clone(),
        Some(turn) => rotate_quarter(image, turn),
        None => rotate_bilinear(image, angle_degrees),
    }
}

fn rotate_quarter(image: &ImageBuffer, turn: QuarterTurn) -> ImageBuffer {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let (dst_w, dst_h) = match turn {
        QuarterTurn::Ccw | QuarterTurn::Cw => (h, w),
        QuarterTurn::None | QuarterTurn::Half => (w, h),
    };
    let src = image.pixels();
    let mut output = Vec::with_capacity(image.byte_size());

    for dst_y in 0..dst_h {
        for dst_x in 0..dst_w {
            let (src_x, src_y) = match turn {
                QuarterTurn::None => (dst_x, dst_y),
                QuarterTurn::Ccw => (w - 1 - dst_y, dst_x),
                QuarterTurn::Half => (w - 1 - dst_x, h - 1 - dst_y),
                QuarterTurn::Cw => (dst_y, h - 1 - dst_x),
            };
            let idx = (src_y * w + src_x) * ch;
            output.extend_from_slice(&src[idx..idx + ch]);
        }
    }

    ImageBuffer::from_parts(dst_w as u32, dst_h as u32, image.channels(), output)
}

fn rotate_bilinear(image: &ImageBuffer, angle_degrees: f64) -> ImageBuffer {
    let (src_w, src_h) = (image.width() as f64, image.height() as f64);
    let (dst_w, dst_h) = compute_rotated_bounds(image.width(), image.height(), angle_degrees);
    let ch = image.channels().count();

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos();
    let sin = angle_rad.sin();

    let src_cx = src_w / 2.0;
    let src_cy = src_h / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    let mut output = vec![0u8; dst_w as usize * dst_h as usize * ch];

    for dst_y in 0..dst_h as usize {
        for dst_x in 0..dst_w as usize {
            // Sample at pixel centers
            let dx = dst_x as f64 + 0.5 - dst_cx;
            let dy = dst_y as f64 + 0.5 - dst_cy;

            let src_x = dx * cos - dy * sin + src_cx - 0.5;
            let src_y = dx * sin + dy * cos + src_cy - 0.5;

            let dst_idx = (dst_y * dst_w as usize + dst_x) * ch;
            sample_bilinear(image, src_x, src_y, &mut output[dst_idx..dst_idx + ch]);
        }
    }

    ImageBuffer::from_parts(dst_w, dst_h, image.channels(), output)
}

/// Bilinear sample at continuous pixel-index coordinates. Locations outside
/// the source footprint leave `out` untouched (black).
fn sample_bilinear(image: &ImageBuffer, x: f64, y: f64, out: &mut [u8]) {
    let (w, h) = (image.width() as usize, image.height() as usize);

    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return;
    }

    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let ch = out.len();
    let src = image.pixels();
    let at = |px: usize, py: usize, c: usize| src[(py * w + px) * ch + c] as f64;

    for (c, slot) in out.iter_mut().enumerate() {
        let v = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
            + at(x1, y0, c) * fx * (1.0 - fy)
            + at(x0, y1, c) * (1.0 - fx) * fy
            + at(x1, y1, c) * fx * fy;
        *slot = v.clamp(0.0, 255.0).round() as u8;
    }
}

/// Resample to exactly `width` x `height` with a triangle (bilinear) filter.
pub(crate) fn resize(image: &ImageBuffer, width: u32, height: u32) -> ImageBuffer {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    // Storage always matches the shape, so the conversion cannot fail.
    let Some(dynamic) = image.to_dynamic_image() else {
        return image.clone();
    };
    match dynamic.resize_exact(width, height, FilterType::Triangle) {
        DynamicImage::ImageLuma8(gray) => ImageBuffer::from_gray_image(gray),
        other => ImageBuffer::from_rgb_image(other.into_rgb8()),
    }
}

/// Copy out a `width` x `height` window starting at (`x`, `y`).
///
/// The origin is pulled inside the image and the window is shrunk to fit,
/// so the result is never empty.
pub(crate) fn crop(image: &ImageBuffer, x: u32, y: u32, width: u32, height: u32) -> ImageBuffer {
    let (w, h) = image.dimensions();
    let x = x.min(w - 1);
    let y = y.min(h - 1);
    let width = width.clamp(1, w - x);
    let height = height.clamp(1, h - y);

    let ch = image.channels().count();
    let row_len = w as usize * ch;
    let start = x as usize * ch;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * ch);
    for row in image.pixels().chunks_exact(row_len).skip(y as usize).take(height as usize) {
        pixels.extend_from_slice(&row[start..start + width as usize * ch]);
    }
    ImageBuffer::from_parts(width, height, image.channels(), pixels)
}

/// Shift by whole pixels on a same-size canvas. Positive `dx` moves right,
/// positive `dy` moves down, and the uncovered strip is black.
pub(crate) fn translate(image: &ImageBuffer, dx: i32, dy: i32) -> ImageBuffer {
    if dx == 0 && dy == 0 {
        return image.clone();
    }
    warp_affine(image, &AffineTransform::translation(f64::from(dx), f64::from(dy)))
}

/// Affine map `(x, y) -> (a*x + b*y + c, d*x + e*y + f)` in pixel
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    m: [f64; 6],
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m: [1.0, 0.0, dx, 0.0, 1.0, dy],
        }
    }

    /// The map that sends each `src` point onto the matching `dst` point.
    ///
    /// # Errors
    ///
    /// [`OpsError::DegenerateAffine`] when either set of points is collinear.
    pub fn from_points(src: [[f64; 2]; 3], dst: [[f64; 2]; 3]) -> Result<Self, OpsError> {
        let points = src.map(|[x, y]| [x, y, 1.0]);
        let det = det3(points);
        if det.abs() < DEGENERATE_EPSILON || det3(dst.map(|[x, y]| [x, y, 1.0])).abs() < DEGENERATE_EPSILON {
            return Err(OpsError::DegenerateAffine);
        }

        // Cramer's rule, once per output coordinate.
        let solve = |values: [f64; 3]| -> [f64; 3] {
            std::array::from_fn(|col| {
                let mut replaced = points;
                for (row, v) in replaced.iter_mut().zip(values) {
                    row[col] = v;
                }
                det3(replaced) / det
            })
        };
        let [a, b, c] = solve(dst.map(|p| p[0]));
        let [d, e, f] = solve(dst.map(|p| p[1]));
        Ok(Self {
            m: [a, b, c, d, e, f],
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.m;
        (a * x + b * y + c, d * x + e * y + f)
    }

    pub fn inverse(&self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.m;
        let det = a * e - b * d;
        if det.abs() < DEGENERATE_EPSILON {
            return None;
        }
        Some(Self {
            m: [
                e / det,
                -b / det,
                (b * f - c * e) / det,
                -d / det,
                a / det,
                (c * d - a * f) / det,
            ],
        })
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Resample through `transform` onto a canvas the size of the input.
/// Destinations whose source falls outside the image stay black.
pub(crate) fn warp_affine(image: &ImageBuffer, transform: &AffineTransform) -> ImageBuffer {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let mut output = vec![0u8; image.byte_size()];

    if let Some(inverse) = transform.inverse() {
        for dst_y in 0..h {
            for dst_x in 0..w {
                let (src_x, src_y) = inverse.apply(dst_x as f64, dst_y as f64);
                let idx = (dst_y * w + dst_x) * ch;
                sample_bilinear(image, src_x, src_y, &mut output[idx..idx + ch]);
            }
        }
    }

    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), output)
}
