//! Neighborhood filters: Gaussian blur, sharpen, Canny edge detection,
//! median and morphology.
//!
//! Blur, sharpen and Canny read past the image border with reflect-101
//! addressing (`gfedcb|abcdefgh|gfedcba`), so a 1-pixel image is its own
//! neighborhood. Median and morphology replicate the edge pixel instead.

use std::cmp::{max, min};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::buffer::{Channels, ImageBuffer};
use crate::luminance::luma_plane;

use super::pixel::expand_plane;
use super::OpsError;

/// Map an out-of-range coordinate back inside `0..n` by mirroring without
/// repeating the edge pixel.
#[inline]
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let i = i.rem_euclid(period);
    (if i >= n { period - i } else { i }) as usize
}

#[inline]
fn clamp_index(i: isize, n: usize) -> usize {
    i.clamp(0, n as isize - 1) as usize
}

/// Normalized 1-D Gaussian weights for a `2 * radius + 1` tap kernel.
///
/// Sigma is derived from the kernel size as
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let size = 2 * radius as usize + 1;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let denom = 2.0 * sigma * sigma;
    let center = radius as f32;

    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Separable Gaussian smoothing. Radius 0 is the identity.
pub(crate) fn gaussian_blur(image: &ImageBuffer, radius: u32) -> ImageBuffer {
    if radius == 0 {
        return image.clone();
    }

    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let kernel = gaussian_kernel(radius);
    let r = radius as isize;
    let src = image.pixels();

    // Horizontal pass
    let mut horizontal = vec![0f32; src.len()];
    for y in 0..h {
        let row = y * w;
        for x in 0..w {
            for c in 0..ch {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = reflect_101(x as isize + k as isize - r, w);
                    acc += src[(row + sx) * ch + c] as f32 * weight;
                }
                horizontal[(row + x) * ch + c] = acc;
            }
        }
    }

    // Vertical pass
    let mut output = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = reflect_101(y as isize + k as isize - r, h);
                    acc += horizontal[(sy * w + x) * ch + c] * weight;
                }
                output[(y * w + x) * ch + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), output)
}

/// 3x3 sharpening with `-s` on the eight neighbors and `8s + 1` at the
/// center, where `s = amount / 100 * 3`.
pub(crate) fn sharpen(image: &ImageBuffer, amount: i32) -> ImageBuffer {
    if amount <= 0 {
        return image.clone();
    }

    let strength = amount as f32 / 100.0 * 3.0;
    let center_weight = 8.0 * strength + 1.0;
    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let src = image.pixels();
    let mut output = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut neighbors = 0.0;
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let sx = reflect_101(x as isize + dx, w);
                        let sy = reflect_101(y as isize + dy, h);
                        neighbors += src[(sy * w + sx) * ch + c] as f32;
                    }
                }
                let idx = (y * w + x) * ch + c;
                let v = center_weight * src[idx] as f32 - strength * neighbors;
                output[idx] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeClass {
    None,
    Weak,
    Strong,
}

/// Canny edge detection on the luma plane.
///
/// Sobel gradients with L1 magnitude, non-maximum suppression along the
/// quantized gradient direction, then hysteresis: pixels above `high` seed
/// edges that grow through 8-connected pixels above `low`. The thresholds
/// are used in ascending order whichever way they are passed.
pub(crate) fn canny(image: &ImageBuffer, low: i32, high: i32) -> ImageBuffer {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let (w, h) = (image.width() as usize, image.height() as usize);

    let gray = match image.channels() {
        Channels::Gray => image.pixels().to_vec(),
        Channels::Rgb => luma_plane(image.pixels()),
    };

    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    let mut magnitude = vec![0i32; w * h];

    for y in 0..h {
        for x in 0..w {
            let p = |dx: isize, dy: isize| {
                let sx = reflect_101(x as isize + dx, w);
                let sy = reflect_101(y as isize + dy, h);
                i32::from(gray[sy * w + sx])
            };
            let dx = (p(1, -1) + 2 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2 * p(-1, 0) + p(-1, 1));
            let dy = (p(-1, 1) + 2 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2 * p(0, -1) + p(1, -1));
            let i = y * w + x;
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }

    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut classes = vec![EdgeClass::None; w * h];
    let mut strong = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let (ax, ay) = (i64::from(gx[i].abs()), i64::from(gy[i].abs()));

            // Sector boundaries at tan(22.5°) and tan(67.5°)
            let (before, after) = if ay * 10_000 <= ax * 4_142 {
                (mag_at(xi - 1, yi), mag_at(xi + 1, yi))
            } else if ay * 10_000 >= ax * 24_142 {
                (mag_at(xi, yi - 1), mag_at(xi, yi + 1))
            } else if (gx[i] > 0) == (gy[i] > 0) {
                (mag_at(xi - 1, yi - 1), mag_at(xi + 1, yi + 1))
            } else {
                (mag_at(xi + 1, yi - 1), mag_at(xi - 1, yi + 1))
            };

            if m > before && m >= after {
                if m > high {
                    classes[i] = EdgeClass::Strong;
                    strong.push(i);
                } else {
                    classes[i] = EdgeClass::Weak;
                }
            }
        }
    }

    let mut edges = vec![0u8; w * h];
    for &i in &strong {
        edges[i] = 255;
    }
    while let Some(i) = strong.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if classes[n] == EdgeClass::Weak && edges[n] == 0 {
                    edges[n] = 255;
                    strong.push(n);
                }
            }
        }
    }

    expand_plane(edges, image.width(), image.height(), image.channels())
}

/// Per-channel median of each `kernel_size` square window. Sizes below 3
/// are the identity and even sizes round up to the next odd one.
pub(crate) fn median_blur(image: &ImageBuffer, kernel_size: u32) -> ImageBuffer {
    if kernel_size < 3 {
        return image.clone();
    }

    let r = (kernel_size / 2) as isize;
    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let src = image.pixels();
    let mut window = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    let mut output = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                window.clear();
                for dy in -r..=r {
                    let sy = clamp_index(y as isize + dy, h);
                    for dx in -r..=r {
                        let sx = clamp_index(x as isize + dx, w);
                        window.push(src[(sy * w + sx) * ch + c]);
                    }
                }
                let mid = window.len() / 2;
                output[(y * w + x) * ch + c] = *window.select_nth_unstable(mid).1;
            }
        }
    }

    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), output)
}

/// Morphological operation over a square structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphOp {
    Erode,
    Dilate,
    /// Erode then dilate. Removes specks smaller than the kernel.
    Open,
    /// Dilate then erode. Fills holes smaller than the kernel.
    Close,
    /// Dilation minus erosion.
    Gradient,
    /// Input minus its opening.
    TopHat,
    /// Closing minus the input.
    BlackHat,
}

impl MorphOp {
    pub const ALL: [MorphOp; 7] = [
        MorphOp::Erode,
        MorphOp::Dilate,
        MorphOp::Open,
        MorphOp::Close,
        MorphOp::Gradient,
        MorphOp::TopHat,
        MorphOp::BlackHat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MorphOp::Erode => "erode",
            MorphOp::Dilate => "dilate",
            MorphOp::Open => "open",
            MorphOp::Close => "close",
            MorphOp::Gradient => "gradient",
            MorphOp::TopHat => "tophat",
            MorphOp::BlackHat => "blackhat",
        }
    }
}

impl FromStr for MorphOp {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        MorphOp::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| OpsError::UnknownMorphOp(s.to_string()))
    }
}

/// Apply `op` with a `kernel_size` square element. The size is raised to at
/// least 3 and rounded up to odd. Each erosion and dilation runs
/// `iterations` times (at least once).
pub(crate) fn morphology(image: &ImageBuffer, op: MorphOp, kernel_size: u32, iterations: u32) -> ImageBuffer {
    let radius = (kernel_size.max(3) | 1) as usize / 2;
    let passes = iterations.max(1);
    let erode = |img: &ImageBuffer| repeat_extremum(img, radius, passes, min);
    let dilate = |img: &ImageBuffer| repeat_extremum(img, radius, passes, max);

    match op {
        MorphOp::Erode => erode(image),
        MorphOp::Dilate => dilate(image),
        MorphOp::Open => dilate(&erode(image)),
        MorphOp::Close => erode(&dilate(image)),
        MorphOp::Gradient => difference(&dilate(image), &erode(image)),
        MorphOp::TopHat => difference(image, &dilate(&erode(image))),
        MorphOp::BlackHat => difference(&erode(&dilate(image)), image),
    }
}

fn repeat_extremum(image: &ImageBuffer, radius: usize, passes: u32, pick: fn(u8, u8) -> u8) -> ImageBuffer {
    let mut out = extremum(image, radius, pick);
    for _ in 1..passes {
        out = extremum(&out, radius, pick);
    }
    out
}

/// Separable min or max filter over a `2 * radius + 1` square.
fn extremum(image: &ImageBuffer, radius: usize, pick: fn(u8, u8) -> u8) -> ImageBuffer {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let ch = image.channels().count();
    let r = radius as isize;
    let src = image.pixels();

    let mut horizontal = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut acc = src[(y * w + x) * ch + c];
                for dx in -r..=r {
                    let sx = clamp_index(x as isize + dx, w);
                    acc = pick(acc, src[(y * w + sx) * ch + c]);
                }
                horizontal[(y * w + x) * ch + c] = acc;
            }
        }
    }

    let mut output = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut acc = horizontal[(y * w + x) * ch + c];
                for dy in -r..=r {
                    let sy = clamp_index(y as isize + dy, h);
                    acc = pick(acc, horizontal[(sy * w + x) * ch + c]);
                }
                output[(y * w + x) * ch + c] = acc;
            }
        }
    }

    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), output)
}

/// Saturating `a - b`, byte by byte.
fn difference(a: &ImageBuffer, b: &ImageBuffer) -> ImageBuffer {
    let pixels = a
        .pixels()
        .iter()
        .zip(b.pixels())
        .map(|(&x, &y)| x.saturating_sub(y))
        .collect();
    ImageBuffer::from_parts(a.width(), a.height(), a.channels(), pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, pixels: Vec<u8>) -> ImageBuffer {
        ImageBuffer::new(width, height, Channels::Gray, pixels).unwrap()
    }

    /// Columns before `split` are `left`, the rest `right`.
    fn step(width: u32, height: u32, split: u32, left: u8, right: u8) -> ImageBuffer {
        let pixels = (0..height)
            .flat_map(|_| (0..width).map(move |x| if x < split { left } else { right }))
            .collect();
        gray(width, height, pixels)
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-3, 1), 0);
        assert_eq!(reflect_101(-1, 2), 1);
        assert_eq!(reflect_101(2, 2), 0);
    }

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        for radius in [1, 3, 10, 20] {
            let k = gaussian_kernel(radius);
            assert_eq!(k.len(), 2 * radius as usize + 1);
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            for i in 0..k.len() / 2 {
                assert!((k[i] - k[k.len() - 1 - i]).abs() < 1e-6);
            }
            assert!(k[radius as usize] >= k[0]);
        }
    }

    #[test]
    fn test_blur_radius_zero_is_identity() {
        let img = step(6, 4, 3, 10, 240);
        assert_eq!(gaussian_blur(&img, 0), img);
    }

    #[test]
    fn test_blur_keeps_uniform_image() {
        let img = ImageBuffer::filled(8, 5, Channels::Rgb, 77).unwrap();
        assert_eq!(gaussian_blur(&img, 4), img);
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut pixels = vec![0u8; 81];
        pixels[40] = 255;
        let out = gaussian_blur(&gray(9, 9, pixels), 1);
        let center = out.pixel(4, 4).unwrap()[0];
        let side = out.pixel(5, 4).unwrap()[0];
        assert!(center < 255 && center > side && side > 0);
        assert_eq!(out.pixel(0, 0).unwrap()[0], 0);
        let total: u32 = out.pixels().iter().map(|&v| u32::from(v)).sum();
        assert!(total.abs_diff(255) <= 9, "total was {total}");
    }

    #[test]
    fn test_blur_large_radius_on_tiny_image() {
        let img = gray(2, 1, vec![0, 200]);
        let out = gaussian_blur(&img, 20);
        assert_eq!(out.dimensions(), (2, 1));
    }

    #[test]
    fn test_sharpen_zero_is_identity() {
        let img = step(5, 5, 2, 100, 150);
        assert_eq!(sharpen(&img, 0), img);
    }

    #[test]
    fn test_sharpen_keeps_uniform_image() {
        let img = ImageBuffer::filled(4, 4, Channels::Rgb, 90).unwrap();
        assert_eq!(sharpen(&img, 33), img);
        assert_eq!(sharpen(&img, 100), img);
    }

    #[test]
    fn test_sharpen_boosts_edges() {
        let img = step(5, 5, 2, 100, 150);
        let out = sharpen(&img, 100);
        assert_eq!(out.pixel(1, 2).unwrap()[0], 0);
        assert_eq!(out.pixel(2, 2).unwrap()[0], 255);
        assert_eq!(out.pixel(4, 2).unwrap()[0], 150);
    }

    #[test]
    fn test_canny_uniform_has_no_edges() {
        let img = ImageBuffer::filled(10, 10, Channels::Rgb, 128).unwrap();
        let out = canny(&img, 50, 150);
        assert_eq!(out.channels(), Channels::Rgb);
        assert!(out.pixels().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_finds_step_edge() {
        let img = step(10, 10, 5, 0, 255);
        let out = canny(&img, 50, 150);
        for y in 0..10 {
            assert_eq!(out.pixel(4, y).unwrap()[0], 255, "row {y}");
            assert_eq!(out.pixel(0, y).unwrap()[0], 0);
            assert_eq!(out.pixel(9, y).unwrap()[0], 0);
        }
        assert!(out.pixels().iter().all(|&v| v == 0 || v == 255));
    }

    /// `size` square of `fill` with `center` at the middle pixel.
    fn dot(size: u32, fill: u8, center: u8) -> ImageBuffer {
        let mut pixels = vec![fill; (size * size) as usize];
        pixels[(size * size / 2) as usize] = center;
        gray(size, size, pixels)
    }

    #[test]
    fn test_median_removes_impulse() {
        let out = median_blur(&dot(5, 0, 255), 3);
        assert!(out.pixels().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_median_keeps_step_edge() {
        let img = step(6, 4, 3, 10, 240);
        assert_eq!(median_blur(&img, 3), img);
    }

    #[test]
    fn test_median_small_kernel_is_identity() {
        let img = dot(5, 0, 255);
        assert_eq!(median_blur(&img, 0), img);
        assert_eq!(median_blur(&img, 2), img);
    }

    #[test]
    fn test_median_even_kernel_rounds_up() {
        let img = step(9, 9, 4, 0, 200);
        let mut noisy = img.pixels().to_vec();
        noisy[10] = 255;
        noisy[50] = 255;
        let noisy = gray(9, 9, noisy);
        assert_eq!(median_blur(&noisy, 4), median_blur(&noisy, 5));
    }

    #[test]
    fn test_median_works_per_channel() {
        let pixels = (0..9).flat_map(|i| if i == 4 { [255, 0, 7] } else { [1, 2, 7] }).collect();
        let img = ImageBuffer::new(3, 3, Channels::Rgb, pixels).unwrap();
        let out = median_blur(&img, 3);
        assert_eq!(out.pixel(1, 1).unwrap(), &[1, 2, 7]);
    }

    #[test]
    fn test_dilate_grows_dot_to_kernel() {
        let out = morphology(&dot(5, 0, 255), MorphOp::Dilate, 3, 1);
        for y in 0..5 {
            for x in 0..5 {
                let inside = (1..=3).contains(&x) && (1..=3).contains(&y);
                assert_eq!(out.pixel(x, y).unwrap()[0], if inside { 255 } else { 0 }, "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_iterations_repeat_the_pass() {
        let img = dot(7, 0, 255);
        assert_eq!(
            morphology(&img, MorphOp::Dilate, 3, 2),
            morphology(&img, MorphOp::Dilate, 5, 1)
        );
        assert_eq!(
            morphology(&img, MorphOp::Dilate, 3, 0),
            morphology(&img, MorphOp::Dilate, 3, 1)
        );
    }

    #[test]
    fn test_kernel_size_is_normalized() {
        let img = dot(7, 0, 255);
        assert_eq!(
            morphology(&img, MorphOp::Dilate, 1, 1),
            morphology(&img, MorphOp::Dilate, 3, 1)
        );
        assert_eq!(
            morphology(&img, MorphOp::Dilate, 4, 1),
            morphology(&img, MorphOp::Dilate, 5, 1)
        );
    }

    #[test]
    fn test_open_removes_speck_and_tophat_keeps_it() {
        let img = dot(5, 0, 255);
        assert!(morphology(&img, MorphOp::Erode, 3, 1).pixels().iter().all(|&v| v == 0));
        assert!(morphology(&img, MorphOp::Open, 3, 1).pixels().iter().all(|&v| v == 0));
        assert_eq!(morphology(&img, MorphOp::TopHat, 3, 1), img);
    }

    #[test]
    fn test_close_fills_hole_and_blackhat_finds_it() {
        let img = dot(5, 255, 0);
        assert!(morphology(&img, MorphOp::Close, 3, 1).pixels().iter().all(|&v| v == 255));
        assert_eq!(morphology(&img, MorphOp::BlackHat, 3, 1), dot(5, 0, 255));
    }

    #[test]
    fn test_gradient_of_uniform_is_black() {
        let img = ImageBuffer::filled(6, 6, Channels::Rgb, 140).unwrap();
        assert!(morphology(&img, MorphOp::Gradient, 5, 1).pixels().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_morph_op_from_str() {
        assert_eq!("TopHat".parse::<MorphOp>().unwrap(), MorphOp::TopHat);
        assert_eq!(" erode ".parse::<MorphOp>().unwrap(), MorphOp::Erode);
        assert_eq!(
            "blur".parse::<MorphOp>(),
            Err(OpsError::UnknownMorphOp("blur".into()))
        );
    }

    #[test]
    fn test_canny_threshold_order_does_not_matter() {
        let img = step(10, 10, 5, 20, 200);
        assert_eq!(canny(&img, 150, 50), canny(&img, 50, 150));
    }

    #[test]
    fn test_canny_weak_edges_need_strong_seed() {
        // Step height 40 gives gradient magnitude 160: weak for (100, 200),
        // and nothing connects it to a strong pixel.
        let img = step(10, 10, 5, 100, 140);
        let out = canny(&img, 100, 200);
        assert!(out.pixels().iter().all(|&v| v == 0));
        let out = canny(&img, 100, 150);
        assert_eq!(out.pixel(4, 5).unwrap()[0], 255);
    }
}
