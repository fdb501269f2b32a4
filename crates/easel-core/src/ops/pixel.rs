//! Per-pixel operations.
//!
//! Brightness, contrast and gamma are channel-independent, so they go
//! through a 256-entry lookup table built once per call.

use crate::buffer::{Channels, ImageBuffer};
use crate::luminance::{luma_plane, luma_u8};

pub(crate) fn grayscale(image: &ImageBuffer) -> ImageBuffer {
    match image.channels() {
        Channels::Gray => image.clone(),
        Channels::Rgb => ImageBuffer::from_parts(
            image.width(),
            image.height(),
            Channels::Gray,
            luma_plane(image.pixels()),
        ),
    }
}

pub(crate) fn invert(image: &ImageBuffer) -> ImageBuffer {
    map_bytes(image, |v| !v)
}

/// Additive shift of `value - 100`, clamped to [0, 255].
pub(crate) fn brightness(image: &ImageBuffer, value: i32) -> ImageBuffer {
    let shift = value - 100;
    let lut = build_lut(|v| (v as i32 + shift).clamp(0, 255) as u8);
    apply_lut(image, &lut)
}

/// Multiplicative scale of `value / 100`, truncated and clamped to [0, 255].
pub(crate) fn contrast(image: &ImageBuffer, value: i32) -> ImageBuffer {
    let factor = value as f32 / 100.0;
    let lut = build_lut(|v| (v as f32 * factor).clamp(0.0, 255.0) as u8);
    apply_lut(image, &lut)
}

/// `luma > cut` becomes 255, everything else 0.
pub(crate) fn threshold(image: &ImageBuffer, cut: i32) -> ImageBuffer {
    let binarize = |l: u8| if i32::from(l) > cut { 255 } else { 0 };
    let plane: Vec<u8> = match image.channels() {
        Channels::Gray => image.pixels().iter().map(|&l| binarize(l)).collect(),
        Channels::Rgb => image
            .pixels()
            .chunks_exact(3)
            .map(|px| binarize(luma_u8(px[0], px[1], px[2])))
            .collect(),
    };
    expand_plane(plane, image.width(), image.height(), image.channels())
}

/// Usable gamma values. Anything outside is clamped.
pub const GAMMA_RANGE: std::ops::RangeInclusive<f64> = 0.1..=3.0;

/// Power-law correction `255 * (v / 255) ^ (1 / gamma)`, truncated.
/// Values above 1 brighten midtones, values below 1 darken them.
pub(crate) fn gamma(image: &ImageBuffer, gamma: f64) -> ImageBuffer {
    let gamma = gamma.clamp(*GAMMA_RANGE.start(), *GAMMA_RANGE.end());
    if (gamma - 1.0).abs() < f64::EPSILON {
        return image.clone();
    }
    let inv = 1.0 / gamma;
    let lut = build_lut(|v| ((f64::from(v) / 255.0).powf(inv) * 255.0) as u8);
    apply_lut(image, &lut)
}

/// Spread the luma histogram over the full range.
///
/// Color images keep their chroma: every channel moves by the same amount
/// its pixel's luma moved.
pub(crate) fn equalize_histogram(image: &ImageBuffer) -> ImageBuffer {
    match image.channels() {
        Channels::Gray => apply_lut(image, &equalization_lut(image.pixels())),
        Channels::Rgb => {
            let luma = luma_plane(image.pixels());
            let lut = equalization_lut(&luma);
            let mut pixels = Vec::with_capacity(image.byte_size());
            for (px, &l) in image.pixels().chunks_exact(3).zip(&luma) {
                let delta = i32::from(lut[l as usize]) - i32::from(l);
                pixels.extend(px.iter().map(|&v| (i32::from(v) + delta).clamp(0, 255) as u8));
            }
            ImageBuffer::from_parts(image.width(), image.height(), Channels::Rgb, pixels)
        }
    }
}

/// Cumulative-histogram mapping with the darkest occupied level pinned to 0
/// and the brightest to 255. A single-level plane maps to itself.
fn equalization_lut(plane: &[u8]) -> [u8; 256] {
    let mut histogram = [0u64; 256];
    for &v in plane {
        histogram[v as usize] += 1;
    }
    let total = plane.len() as u64;
    let Some(first) = histogram.iter().position(|&n| n > 0) else {
        return build_lut(|v| v);
    };
    if histogram[first] == total {
        return build_lut(|v| v);
    }

    let scale = 255.0 / (total - histogram[first]) as f64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    for level in first + 1..256 {
        cumulative += histogram[level];
        lut[level] = (cumulative as f64 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Replicate a single-channel plane into `channels` bytes per pixel.
pub(crate) fn expand_plane(plane: Vec<u8>, width: u32, height: u32, channels: Channels) -> ImageBuffer {
    match channels {
        Channels::Gray => ImageBuffer::from_parts(width, height, Channels::Gray, plane),
        Channels::Rgb => {
            let pixels = plane.iter().flat_map(|&v| [v, v, v]).collect();
            ImageBuffer::from_parts(width, height, Channels::Rgb, pixels)
        }
    }
}

fn build_lut(f: impl Fn(u8) -> u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = f(i as u8);
    }
    lut
}

fn apply_lut(image: &ImageBuffer, lut: &[u8; 256]) -> ImageBuffer {
    map_bytes(image, |v| lut[v as usize])
}

fn map_bytes(image: &ImageBuffer, f: impl Fn(u8) -> u8) -> ImageBuffer {
    let pixels = image.pixels().iter().map(|&v| f(v)).collect();
    ImageBuffer::from_parts(image.width(), image.height(), image.channels(), pixels)
}
