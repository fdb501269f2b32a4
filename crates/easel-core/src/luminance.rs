//! Luma calculation using ITU-R BT.601 coefficients.
//!
//! Grayscale conversion, thresholding and edge detection all collapse color
//! to a single luma channel through [`luma_u8`], so the three stages agree on
//! what "brightness" means for a given pixel.

/// ITU-R BT.601 coefficient for the red channel.
pub const LUMA_R: f32 = 0.299;

/// ITU-R BT.601 coefficient for the green channel.
pub const LUMA_G: f32 = 0.587;

/// ITU-R BT.601 coefficient for the blue channel.
pub const LUMA_B: f32 = 0.114;

/// Calculate luma from u8 RGB values (0 to 255), rounded to nearest.
#[inline]
pub fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    let luma = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
    luma.clamp(0.0, 255.0).round() as u8
}

/// Collapse interleaved RGB bytes into one luma byte per pixel.
pub fn luma_plane(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| luma_u8(px[0], px[1], px[2]))
        .collect()
}
