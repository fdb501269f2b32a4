//! Pixel primitives behind the effect pipeline.
//!
//! The pipeline only decides *which* primitives run and in what order; the
//! numerics live behind the [`ImageOps`] trait so a different backend can be
//! swapped in without touching the composition logic. [`CpuOps`] is the
//! native implementation.
//!
//! Every primitive is pure: it borrows its input and returns a new buffer.
//!
//! # Modules
//!
//! - `pixel` - per-pixel operations (grayscale, invert, brightness, contrast, threshold, gamma, histogram equalization)
//! - `area` - neighborhood filters (Gaussian blur, sharpen, Canny edges, median, morphology)
//! - `geometric` - flips, rotation with canvas expansion, resize, crop, translation, affine warps

mod area;
mod geometric;
mod pixel;

use thiserror::Error;

pub use area::MorphOp;
pub use geometric::{compute_rotated_bounds, AffineTransform};
pub use pixel::GAMMA_RANGE;

use crate::buffer::ImageBuffer;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpsError {
    #[error("Unknown morphology operation: {0}")]
    UnknownMorphOp(String),

    #[error("Affine points are collinear")]
    DegenerateAffine,
}

/// Capability set of pixel primitives.
///
/// The pipeline composes the first twelve in a fixed order. The rest are
/// standalone tools for callers that work on buffers directly. Integer
/// arguments of pipeline primitives are already validated against their
/// parameter domains by the time they reach an implementation.
pub trait ImageOps: Send + Sync {
    /// Collapse color to one luma channel. Single-channel input is returned unchanged.
    fn grayscale(&self, image: &ImageBuffer) -> ImageBuffer;

    /// Bitwise complement of every channel.
    fn invert(&self, image: &ImageBuffer) -> ImageBuffer;

    /// Mirror left to right.
    fn flip_horizontal(&self, image: &ImageBuffer) -> ImageBuffer;

    /// Mirror top to bottom.
    fn flip_vertical(&self, image: &ImageBuffer) -> ImageBuffer;

    /// Add `value - 100` to every channel, saturating.
    fn brightness(&self, image: &ImageBuffer, value: i32) -> ImageBuffer;

    /// Scale every channel by `value / 100`, saturating.
    fn contrast(&self, image: &ImageBuffer, value: i32) -> ImageBuffer;

    /// Gaussian smoothing with a `2 * radius + 1` kernel.
    fn gaussian_blur(&self, image: &ImageBuffer, radius: u32) -> ImageBuffer;

    /// Laplacian-style sharpening, `amount` from 0 to 100.
    fn sharpen(&self, image: &ImageBuffer, amount: i32) -> ImageBuffer;

    /// Two-threshold edge map, expanded back to the input's channel count.
    fn canny(&self, image: &ImageBuffer, low: i32, high: i32) -> ImageBuffer;

    /// Binarize luma at `cut`, expanded back to the input's channel count.
    fn threshold(&self, image: &ImageBuffer, cut: i32) -> ImageBuffer;

    /// Rotate counter-clockwise about the center, growing the canvas to fit.
    fn rotate(&self, image: &ImageBuffer, degrees: f64) -> ImageBuffer;

    /// Resample to exact dimensions.
    fn resize(&self, image: &ImageBuffer, width: u32, height: u32) -> ImageBuffer;

    /// Power-law correction, clamped to [`GAMMA_RANGE`]. 1.0 is the identity.
    fn gamma(&self, image: &ImageBuffer, gamma: f64) -> ImageBuffer;

    /// Stretch the luma histogram over the full range, keeping chroma.
    fn equalize_histogram(&self, image: &ImageBuffer) -> ImageBuffer;

    /// Median filter. Sizes below 3 are the identity, even sizes round up.
    fn median_blur(&self, image: &ImageBuffer, kernel_size: u32) -> ImageBuffer;

    /// Erosion, dilation and the operations built from them.
    fn morphology(&self, image: &ImageBuffer, op: MorphOp, kernel_size: u32, iterations: u32) -> ImageBuffer;

    /// Shift by whole pixels on a same-size black canvas.
    fn translate(&self, image: &ImageBuffer, dx: i32, dy: i32) -> ImageBuffer;

    /// Cut out a window, clamped so it is never empty.
    fn crop(&self, image: &ImageBuffer, x: u32, y: u32, width: u32, height: u32) -> ImageBuffer;

    /// Resample through `transform` onto a same-size black canvas.
    fn warp_affine(&self, image: &ImageBuffer, transform: &AffineTransform) -> ImageBuffer;
}

/// Native single-threaded CPU backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuOps;

impl ImageOps for CpuOps {
    fn grayscale(&self, image: &ImageBuffer) -> ImageBuffer {
        pixel::grayscale(image)
    }

    fn invert(&self, image: &ImageBuffer) -> ImageBuffer {
        pixel::invert(image)
    }

    fn flip_horizontal(&self, image: &ImageBuffer) -> ImageBuffer {
        geometric::flip_horizontal(image)
    }

    fn flip_vertical(&self, image: &ImageBuffer) -> ImageBuffer {
        geometric::flip_vertical(image)
    }

    fn brightness(&self, image: &ImageBuffer, value: i32) -> ImageBuffer {
        pixel::brightness(image, value)
    }

    fn contrast(&self, image: &ImageBuffer, value: i32) -> ImageBuffer {
        pixel::contrast(image, value)
    }

    fn gaussian_blur(&self, image: &ImageBuffer, radius: u32) -> ImageBuffer {
        area::gaussian_blur(image, radius)
    }

    fn sharpen(&self, image: &ImageBuffer, amount: i32) -> ImageBuffer {
        area::sharpen(image, amount)
    }

    fn canny(&self, image: &ImageBuffer, low: i32, high: i32) -> ImageBuffer {
        area::canny(image, low, high)
    }

    fn threshold(&self, image: &ImageBuffer, cut: i32) -> ImageBuffer {
        pixel::threshold(image, cut)
    }

    fn rotate(&self, image: &ImageBuffer, degrees: f64) -> ImageBuffer {
        geometric::rotate(image, degrees)
    }

    fn resize(&self, image: &ImageBuffer, width: u32, height: u32) -> ImageBuffer {
        geometric::resize(image, width, height)
    }

    fn gamma(&self, image: &ImageBuffer, gamma: f64) -> ImageBuffer {
        pixel::gamma(image, gamma)
    }

    fn equalize_histogram(&self, image: &ImageBuffer) -> ImageBuffer {
        pixel::equalize_histogram(image)
    }

    fn median_blur(&self, image: &ImageBuffer, kernel_size: u32) -> ImageBuffer {
        area::median_blur(image, kernel_size)
    }

    fn morphology(&self, image: &ImageBuffer, op: MorphOp, kernel_size: u32, iterations: u32) -> ImageBuffer {
        area::morphology(image, op, kernel_size, iterations)
    }

    fn translate(&self, image: &ImageBuffer, dx: i32, dy: i32) -> ImageBuffer {
        geometric::translate(image, dx, dy)
    }

    fn crop(&self, image: &ImageBuffer, x: u32, y: u32, width: u32, height: u32) -> ImageBuffer {
        geometric::crop(image, x, y, width, height)
    }

    fn warp_affine(&self, image: &ImageBuffer, transform: &AffineTransform) -> ImageBuffer {
        geometric::warp_affine(image, transform)
    }
}
