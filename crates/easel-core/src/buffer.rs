//! Owned raster storage shared by every stage of the editor.
//!
//! An [`ImageBuffer`] is always row-major, 8 bits per channel, and either
//! single-channel grayscale or 3-channel RGB. Its storage length is checked
//! against its shape at construction, so every buffer handed around the
//! pipeline satisfies `pixels.len() == width * height * channels`.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building an [`ImageBuffer`] from raw parts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// Width or height is zero.
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    ZeroDimension { width: u32, height: u32 },

    /// Pixel data length doesn't match the declared shape.
    #[error("Invalid pixel data: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Channel layout of an [`ImageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channels {
    /// Single luminance channel.
    Gray = 1,
    /// Red, green, blue.
    Rgb = 3,
}

impl Channels {
    /// Number of bytes per pixel.
    #[inline]
    pub fn count(self) -> usize {
        self as usize
    }
}

/// A decoded raster with its shape metadata.
///
/// `Clone` performs a deep copy of the pixel storage, so two buffers never
/// alias each other's pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    pixels: Vec<u8>,
}

impl ImageBuffer {
    /// Create a buffer from raw parts, validating the storage length.
    pub fn new(
        width: u32,
        height: u32,
        channels: Channels,
        pixels: Vec<u8>,
    ) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        let expected = storage_len(width, height, channels);
        if pixels.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Create a buffer where every byte has the same value.
    pub fn filled(
        width: u32,
        height: u32,
        channels: Channels,
        value: u8,
    ) -> Result<Self, BufferError> {
        Self::new(
            width,
            height,
            channels,
            vec![value; storage_len(width, height, channels)],
        )
    }

    /// Construct from parts the caller has already sized correctly.
    ///
    /// Used by the pixel primitives, which derive their output length from
    /// the shape they pass in.
    pub(crate) fn from_parts(width: u32, height: u32, channels: Channels, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            storage_len(width, height, channels),
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    /// Wrap an `image::RgbImage`.
    pub fn from_rgb_image(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self::from_parts(width, height, Channels::Rgb, img.into_raw())
    }

    /// Wrap an `image::GrayImage`.
    pub fn from_gray_image(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self::from_parts(width, height, Channels::Gray, img.into_raw())
    }

    /// Convert to a `DynamicImage` (`ImageLuma8` or `ImageRgb8`).
    ///
    /// Returns `None` only if the pixel storage does not match the shape.
    pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
        self.clone().into_dynamic_image()
    }

    /// Consume into a `DynamicImage` without copying the pixels.
    pub fn into_dynamic_image(self) -> Option<DynamicImage> {
        match self.channels {
            Channels::Gray => GrayImage::from_raw(self.width, self.height, self.pixels)
                .map(DynamicImage::ImageLuma8),
            Channels::Rgb => RgbImage::from_raw(self.width, self.height, self.pixels)
                .map(DynamicImage::ImageRgb8),
        }
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Channel layout.
    #[inline]
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// True for 3-channel buffers.
    #[inline]
    pub fn is_color(&self) -> bool {
        self.channels == Channels::Rgb
    }

    /// Row-major pixel bytes.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume the buffer and return its storage.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Bytes of the pixel at `(x, y)`, one per channel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let stride = self.channels.count();
        let idx = (y as usize * self.width as usize + x as usize) * stride;
        Some(&self.pixels[idx..idx + stride])
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of the pixel storage in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

#[inline]
pub(crate) fn storage_len(width: u32, height: u32, channels: Channels) -> usize {
    width as usize * height as usize * channels.count()
}
