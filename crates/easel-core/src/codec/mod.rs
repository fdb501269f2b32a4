//! File collaborator for loading and saving images.
//!
//! This module provides functionality for:
//! - Detecting the format from a path's extension (case-insensitive)
//! - Decoding JPEG, PNG, BMP, GIF and TIFF to RGB with EXIF orientation applied
//! - Encoding to the same formats, with configurable JPEG quality
//!
//! [`EditSession`](crate::EditSession) talks to the file system only through
//! the [`ImageCodec`] trait; [`FileCodec`] is the default implementation.

mod decode;
mod encode;
mod format;

use std::path::Path;

pub use decode::{decode_bytes, decode_path, read_orientation, DecodeError, Orientation};
pub use encode::{encode_bytes, encode_path, EncodeError};
pub use format::{is_supported_path, ImageFormat, UnknownFormat, SUPPORTED_EXTENSIONS};

use crate::buffer::ImageBuffer;

/// Default JPEG quality for saved files.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Reads and writes image files.
pub trait ImageCodec {
    fn decode(&self, path: &Path) -> Result<ImageBuffer, DecodeError>;

    fn encode(&self, image: &ImageBuffer, path: &Path) -> Result<(), EncodeError>;
}

/// Local file system codec built on the `image` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCodec {
    jpeg_quality: u8,
}

impl FileCodec {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

impl Default for FileCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageCodec for FileCodec {
    fn decode(&self, path: &Path) -> Result<ImageBuffer, DecodeError> {
        decode_path(path)
    }

    fn encode(&self, image: &ImageBuffer, path: &Path) -> Result<(), EncodeError> {
        encode_path(image, path, self.jpeg_quality)
    }
}
