//! Decoding with EXIF orientation handling.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::format::ImageFormat;
use crate::buffer::ImageBuffer;

/// Error types for image decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file extension is not one of the supported formats.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a decodable image.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),
}

/// EXIF orientation values (1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    /// Mirror across the top-left to bottom-right diagonal.
    Transpose = 5,
    Rotate90CW = 6,
    /// Mirror across the top-right to bottom-left diagonal.
    Transverse = 7,
    Rotate270CW = 8,
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}

/// Read the file at `path` and decode it to a 3-channel buffer.
///
/// The extension is checked before the file is opened.
///
/// # Errors
///
/// Returns `DecodeError::UnsupportedFormat` for an unknown extension,
/// `DecodeError::Io` when the file cannot be read, and
/// `DecodeError::CorruptedFile` when its contents do not decode.
pub fn decode_path(path: &Path) -> Result<ImageBuffer, DecodeError> {
    if ImageFormat::from_path(path).is_none() {
        return Err(DecodeError::UnsupportedFormat(path.display().to_string()));
    }
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(?path, size = bytes.len(), "read image file");
    decode_bytes(&bytes)
}

/// Decode an in-memory image of any supported format to a 3-channel RGB
/// buffer, applying EXIF orientation when the container carries one.
pub fn decode_bytes(bytes: &[u8]) -> Result<ImageBuffer, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let carries_exif = reader
        .format()
        .map(|f| matches!(f, image::ImageFormat::Jpeg | image::ImageFormat::Tiff))
        .unwrap_or(false);

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let orientation = if carries_exif {
        read_orientation(bytes)
    } else {
        Orientation::Normal
    };
    if orientation != Orientation::Normal {
        debug!(?orientation, "applying EXIF orientation");
    }

    Ok(ImageBuffer::from_rgb_image(
        apply_orientation(img, orientation).into_rgb8(),
    ))
}

/// EXIF orientation of a JPEG or TIFF container, `Normal` when absent.
pub fn read_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    Reader::new()
        .read_from_container(&mut cursor)
        .ok()
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .map(Orientation::from)
        .unwrap_or_default()
}

fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}
