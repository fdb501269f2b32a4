//! Encoding for save and export.
//!
//! JPEG goes through the `image` crate's encoder directly so the quality
//! setting is honored. Every other format is written through
//! [`DynamicImage::write_to`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use thiserror::Error;
use tracing::debug;

use super::format::ImageFormat;
use crate::buffer::{Channels, ImageBuffer};

/// Errors that can occur while encoding or writing an image.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The target extension is not one of the supported formats.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Creating the parent directory or writing the file failed.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoder rejected the image.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

/// Encode `image` in memory.
///
/// # Arguments
///
/// * `image` - Buffer to encode, grayscale or RGB
/// * `format` - Output container
/// * `quality` - JPEG quality, clamped to 1-100; ignored by other formats
pub fn encode_bytes(
    image: &ImageBuffer,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let color = match image.channels() {
                Channels::Gray => ExtendedColorType::L8,
                Channels::Rgb => ExtendedColorType::Rgb8,
            };
            JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
                .write_image(image.pixels(), image.width(), image.height(), color)
                .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;
        }
        ImageFormat::Gif => {
            DynamicImage::ImageRgba8(dynamic_image(image)?.into_rgba8())
                .write_to(&mut buffer, format.to_image_format())
                .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;
        }
        ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff => {
            dynamic_image(image)?
                .write_to(&mut buffer, format.to_image_format())
                .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;
        }
    }

    Ok(buffer.into_inner())
}

fn dynamic_image(image: &ImageBuffer) -> Result<DynamicImage, EncodeError> {
    image
        .to_dynamic_image()
        .ok_or_else(|| EncodeError::EncodingFailed("pixel storage does not match dimensions".into()))
}

/// Encode `image` into `path`, choosing the format from its extension and
/// creating missing parent directories.
pub fn encode_path(image: &ImageBuffer, path: &Path, quality: u8) -> Result<(), EncodeError> {
    let format = ImageFormat::from_path(path)
        .ok_or_else(|| EncodeError::UnsupportedFormat(path.display().to_string()))?;

    let bytes = encode_bytes(image, format, quality)?;

    let io_error = |source| EncodeError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, &bytes).map_err(io_error)?;

    debug!(?path, %format, size = bytes.len(), "wrote image file");
    Ok(())
}
