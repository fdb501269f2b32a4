//! WASM-compatible wrapper types for image data.

use easel_core::{Channels, ImageBuffer};
use wasm_bindgen::prelude::*;

/// A rendered image handed to JavaScript.
///
/// Pixels are row-major, one byte per channel. `channels` is 1 for grayscale
/// and 3 for RGB.
#[wasm_bindgen]
pub struct JsImageBuffer {
    inner: ImageBuffer,
}

#[wasm_bindgen]
impl JsImageBuffer {
    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    #[wasm_bindgen(getter)]
    pub fn channels(&self) -> u8 {
        self.inner.channels().count() as u8
    }

    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.inner.byte_size()
    }

    /// Copy of the pixel data as a `Uint8Array`.
    pub fn pixels(&self) -> Vec<u8> {
        self.inner.pixels().to_vec()
    }

    /// RGBA copy ready for `new ImageData(...)`.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.inner.pixel_count() * 4);
        match self.inner.channels() {
            Channels::Gray => {
                for &v in self.inner.pixels() {
                    rgba.extend_from_slice(&[v, v, v, 255]);
                }
            }
            Channels::Rgb => {
                for px in self.inner.pixels().chunks_exact(3) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
        }
        rgba
    }
}

impl JsImageBuffer {
    pub(crate) fn from_buffer(inner: ImageBuffer) -> Self {
        Self { inner }
    }
}
