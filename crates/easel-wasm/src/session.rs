//! Editing session bindings.
//!
//! Browsers have no file paths, so images come in and go out as encoded
//! bytes. Everything else maps one to one onto [`EditSession`].
//!
//! # Example
//!
//! ```typescript
//! const session = new JsEditSession();
//! session.load_bytes(bytes);
//! session.toggle('grayscale');
//! session.set_parameter('blur', 3);
//! if (session.can_undo) session.undo();
//! const png = session.encode('png', 95);
//! ```

use easel_core::{
    decode_bytes, encode_bytes, Channels, EditSession, HistoryMove, ImageFormat, ParamKey,
    SessionConfig,
};
use wasm_bindgen::prelude::*;

use crate::types::JsImageBuffer;

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    let message = err.to_string();
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

fn parse_key(name: &str) -> Result<ParamKey, JsValue> {
    name.parse::<ParamKey>().map_err(to_js_error)
}

/// Stateful editing session for JavaScript.
#[wasm_bindgen]
pub struct JsEditSession {
    inner: EditSession,
}

#[wasm_bindgen]
impl JsEditSession {
    /// Create a session with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: EditSession::new(),
        }
    }

    /// Create a session from a configuration object, e.g.
    /// `{ history_capacity: 20, parameter_policy: "clamp" }`.
    pub fn with_config(config: JsValue) -> Result<JsEditSession, JsValue> {
        let config: SessionConfig = serde_wasm_bindgen::from_value(config).map_err(to_js_error)?;
        let inner = EditSession::with_config(config).map_err(to_js_error)?;
        Ok(Self { inner })
    }

    /// Decode an encoded image (JPEG, PNG, BMP, GIF or TIFF) and start editing it.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        let image = decode_bytes(bytes).map_err(to_js_error)?;
        self.inner.load_image(image, None);
        Ok(())
    }

    /// Start editing raw RGB pixels (3 bytes per pixel, row-major).
    pub fn load_rgb(&mut self, width: u32, height: u32, pixels: Vec<u8>) -> Result<(), JsValue> {
        self.inner
            .load_pixels(width, height, Channels::Rgb, pixels)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(getter)]
    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    /// Set a slider by name, e.g. `set_parameter('contrast', 150)`.
    pub fn set_parameter(&mut self, name: &str, value: i32) -> Result<(), JsValue> {
        let key = parse_key(name)?;
        self.inner.set_parameter(key, value).map_err(to_js_error)
    }

    /// Flip a toggle by name and return its new state.
    pub fn toggle(&mut self, name: &str) -> Result<bool, JsValue> {
        let key = parse_key(name)?;
        self.inner.toggle(key).map_err(to_js_error)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.inner.undo() == HistoryMove::Moved
    }

    /// Returns false when there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.inner.redo() == HistoryMove::Moved
    }

    #[wasm_bindgen(getter)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(getter)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    #[wasm_bindgen(getter)]
    pub fn history_len(&self) -> usize {
        self.inner.history_len()
    }

    /// The image to display, or `undefined` before anything is loaded.
    pub fn current_image(&self) -> Option<JsImageBuffer> {
        self.inner
            .current_derived_image()
            .cloned()
            .map(JsImageBuffer::from_buffer)
    }

    /// Encode the current image, e.g. `encode('jpeg', 90)`.
    pub fn encode(&self, format: &str, quality: u8) -> Result<Vec<u8>, JsValue> {
        let format: ImageFormat = format.parse().map_err(to_js_error)?;
        let image = self
            .inner
            .current_derived_image()
            .ok_or_else(|| to_js_error(easel_core::SessionError::NoImage))?;
        encode_bytes(image, format, quality).map_err(to_js_error)
    }

    /// Current parameters as a plain object.
    pub fn parameters(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.parameter_snapshot()).map_err(to_js_error)
    }

    /// Caption for a control, e.g. `"Rotation: 90°"`.
    pub fn label(&self, name: &str) -> Result<String, JsValue> {
        let key = parse_key(name)?;
        Ok(self.inner.label(key))
    }

    /// Names of the pipeline stages the current parameters run, in order.
    pub fn stage_names(&self) -> js_sys::Array {
        self.active_stage_names()
            .into_iter()
            .map(JsValue::from)
            .collect()
    }
}

impl Default for JsEditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEditSession {
    fn active_stage_names(&self) -> Vec<&'static str> {
        self.inner
            .active_stages()
            .into_iter()
            .map(|stage| stage.name())
            .collect()
    }
}
