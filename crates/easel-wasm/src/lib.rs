//! Easel WASM - WebAssembly bindings for Easel
//!
//! This crate exposes the easel-core editing session to JavaScript/TypeScript
//! so a browser front end can drive the same pipeline and history as native
//! callers.
//!
//! # Module Structure
//!
//! - `session` - Stateful editing session (load, parameters, undo/redo, export)
//! - `types` - WASM-compatible wrapper types for image data
//!
//! # Usage
//!
//! ```typescript
//! import init, { JsEditSession } from '@easel/wasm';
//!
//! await init();
//!
//! const session = new JsEditSession();
//! session.load_bytes(new Uint8Array(await file.arrayBuffer()));
//! session.set_parameter('rotation', 90);
//! const image = session.current_image();
//! ```

use wasm_bindgen::prelude::*;

mod session;
mod types;

pub use session::JsEditSession;
pub use types::JsImageBuffer;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// File extensions the session can load and export.
#[wasm_bindgen]
pub fn supported_extensions() -> Vec<String> {
    easel_core::codec::SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}
