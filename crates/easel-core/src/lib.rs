//! Easel Core - Interactive image editing engine
//!
//! This crate provides the editing model behind Easel: a fixed-order effect
//! pipeline that re-derives the displayed image from the pristine base on
//! every change, a bounded undo/redo history of rendered results, and file
//! loading and saving for the common raster formats.
//!
//! [`EditSession`] is the entry point. Presentation layers feed it
//! [`SessionEvent`]s (or call its methods directly) and display
//! [`EditSession::current_derived_image`].

pub mod buffer;
pub mod codec;
pub mod config;
pub mod history;
pub mod luminance;
pub mod ops;
pub mod params;
pub mod pipeline;
pub mod render;
pub mod session;

pub use buffer::{BufferError, Channels, ImageBuffer};
pub use codec::{
    decode_bytes, decode_path, encode_bytes, encode_path, DecodeError, EncodeError, FileCodec,
    ImageCodec, ImageFormat,
};
pub use config::{ConfigError, SessionConfig, UndoPolicy};
pub use history::{HistoryStack, MemorySize};
pub use ops::{compute_rotated_bounds, AffineTransform, CpuOps, ImageOps, MorphOp, OpsError, GAMMA_RANGE};
pub use params::{format_label, ParamError, ParamKey, ParamKind, ParamValue, ParameterPolicy, ParameterSet};
pub use pipeline::{scaled_dimension, EffectPipeline, Stage};
pub use render::{RenderError, RenderMetrics, RenderRequest, RenderWorker, RenderedFrame};
pub use session::{EditSession, EventOutcome, HistoryMove, SessionError, SessionEvent, Snapshot};
