//! The stateful editor: base image, parameters, pipeline and history.
//!
//! Every mutation follows the same sequence: validate, update the parameter
//! set, run the pipeline, commit the result to history. Validation happens
//! first, so a rejected update or a failed load/save leaves the session
//! exactly as it was.
//!
//! The derived image is always the history entry under the cursor. Moving
//! the cursor and replacing the displayed image are therefore one step.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::buffer::{BufferError, Channels, ImageBuffer};
use crate::codec::{DecodeError, EncodeError, FileCodec, ImageCodec};
use crate::config::{ConfigError, SessionConfig, UndoPolicy};
use crate::history::{HistoryStack, MemorySize};
use crate::ops::{CpuOps, ImageOps};
use crate::params::{format_label, ParamError, ParamKey, ParamValue, ParameterSet};
use crate::pipeline::{EffectPipeline, Stage};
use crate::render::{RenderError, RenderRequest, RenderWorker, RenderedFrame};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Load failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Save failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    InvalidParameter(#[from] ParamError),

    #[error("Invalid image: {0}")]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No image loaded")]
    NoImage,

    #[error("No save target: the image was not loaded from a file")]
    NoTarget,

    #[error("Stale render: generation {frame} is behind {current}")]
    StaleRender { frame: u64, current: u64 },
}

/// One committed history entry: a rendered image and the parameters that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    image: ImageBuffer,
    params: ParameterSet,
}

impl Snapshot {
    pub fn image(&self) -> &ImageBuffer {
        &self.image
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }
}

impl MemorySize for Snapshot {
    fn memory_size(&self) -> usize {
        self.image.byte_size()
    }
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMove {
    Moved,
    /// Nothing to undo or redo; the session did not change.
    Exhausted,
}

/// Discrete events emitted by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ParameterChanged { key: ParamKey, value: i32 },
    Toggled { key: ParamKey },
    ResetRequested,
    UndoRequested,
    RedoRequested,
    LoadRequested { path: PathBuf },
    /// Saves back to the source file when `path` is absent.
    SaveRequested {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// What handling a [`SessionEvent`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// Parameters changed. `rendered` is false when no image is loaded yet.
    Updated { rendered: bool },
    Toggled { on: bool, rendered: bool },
    History { result: HistoryMove },
    Loaded { width: u32, height: u32 },
    Saved { path: PathBuf },
}

/// Editing session over one image at a time.
pub struct EditSession<O: ImageOps = CpuOps, C: ImageCodec = FileCodec> {
    config: SessionConfig,
    pipeline: EffectPipeline<O>,
    codec: C,
    params: ParameterSet,
    base: Option<Arc<ImageBuffer>>,
    source: Option<PathBuf>,
    history: HistoryStack<Snapshot>,
    /// Bumped on every change to parameters, base image or cursor.
    generation: u64,
}

impl EditSession {
    /// Empty session with the default configuration.
    pub fn new() -> Self {
        let config = SessionConfig::default();
        let pipeline = EffectPipeline::new().with_sharpen(config.include_sharpen);
        let codec = FileCodec::new(config.jpeg_quality);
        Self::from_validated(config, pipeline, codec)
    }

    /// Empty session on the native backends.
    pub fn with_config(config: SessionConfig) -> Result<Self, SessionError> {
        let codec = FileCodec::new(config.jpeg_quality);
        Self::with_backends(config, CpuOps, codec)
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ImageOps, C: ImageCodec> EditSession<O, C> {
    /// Empty session on caller-supplied pixel and file backends.
    pub fn with_backends(config: SessionConfig, ops: O, codec: C) -> Result<Self, SessionError> {
        config.validate()?;
        let pipeline = EffectPipeline::with_ops(ops).with_sharpen(config.include_sharpen);
        Ok(Self::from_validated(config, pipeline, codec))
    }

    fn from_validated(config: SessionConfig, pipeline: EffectPipeline<O>, codec: C) -> Self {
        let capacity = config.history_capacity().unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            pipeline,
            codec,
            params: ParameterSet::neutral(),
            base: None,
            source: None,
            history: HistoryStack::new(capacity),
            generation: 0,
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &EffectPipeline<O> {
        &self.pipeline
    }

    pub fn is_loaded(&self) -> bool {
        self.base.is_some()
    }

    pub fn parameter_snapshot(&self) -> ParameterSet {
        self.params
    }

    pub fn base_image(&self) -> Option<&ImageBuffer> {
        self.base.as_deref()
    }

    /// The image to display: the history entry under the cursor.
    pub fn current_derived_image(&self) -> Option<&ImageBuffer> {
        self.history.current().map(Snapshot::image)
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_cursor(&self) -> Option<usize> {
        self.history.cursor()
    }

    /// Bytes of pixel data retained by history.
    pub fn history_memory(&self) -> usize {
        self.history.memory_size()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Caption for `key` at its current value.
    pub fn label(&self, key: ParamKey) -> String {
        format_label(key, self.params.get(key))
    }

    /// Stages the current parameters will run.
    pub fn active_stages(&self) -> Vec<Stage> {
        self.pipeline.stages(&self.params)
    }

    // ------------------------------------------------------------------
    // Load and save
    // ------------------------------------------------------------------

    /// Decode `path` and start editing it.
    ///
    /// Parameters return to neutral and history is reseeded with the
    /// decoded image. On failure nothing changes.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let image = self.codec.decode(path).map_err(|err| {
            warn!(?path, %err, "failed to load image");
            err
        })?;
        self.install(image, Some(path.to_path_buf()));
        Ok(())
    }

    /// Start editing an already-decoded image. `source` becomes the default
    /// save target.
    pub fn load_image(&mut self, image: ImageBuffer, source: Option<PathBuf>) {
        self.install(image, source);
    }

    /// Start editing raw row-major pixels.
    pub fn load_pixels(
        &mut self,
        width: u32,
        height: u32,
        channels: Channels,
        pixels: Vec<u8>,
    ) -> Result<(), SessionError> {
        let image = ImageBuffer::new(width, height, channels, pixels)?;
        self.install(image, None);
        Ok(())
    }

    fn install(&mut self, image: ImageBuffer, source: Option<PathBuf>) {
        info!(
            path = ?source,
            width = image.width(),
            height = image.height(),
            channels = image.channels().count(),
            "image loaded"
        );
        self.params = ParameterSet::neutral();
        self.base = Some(Arc::new(image.clone()));
        self.history.reset(Snapshot {
            image,
            params: self.params,
        });
        self.source = source;
        self.generation += 1;
    }

    /// Write the current derived image to `path`, or back to the source
    /// file when `path` is `None`. Returns the path written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, SessionError> {
        let image = self.current_derived_image().ok_or(SessionError::NoImage)?;
        let target = path
            .or(self.source.as_deref())
            .ok_or(SessionError::NoTarget)?;
        self.codec.encode(image, target).map_err(|err| {
            warn!(path = ?target, %err, "failed to save image");
            err
        })?;
        info!(path = ?target, width = image.width(), height = image.height(), "image saved");
        Ok(target.to_path_buf())
    }

    // ------------------------------------------------------------------
    // Parameter updates
    // ------------------------------------------------------------------

    /// Set a slider and re-render. Without an image the value is only stored.
    pub fn set_parameter(&mut self, key: ParamKey, value: i32) -> Result<(), SessionError> {
        let params = self.validated_slider(key, value)?;
        self.commit_params(params);
        Ok(())
    }

    /// Set a toggle and re-render.
    pub fn set_toggle(&mut self, key: ParamKey, on: bool) -> Result<(), SessionError> {
        let params = self.validated_toggle(key, on)?;
        self.commit_params(params);
        Ok(())
    }

    /// Flip a toggle, re-render, and return its new state.
    pub fn toggle(&mut self, key: ParamKey) -> Result<bool, SessionError> {
        let on = !self.current_toggle(key)?;
        self.set_toggle(key, on)?;
        Ok(on)
    }

    /// Return every parameter to neutral and re-render.
    pub fn reset(&mut self) {
        info!(loaded = self.is_loaded(), "parameters reset");
        self.commit_params(ParameterSet::neutral());
    }

    fn current_toggle(&self, key: ParamKey) -> Result<bool, SessionError> {
        match self.params.get(key) {
            ParamValue::Toggle(on) => Ok(on),
            ParamValue::Slider(_) => Err(ParamError::NotAToggle(key).into()),
        }
    }

    fn validated_slider(&self, key: ParamKey, value: i32) -> Result<ParameterSet, SessionError> {
        self.params
            .with_slider(key, value, self.config.parameter_policy)
            .map_err(|err| {
                warn!(%key, value, %err, "parameter rejected");
                err.into()
            })
    }

    fn validated_toggle(&self, key: ParamKey, on: bool) -> Result<ParameterSet, SessionError> {
        self.params.with_toggle(key, on).map_err(|err| {
            warn!(%key, on, %err, "parameter rejected");
            err.into()
        })
    }

    fn commit_params(&mut self, params: ParameterSet) {
        self.params = params;
        self.generation += 1;
        let Some(base) = self.base.as_deref() else {
            return;
        };
        let image = self.pipeline.apply(base, &params);
        self.history.push(Snapshot { image, params });
        trace!(
            len = self.history.len(),
            cursor = ?self.history.cursor(),
            "history committed"
        );
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> HistoryMove {
        let restored = self.history.undo().map(|snapshot| snapshot.params);
        self.after_move("undo", restored)
    }

    pub fn redo(&mut self) -> HistoryMove {
        let restored = self.history.redo().map(|snapshot| snapshot.params);
        self.after_move("redo", restored)
    }

    fn after_move(&mut self, direction: &'static str, restored: Option<ParameterSet>) -> HistoryMove {
        let Some(params) = restored else {
            trace!(direction, "history exhausted");
            return HistoryMove::Exhausted;
        };
        if self.config.undo_policy == UndoPolicy::RestoreParameters {
            self.params = params;
        }
        self.generation += 1;
        trace!(direction, cursor = ?self.history.cursor(), "history moved");
        HistoryMove::Moved
    }

    // ------------------------------------------------------------------
    // Deferred rendering
    // ------------------------------------------------------------------

    /// Set a slider without rendering. Returns the render job to run, or
    /// `None` when no image is loaded.
    pub fn set_parameter_deferred(
        &mut self,
        key: ParamKey,
        value: i32,
    ) -> Result<Option<RenderRequest>, SessionError> {
        let params = self.validated_slider(key, value)?;
        self.params = params;
        self.generation += 1;
        Ok(self.render_request())
    }

    /// Flip a toggle without rendering.
    pub fn toggle_deferred(&mut self, key: ParamKey) -> Result<Option<RenderRequest>, SessionError> {
        let on = !self.current_toggle(key)?;
        let params = self.validated_toggle(key, on)?;
        self.params = params;
        self.generation += 1;
        Ok(self.render_request())
    }

    /// Render job for the current state.
    pub fn render_request(&self) -> Option<RenderRequest> {
        self.base.as_ref().map(|base| RenderRequest {
            generation: self.generation,
            base: Arc::clone(base),
            params: self.params,
        })
    }

    /// Commit a background render. Frames from an older generation or an
    /// older base image are refused with [`SessionError::StaleRender`].
    pub fn commit_render(&mut self, frame: RenderedFrame) -> Result<(), SessionError> {
        let base = self.base.as_ref().ok_or(SessionError::NoImage)?;
        if frame.generation != self.generation
            || !Arc::ptr_eq(&frame.base, base)
            || frame.params != self.params
        {
            debug!(
                frame = frame.generation,
                current = self.generation,
                "discarding stale render"
            );
            return Err(SessionError::StaleRender {
                frame: frame.generation,
                current: self.generation,
            });
        }
        self.history.push(Snapshot {
            image: frame.image,
            params: frame.params,
        });
        trace!(generation = frame.generation, "render committed");
        Ok(())
    }

    /// Commit the newest frame `worker` has finished, if it is still current.
    /// Returns whether history changed. Stale frames are dropped.
    pub fn commit_ready_render(&mut self, worker: &RenderWorker) -> Result<bool, SessionError> {
        let Some(frame) = worker.try_receive()? else {
            return Ok(false);
        };
        match self.commit_render(frame) {
            Ok(()) => Ok(true),
            Err(SessionError::StaleRender { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Dispatch a presentation event.
    pub fn handle(&mut self, event: SessionEvent) -> Result<EventOutcome, SessionError> {
        match event {
            SessionEvent::ParameterChanged { key, value } => {
                self.set_parameter(key, value)?;
                Ok(EventOutcome::Updated {
                    rendered: self.is_loaded(),
                })
            }
            SessionEvent::Toggled { key } => {
                let on = self.toggle(key)?;
                Ok(EventOutcome::Toggled {
                    on,
                    rendered: self.is_loaded(),
                })
            }
            SessionEvent::ResetRequested => {
                self.reset();
                Ok(EventOutcome::Updated {
                    rendered: self.is_loaded(),
                })
            }
            SessionEvent::UndoRequested => Ok(EventOutcome::History {
                result: self.undo(),
            }),
            SessionEvent::RedoRequested => Ok(EventOutcome::History {
                result: self.redo(),
            }),
            SessionEvent::LoadRequested { path } => {
                self.load(&path)?;
                let (width, height) = self
                    .base_image()
                    .map(ImageBuffer::dimensions)
                    .ok_or(SessionError::NoImage)?;
                Ok(EventOutcome::Loaded { width, height })
            }
            SessionEvent::SaveRequested { path } => {
                let path = self.save(path.as_deref())?;
                Ok(EventOutcome::Saved { path })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::params::ParameterPolicy;

    fn gradient(width: u32, height: u32) -> ImageBuffer {
        let pixels = (0..width * height)
            .flat_map(|i| [(i % 251) as u8, (i * 7 % 256) as u8, 30])
            .collect();
        ImageBuffer::new(width, height, Channels::Rgb, pixels).unwrap()
    }

    fn loaded(width: u32, height: u32) -> EditSession {
        let mut session = EditSession::new();
        session.load_image(gradient(width, height), None);
        session
    }

    /// In-memory codec that can be told to fail.
    #[derive(Default)]
    struct MemoryCodec {
        files: RefCell<std::collections::HashMap<PathBuf, ImageBuffer>>,
        fail_decode: bool,
        fail_encode: bool,
    }

    impl ImageCodec for MemoryCodec {
        fn decode(&self, path: &Path) -> Result<ImageBuffer, DecodeError> {
            if self.fail_decode {
                return Err(DecodeError::CorruptedFile("truncated".into()));
            }
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| DecodeError::UnsupportedFormat(path.display().to_string()))
        }

        fn encode(&self, image: &ImageBuffer, path: &Path) -> Result<(), EncodeError> {
            if self.fail_encode {
                return Err(EncodeError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.files
                .borrow_mut()
                .insert(path.to_path_buf(), image.clone());
            Ok(())
        }
    }

    fn memory_session(codec: MemoryCodec) -> EditSession<CpuOps, MemoryCodec> {
        EditSession::with_backends(SessionConfig::default(), CpuOps, codec).unwrap()
    }

    #[test]
    fn test_empty_session() {
        let mut session = EditSession::new();
        assert!(!session.is_loaded());
        assert!(session.current_derived_image().is_none());
        assert!(!session.can_undo() && !session.can_redo());
        assert_eq!(session.undo(), HistoryMove::Exhausted);
        assert_eq!(session.redo(), HistoryMove::Exhausted);
        assert!(matches!(session.save(None), Err(SessionError::NoImage)));
        assert!(session.render_request().is_none());
    }

    #[test]
    fn test_set_parameter_before_load_is_stored() {
        let mut session = EditSession::new();
        session.set_parameter(ParamKey::Brightness, 150).unwrap();
        assert_eq!(session.parameter_snapshot().brightness(), 150);
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_load_resets_state() {
        let mut session = EditSession::new();
        session.set_parameter(ParamKey::Blur, 4).unwrap();
        session.load_image(gradient(10, 8), Some(PathBuf::from("a.png")));

        assert!(session.is_loaded());
        assert!(session.parameter_snapshot().is_neutral());
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.current_derived_image(), session.base_image());
        assert_eq!(session.source_path(), Some(Path::new("a.png")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        FileCodec::default().encode(&gradient(12, 9), &path).unwrap();

        let mut session = EditSession::new();
        session.load(&path).unwrap();
        assert_eq!(session.base_image(), Some(&gradient(12, 9)));
        assert_eq!(session.source_path(), Some(path.as_path()));
    }

    #[test]
    fn test_set_parameter_renders_and_commits() {
        let mut session = loaded(200, 100);
        session.set_parameter(ParamKey::Rotation, 90).unwrap();
        assert_eq!(session.history_len(), 2);
        assert_eq!(
            session.current_derived_image().map(ImageBuffer::dimensions),
            Some((100, 200))
        );
        assert_eq!(session.base_image().map(ImageBuffer::dimensions), Some((200, 100)));
    }

    #[test]
    fn test_rejected_parameter_leaves_state_unchanged() {
        let mut session = loaded(8, 8);
        session.set_parameter(ParamKey::Brightness, 120).unwrap();
        let params = session.parameter_snapshot();
        let derived = session.current_derived_image().cloned();
        let generation = session.generation();

        let err = session.set_parameter(ParamKey::Brightness, 250).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidParameter(ParamError::OutOfRange { value: 250, .. })
        ));
        assert_eq!(session.parameter_snapshot(), params);
        assert_eq!(session.current_derived_image().cloned(), derived);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.generation(), generation);
    }

    #[test]
    fn test_clamp_policy() {
        let config = SessionConfig {
            parameter_policy: ParameterPolicy::Clamp,
            ..SessionConfig::default()
        };
        let mut session = EditSession::with_config(config).unwrap();
        session.load_image(gradient(4, 4), None);
        session.set_parameter(ParamKey::Blur, 99).unwrap();
        assert_eq!(session.parameter_snapshot().blur(), 20);
    }

    #[test]
    fn test_kind_mismatch_is_invalid_parameter() {
        let mut session = loaded(4, 4);
        assert!(matches!(
            session.toggle(ParamKey::Blur),
            Err(SessionError::InvalidParameter(ParamError::NotAToggle(ParamKey::Blur)))
        ));
        assert!(matches!(
            session.set_parameter(ParamKey::Invert, 1),
            Err(SessionError::InvalidParameter(ParamError::NotASlider(ParamKey::Invert)))
        ));
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn test_toggle_flips_and_renders() {
        let mut session = loaded(100, 100);
        assert!(session.toggle(ParamKey::Grayscale).unwrap());
        assert_eq!(
            session.current_derived_image().map(ImageBuffer::channels),
            Some(Channels::Gray)
        );
        assert!(!session.toggle(ParamKey::Grayscale).unwrap());
        assert_eq!(session.current_derived_image(), session.base_image());
        assert_eq!(session.history_len(), 3);
    }

    #[test]
    fn test_black_image_grayscale_invert_is_white() {
        let mut session = EditSession::new();
        session.load_image(ImageBuffer::filled(100, 100, Channels::Rgb, 0).unwrap(), None);
        session.set_toggle(ParamKey::Grayscale, true).unwrap();
        session.set_toggle(ParamKey::Invert, true).unwrap();
        let out = session.current_derived_image().unwrap();
        assert_eq!(out.pixel(0, 0), Some(&[255u8][..]));
        assert_eq!(out.pixel(50, 50), Some(&[255u8][..]));
    }

    #[test]
    fn test_undo_redo_restores_pixels_only_by_default() {
        let mut session = loaded(6, 6);
        session.set_parameter(ParamKey::Brightness, 150).unwrap();
        let first = session.current_derived_image().cloned();
        session.set_parameter(ParamKey::Contrast, 50).unwrap();
        let second = session.current_derived_image().cloned();
        let params = session.parameter_snapshot();

        assert_eq!(session.undo(), HistoryMove::Moved);
        assert_eq!(session.current_derived_image().cloned(), first);
        assert_eq!(session.parameter_snapshot(), params);
        assert!(session.can_redo());

        assert_eq!(session.redo(), HistoryMove::Moved);
        assert_eq!(session.current_derived_image().cloned(), second);
        assert_eq!(session.redo(), HistoryMove::Exhausted);
    }

    #[test]
    fn test_undo_restore_parameters_policy() {
        let config = SessionConfig {
            undo_policy: UndoPolicy::RestoreParameters,
            ..SessionConfig::default()
        };
        let mut session = EditSession::with_config(config).unwrap();
        session.load_image(gradient(6, 6), None);
        session.set_parameter(ParamKey::Brightness, 150).unwrap();
        session.set_parameter(ParamKey::Brightness, 50).unwrap();

        session.undo();
        assert_eq!(session.parameter_snapshot().brightness(), 150);
        session.undo();
        assert!(session.parameter_snapshot().is_neutral());
        session.redo();
        assert_eq!(session.parameter_snapshot().brightness(), 150);
    }

    #[test]
    fn test_edit_after_undo_prunes_redo() {
        let mut session = loaded(6, 6);
        session.set_parameter(ParamKey::Brightness, 150).unwrap();
        session.set_parameter(ParamKey::Brightness, 160).unwrap();
        session.undo();
        session.set_parameter(ParamKey::Brightness, 170).unwrap();
        assert!(!session.can_redo());
        assert_eq!(session.history_len(), 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SessionConfig {
            history_capacity: 3,
            ..SessionConfig::default()
        };
        let mut session = EditSession::with_config(config).unwrap();
        session.load_image(gradient(4, 4), None);
        for value in 101..=105 {
            session.set_parameter(ParamKey::Brightness, value).unwrap();
        }
        assert_eq!(session.history_len(), 3);
        assert_eq!(session.history_cursor(), Some(2));
        assert_eq!(session.history_memory(), 3 * 4 * 4 * 3);
    }

    #[test]
    fn test_reset_renders_neutral() {
        let mut session = loaded(6, 4);
        session.set_parameter(ParamKey::Rotation, 45).unwrap();
        session.reset();
        assert!(session.parameter_snapshot().is_neutral());
        assert_eq!(session.current_derived_image(), session.base_image());
        assert_eq!(session.history_len(), 3);
    }

    #[test]
    fn test_failed_load_leaves_session_unchanged() {
        let codec = MemoryCodec {
            fail_decode: true,
            ..MemoryCodec::default()
        };
        let mut session = memory_session(codec);
        session.load_image(gradient(5, 5), Some(PathBuf::from("orig.png")));
        session.set_parameter(ParamKey::Blur, 2).unwrap();
        let derived = session.current_derived_image().cloned();

        let err = session.load("broken.png").unwrap_err();
        assert!(matches!(err, SessionError::Decode(DecodeError::CorruptedFile(_))));
        assert_eq!(session.source_path(), Some(Path::new("orig.png")));
        assert_eq!(session.parameter_snapshot().blur(), 2);
        assert_eq!(session.current_derived_image().cloned(), derived);
        assert_eq!(session.history_len(), 2);
    }

    #[test]
    fn test_failed_save_leaves_session_unchanged() {
        let codec = MemoryCodec {
            fail_encode: true,
            ..MemoryCodec::default()
        };
        let mut session = memory_session(codec);
        session.load_image(gradient(5, 5), Some(PathBuf::from("orig.png")));
        session.set_parameter(ParamKey::Contrast, 130).unwrap();
        let generation = session.generation();

        let err = session.save(None).unwrap_err();
        assert!(matches!(err, SessionError::Encode(EncodeError::Io { .. })));
        assert_eq!(session.generation(), generation);
        assert_eq!(session.history_len(), 2);
        assert!(session.can_undo());
    }

    #[test]
    fn test_save_targets() {
        let mut session = memory_session(MemoryCodec::default());
        session.load_image(gradient(5, 5), None);
        assert!(matches!(session.save(None), Err(SessionError::NoTarget)));

        session.set_parameter(ParamKey::Brightness, 180).unwrap();
        let written = session.save(Some(Path::new("out.png"))).unwrap();
        assert_eq!(written, PathBuf::from("out.png"));
        assert_eq!(
            session.codec.files.borrow().get(Path::new("out.png")),
            session.current_derived_image()
        );
    }

    #[test]
    fn test_save_to_source_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edit.png");
        FileCodec::default().encode(&gradient(6, 6), &path).unwrap();

        let mut session = EditSession::new();
        session.load(&path).unwrap();
        session.set_toggle(ParamKey::FlipH, true).unwrap();
        assert_eq!(session.save(None).unwrap(), path);

        let saved = FileCodec::default().decode(&path).unwrap();
        assert_eq!(Some(&saved), session.current_derived_image());
    }

    #[test]
    fn test_deferred_render_commits_latest_only() {
        let mut session = loaded(16, 16);
        let pipeline = EffectPipeline::new();

        let first = session
            .set_parameter_deferred(ParamKey::Blur, 1)
            .unwrap()
            .unwrap();
        let second = session
            .set_parameter_deferred(ParamKey::Blur, 3)
            .unwrap()
            .unwrap();
        assert!(second.generation > first.generation);
        assert_eq!(session.history_len(), 1);

        let render = |request: RenderRequest| RenderedFrame {
            generation: request.generation,
            image: pipeline.apply(&request.base, &request.params),
            base: request.base,
            params: request.params,
        };

        let stale = session.commit_render(render(first));
        assert!(matches!(stale, Err(SessionError::StaleRender { .. })));
        assert_eq!(session.history_len(), 1);

        session.commit_render(render(second)).unwrap();
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current_derived_image().cloned(), {
            let base = session.base_image().unwrap();
            Some(pipeline.apply(base, &session.parameter_snapshot()))
        });
    }

    #[test]
    fn test_render_for_previous_image_is_stale() {
        let mut session = loaded(8, 8);
        let request = session.set_parameter_deferred(ParamKey::Blur, 2).unwrap().unwrap();
        session.load_image(gradient(8, 8), None);
        let frame = RenderedFrame {
            generation: request.generation,
            image: request.base.as_ref().clone(),
            base: request.base,
            params: request.params,
        };
        assert!(matches!(
            session.commit_render(frame),
            Err(SessionError::StaleRender { .. })
        ));
    }

    #[test]
    fn test_toggle_deferred() {
        let mut session = loaded(4, 4);
        let request = session.toggle_deferred(ParamKey::Invert).unwrap().unwrap();
        assert!(request.params.invert());
        assert!(session.parameter_snapshot().invert());
    }

    #[test]
    fn test_background_worker_round_trip() {
        let mut session = loaded(32, 32);
        let worker = RenderWorker::spawn(EffectPipeline::new()).unwrap();

        let _ = session.set_parameter_deferred(ParamKey::Blur, 5).unwrap();
        let request = session
            .set_parameter_deferred(ParamKey::Brightness, 140)
            .unwrap()
            .unwrap();
        worker.submit(request).unwrap();

        let frame = worker
            .receive_timeout(Duration::from_secs(10))
            .unwrap()
            .expect("frame");
        session.commit_render(frame).unwrap();
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current_derived_image().map(ImageBuffer::dimensions), Some((32, 32)));
    }

    fn wait_for_completed(worker: &RenderWorker, count: u64) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while worker.metrics().completed < count {
            assert!(std::time::Instant::now() < deadline, "render did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_commit_ready_render() {
        let mut session = loaded(16, 16);
        let worker = RenderWorker::spawn(EffectPipeline::new()).unwrap();
        assert!(!session.commit_ready_render(&worker).unwrap());

        let request = session.set_parameter_deferred(ParamKey::Blur, 2).unwrap().unwrap();
        worker.submit(request).unwrap();
        wait_for_completed(&worker, 1);

        assert!(session.commit_ready_render(&worker).unwrap());
        assert_eq!(session.history_len(), 2);
        assert!(!session.commit_ready_render(&worker).unwrap());
    }

    #[test]
    fn test_commit_ready_render_drops_stale_frame() {
        let mut session = loaded(16, 16);
        let worker = RenderWorker::spawn(EffectPipeline::new()).unwrap();

        let request = session.set_parameter_deferred(ParamKey::Blur, 2).unwrap().unwrap();
        worker.submit(request).unwrap();
        session.set_parameter_deferred(ParamKey::Blur, 4).unwrap();
        wait_for_completed(&worker, 1);

        assert!(!session.commit_ready_render(&worker).unwrap());
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn test_undo_with_pending_render_restores_parameters() {
        let config = SessionConfig {
            undo_policy: UndoPolicy::RestoreParameters,
            ..SessionConfig::default()
        };
        let mut session = EditSession::with_config(config).unwrap();
        session.load_image(gradient(12, 12), None);
        session.set_parameter(ParamKey::Brightness, 150).unwrap();
        let committed = session.parameter_snapshot();

        let worker = RenderWorker::spawn(EffectPipeline::new()).unwrap();
        let pending = session.set_parameter_deferred(ParamKey::Blur, 3).unwrap().unwrap();
        assert_eq!(pending.params.blur(), 3);
        worker.submit(pending).unwrap();

        // Undo lands on the load snapshot while the blur render is in flight.
        assert_eq!(session.undo(), HistoryMove::Moved);
        assert!(session.parameter_snapshot().is_neutral());

        let frame = worker
            .receive_timeout(Duration::from_secs(10))
            .unwrap()
            .expect("frame");
        assert!(matches!(
            session.commit_render(frame),
            Err(SessionError::StaleRender { .. })
        ));
        assert_eq!(session.history_len(), 2);
        assert!(session.can_redo());
        assert!(session.parameter_snapshot().is_neutral());

        assert_eq!(session.redo(), HistoryMove::Moved);
        assert_eq!(session.parameter_snapshot(), committed);
        let base = session.base_image().unwrap().clone();
        assert_eq!(
            session.current_derived_image().cloned(),
            Some(EffectPipeline::new().apply(&base, &committed))
        );

        // A request issued after the move renders the restored parameters.
        let request = session.render_request().unwrap();
        assert_eq!(request.params, committed);
        worker.submit(request).unwrap();
        let frame = worker
            .receive_timeout(Duration::from_secs(10))
            .unwrap()
            .expect("frame");
        session.commit_render(frame).unwrap();
        assert_eq!(session.parameter_snapshot(), committed);
        assert!(!session.can_redo());
    }

    #[test]
    fn test_handle_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bmp");
        FileCodec::default().encode(&gradient(20, 10), &path).unwrap();

        let mut session = EditSession::new();
        assert_eq!(
            session.handle(SessionEvent::LoadRequested { path: path.clone() }).unwrap(),
            EventOutcome::Loaded { width: 20, height: 10 }
        );
        assert_eq!(
            session
                .handle(SessionEvent::ParameterChanged {
                    key: ParamKey::Rotation,
                    value: 90
                })
                .unwrap(),
            EventOutcome::Updated { rendered: true }
        );
        assert_eq!(
            session.handle(SessionEvent::Toggled { key: ParamKey::FlipV }).unwrap(),
            EventOutcome::Toggled { on: true, rendered: true }
        );
        assert_eq!(
            session.handle(SessionEvent::UndoRequested).unwrap(),
            EventOutcome::History { result: HistoryMove::Moved }
        );
        assert_eq!(
            session.handle(SessionEvent::RedoRequested).unwrap(),
            EventOutcome::History { result: HistoryMove::Moved }
        );
        assert_eq!(
            session.handle(SessionEvent::ResetRequested).unwrap(),
            EventOutcome::Updated { rendered: true }
        );

        let out = dir.path().join("out").join("result.png");
        assert_eq!(
            session
                .handle(SessionEvent::SaveRequested { path: Some(out.clone()) })
                .unwrap(),
            EventOutcome::Saved { path: out.clone() }
        );
        assert!(out.exists());
    }

    #[test]
    fn test_event_json() {
        let event: SessionEvent =
            serde_json::from_str(r#"{"event": "parameter_changed", "key": "resize_w", "value": 50}"#)
                .unwrap();
        assert_eq!(
            event,
            SessionEvent::ParameterChanged {
                key: ParamKey::ResizeW,
                value: 50
            }
        );
        let event: SessionEvent = serde_json::from_str(r#"{"event": "save_requested"}"#).unwrap();
        assert_eq!(event, SessionEvent::SaveRequested { path: None });
    }

    #[test]
    fn test_labels_and_stages() {
        let mut session = loaded(4, 4);
        session.set_parameter(ParamKey::Rotation, 90).unwrap();
        session.set_toggle(ParamKey::Grayscale, true).unwrap();
        assert_eq!(session.label(ParamKey::Rotation), "Rotation: 90°");
        assert_eq!(session.label(ParamKey::Grayscale), "Grayscale: On");
        assert_eq!(session.active_stages(), vec![Stage::Grayscale, Stage::Rotation]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            history_capacity: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            EditSession::with_config(config),
            Err(SessionError::Config(ConfigError::ZeroHistoryCapacity))
        ));
    }

    #[test]
    fn test_load_pixels_validates() {
        let mut session = EditSession::new();
        assert!(matches!(
            session.load_pixels(2, 2, Channels::Rgb, vec![0; 5]),
            Err(SessionError::Buffer(BufferError::SizeMismatch { .. }))
        ));
        assert!(!session.is_loaded());
        session.load_pixels(2, 2, Channels::Gray, vec![1, 2, 3, 4]).unwrap();
        assert!(session.is_loaded());
    }
}
