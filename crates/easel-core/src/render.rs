//! Off-thread rendering for interactive editing.
//!
//! A session in deferred mode produces [`RenderRequest`]s instead of
//! rendering inline. [`RenderWorker`] runs them on its own thread and hands
//! back [`RenderedFrame`]s, which go through
//! [`EditSession::commit_render`](crate::EditSession::commit_render) before
//! they reach history.
//!
//! Submitting a request supersedes every request with a lower generation.
//! Superseded requests still in the queue are never started, and a render in
//! progress stops at the next stage boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::buffer::ImageBuffer;
use crate::ops::ImageOps;
use crate::params::ParameterSet;
use crate::pipeline::EffectPipeline;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Render thread is no longer running")]
    Disconnected,
}

/// Everything needed to render one parameter snapshot.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub generation: u64,
    pub base: Arc<ImageBuffer>,
    pub params: ParameterSet,
}

/// Output of a finished [`RenderRequest`].
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub generation: u64,
    pub base: Arc<ImageBuffer>,
    pub params: ParameterSet,
    pub image: ImageBuffer,
}

/// Job counts since the worker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderMetrics {
    pub submitted: u64,
    /// Frames handed back and ready to receive.
    pub completed: u64,
    /// Superseded before starting or abandoned between stages.
    pub cancelled: u64,
}

#[derive(Default)]
struct Shared {
    latest_generation: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

impl Shared {
    fn is_superseded(&self, generation: u64) -> bool {
        generation < self.latest_generation.load(Ordering::SeqCst)
    }
}

/// Handle to a render thread. The thread exits once the handle is dropped
/// and its current job has stopped.
pub struct RenderWorker {
    shared: Arc<Shared>,
    jobs: mpsc::Sender<RenderRequest>,
    frames: mpsc::Receiver<RenderedFrame>,
}

impl RenderWorker {
    /// Start a render thread that owns `pipeline`.
    pub fn spawn<O: ImageOps + 'static>(pipeline: EffectPipeline<O>) -> Result<Self, RenderError> {
        let shared = Arc::new(Shared::default());
        let (jobs, job_rx) = mpsc::channel();
        let (frame_tx, frames) = mpsc::channel();

        let renderer = Renderer {
            pipeline,
            shared: Arc::clone(&shared),
            jobs: job_rx,
            frames: frame_tx,
        };
        thread::Builder::new()
            .name("easel-render".into())
            .spawn(move || renderer.run())?;

        Ok(Self {
            shared,
            jobs,
            frames,
        })
    }

    /// Queue `request`. Anything older is superseded.
    pub fn submit(&self, request: RenderRequest) -> Result<(), RenderError> {
        self.shared
            .latest_generation
            .fetch_max(request.generation, Ordering::SeqCst);
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        trace!(generation = request.generation, "render queued");
        self.jobs.send(request).map_err(|_| RenderError::Disconnected)
    }

    /// The most recent finished frame, if any. Older finished frames are discarded.
    pub fn try_receive(&self) -> Result<Option<RenderedFrame>, RenderError> {
        match self.frames.try_recv() {
            Ok(frame) => Ok(Some(self.newest_since(frame))),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(RenderError::Disconnected),
        }
    }

    /// Like [`try_receive`](Self::try_receive), waiting up to `timeout` for a frame.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<RenderedFrame>, RenderError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(self.newest_since(frame))),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RenderError::Disconnected),
        }
    }

    fn newest_since(&self, frame: RenderedFrame) -> RenderedFrame {
        self.frames.try_iter().last().unwrap_or(frame)
    }

    /// Highest generation submitted so far.
    pub fn latest_generation(&self) -> u64 {
        self.shared.latest_generation.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> RenderMetrics {
        RenderMetrics {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Thread side of a [`RenderWorker`].
struct Renderer<O: ImageOps> {
    pipeline: EffectPipeline<O>,
    shared: Arc<Shared>,
    jobs: mpsc::Receiver<RenderRequest>,
    frames: mpsc::Sender<RenderedFrame>,
}

impl<O: ImageOps> Renderer<O> {
    fn run(self) {
        while let Some(job) = self.next_job() {
            let Some(frame) = self.render(job) else {
                continue;
            };
            if self.frames.send(frame).is_err() {
                break;
            }
            self.shared.completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Block for a job, then skip ahead to the newest one queued.
    fn next_job(&self) -> Option<RenderRequest> {
        let mut job = self.jobs.recv().ok()?;
        for newer in self.jobs.try_iter() {
            self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
            job = newer;
        }
        Some(job)
    }

    fn render(&self, job: RenderRequest) -> Option<RenderedFrame> {
        let generation = job.generation;
        let superseded = || self.shared.is_superseded(generation);

        let image = if superseded() {
            None
        } else {
            self.pipeline
                .apply_until(&job.base, &job.params, &superseded)
                .filter(|_| !superseded())
        };

        let Some(image) = image else {
            self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(generation, "render superseded");
            return None;
        };

        debug!(generation, width = image.width(), height = image.height(), "render finished");
        Some(RenderedFrame {
            generation,
            base: job.base,
            params: job.params,
            image,
        })
    }
}
