//! Deterministic effect composition.
//!
//! [`EffectPipeline`] turns a base image plus a [`ParameterSet`] into a derived
//! image by running the active stages in [`Stage::ORDER`]. Effects do not
//! commute, so the order is fixed and public. Stages whose parameter sits at
//! its neutral value are skipped entirely rather than run as an identity pass.

use std::fmt;

use tracing::debug;

use crate::buffer::ImageBuffer;
use crate::ops::{CpuOps, ImageOps};
use crate::params::{ParamKey, ParameterSet};

/// One step of the effect pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Grayscale,
    Invert,
    FlipH,
    FlipV,
    Brightness,
    Contrast,
    Blur,
    /// Only runs when the pipeline was built with sharpen enabled.
    Sharpen,
    Canny,
    Threshold,
    Rotation,
    Resize,
}

impl Stage {
    /// Fixed application order.
    pub const ORDER: [Stage; 12] = [
        Stage::Grayscale,
        Stage::Invert,
        Stage::FlipH,
        Stage::FlipV,
        Stage::Brightness,
        Stage::Contrast,
        Stage::Blur,
        Stage::Sharpen,
        Stage::Canny,
        Stage::Threshold,
        Stage::Rotation,
        Stage::Resize,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Stage::Grayscale => "grayscale",
            Stage::Invert => "invert",
            Stage::FlipH => "flip_h",
            Stage::FlipV => "flip_v",
            Stage::Brightness => "brightness",
            Stage::Contrast => "contrast",
            Stage::Blur => "blur",
            Stage::Sharpen => "sharpen",
            Stage::Canny => "canny",
            Stage::Threshold => "threshold",
            Stage::Rotation => "rotation",
            Stage::Resize => "resize",
        }
    }

    /// Whether this stage changes anything for `params`.
    pub fn is_active(self, params: &ParameterSet, include_sharpen: bool) -> bool {
        match self {
            Stage::Grayscale => params.grayscale(),
            Stage::Invert => params.invert(),
            Stage::FlipH => params.flip_h(),
            Stage::FlipV => params.flip_v(),
            Stage::Brightness => params.brightness() != neutral(ParamKey::Brightness),
            Stage::Contrast => params.contrast() != neutral(ParamKey::Contrast),
            Stage::Blur => params.blur() > 0,
            Stage::Sharpen => include_sharpen && params.sharpen() > 0,
            Stage::Canny => {
                params.canny_low() != neutral(ParamKey::CannyLow)
                    || params.canny_high() != neutral(ParamKey::CannyHigh)
            }
            Stage::Threshold => params.threshold() != neutral(ParamKey::Threshold),
            Stage::Rotation => params.rotation() != neutral(ParamKey::Rotation),
            Stage::Resize => {
                params.resize_w() != neutral(ParamKey::ResizeW)
                    || params.resize_h() != neutral(ParamKey::ResizeH)
            }
        }
    }
}

const fn neutral(key: ParamKey) -> i32 {
    key.spec().neutral
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale one dimension by a percentage, rounding down and never below 1.
pub fn scaled_dimension(dimension: u32, percent: i32) -> u32 {
    let scaled = u64::from(dimension) * u64::from(percent.max(0).unsigned_abs()) / 100;
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// Pure function from (base image, parameters) to a derived image.
#[derive(Debug, Clone, Default)]
pub struct EffectPipeline<O: ImageOps = CpuOps> {
    ops: O,
    include_sharpen: bool,
}

impl EffectPipeline<CpuOps> {
    /// Pipeline on the native CPU backend with sharpen disabled.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<O: ImageOps> EffectPipeline<O> {
    pub fn with_ops(ops: O) -> Self {
        Self {
            ops,
            include_sharpen: false,
        }
    }

    /// Enable or disable the optional sharpen stage after blur.
    pub fn with_sharpen(mut self, enabled: bool) -> Self {
        self.include_sharpen = enabled;
        self
    }

    pub fn sharpen_enabled(&self) -> bool {
        self.include_sharpen
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// Stages that will run for `params`, in application order.
    pub fn stages(&self, params: &ParameterSet) -> Vec<Stage> {
        Stage::ORDER
            .into_iter()
            .filter(|stage| stage.is_active(params, self.include_sharpen))
            .collect()
    }

    /// Render `base` with `params`. Never mutates `base`.
    pub fn apply(&self, base: &ImageBuffer, params: &ParameterSet) -> ImageBuffer {
        self.stages(params)
            .into_iter()
            .fold(base.clone(), |image, stage| self.apply_stage(stage, &image, params))
    }

    /// Like [`apply`](Self::apply), but polls `should_cancel` before every
    /// stage and gives up with `None` once it returns true.
    pub fn apply_until(
        &self,
        base: &ImageBuffer,
        params: &ParameterSet,
        should_cancel: &dyn Fn() -> bool,
    ) -> Option<ImageBuffer> {
        let mut image = base.clone();
        for stage in self.stages(params) {
            if should_cancel() {
                debug!(stage = stage.name(), "render cancelled");
                return None;
            }
            image = self.apply_stage(stage, &image, params);
        }
        Some(image)
    }

    fn apply_stage(&self, stage: Stage, image: &ImageBuffer, params: &ParameterSet) -> ImageBuffer {
        let ops = &self.ops;
        let out = match stage {
            Stage::Grayscale => ops.grayscale(image),
            Stage::Invert => ops.invert(image),
            Stage::FlipH => ops.flip_horizontal(image),
            Stage::FlipV => ops.flip_vertical(image),
            Stage::Brightness => ops.brightness(image, params.brightness()),
            Stage::Contrast => ops.contrast(image, params.contrast()),
            Stage::Blur => ops.gaussian_blur(image, params.blur().unsigned_abs()),
            Stage::Sharpen => ops.sharpen(image, params.sharpen()),
            Stage::Canny => ops.canny(image, params.canny_low(), params.canny_high()),
            Stage::Threshold => ops.threshold(image, params.threshold()),
            Stage::Rotation => ops.rotate(image, f64::from(params.rotation())),
            Stage::Resize => {
                let width = scaled_dimension(image.width(), params.resize_w());
                let height = scaled_dimension(image.height(), params.resize_h());
                ops.resize(image, width, height)
            }
        };
        debug!(
            stage = stage.name(),
            width = out.width(),
            height = out.height(),
            channels = out.channels().count(),
            "processing"
        );
        out
    }
}
