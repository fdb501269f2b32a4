//! Effect parameters.
//!
//! A [`ParameterSet`] is a value type: every update returns a new set, and
//! every constructor path (including deserialization) validates each key
//! against its domain. Once a set exists, all of its values are in range.

mod key;
mod label;

pub use key::{ParamKey, ParamKind, ParamSpec, ParameterPolicy};
pub use label::{format_label, ParamValue};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised at the parameter mutation boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParamError {
    /// The value is outside the key's domain and the policy is `Reject`.
    #[error("Invalid parameter: {key} = {value} is outside {min}..={max}")]
    OutOfRange {
        key: ParamKey,
        value: i32,
        min: i32,
        max: i32,
    },

    /// No parameter has this name.
    #[error("Invalid parameter: unknown key '{0}'")]
    UnknownKey(String),

    /// A magnitude was supplied for an on/off key.
    #[error("Invalid parameter: {0} is a toggle, not a slider")]
    NotASlider(ParamKey),

    /// An on/off operation was requested for a magnitude key.
    #[error("Invalid parameter: {0} is a slider, not a toggle")]
    NotAToggle(ParamKey),
}

/// Snapshot of every effect toggle and magnitude.
///
/// `Default` is the neutral set, for which the pipeline is an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawParameters", into = "RawParameters")]
pub struct ParameterSet {
    grayscale: bool,
    invert: bool,
    flip_h: bool,
    flip_v: bool,
    brightness: i32,
    contrast: i32,
    threshold: i32,
    blur: i32,
    canny_low: i32,
    canny_high: i32,
    sharpen: i32,
    rotation: i32,
    resize_w: i32,
    resize_h: i32,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ParameterSet {
    /// The set for which every effect is a no-op.
    pub const fn neutral() -> Self {
        Self {
            grayscale: false,
            invert: false,
            flip_h: false,
            flip_v: false,
            brightness: key::BRIGHTNESS.neutral,
            contrast: key::CONTRAST.neutral,
            threshold: key::THRESHOLD.neutral,
            blur: key::BLUR.neutral,
            canny_low: key::CANNY_LOW.neutral,
            canny_high: key::CANNY_HIGH.neutral,
            sharpen: key::SHARPEN.neutral,
            rotation: key::ROTATION.neutral,
            resize_w: key::RESIZE_W.neutral,
            resize_h: key::RESIZE_H.neutral,
        }
    }

    /// Check if all values are at their neutral settings.
    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }

    /// Keys whose value differs from neutral, in [`ParamKey::ALL`] order.
    pub fn changed_keys(&self) -> Vec<ParamKey> {
        ParamKey::ALL
            .into_iter()
            .filter(|key| self.get(*key).as_i32() != key.spec().neutral)
            .collect()
    }

    /// Return a copy with one slider set, validated against its domain.
    pub fn with_slider(
        self,
        key: ParamKey,
        value: i32,
        policy: ParameterPolicy,
    ) -> Result<Self, ParamError> {
        let mut next = self;
        let slot = next.slider_mut(key).ok_or(ParamError::NotASlider(key))?;
        *slot = key.validate(value, policy)?;
        Ok(next)
    }

    /// Return a copy with one toggle set.
    pub fn with_toggle(self, key: ParamKey, on: bool) -> Result<Self, ParamError> {
        let mut next = self;
        *next.toggle_mut(key)? = on;
        Ok(next)
    }

    /// Current value of any key.
    pub fn get(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::Grayscale => ParamValue::Toggle(self.grayscale),
            ParamKey::Invert => ParamValue::Toggle(self.invert),
            ParamKey::FlipH => ParamValue::Toggle(self.flip_h),
            ParamKey::FlipV => ParamValue::Toggle(self.flip_v),
            ParamKey::Brightness => ParamValue::Slider(self.brightness),
            ParamKey::Contrast => ParamValue::Slider(self.contrast),
            ParamKey::Threshold => ParamValue::Slider(self.threshold),
            ParamKey::Blur => ParamValue::Slider(self.blur),
            ParamKey::CannyLow => ParamValue::Slider(self.canny_low),
            ParamKey::CannyHigh => ParamValue::Slider(self.canny_high),
            ParamKey::Sharpen => ParamValue::Slider(self.sharpen),
            ParamKey::Rotation => ParamValue::Slider(self.rotation),
            ParamKey::ResizeW => ParamValue::Slider(self.resize_w),
            ParamKey::ResizeH => ParamValue::Slider(self.resize_h),
        }
    }

    fn toggle_mut(&mut self, key: ParamKey) -> Result<&mut bool, ParamError> {
        match key {
            ParamKey::Grayscale => Ok(&mut self.grayscale),
            ParamKey::Invert => Ok(&mut self.invert),
            ParamKey::FlipH => Ok(&mut self.flip_h),
            ParamKey::FlipV => Ok(&mut self.flip_v),
            _ => Err(ParamError::NotAToggle(key)),
        }
    }

    fn slider_mut(&mut self, key: ParamKey) -> Option<&mut i32> {
        match key {
            ParamKey::Brightness => Some(&mut self.brightness),
            ParamKey::Contrast => Some(&mut self.contrast),
            ParamKey::Threshold => Some(&mut self.threshold),
            ParamKey::Blur => Some(&mut self.blur),
            ParamKey::CannyLow => Some(&mut self.canny_low),
            ParamKey::CannyHigh => Some(&mut self.canny_high),
            ParamKey::Sharpen => Some(&mut self.sharpen),
            ParamKey::Rotation => Some(&mut self.rotation),
            ParamKey::ResizeW => Some(&mut self.resize_w),
            ParamKey::ResizeH => Some(&mut self.resize_h),
            ParamKey::Grayscale | ParamKey::Invert | ParamKey::FlipH | ParamKey::FlipV => None,
        }
    }

    pub fn grayscale(&self) -> bool {
        self.grayscale
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn flip_h(&self) -> bool {
        self.flip_h
    }

    pub fn flip_v(&self) -> bool {
        self.flip_v
    }

    /// 0 to 200, neutral 100.
    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    /// 0 to 200, neutral 100.
    pub fn contrast(&self) -> i32 {
        self.contrast
    }

    /// 0 to 255, neutral 127.
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Blur radius, 0 to 20. The kernel size is `2 * blur + 1`.
    pub fn blur(&self) -> i32 {
        self.blur
    }

    pub fn canny_low(&self) -> i32 {
        self.canny_low
    }

    pub fn canny_high(&self) -> i32 {
        self.canny_high
    }

    /// 0 to 100.
    pub fn sharpen(&self) -> i32 {
        self.sharpen
    }

    /// Degrees counter-clockwise, 0 to 360.
    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    /// Percent of the current width, 10 to 200.
    pub fn resize_w(&self) -> i32 {
        self.resize_w
    }

    /// Percent of the current height, 10 to 200.
    pub fn resize_h(&self) -> i32 {
        self.resize_h
    }
}

/// Unvalidated wire form of a [`ParameterSet`].
///
/// Missing fields fall back to neutral values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
struct RawParameters {
    grayscale: bool,
    invert: bool,
    flip_h: bool,
    flip_v: bool,
    brightness: i32,
    contrast: i32,
    threshold: i32,
    blur: i32,
    canny_low: i32,
    canny_high: i32,
    sharpen: i32,
    rotation: i32,
    resize_w: i32,
    resize_h: i32,
}

impl Default for RawParameters {
    fn default() -> Self {
        ParameterSet::neutral().into()
    }
}

impl From<ParameterSet> for RawParameters {
    fn from(p: ParameterSet) -> Self {
        Self {
            grayscale: p.grayscale,
            invert: p.invert,
            flip_h: p.flip_h,
            flip_v: p.flip_v,
            brightness: p.brightness,
            contrast: p.contrast,
            threshold: p.threshold,
            blur: p.blur,
            canny_low: p.canny_low,
            canny_high: p.canny_high,
            sharpen: p.sharpen,
            rotation: p.rotation,
            resize_w: p.resize_w,
            resize_h: p.resize_h,
        }
    }
}

impl TryFrom<RawParameters> for ParameterSet {
    type Error = ParamError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        let policy = ParameterPolicy::Reject;
        ParameterSet::neutral()
            .with_toggle(ParamKey::Grayscale, raw.grayscale)?
            .with_toggle(ParamKey::Invert, raw.invert)?
            .with_toggle(ParamKey::FlipH, raw.flip_h)?
            .with_toggle(ParamKey::FlipV, raw.flip_v)?
            .with_slider(ParamKey::Brightness, raw.brightness, policy)?
            .with_slider(ParamKey::Contrast, raw.contrast, policy)?
            .with_slider(ParamKey::Threshold, raw.threshold, policy)?
            .with_slider(ParamKey::Blur, raw.blur, policy)?
            .with_slider(ParamKey::CannyLow, raw.canny_low, policy)?
            .with_slider(ParamKey::CannyHigh, raw.canny_high, policy)?
            .with_slider(ParamKey::Sharpen, raw.sharpen, policy)?
            .with_slider(ParamKey::Rotation, raw.rotation, policy)?
            .with_slider(ParamKey::ResizeW, raw.resize_w, policy)?
            .with_slider(ParamKey::ResizeH, raw.resize_h, policy)
    }
}
