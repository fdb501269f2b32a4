//! Parameter keys and their fixed domains.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParamError;

/// Whether a key is an on/off effect or a magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Toggle,
    Slider,
}

/// Every adjustable parameter of the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    Grayscale,
    Invert,
    FlipH,
    FlipV,
    Brightness,
    Contrast,
    Threshold,
    Blur,
    CannyLow,
    CannyHigh,
    Sharpen,
    Rotation,
    ResizeW,
    ResizeH,
}

/// Static description of one parameter's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: ParamKey,
    /// Canonical snake_case name used by events and serialization.
    pub name: &'static str,
    /// Human-readable caption.
    pub label: &'static str,
    pub min: i32,
    pub max: i32,
    /// Value at which the effect is a no-op.
    pub neutral: i32,
}

const fn toggle(key: ParamKey, name: &'static str, label: &'static str) -> ParamSpec {
    ParamSpec {
        key,
        name,
        label,
        min: 0,
        max: 1,
        neutral: 0,
    }
}

const fn slider(
    key: ParamKey,
    name: &'static str,
    label: &'static str,
    min: i32,
    max: i32,
    neutral: i32,
) -> ParamSpec {
    ParamSpec {
        key,
        name,
        label,
        min,
        max,
        neutral,
    }
}

pub const GRAYSCALE: ParamSpec = toggle(ParamKey::Grayscale, "grayscale", "Grayscale");
pub const INVERT: ParamSpec = toggle(ParamKey::Invert, "invert", "Invert");
pub const FLIP_H: ParamSpec = toggle(ParamKey::FlipH, "flip_h", "Flip H");
pub const FLIP_V: ParamSpec = toggle(ParamKey::FlipV, "flip_v", "Flip V");
pub const BRIGHTNESS: ParamSpec = slider(ParamKey::Brightness, "brightness", "Brightness", 0, 200, 100);
pub const CONTRAST: ParamSpec = slider(ParamKey::Contrast, "contrast", "Contrast", 0, 200, 100);
pub const THRESHOLD: ParamSpec = slider(ParamKey::Threshold, "threshold", "Threshold", 0, 255, 127);
pub const BLUR: ParamSpec = slider(ParamKey::Blur, "blur", "Blur", 0, 20, 0);
pub const CANNY_LOW: ParamSpec = slider(ParamKey::CannyLow, "canny_low", "Canny Low", 0, 255, 50);
pub const CANNY_HIGH: ParamSpec = slider(ParamKey::CannyHigh, "canny_high", "Canny High", 0, 255, 150);
pub const SHARPEN: ParamSpec = slider(ParamKey::Sharpen, "sharpen", "Sharpen", 0, 100, 0);
pub const ROTATION: ParamSpec = slider(ParamKey::Rotation, "rotation", "Rotation", 0, 360, 0);
pub const RESIZE_W: ParamSpec = slider(ParamKey::ResizeW, "resize_w", "Resize W", 10, 200, 100);
pub const RESIZE_H: ParamSpec = slider(ParamKey::ResizeH, "resize_h", "Resize H", 10, 200, 100);

impl ParamKey {
    /// All keys, toggles first, then sliders in panel order.
    pub const ALL: [ParamKey; 14] = [
        ParamKey::Grayscale,
        ParamKey::Invert,
        ParamKey::FlipH,
        ParamKey::FlipV,
        ParamKey::Brightness,
        ParamKey::Contrast,
        ParamKey::Threshold,
        ParamKey::Blur,
        ParamKey::CannyLow,
        ParamKey::CannyHigh,
        ParamKey::Sharpen,
        ParamKey::Rotation,
        ParamKey::ResizeW,
        ParamKey::ResizeH,
    ];

    /// Domain descriptor for this key.
    pub const fn spec(self) -> &'static ParamSpec {
        match self {
            ParamKey::Grayscale => &GRAYSCALE,
            ParamKey::Invert => &INVERT,
            ParamKey::FlipH => &FLIP_H,
            ParamKey::FlipV => &FLIP_V,
            ParamKey::Brightness => &BRIGHTNESS,
            ParamKey::Contrast => &CONTRAST,
            ParamKey::Threshold => &THRESHOLD,
            ParamKey::Blur => &BLUR,
            ParamKey::CannyLow => &CANNY_LOW,
            ParamKey::CannyHigh => &CANNY_HIGH,
            ParamKey::Sharpen => &SHARPEN,
            ParamKey::Rotation => &ROTATION,
            ParamKey::ResizeW => &RESIZE_W,
            ParamKey::ResizeH => &RESIZE_H,
        }
    }

    pub const fn kind(self) -> ParamKind {
        match self {
            ParamKey::Grayscale | ParamKey::Invert | ParamKey::FlipH | ParamKey::FlipV => {
                ParamKind::Toggle
            }
            _ => ParamKind::Slider,
        }
    }

    pub const fn name(self) -> &'static str {
        self.spec().name
    }

    pub const fn label(self) -> &'static str {
        self.spec().label
    }

    /// Bring `value` into this key's domain according to `policy`.
    pub fn validate(self, value: i32, policy: ParameterPolicy) -> Result<i32, ParamError> {
        let spec = self.spec();
        if (spec.min..=spec.max).contains(&value) {
            return Ok(value);
        }
        match policy {
            ParameterPolicy::Clamp => Ok(value.clamp(spec.min, spec.max)),
            ParameterPolicy::Reject => Err(ParamError::OutOfRange {
                key: self,
                value,
                min: spec.min,
                max: spec.max,
            }),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamKey {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ParamKey::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParamError::UnknownKey(s.to_string()))
    }
}

/// What to do with a slider value outside its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterPolicy {
    /// Refuse the update with [`ParamError::OutOfRange`].
    #[default]
    Reject,
    /// Pull the value to the nearest domain bound.
    Clamp,
}
