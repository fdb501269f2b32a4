//! Caption text for parameter controls.

use serde::{Deserialize, Serialize};

use super::ParamKey;

/// Value of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Toggle(bool),
    Slider(i32),
}

impl ParamValue {
    /// Numeric form; toggles map to 0 and 1.
    pub fn as_i32(self) -> i32 {
        match self {
            ParamValue::Toggle(on) => i32::from(on),
            ParamValue::Slider(v) => v,
        }
    }
}

/// Render the caption shown next to a control, e.g. `"Rotation: 90°"`.
pub fn format_label(key: ParamKey, value: ParamValue) -> String {
    let label = key.label();
    match (key, value) {
        (_, ParamValue::Toggle(on)) => format!("{label}: {}", if on { "On" } else { "Off" }),
        (ParamKey::Rotation, ParamValue::Slider(v)) => format!("{label}: {v}°"),
        (ParamKey::ResizeW | ParamKey::ResizeH, ParamValue::Slider(v)) => {
            format!("{label}: {v}%")
        }
        (ParamKey::Blur, ParamValue::Slider(v)) if v > 0 => {
            format!("{label}: {v} ({k}x{k})", k = 2 * v + 1)
        }
        (_, ParamValue::Slider(v)) => format!("{label}: {v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_labels() {
        assert_eq!(
            format_label(ParamKey::Grayscale, ParamValue::Toggle(true)),
            "Grayscale: On"
        );
        assert_eq!(
            format_label(ParamKey::FlipH, ParamValue::Toggle(false)),
            "Flip H: Off"
        );
    }

    #[test]
    fn test_slider_labels() {
        assert_eq!(
            format_label(ParamKey::Rotation, ParamValue::Slider(90)),
            "Rotation: 90°"
        );
        assert_eq!(
            format_label(ParamKey::ResizeW, ParamValue::Slider(50)),
            "Resize W: 50%"
        );
        assert_eq!(
            format_label(ParamKey::Brightness, ParamValue::Slider(120)),
            "Brightness: 120"
        );
        assert_eq!(
            format_label(ParamKey::CannyLow, ParamValue::Slider(30)),
            "Canny Low: 30"
        );
    }

    #[test]
    fn test_blur_label_shows_kernel() {
        assert_eq!(
            format_label(ParamKey::Blur, ParamValue::Slider(3)),
            "Blur: 3 (7x7)"
        );
        assert_eq!(format_label(ParamKey::Blur, ParamValue::Slider(0)), "Blur: 0");
    }

    #[test]
    fn test_as_i32() {
        assert_eq!(ParamValue::Toggle(true).as_i32(), 1);
        assert_eq!(ParamValue::Toggle(false).as_i32(), 0);
        assert_eq!(ParamValue::Slider(42).as_i32(), 42);
    }
}
