//! Converting layout positions into pixel rectangles.

use crate::model::{parse_monitor_label, MonitorInfo, MonitorLabel, Rect};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// One edge offset as written in a layout file: `40`, `"40"` or `"25%"`.
///
/// Anything else YAML can express is kept in [`PixelValue::Other`] so that
/// [`to_pixels`] can reject it with the offending value in the message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PixelValue {
    Int(i64),
    Text(String),
    Other(serde_json::Value),
}

impl fmt::Display for PixelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelValue::Int(n) => write!(f, "{}", n),
            PixelValue::Text(s) => write!(f, "{:?}", s),
            PixelValue::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Inset of a window from the monitor edges.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "[PixelValue; 4]")]
pub struct Position {
    pub top: PixelValue,
    pub right: PixelValue,
    pub bottom: PixelValue,
    pub left: PixelValue,
}

impl From<[PixelValue; 4]> for Position {
    fn from([top, right, bottom, left]: [PixelValue; 4]) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("no {0} monitor connected")]
    UnknownMonitor(String),
    #[error("invalid pixel value {0}: expected an integer or a percentage like \"25%\"")]
    InvalidPixelValue(String),
    #[error("position does not fit on the {0} monitor: pixel arithmetic overflows")]
    Overflow(String),
}

/// Turn `value` into pixels, resolving percentages against `relative`.
pub fn to_pixels(value: &PixelValue, relative: i64) -> Result<i64, GeometryError> {
    let invalid = || GeometryError::InvalidPixelValue(value.to_string());
    match value {
        PixelValue::Int(n) => Ok(*n),
        PixelValue::Text(text) => {
            let text = text.trim();
            match text.strip_suffix('%') {
                Some(number) => {
                    let percent: f64 = number.trim().parse().map_err(|_| invalid())?;
                    let pixels = (percent / 100.0 * relative as f64).floor();
                    // i64::MAX as f64 rounds up to 2^63, which is already out of range
                    if !pixels.is_finite() || pixels < i64::MIN as f64 || pixels >= i64::MAX as f64 {
                        return Err(invalid());
                    }
                    Ok(pixels as i64)
                }
                None => text.parse().map_err(|_| invalid()),
            }
        }
        PixelValue::Other(_) => Err(invalid()),
    }
}

/// Connected monitors by label.
#[derive(Debug, Clone, Default)]
pub struct MonitorRegistry {
    monitors: HashMap<MonitorLabel, MonitorInfo>,
}

impl MonitorRegistry {
    /// Later monitors replace earlier ones with the same label.
    pub fn from_monitors<I: IntoIterator<Item = MonitorInfo>>(monitors: I) -> Self {
        Self {
            monitors: monitors.into_iter().map(|m| (m.label, m)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&MonitorInfo> {
        parse_monitor_label(label).and_then(|label| self.monitors.get(&label))
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

/// Place `position` on the monitor labelled `label`.
///
/// Vertical offsets are relative to the monitor height and horizontal ones to
/// its width.  A position wider than the monitor produces a negative size.
pub fn resolve_rect(
    position: &Position,
    label: &str,
    registry: &MonitorRegistry,
) -> Result<Rect, GeometryError> {
    let monitor = registry
        .get(label)
        .ok_or_else(|| GeometryError::UnknownMonitor(label.to_string()))?;
    let width = i64::from(monitor.width);
    let height = i64::from(monitor.height);

    let top = to_pixels(&position.top, height)?;
    let right = to_pixels(&position.right, width)?;
    let bottom = to_pixels(&position.bottom, height)?;
    let left = to_pixels(&position.left, width)?;

    let overflow = || GeometryError::Overflow(label.to_string());
    Ok(Rect {
        x: i64::from(monitor.x).checked_add(left).ok_or_else(overflow)?,
        y: i64::from(monitor.y).checked_add(top).ok_or_else(overflow)?,
        width: width
            .checked_sub(left)
            .and_then(|w| w.checked_sub(right))
            .ok_or_else(overflow)?,
        height: height
            .checked_sub(top)
            .and_then(|h| h.checked_sub(bottom))
            .ok_or_else(overflow)?,
    })
}
