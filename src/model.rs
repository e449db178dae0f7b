//! Types shared by every part of deskplan.
//!
//! This module defines the vocabulary that all components share:
//! [`MonitorInfo`] and [`WindowInfo`] describe what the desktop reports,
//! [`WindowId`] is the opaque handle used to address a window, and
//! [`Rect`] / [`Gravity`] make up a placement request.

use serde::{Serialize, Serializer};
use std::fmt;

/// Role of a monitor in the layout file (`monitor: primary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorLabel {
    Primary,
    Secondary,
}

impl MonitorLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorLabel::Primary => "primary",
            MonitorLabel::Secondary => "secondary",
        }
    }
}

impl fmt::Display for MonitorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a monitor label (case-insensitive, surrounding whitespace ignored).
pub fn parse_monitor_label(s: &str) -> Option<MonitorLabel> {
    match s.trim().to_lowercase().as_str() {
        "primary" => Some(MonitorLabel::Primary),
        "secondary" => Some(MonitorLabel::Secondary),
        _ => None,
    }
}

impl Serialize for MonitorLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A connected display, as reported by the monitor listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorInfo {
    /// `primary` or `secondary`.
    pub label: MonitorLabel,
    /// Output name (e.g. `"DP-1"`).
    pub name: String,
    /// X position on the virtual desktop (pixels).
    pub x: i32,
    /// Y position on the virtual desktop (pixels).
    pub y: i32,
    /// Horizontal resolution in pixels.
    pub width: u32,
    /// Vertical resolution in pixels.
    pub height: u32,
    /// Unparsed listing line; only filled in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Opaque window handle.
///
/// Rendered as `0x…` hex wherever it crosses a tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl WindowId {
    /// Parse a `0x`-prefixed hex id as printed by `wmctrl` / `xprop`.
    pub fn parse_hex(s: &str) -> Option<WindowId> {
        let digits = s.trim().strip_prefix("0x").or_else(|| s.trim().strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok().map(WindowId)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Serialize for WindowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One open top-level window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    pub id: WindowId,
    /// Human-readable title.
    pub title: String,
    /// Owning process, if the window advertises `_NET_WM_PID`.
    pub pid: Option<u32>,
    /// Command line of the owning process, if known.
    pub command: Option<String>,
    /// Unparsed listing line; only filled in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// An absolute placement rectangle in virtual-desktop pixels.
///
/// Width and height may come out negative from a bad layout entry; the
/// window manager is the one to reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Reference point for a placement request.
///
/// Placements always let the window manager use the window's own gravity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    Default,
}

impl Gravity {
    /// Numeric value used by the EWMH `_NET_MOVERESIZE_WINDOW` protocol.
    pub fn code(&self) -> u8 {
        match self {
            Gravity::Default => 0,
        }
    }
}
