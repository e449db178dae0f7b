//! [`WindowManager`] implementation backed by `xrandr`, `wmctrl` and `xprop`.
//!
//! Every query spawns the tool afresh; nothing is cached between calls.  The
//! parsers are methods on [`X11Wm`] so they can be exercised on captured
//! tool output.

use super::{run_tool, X11Error};
use crate::model::{Gravity, MonitorInfo, MonitorLabel, Rect, WindowId, WindowInfo};
use crate::traits::WindowManager;
use log::{debug, info};
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;

/// X11 window manager reached through EWMH command-line tools.
pub struct X11Wm {
    /// Keep unparsed tool output in the `raw` fields.
    debug: bool,
    geometry: Regex,
    window_row: Regex,
}

impl X11Wm {
    pub fn new(debug: bool) -> Result<Self, X11Error> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| X11Error::new(format!("regex {}: {}", pattern, e)))
        };
        Ok(Self {
            debug,
            geometry: compile(r"(\d+)x(\d+)\+(-?\d+)\+(-?\d+)")?,
            window_row: compile(r"^(0x[0-9a-fA-F]+)\s+(-?\d+)\s+(\S+)\s?(.*)$")?,
        })
    }

    fn raw(&self, line: &str) -> Option<String> {
        self.debug.then(|| line.to_string())
    }

    //  Parsers

    /// Connected outputs with a mode set, from `xrandr --query`.
    pub fn parse_monitors(&self, output: &str) -> Result<Vec<MonitorInfo>, X11Error> {
        let mut monitors = Vec::new();
        for line in output.lines().filter(|l| l.contains(" connected ")) {
            let Some(caps) = self.geometry.captures(line) else {
                debug!("skipping output without geometry: {}", line);
                continue;
            };
            let label = if line.contains(" primary ") {
                MonitorLabel::Primary
            } else {
                MonitorLabel::Secondary
            };
            monitors.push(MonitorInfo {
                label,
                name: line.split_whitespace().next().unwrap_or_default().to_string(),
                width: field(&caps[1], line)?,
                height: field(&caps[2], line)?,
                x: field(&caps[3], line)?,
                y: field(&caps[4], line)?,
                raw: self.raw(line),
            });
        }
        Ok(monitors)
    }

    /// Window ids and titles from `wmctrl -l`, in listing order.
    pub fn parse_window_list(&self, output: &str) -> Result<Vec<WindowInfo>, X11Error> {
        output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let caps = self
                    .window_row
                    .captures(line)
                    .ok_or_else(|| X11Error::new(format!("malformed wmctrl row {:?}", line)))?;
                let id = WindowId::parse_hex(&caps[1])
                    .ok_or_else(|| X11Error::new(format!("bad window id in {:?}", line)))?;
                Ok(WindowInfo {
                    id,
                    title: caps[4].to_string(),
                    pid: None,
                    command: None,
                    raw: self.raw(line),
                })
            })
            .collect()
    }

    //  Tool invocations

    fn window_pid(&self, id: &WindowId) -> Option<u32> {
        match run_tool("xprop", &["-id", &id.to_string(), "_NET_WM_PID"]) {
            Ok(output) => parse_wm_pid(&output),
            Err(e) => {
                // The window may have closed since the listing was taken.
                debug!("no pid for {}: {}", id, e);
                None
            }
        }
    }
}

fn field<T: FromStr>(text: &str, line: &str) -> Result<T, X11Error> {
    text.parse()
        .map_err(|_| X11Error::new(format!("bad geometry in {:?}", line)))
}

/// `_NET_WM_PID(CARDINAL) = 1234` → `1234`.
pub fn parse_wm_pid(output: &str) -> Option<u32> {
    let (_, value) = output.split_once('=')?;
    value.trim().parse().ok()
}

/// `pid args…` rows from `ps -eo pid=,args=`.
pub fn parse_commands(output: &str) -> HashMap<u32, String> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            Some((pid.parse().ok()?, args.trim().to_string()))
        })
        .collect()
}

//  WindowManager implementation

impl WindowManager for X11Wm {
    type Error = X11Error;

    fn monitors(&self) -> Result<Vec<MonitorInfo>, Self::Error> {
        let output = run_tool("xrandr", &["--query"])?;
        self.parse_monitors(&output)
    }

    fn open_windows(&self) -> Result<Vec<WindowInfo>, Self::Error> {
        let mut windows = self.parse_window_list(&run_tool("wmctrl", &["-l"])?)?;
        for window in &mut windows {
            window.pid = self.window_pid(&window.id);
        }
        if windows.iter().any(|w| w.pid.is_some()) {
            let commands = parse_commands(&run_tool("ps", &["-eo", "pid=,args="])?);
            for window in &mut windows {
                window.command = window.pid.and_then(|pid| commands.get(&pid).cloned());
            }
        }
        debug!("{} open windows", windows.len());
        Ok(windows)
    }

    fn place_window(&self, window: &WindowId, gravity: Gravity, rect: Rect) -> Result<(), Self::Error> {
        let geometry = format!(
            "{},{},{},{},{}",
            gravity.code(),
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        info!("placing {} at {}", window, geometry);
        run_tool("wmctrl", &["-i", "-r", &window.to_string(), "-e", &geometry])?;
        Ok(())
    }
}
