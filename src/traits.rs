//! Core traits that decouple deskplan from the desktop it runs on.
//!
//! The [`LayoutExecutor`](crate::layout::LayoutExecutor) only talks to these
//! abstractions.  The X11 backend in [`x11`](crate::x11) implements both by
//! shelling out to the usual command-line tools; tests implement them with
//! recording doubles.

use crate::model::{Gravity, MonitorInfo, Rect, WindowId, WindowInfo};

/// Abstraction over a window manager that can report its monitors and
/// windows and move a window.
pub trait WindowManager {
    /// The error type produced by this window manager.
    type Error: std::error::Error + Send + 'static;

    /// Return the connected monitors.
    fn monitors(&self) -> Result<Vec<MonitorInfo>, Self::Error>;

    /// Return the open top-level windows, in the window manager's order.
    ///
    /// Every call takes a fresh listing.
    fn open_windows(&self) -> Result<Vec<WindowInfo>, Self::Error>;

    /// Move and resize `window` to `rect`.
    fn place_window(&self, window: &WindowId, gravity: Gravity, rect: Rect) -> Result<(), Self::Error>;
}

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// `true` when the command exited with status 0.
    pub success: bool,
    pub stdout: String,
}

/// Abstraction over the local process environment.
pub trait ProcessHost {
    type Error: std::error::Error + Send + 'static;

    /// One `pid ppid command` row per running process, blank rows removed.
    fn process_snapshot(&self) -> Result<Vec<String>, Self::Error>;

    /// Run `command` through the shell and wait for it.
    fn run_shell(&self, command: &str) -> Result<ShellOutput, Self::Error>;

    /// Start `command` so that it outlives deskplan.  Returns once the
    /// command has been handed off, not when it exits.
    fn launch_detached(&self, command: &str) -> Result<(), Self::Error>;
}
