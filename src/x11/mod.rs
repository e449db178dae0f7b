//! X11 implementations.
//!
//! This module provides concrete backends for the
//! [`WindowManager`](crate::traits::WindowManager) and
//! [`ProcessHost`](crate::traits::ProcessHost) traits, powered by the
//! standard X11 command-line tools (`xrandr`, `wmctrl`, `xprop`) plus `ps`
//! and `sh`.
//!
//! Nothing outside this module should reference those tools directly.

pub mod host;
pub mod wm;

pub use host::SystemHost;
pub use wm::X11Wm;

use log::debug;
use std::process::Command;

/// Errors that can occur when talking to the desktop tools.
#[derive(Debug, thiserror::Error)]
#[error("x11 backend error: {0}")]
pub struct X11Error(String);

impl X11Error {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Run `program args…`, wait for it and return its stdout.
///
/// A spawn failure or non-zero exit is an error naming the command line.
fn run_tool(program: &str, args: &[&str]) -> Result<String, X11Error> {
    let line = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    debug!("running `{}`", line);

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| X11Error(format!("`{}`: {}", line, e)))?;
    if !output.status.success() {
        return Err(X11Error(format!(
            "`{}` exited with {}: {}",
            line,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    String::from_utf8(output.stdout).map_err(|e| X11Error(format!("`{}`: utf-8: {}", line, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_tool_returns_stdout() {
        assert_eq!(run_tool("echo", &["hello"]).unwrap(), "hello\n");
    }

    #[test]
    fn run_tool_reports_failures_with_the_command_line() {
        let err = run_tool("sh", &["-c", "exit 3"]).unwrap_err();
        assert!(err.to_string().contains("`sh -c exit 3`"));

        let err = run_tool("deskplan-no-such-tool", &[]).unwrap_err();
        assert!(err.to_string().contains("deskplan-no-such-tool"));
    }
}
