//! [`ProcessHost`] implementation for the local machine.

use super::{run_tool, X11Error};
use crate::traits::{ProcessHost, ShellOutput};
use log::{debug, info};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// The machine deskplan runs on, reached through `ps` and `sh`.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for SystemHost {
    type Error = X11Error;

    fn process_snapshot(&self) -> Result<Vec<String>, Self::Error> {
        let output = run_tool("ps", &["ax", "-o", "pid=", "-o", "ppid=", "-o", "args="])?;
        Ok(output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_shell(&self, command: &str) -> Result<ShellOutput, Self::Error> {
        debug!("sh -c {:?}", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| X11Error::new(format!("sh -c {:?}: {}", command, e)))?;
        Ok(ShellOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// The command is backgrounded by an intermediate shell in a fresh
    /// process group.  Only that shell is waited for, so the application is
    /// re-parented to init and survives deskplan exiting.
    fn launch_detached(&self, command: &str) -> Result<(), Self::Error> {
        info!("launching {:?}", command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{} &", command))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .status()
            .map_err(|e| X11Error::new(format!("launch {:?}: {}", command, e)))?;
        if !status.success() {
            return Err(X11Error::new(format!(
                "launch {:?}: shell exited with {}",
                command, status
            )));
        }
        Ok(())
    }
}
