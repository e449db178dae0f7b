//! Application configuration and layout files.
//!
//! Two kinds of files are read here:
//!
//! * the **application config**, JSON at
//!   `$XDG_CONFIG_HOME/deskplan/config.json`, tuning retries and error
//!   handling.  Every field is optional and a missing file means defaults;
//! * **layout files**, YAML documents holding a sequence of window entries,
//!   passed on the command line.
//!
//! # Application config example
//!
//! ```json
//! {
//!   "retry": { "max_attempts": 12, "base_delay_ms": 150 },
//!   "fail_fast": false,
//!   "debug": false
//! }
//! ```
//!
//! # Layout file example
//!
//! ```yaml
//! - monitor: primary
//!   position: [0, "50%", 0, 0]
//!   window_locator:
//!     pstree:
//!       command_regex: "^/usr/share/code/code"
//!   command: code --new-window ~/notes
//!   command_preconditions:
//!     - poll(sh_ok("pgrep -x dockerd"))
//! - monitor: secondary
//!   position: ["10%", "10%", "10%", "10%"]
//!   window_locator:
//!     title_regex: "Mozilla Firefox$"
//!   command: firefox
//! ```

use crate::expr::Condition;
use crate::geometry::Position;
use crate::locator::Locator;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration.
///
/// A minimal `{}` file is valid; every section falls back to its
/// compiled-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Attempts and back-off for `poll(...)` and for waiting on launched
    /// windows.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Stop a layout run at the first failing entry instead of carrying on
    /// with the next one.
    #[serde(default)]
    pub fail_fast: bool,

    /// Keep raw tool output on monitors and windows.
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Error from loading or parsing a configuration or layout file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

/// One entry of a layout file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSpec {
    /// `primary` or `secondary`.
    pub monitor: String,
    /// `[top, right, bottom, left]` insets.
    pub position: Position,
    pub window_locator: Locator,
    /// Shell command that opens the window when it is not already there.
    pub command: String,
    /// Checked in order before `command` is launched.
    #[serde(default)]
    pub command_preconditions: Vec<Condition>,
    /// Checked in order before the window is moved.
    #[serde(default)]
    pub reposition_preconditions: Vec<Condition>,
}

/// Parse layout file contents.
pub fn parse_layout(contents: &str) -> Result<Vec<WindowSpec>, ConfigError> {
    // An empty document is an empty layout.
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(contents).map_err(|e| ConfigError(e.to_string()))
}

/// Read and parse the layout file at `path`.
///
/// Conditions are compiled here, so a syntax error in any entry fails the
/// whole file before anything is moved.
pub fn load_layout(path: &Path) -> Result<Vec<WindowSpec>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
    parse_layout(&contents)
        .map_err(|ConfigError(e)| ConfigError(format!("failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelValue;
    use crate::retry::RetryPolicy;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "retry": { "max_attempts": 4, "base_delay_ms": 50 },
            "fail_fast": true,
            "debug": true
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            RetryPolicy::from(&cfg.retry),
            RetryPolicy::new(4, Duration::from_millis(50))
        );
        assert!(cfg.fail_fast);
        assert!(cfg.debug);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(RetryPolicy::from(&cfg.retry), RetryPolicy::default());
        assert!(!cfg.fail_fast);
        assert!(!cfg.debug);
    }

    #[test]
    fn deserialize_partial_retry() {
        let cfg: Config = serde_json::from_str(r#"{ "retry": { "max_attempts": 2 } }"#).unwrap();
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.retry.base_delay_ms, 100);
    }

    #[test]
    fn unknown_top_level_keys_ignored() {
        let json = r#"{ "retry": {}, "future_section": { "key": 42 } }"#;
        let _cfg: Config = serde_json::from_str(json).unwrap();
    }

    #[test]
    fn load_reports_the_path() {
        let err = Config::load(Path::new("/nonexistent/deskplan.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/deskplan.json"));
    }

    const LAYOUT: &str = r#"
- monitor: primary
  position: [0, "50%", 0, 0]
  window_locator:
    pstree:
      command_regex: "^/usr/share/code/code"
      predicate: "'extensionHost' in descendants()"
  command: code --new-window
  command_preconditions:
    - poll(sh_ok("pgrep -x dockerd"))
- monitor: secondary
  position: ["10%", 10, "10%", 10]
  window_locator:
    title_regex: "Mozilla Firefox$"
  command: firefox
  reposition_preconditions:
    - "true"
"#;

    #[test]
    fn parses_layout_entries() {
        let specs = parse_layout(LAYOUT).unwrap();
        assert_eq!(specs.len(), 2);

        assert_eq!(specs[0].monitor, "primary");
        assert_eq!(specs[0].position.right, PixelValue::Text("50%".into()));
        assert!(matches!(specs[0].window_locator, Locator::ProcessTree(_)));
        assert_eq!(specs[0].command_preconditions.len(), 1);
        assert_eq!(
            specs[0].command_preconditions[0].source(),
            r#"poll(sh_ok("pgrep -x dockerd"))"#
        );
        assert!(specs[0].reposition_preconditions.is_empty());

        assert!(matches!(specs[1].window_locator, Locator::TitleRegex(_)));
        assert_eq!(specs[1].position.right, PixelValue::Int(10));
        assert_eq!(specs[1].reposition_preconditions.len(), 1);
    }

    #[test]
    fn empty_layout() {
        assert!(parse_layout("").unwrap().is_empty());
        assert!(parse_layout("[]").unwrap().is_empty());
    }

    #[test]
    fn bad_condition_fails_the_whole_file() {
        let yaml = r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: x }
  command: xterm
  command_preconditions: ["sh_ok('true') and"]
"#;
        let err = parse_layout(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid condition"));
    }

    #[test]
    fn missing_locator_and_bad_regex_are_rejected() {
        let no_locator = "- { monitor: primary, position: [0, 0, 0, 0], window_locator: {}, command: x }";
        assert!(parse_layout(no_locator).is_err());

        let bad_regex = "- { monitor: primary, position: [0, 0, 0, 0], window_locator: { title_regex: '(' }, command: x }";
        assert!(parse_layout(bad_regex).is_err());
    }

    #[test]
    fn load_layout_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LAYOUT.as_bytes()).unwrap();
        let specs = load_layout(file.path()).unwrap();
        assert_eq!(specs.len(), 2);

        let err = load_layout(Path::new("/nonexistent/work.deskr.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
