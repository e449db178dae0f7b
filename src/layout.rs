//! Applying layout entries to the desktop.
//!
//! Each [`WindowSpec`] is driven through a small state machine:
//!
//! ```text
//! Searching ──found──────────────────────────────▶ Positioning ──▶ Done
//!     │                                                 ▲
//!     └─missing──▶ Launching ──▶ Waiting ──appeared─────┘
//! ```
//!
//! Any stage can fail, which ends that entry with a [`LayoutError`].
//! [`LayoutExecutor::run`] applies a whole layout file, isolating entries
//! from each other unless asked to stop at the first failure.

use crate::config::WindowSpec;
use crate::expr::{Condition, ExprError, Scope, Value};
use crate::geometry::{resolve_rect, GeometryError, MonitorRegistry};
use crate::model::{Gravity, Rect, WindowInfo};
use crate::process::{ParseError, ProcessForest};
use crate::retry::{RetryPolicy, TimedOut};
use crate::traits::{ProcessHost, WindowManager};
use log::{debug, error, info};
use serde::Serialize;
use std::fmt;

/// Why a layout entry could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("precondition not met: {expression}")]
    Precondition { expression: String },
    #[error(transparent)]
    Timeout(#[from] TimedOut),
    #[error("cannot evaluate {expression}: {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExprError,
    },
    #[error("window manager error: {0}")]
    WindowManager(String),
    #[error("process host error: {0}")]
    Host(String),
}

impl LayoutError {
    /// Wrap an evaluation failure of `expression`.  A `poll` that ran out of
    /// attempts is reported as a timeout.
    fn expression(expression: impl Into<String>, source: ExprError) -> Self {
        match source {
            ExprError::TimedOut(timed_out) => LayoutError::Timeout(timed_out),
            source => LayoutError::Expression {
                expression: expression.into(),
                source,
            },
        }
    }
}

/// A window that ended up where its entry asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub window: WindowInfo,
    pub rect: Rect,
}

/// Outcome of one entry of a [`LayoutExecutor::run`].
#[derive(Debug)]
pub struct EntryOutcome {
    /// Position of the entry in the layout file.
    pub index: usize,
    pub command: String,
    pub result: Result<Placement, LayoutError>,
}

/// Result of applying a whole layout.
#[derive(Debug, Default)]
pub struct LayoutReport {
    pub outcomes: Vec<EntryOutcome>,
    /// Entries never attempted because an earlier one failed in fail-fast
    /// mode.
    pub skipped: usize,
}

impl LayoutReport {
    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.skipped == 0 && self.failures().next().is_none()
    }
}

enum Stage {
    Searching,
    Launching,
    Waiting,
    Positioning(WindowInfo),
    Done(Placement),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Searching => f.write_str("searching"),
            Stage::Launching => f.write_str("launching"),
            Stage::Waiting => f.write_str("waiting"),
            Stage::Positioning(window) => write!(f, "positioning {}", window.id),
            Stage::Done(_) => f.write_str("done"),
        }
    }
}

/// Error of one locator resolution, before it is tied to its entry.
enum LocateError {
    Layout(LayoutError),
    Expr(ExprError),
}

impl From<ExprError> for LocateError {
    fn from(e: ExprError) -> Self {
        LocateError::Expr(e)
    }
}

//  Precondition scope

/// Bindings visible to launch and reposition preconditions.
struct PreconditionScope<'h, H> {
    host: &'h H,
    policy: &'h RetryPolicy,
}

impl<'h, H: ProcessHost> PreconditionScope<'h, H> {
    fn shell_arg<'v>(name: &str, args: &'v [Value<'_>]) -> Result<&'v str, ExprError> {
        match args {
            [Value::Str(command)] => Ok(command.as_str()),
            [other] => Err(ExprError::Type(format!(
                "`{}` expects a command string, got a {}",
                name,
                other.kind()
            ))),
            _ => Err(ExprError::Arity {
                function: name.to_string(),
                expected: 1,
                got: args.len(),
            }),
        }
    }
}

impl<'a, 'h, H: ProcessHost> Scope<'a> for PreconditionScope<'h, H> {
    fn variable(&self, _name: &str) -> Option<Value<'a>> {
        None
    }

    fn call(&self, name: &str, args: &[Value<'a>]) -> Option<Result<Value<'a>, ExprError>> {
        if name != "sh" && name != "sh_ok" {
            return None;
        }
        let result = Self::shell_arg(name, args).and_then(|command| {
            let output = self.host.run_shell(command).map_err(|e| ExprError::Capability {
                function: name.to_string(),
                message: e.to_string(),
            })?;
            debug!("{}({:?}) -> success={}", name, command, output.success);
            Ok(if name == "sh" {
                Value::Str(output.stdout)
            } else {
                Value::Bool(output.success)
            })
        });
        Some(result)
    }

    fn poll_policy(&self) -> Option<&RetryPolicy> {
        Some(self.policy)
    }
}

//  Executor

/// Applies layout entries through a [`WindowManager`] and a [`ProcessHost`].
pub struct LayoutExecutor<W, H> {
    wm: W,
    host: H,
    policy: RetryPolicy,
    monitors: MonitorRegistry,
}

impl<W: WindowManager, H: ProcessHost> LayoutExecutor<W, H> {
    /// Create an executor.  The monitors are queried once, here.
    pub fn new(wm: W, host: H, policy: RetryPolicy) -> Result<Self, LayoutError> {
        let monitors = wm
            .monitors()
            .map_err(|e| LayoutError::WindowManager(e.to_string()))?;
        info!("found {} monitor(s)", monitors.len());
        Ok(Self {
            wm,
            host,
            policy,
            monitors: MonitorRegistry::from_monitors(monitors),
        })
    }

    /// Take a fresh process snapshot.
    pub fn process_forest(&self) -> Result<ProcessForest, LayoutError> {
        let rows = self
            .host
            .process_snapshot()
            .map_err(|e| LayoutError::Host(e.to_string()))?;
        Ok(ProcessForest::parse(rows)?)
    }

    /// Find the window `spec` refers to in a fresh window listing.
    pub fn locate(&self, spec: &WindowSpec) -> Result<Option<WindowInfo>, LayoutError> {
        let windows = self
            .wm
            .open_windows()
            .map_err(|e| LayoutError::WindowManager(e.to_string()))?;
        spec.window_locator
            .resolve(&windows, || self.process_forest().map_err(LocateError::Layout))
            .map_err(|e| match e {
                LocateError::Layout(e) => e,
                LocateError::Expr(source) => {
                    LayoutError::expression(spec.window_locator.to_string(), source)
                }
            })
    }

    fn check_preconditions(&self, conditions: &[Condition]) -> Result<(), LayoutError> {
        let scope = PreconditionScope {
            host: &self.host,
            policy: &self.policy,
        };
        for condition in conditions {
            match condition.holds(&scope) {
                Ok(true) => debug!("precondition holds: {}", condition),
                Ok(false) => {
                    return Err(LayoutError::Precondition {
                        expression: condition.source().to_string(),
                    })
                }
                Err(e) => return Err(LayoutError::expression(condition.source(), e)),
            }
        }
        Ok(())
    }

    /// Apply one entry: find (or launch) its window and move it into place.
    pub fn execute(&self, spec: &WindowSpec) -> Result<Placement, LayoutError> {
        let mut stage = Stage::Searching;
        loop {
            let from = stage.to_string();
            stage = match stage {
                Stage::Searching => match self.locate(spec)? {
                    Some(window) => Stage::Positioning(window),
                    None => Stage::Launching,
                },
                Stage::Launching => {
                    self.check_preconditions(&spec.command_preconditions)?;
                    self.host
                        .launch_detached(&spec.command)
                        .map_err(|e| LayoutError::Host(e.to_string()))?;
                    Stage::Waiting
                }
                Stage::Waiting => Stage::Positioning(self.policy.wait_for(
                    || self.locate(spec),
                    format!("timed out waiting for window to be spawned: {}", spec.command),
                )?),
                Stage::Positioning(window) => {
                    let rect = resolve_rect(&spec.position, &spec.monitor, &self.monitors)?;
                    self.check_preconditions(&spec.reposition_preconditions)?;
                    self.wm
                        .place_window(&window.id, Gravity::Default, rect)
                        .map_err(|e| LayoutError::WindowManager(e.to_string()))?;
                    Stage::Done(Placement { window, rect })
                }
                Stage::Done(placement) => return Ok(placement),
            };
            debug!("{}: {} -> {}", spec.command, from, stage);
        }
    }

    /// Apply every entry in order.
    ///
    /// A failing entry is logged and the run moves on, unless `fail_fast` is
    /// set, in which case the remaining entries are skipped.
    pub fn run(&self, specs: &[WindowSpec], fail_fast: bool) -> LayoutReport {
        let mut report = LayoutReport::default();
        for (index, spec) in specs.iter().enumerate() {
            let result = self.execute(spec);
            let failed = result.is_err();
            if let Err(e) = &result {
                error!("entry {} ({}): {}", index, spec.command, e);
            }
            report.outcomes.push(EntryOutcome {
                index,
                command: spec.command.clone(),
                result,
            });
            if failed && fail_fast {
                report.skipped = specs.len() - index - 1;
                break;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_layout;
    use crate::model::{MonitorInfo, MonitorLabel, WindowId};
    use crate::traits::ShellOutput;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("mock error: {0}")]
    struct MockError(String);

    //  Recording WindowManager

    /// Serves queued window listings; the last one repeats forever.
    struct RecorderWm {
        listings: RefCell<VecDeque<Vec<WindowInfo>>>,
        placements: RefCell<Vec<(WindowId, Gravity, Rect)>>,
    }

    impl RecorderWm {
        fn new(listings: Vec<Vec<WindowInfo>>) -> Self {
            Self {
                listings: RefCell::new(listings.into()),
                placements: RefCell::new(Vec::new()),
            }
        }
    }

    impl WindowManager for &RecorderWm {
        type Error = MockError;

        fn monitors(&self) -> Result<Vec<MonitorInfo>, MockError> {
            Ok(vec![
                MonitorInfo {
                    label: MonitorLabel::Primary,
                    name: "eDP-1".into(),
                    x: 0,
                    y: 0,
                    width: 1920,
                    height: 1080,
                    raw: None,
                },
                MonitorInfo {
                    label: MonitorLabel::Secondary,
                    name: "DP-1".into(),
                    x: 1920,
                    y: 0,
                    width: 2560,
                    height: 1440,
                    raw: None,
                },
            ])
        }

        fn open_windows(&self) -> Result<Vec<WindowInfo>, MockError> {
            let mut listings = self.listings.borrow_mut();
            if listings.len() > 1 {
                Ok(listings.pop_front().unwrap_or_default())
            } else {
                Ok(listings.front().cloned().unwrap_or_default())
            }
        }

        fn place_window(&self, window: &WindowId, gravity: Gravity, rect: Rect) -> Result<(), MockError> {
            self.placements.borrow_mut().push((*window, gravity, rect));
            Ok(())
        }
    }

    //  Recording ProcessHost

    #[derive(Default)]
    struct RecorderHost {
        snapshot: Vec<String>,
        shell: Vec<(String, ShellOutput)>,
        shell_log: RefCell<Vec<String>>,
        launched: RefCell<Vec<String>>,
    }

    impl RecorderHost {
        fn answer(mut self, command: &str, success: bool, stdout: &str) -> Self {
            self.shell.push((
                command.into(),
                ShellOutput {
                    success,
                    stdout: stdout.into(),
                },
            ));
            self
        }
    }

    impl ProcessHost for &RecorderHost {
        type Error = MockError;

        fn process_snapshot(&self) -> Result<Vec<String>, MockError> {
            Ok(self.snapshot.clone())
        }

        fn run_shell(&self, command: &str) -> Result<ShellOutput, MockError> {
            self.shell_log.borrow_mut().push(command.to_string());
            self.shell
                .iter()
                .find(|(c, _)| c == command)
                .map(|(_, out)| out.clone())
                .ok_or_else(|| MockError(format!("unexpected command {}", command)))
        }

        fn launch_detached(&self, command: &str) -> Result<(), MockError> {
            self.launched.borrow_mut().push(command.to_string());
            Ok(())
        }
    }

    fn window(id: u64, title: &str, pid: u32) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            title: title.into(),
            pid: Some(pid),
            command: None,
            raw: None,
        }
    }

    fn instant() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    fn spec(yaml: &str) -> WindowSpec {
        parse_layout(yaml).unwrap().remove(0)
    }

    const FIREFOX: &str = r#"
- monitor: primary
  position: [0, "50%", 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
"#;

    #[test]
    fn existing_window_is_placed_without_launching() {
        let wm = RecorderWm::new(vec![vec![
            window(1, "Terminal", 10),
            window(2, "Mozilla Firefox", 20),
        ]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();

        let placement = executor.execute(&spec(FIREFOX)).unwrap();
        assert_eq!(placement.window.id, WindowId(2));
        assert_eq!(
            *wm.placements.borrow(),
            vec![(
                WindowId(2),
                Gravity::Default,
                Rect {
                    x: 0,
                    y: 0,
                    width: 960,
                    height: 1080
                }
            )]
        );
        assert!(host.launched.borrow().is_empty());
    }

    #[test]
    fn missing_window_is_launched_and_waited_for() {
        let wm = RecorderWm::new(vec![
            vec![window(1, "Terminal", 10)],
            vec![window(1, "Terminal", 10)],
            vec![window(1, "Terminal", 10), window(3, "Mozilla Firefox", 30)],
        ]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();

        let placement = executor.execute(&spec(FIREFOX)).unwrap();
        assert_eq!(placement.window.id, WindowId(3));
        assert_eq!(*host.launched.borrow(), vec!["firefox".to_string()]);
        assert_eq!(wm.placements.borrow().len(), 1);
    }

    #[test]
    fn window_that_never_appears_times_out() {
        let wm = RecorderWm::new(vec![vec![]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();

        match executor.execute(&spec(FIREFOX)) {
            Err(LayoutError::Timeout(t)) => {
                assert_eq!(t.message, "timed out waiting for window to be spawned: firefox");
                assert_eq!(t.attempts, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(wm.placements.borrow().is_empty());
    }

    #[test]
    fn failed_launch_precondition_stops_before_launching() {
        let wm = RecorderWm::new(vec![vec![]]);
        let host = RecorderHost::default().answer("pgrep -x dockerd", false, "");
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let spec = spec(
            r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "^docker-ui$" }
  command: docker-ui
  command_preconditions: ["sh_ok('pgrep -x dockerd')"]
"#,
        );

        match executor.execute(&spec) {
            Err(LayoutError::Precondition { expression }) => {
                assert_eq!(expression, "sh_ok('pgrep -x dockerd')")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(host.launched.borrow().is_empty());
    }

    #[test]
    fn polled_precondition_that_never_holds_is_a_timeout() {
        let wm = RecorderWm::new(vec![vec![]]);
        let host = RecorderHost::default().answer("pgrep -x dockerd", false, "");
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let spec = spec(
            r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "^docker-ui$" }
  command: docker-ui
  command_preconditions: ["poll(sh_ok('pgrep -x dockerd'))"]
"#,
        );

        assert!(matches!(executor.execute(&spec), Err(LayoutError::Timeout(_))));
        assert_eq!(host.shell_log.borrow().len(), 3);
    }

    #[test]
    fn reposition_precondition_uses_shell_output() {
        let wm = RecorderWm::new(vec![vec![window(2, "Mozilla Firefox", 20)]]);
        let host = RecorderHost::default().answer("xdotool get_desktop", true, " 1\n");
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let yaml = r#"
- monitor: secondary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
  reposition_preconditions: ["int(sh('xdotool get_desktop')) == 1"]
"#;
        let placement = executor.execute(&spec(yaml)).unwrap();
        assert_eq!(placement.rect.x, 1920);
        assert_eq!(placement.rect.width, 2560);
    }

    #[test]
    fn failed_reposition_precondition_leaves_the_window_alone() {
        let wm = RecorderWm::new(vec![vec![window(2, "Mozilla Firefox", 20)]]);
        let host = RecorderHost::default().answer("pgrep -x picom", false, "");
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let yaml = r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
  reposition_preconditions: ["sh_ok('pgrep -x picom')"]
"#;
        match executor.execute(&spec(yaml)) {
            Err(LayoutError::Precondition { expression }) => {
                assert_eq!(expression, "sh_ok('pgrep -x picom')")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(wm.placements.borrow().is_empty());
        assert!(host.launched.borrow().is_empty());
        assert_eq!(*host.shell_log.borrow(), vec!["pgrep -x picom".to_string()]);
    }

    #[test]
    fn shell_errors_surface_as_expression_errors() {
        let wm = RecorderWm::new(vec![vec![window(2, "Mozilla Firefox", 20)]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let yaml = r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
  reposition_preconditions: ["sh('unknown')"]
"#;
        match executor.execute(&spec(yaml)) {
            Err(LayoutError::Expression { expression, source }) => {
                assert_eq!(expression, "sh('unknown')");
                assert!(matches!(source, ExprError::Capability { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(wm.placements.borrow().is_empty());
    }

    #[test]
    fn process_tree_locator_uses_the_host_snapshot() {
        let wm = RecorderWm::new(vec![vec![
            window(1, "Terminal", 311),
            window(2, "notes.md - Visual Studio Code", 100),
        ]]);
        let host = RecorderHost {
            snapshot: vec![
                "1 0 init".into(),
                "100 1 /usr/share/code/code".into(),
                "101 100 /usr/share/code/code --type=zygote".into(),
            ],
            ..Default::default()
        };
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let yaml = r#"
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator:
    pstree:
      predicate: "any_matches(descendants(), 'zygote')"
  command: code
"#;
        assert_eq!(executor.execute(&spec(yaml)).unwrap().window.id, WindowId(2));
    }

    #[test]
    fn unknown_monitor_fails_the_entry() {
        let wm = RecorderWm::new(vec![vec![window(2, "Mozilla Firefox", 20)]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        let yaml = r#"
- monitor: tertiary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
"#;
        assert!(matches!(
            executor.execute(&spec(yaml)),
            Err(LayoutError::Geometry(GeometryError::UnknownMonitor(_)))
        ));
    }

    const BATCH: &str = r#"
- monitor: tertiary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Terminal" }
  command: xterm
- monitor: primary
  position: [0, 0, 0, 0]
  window_locator: { title_regex: "Firefox$" }
  command: firefox
"#;

    #[test]
    fn run_isolates_failing_entries() {
        let wm = RecorderWm::new(vec![vec![
            window(1, "Terminal", 10),
            window(2, "Mozilla Firefox", 20),
        ]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();

        let report = executor.run(&parse_layout(BATCH).unwrap(), false);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].result.is_err());
        assert!(report.outcomes[1].result.is_ok());
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_success());
        assert_eq!(wm.placements.borrow().len(), 1);
    }

    #[test]
    fn run_fail_fast_skips_the_rest() {
        let wm = RecorderWm::new(vec![vec![
            window(1, "Terminal", 10),
            window(2, "Mozilla Firefox", 20),
        ]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();

        let report = executor.run(&parse_layout(BATCH).unwrap(), true);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.skipped, 1);
        assert!(wm.placements.borrow().is_empty());
    }

    #[test]
    fn empty_layout_is_a_success() {
        let wm = RecorderWm::new(vec![vec![]]);
        let host = RecorderHost::default();
        let executor = LayoutExecutor::new(&wm, &host, instant()).unwrap();
        assert!(executor.run(&[], false).is_success());
    }
}
