//! Finding the window a layout entry is about.

use crate::expr::ExprError;
use crate::model::WindowInfo;
use crate::process::ProcessForest;
use crate::query::{search, Criteria};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::fmt;

/// How a layout entry identifies its window.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawLocator")]
pub enum Locator {
    /// Regex searched in the window title.
    TitleRegex(Regex),
    /// First process of a pre-order search whose pid owns a window.
    ProcessTree(Criteria),
}

/// `window_locator` exactly as written; exactly one field must be set.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLocator {
    #[serde(default, deserialize_with = "optional_regex")]
    title_regex: Option<Regex>,
    #[serde(default)]
    pstree: Option<Criteria>,
}

fn optional_regex<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    crate::query::regex(deserializer).map(Some)
}

impl TryFrom<RawLocator> for Locator {
    type Error = String;

    fn try_from(raw: RawLocator) -> Result<Self, Self::Error> {
        match (raw.title_regex, raw.pstree) {
            (Some(re), None) => Ok(Locator::TitleRegex(re)),
            (None, Some(criteria)) => Ok(Locator::ProcessTree(criteria)),
            (Some(_), Some(_)) => {
                Err("window_locator takes either `title_regex` or `pstree`, not both".into())
            }
            (None, None) => Err("window_locator needs `title_regex` or `pstree`".into()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::TitleRegex(re) => write!(f, "title_regex {:?}", re.as_str()),
            Locator::ProcessTree(criteria) => {
                f.write_str("pstree")?;
                if let Some(command) = &criteria.command {
                    write!(f, " command={:?}", command)?;
                }
                if let Some(re) = &criteria.command_regex {
                    write!(f, " command_regex={:?}", re.as_str())?;
                }
                if let Some(predicate) = &criteria.predicate {
                    write!(f, " predicate={:?}", predicate.source())?;
                }
                Ok(())
            }
        }
    }
}

impl Locator {
    /// Pick the matching window out of `windows`.
    ///
    /// `processes` is only called for [`Locator::ProcessTree`]; its error
    /// type must absorb predicate failures.  `Ok(None)` means nothing
    /// matched, which is not an error.
    pub fn resolve<E, F>(&self, windows: &[WindowInfo], processes: F) -> Result<Option<WindowInfo>, E>
    where
        F: FnOnce() -> Result<ProcessForest, E>,
        E: From<ExprError>,
    {
        match self {
            Locator::TitleRegex(re) => Ok(windows.iter().find(|w| re.is_match(&w.title)).cloned()),
            Locator::ProcessTree(criteria) => {
                let forest = processes()?;
                let Some(node) = search(&forest, criteria).next().transpose()? else {
                    debug!("no process matches {}", self);
                    return Ok(None);
                };
                debug!("{} matched pid {} ({})", self, node.pid, node.command);
                Ok(windows.iter().find(|w| w.pid == Some(node.pid)).cloned())
            }
        }
    }
}
