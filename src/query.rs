//! Searching the process forest.
//!
//! Both iterators here walk with an explicit stack, so arbitrarily deep
//! process chains cannot overflow the call stack.  Every call starts a new,
//! independent enumeration.

use crate::expr::{Condition, ExprError, ProcessSet, Scope, Value};
use crate::process::{NodeId, ProcessForest, ProcessNode};
use regex::Regex;
use serde::{Deserialize, Deserializer};

//  Descendants

/// Pre-order enumeration of everything below a node (the node excluded).
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    forest: &'a ProcessForest,
    stack: Vec<NodeId>,
}

/// Lazily enumerate the descendants of `id`.
pub fn descendants(forest: &ProcessForest, id: NodeId) -> Descendants<'_> {
    Descendants {
        forest,
        stack: forest.get(id).children().iter().rev().copied().collect(),
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a ProcessNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.forest.get(id);
        self.stack.extend(node.children().iter().rev().copied());
        Some(node)
    }
}

//  Criteria

/// The `pstree` tests of a window locator.
///
/// A node matches when *any* of the configured tests holds.  With no test
/// configured nothing matches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criteria {
    /// Exact command line.
    #[serde(default)]
    pub command: Option<String>,
    /// Regex searched anywhere in the command line.
    #[serde(default, deserialize_with = "optional_regex")]
    pub command_regex: Option<Regex>,
    /// Condition over `process` and `descendants()`.
    #[serde(default)]
    pub predicate: Option<Condition>,
}

pub(crate) fn regex<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    let pattern = String::deserialize(deserializer)?;
    Regex::new(&pattern).map_err(serde::de::Error::custom)
}

fn optional_regex<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
where
    D: Deserializer<'de>,
{
    regex(deserializer).map(Some)
}

/// Bindings visible to a `pstree` predicate.
struct ProcessScope<'a> {
    forest: &'a ProcessForest,
    id: NodeId,
}

impl<'a> Scope<'a> for ProcessScope<'a> {
    fn variable(&self, name: &str) -> Option<Value<'a>> {
        match name {
            "process" => Some(Value::Process(self.forest, self.id)),
            _ => None,
        }
    }

    fn call(&self, name: &str, args: &[Value<'a>]) -> Option<Result<Value<'a>, ExprError>> {
        if name != "descendants" {
            return None;
        }
        if !args.is_empty() {
            return Some(Err(ExprError::Arity {
                function: name.to_string(),
                expected: 0,
                got: args.len(),
            }));
        }
        Some(Ok(Value::Processes(ProcessSet::descendants_of(
            self.forest,
            self.id,
        ))))
    }
}

impl Criteria {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.command_regex.is_none() && self.predicate.is_none()
    }

    /// Test one node.  Tests run in the order command, regex, predicate and
    /// stop at the first that holds.
    pub fn matches(&self, forest: &ProcessForest, id: NodeId) -> Result<bool, ExprError> {
        let node = forest.get(id);
        if self.command.as_deref() == Some(node.command.as_str()) {
            return Ok(true);
        }
        if let Some(re) = &self.command_regex {
            if re.is_match(&node.command) {
                return Ok(true);
            }
        }
        match &self.predicate {
            Some(predicate) => predicate.holds(&ProcessScope { forest, id }),
            None => Ok(false),
        }
    }
}

//  Search

/// Pre-order search over a whole forest, see [`search`].
pub struct Search<'a, 'c> {
    forest: &'a ProcessForest,
    criteria: &'c Criteria,
    stack: Vec<NodeId>,
}

/// Every node of `forest` matching `criteria`, in pre-order.
///
/// A predicate that fails to evaluate yields an `Err` for that node; the
/// search can be resumed past it.
pub fn search<'a, 'c>(forest: &'a ProcessForest, criteria: &'c Criteria) -> Search<'a, 'c> {
    let stack = if criteria.is_empty() {
        Vec::new()
    } else {
        forest.roots().iter().rev().copied().collect()
    };
    Search {
        forest,
        criteria,
        stack,
    }
}

impl<'a, 'c> Iterator for Search<'a, 'c> {
    type Item = Result<&'a ProcessNode, ExprError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let node = self.forest.get(id);
            self.stack.extend(node.children().iter().rev().copied());
            match self.criteria.matches(self.forest, id) {
                Ok(true) => return Some(Ok(node)),
                Ok(false) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
