//! A small boolean condition language.
//!
//! Layout files carry conditions in two places: process-tree predicates
//! (`window_locator.pstree.predicate`) and launch / reposition
//! preconditions.  They are parsed into an [`Expr`] tree when the layout is
//! loaded and interpreted by [`evaluate`]; nothing is ever handed to a shell
//! or an interpreter as code.
//!
//! # Grammar
//!
//! ```text
//! expr     := or
//! or       := and (("or" | "||") and)*
//! and      := not (("and" | "&&") not)*
//! not      := ("not" | "!") not | compare
//! compare  := postfix (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in") postfix)?
//! postfix  := primary ("." ident | "[" expr "]" | "(" args ")")*
//! int      := "-"? digit+
//! primary  := int | string | true | false | ident | "(" expr ")" | "[" args "]"
//! ```
//!
//! # Names
//!
//! What a condition can refer to depends on where it is evaluated, see
//! [`Scope`].  Always available:
//!
//! | Function              | Result                                            |
//! |-----------------------|---------------------------------------------------|
//! | `len(x)`              | length of a string, list or process sequence      |
//! | `matches(s, re)`      | `true` if regex `re` matches somewhere in `s`     |
//! | `any_matches(xs, re)` | `true` if any command / string in `xs` matches    |
//! | `int(x)`, `str(x)`    | conversions                                       |
//! | `strip(s)`            | `s` without surrounding whitespace                |
//!
//! # Example
//!
//! ```text
//! "code" in process.command and any_matches(descendants(), "extensionHost")
//! poll(sh_ok("pgrep -x dockerd")) and not "inactive" in sh("systemctl is-active vpn")
//! ```

mod eval;
mod lexer;
mod parser;

pub use eval::evaluate;
pub use parser::{CompareOp, Expr};

use crate::process::{NodeId, ProcessForest, ProcessNode};
use crate::query::{descendants, Descendants};
use crate::retry::{RetryPolicy, TimedOut};
use serde::Deserialize;
use std::fmt;

/// Anything that can go wrong parsing or evaluating a condition.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("unknown name `{0}`")]
    UnknownName(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{function}` takes {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("`{function}` failed: {message}")]
    Capability { function: String, message: String },
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

/// The descendants of one process, enumerated lazily on every use.
#[derive(Debug, Clone, Copy)]
pub struct ProcessSet<'a> {
    forest: &'a ProcessForest,
    root: NodeId,
}

impl<'a> ProcessSet<'a> {
    pub fn descendants_of(forest: &'a ProcessForest, root: NodeId) -> Self {
        Self { forest, root }
    }

    /// A fresh pre-order enumeration.
    pub fn iter(&self) -> Descendants<'a> {
        descendants(self.forest, self.root)
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value<'a>>),
    Process(&'a ProcessForest, NodeId),
    Processes(ProcessSet<'a>),
}

impl<'a> Value<'a> {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Process(..) => true,
            Value::Processes(set) => set.iter().next().is_some(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Process(..) => "process",
            Value::Processes(_) => "process sequence",
        }
    }

    pub(crate) fn process(&self) -> Option<&'a ProcessNode> {
        match self {
            Value::Process(forest, id) => Some(forest.get(*id)),
            _ => None,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Process(forest, id) => write!(f, "<process {}>", forest.get(*id).pid),
            Value::Processes(_) => f.write_str("<descendants>"),
        }
    }
}

/// The names a condition can see.
///
/// [`evaluate`] resolves the built-in functions itself and asks the scope for
/// everything else.  A scope that returns a [`RetryPolicy`] from
/// [`poll_policy`](Scope::poll_policy) also enables `poll(expr)`, which
/// re-evaluates `expr` until it is truthy.
pub trait Scope<'a> {
    /// Value bound to `name`, if any.
    fn variable(&self, name: &str) -> Option<Value<'a>>;

    /// Call the capability `name`.  `None` means the scope has no such
    /// function.
    fn call(&self, name: &str, args: &[Value<'a>]) -> Option<Result<Value<'a>, ExprError>>;

    fn poll_policy(&self) -> Option<&RetryPolicy> {
        None
    }
}

/// A parsed condition together with the text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            source: source.trim().to_string(),
            expr: Expr::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate and reduce the result to a boolean.
    pub fn holds<'a>(&self, scope: &dyn Scope<'a>) -> Result<bool, ExprError> {
        Ok(evaluate(&self.expr, scope)?.truthy())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Condition::parse(&source)
            .map_err(|e| serde::de::Error::custom(format!("invalid condition {:?}: {}", source, e)))
    }
}
