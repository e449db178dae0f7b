//! Tree-walking interpreter for [`Expr`].

use super::{CompareOp, Expr, ExprError, Scope, Value};
use crate::retry::OnExhaustion;
use regex::Regex;
use std::cmp::Ordering;

/// Evaluate `expr` against `scope`.
///
/// `and` / `or` short-circuit and return a boolean.
pub fn evaluate<'a>(expr: &Expr, scope: &dyn Scope<'a>) -> Result<Value<'a>, ExprError> {
    match expr {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| evaluate(item, scope))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Name(name) => scope
            .variable(name)
            .ok_or_else(|| ExprError::UnknownName(name.clone())),
        Expr::Attr(base, name) => attribute(evaluate(base, scope)?, name),
        Expr::Index(base, index) => {
            let base = evaluate(base, scope)?;
            match evaluate(index, scope)? {
                Value::Str(name) => attribute(base, &name),
                Value::Int(i) => index_list(base, i),
                other => Err(ExprError::Type(format!(
                    "cannot index with a {}",
                    other.kind()
                ))),
            }
        }
        Expr::Call(name, args) => call(name, args, scope),
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, scope)?.truthy())),
        Expr::And(a, b) => Ok(Value::Bool(
            evaluate(a, scope)?.truthy() && evaluate(b, scope)?.truthy(),
        )),
        Expr::Or(a, b) => Ok(Value::Bool(
            evaluate(a, scope)?.truthy() || evaluate(b, scope)?.truthy(),
        )),
        Expr::Compare(a, op, b) => {
            let lhs = evaluate(a, scope)?;
            let rhs = evaluate(b, scope)?;
            compare(&lhs, *op, &rhs).map(Value::Bool)
        }
    }
}

fn attribute<'a>(base: Value<'a>, name: &str) -> Result<Value<'a>, ExprError> {
    let Value::Process(forest, id) = base else {
        return Err(ExprError::Type(format!(
            "a {} has no attribute `{}`",
            base.kind(),
            name
        )));
    };
    let node = forest.get(id);
    match name {
        "pid" => Ok(Value::Int(node.pid.into())),
        "parent_pid" | "ppid" => Ok(Value::Int(node.parent_pid.into())),
        "command" => Ok(Value::Str(node.command.clone())),
        "children" => Ok(Value::List(
            node.children()
                .iter()
                .map(|&child| Value::Process(forest, child))
                .collect(),
        )),
        _ => Err(ExprError::Type(format!("a process has no attribute `{}`", name))),
    }
}

fn index_list<'a>(base: Value<'a>, index: i64) -> Result<Value<'a>, ExprError> {
    let Value::List(mut items) = base else {
        return Err(ExprError::Type(format!("cannot index into a {}", base.kind())));
    };
    let len = items.len() as i64;
    let position = if index < 0 { len + index } else { index };
    if position < 0 || position >= len {
        return Err(ExprError::Type(format!(
            "index {} out of range for list of length {}",
            index, len
        )));
    }
    Ok(items.swap_remove(position as usize))
}

fn arity(function: &str, args: &[Expr], expected: usize) -> Result<(), ExprError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExprError::Arity {
            function: function.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn string_arg<'v>(function: &str, value: &'v Value<'_>) -> Result<&'v str, ExprError> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(ExprError::Type(format!(
            "`{}` expects a string, got a {}",
            function,
            other.kind()
        ))),
    }
}

fn call<'a>(name: &str, args: &[Expr], scope: &dyn Scope<'a>) -> Result<Value<'a>, ExprError> {
    if name == "poll" {
        if let Some(policy) = scope.poll_policy() {
            arity(name, args, 1)?;
            let target = &args[0];
            return policy.retry(
                || evaluate(target, scope),
                Value::truthy,
                OnExhaustion::Fail(format!("timed out polling {}", target)),
            );
        }
    }

    let builtin = matches!(
        name,
        "len" | "matches" | "any_matches" | "int" | "str" | "strip"
    );
    if !builtin {
        let values = args
            .iter()
            .map(|arg| evaluate(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;
        return scope
            .call(name, &values)
            .unwrap_or_else(|| Err(ExprError::UnknownFunction(name.to_string())));
    }

    match name {
        "len" => {
            arity(name, args, 1)?;
            let len = match evaluate(&args[0], scope)? {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Processes(set) => set.iter().count(),
                other => {
                    return Err(ExprError::Type(format!("a {} has no length", other.kind())))
                }
            };
            Ok(Value::Int(len as i64))
        }
        "matches" => {
            arity(name, args, 2)?;
            let text = evaluate(&args[0], scope)?;
            let pattern = evaluate(&args[1], scope)?;
            let re = Regex::new(string_arg(name, &pattern)?)?;
            Ok(Value::Bool(re.is_match(string_arg(name, &text)?)))
        }
        "any_matches" => {
            arity(name, args, 2)?;
            let haystack = evaluate(&args[0], scope)?;
            let pattern = evaluate(&args[1], scope)?;
            let re = Regex::new(string_arg(name, &pattern)?)?;
            any_matches(&haystack, &re).map(Value::Bool)
        }
        "int" => {
            arity(name, args, 1)?;
            match evaluate(&args[0], scope)? {
                Value::Int(n) => Ok(Value::Int(n)),
                Value::Bool(b) => Ok(Value::Int(b.into())),
                Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    ExprError::Type(format!("cannot convert {:?} to int", s))
                }),
                other => Err(ExprError::Type(format!(
                    "cannot convert a {} to int",
                    other.kind()
                ))),
            }
        }
        "str" => {
            arity(name, args, 1)?;
            match evaluate(&args[0], scope)? {
                Value::Str(s) => Ok(Value::Str(s)),
                Value::Int(n) => Ok(Value::Str(n.to_string())),
                Value::Bool(b) => Ok(Value::Str(b.to_string())),
                Value::Process(forest, id) => Ok(Value::Str(forest.get(id).command.clone())),
                other => Err(ExprError::Type(format!(
                    "cannot convert a {} to string",
                    other.kind()
                ))),
            }
        }
        _ => {
            arity(name, args, 1)?;
            let value = evaluate(&args[0], scope)?;
            Ok(Value::Str(string_arg(name, &value)?.trim().to_string()))
        }
    }
}

fn any_matches(haystack: &Value<'_>, re: &Regex) -> Result<bool, ExprError> {
    match haystack {
        Value::Processes(set) => Ok(set.iter().any(|node| re.is_match(&node.command))),
        Value::List(items) => {
            for item in items {
                let hit = match item {
                    Value::Str(s) => re.is_match(s),
                    Value::Process(forest, id) => re.is_match(&forest.get(*id).command),
                    other => {
                        return Err(ExprError::Type(format!(
                            "`any_matches` cannot match against a {}",
                            other.kind()
                        )))
                    }
                };
                if hit {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Str(s) => Ok(re.is_match(s)),
        other => Err(ExprError::Type(format!(
            "`any_matches` expects a sequence, got a {}",
            other.kind()
        ))),
    }
}

fn equal(a: &Value<'_>, b: &Value<'_>) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| equal(a, b))
        }
        (Value::Process(..), Value::Process(..)) => {
            a.process().map(|n| n.pid) == b.process().map(|n| n.pid)
        }
        _ => false,
    }
}

fn contains(needle: &Value<'_>, haystack: &Value<'_>) -> Result<bool, ExprError> {
    match (needle, haystack) {
        (Value::Str(n), Value::Str(h)) => Ok(h.contains(n.as_str())),
        (_, Value::List(items)) => Ok(items.iter().any(|item| equal(needle, item))),
        (Value::Str(n), Value::Processes(set)) => {
            Ok(set.iter().any(|node| node.command.contains(n.as_str())))
        }
        (Value::Int(pid), Value::Processes(set)) => {
            Ok(set.iter().any(|node| i64::from(node.pid) == *pid))
        }
        (Value::Process(..), Value::Processes(set)) => {
            let pid = needle.process().map(|n| n.pid);
            Ok(set.iter().any(|node| Some(node.pid) == pid))
        }
        _ => Err(ExprError::Type(format!(
            "cannot test whether a {} is in a {}",
            needle.kind(),
            haystack.kind()
        ))),
    }
}

fn compare(lhs: &Value<'_>, op: CompareOp, rhs: &Value<'_>) -> Result<bool, ExprError> {
    let ordering = || -> Result<Ordering, ExprError> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => Err(ExprError::Type(format!(
                "cannot order a {} and a {}",
                lhs.kind(),
                rhs.kind()
            ))),
        }
    };
    match op {
        CompareOp::Eq => Ok(equal(lhs, rhs)),
        CompareOp::Ne => Ok(!equal(lhs, rhs)),
        CompareOp::Lt => Ok(ordering()? == Ordering::Less),
        CompareOp::Le => Ok(ordering()? != Ordering::Greater),
        CompareOp::Gt => Ok(ordering()? == Ordering::Greater),
        CompareOp::Ge => Ok(ordering()? != Ordering::Less),
        CompareOp::In => contains(lhs, rhs),
        CompareOp::NotIn => contains(lhs, rhs).map(|found| !found),
    }
}
