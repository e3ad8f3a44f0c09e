//! Tree-walking evaluator for compiled rule bodies.
//!
//! Evaluation is direct interpretation of the parsed [`Program`] against a
//! [`LineContext`]. Control flow is threaded through a tiny `Flow` enum so
//! `return` can unwind out of nested `if` blocks; the value of a program
//! without an explicit `return` is the value of its last executed statement
//! (Perl-style).
//!
//! The builtin table at the bottom is the entire host surface a rule body
//! can reach: line/field accessors, stash access, string helpers, and
//! `abort_reading`. Anything else is an `UnknownFunction` fault at run time.

use crate::engine::LineContext;
use crate::error::EvalError;

use super::parser::{AssignOp, BinOp, Expr, Program, Stmt, UnOp};
use super::value::{Pat, Value};

/// Run a program to completion and produce its value.
pub(crate) fn run_program(prog: &Program, ctx: &mut LineContext<'_>) -> Result<Value, EvalError> {
    match exec_block(prog, ctx)? {
        Flow::Return(v) | Flow::Normal(v) => Ok(v),
    }
}

enum Flow {
    Normal(Value),
    Return(Value),
}

fn exec_block(stmts: &[Stmt], ctx: &mut LineContext<'_>) -> Result<Flow, EvalError> {
    let mut last = Value::Null;
    for stmt in stmts {
        match exec(stmt, ctx)? {
            Flow::Return(v) => return Ok(Flow::Return(v)),
            Flow::Normal(v) => last = v,
        }
    }
    Ok(Flow::Normal(last))
}

fn exec(stmt: &Stmt, ctx: &mut LineContext<'_>) -> Result<Flow, EvalError> {
    match stmt {
        Stmt::Expr(expr) => Ok(Flow::Normal(eval(expr, ctx)?)),
        Stmt::Return(None) => Ok(Flow::Return(Value::Null)),
        Stmt::Return(Some(expr)) => Ok(Flow::Return(eval(expr, ctx)?)),
        Stmt::Delete { name } => {
            ctx.stash_delete(name);
            Ok(Flow::Normal(Value::Null))
        }
        Stmt::Assign { name, op, value } => {
            let rhs = eval(value, ctx)?;
            let next = match op {
                AssignOp::Set => rhs,
                AssignOp::Add => Value::Num(ctx.stash_get(name).as_num() + rhs.as_num()),
                AssignOp::Sub => Value::Num(ctx.stash_get(name).as_num() - rhs.as_num()),
                AssignOp::Mul => Value::Num(ctx.stash_get(name).as_num() * rhs.as_num()),
                AssignOp::Div => {
                    let d = rhs.as_num();
                    if d == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    Value::Num(ctx.stash_get(name).as_num() / d)
                }
                AssignOp::Concat => {
                    let mut s = ctx.stash_get(name).as_str();
                    s.push_str(&rhs.as_str());
                    Value::Str(s)
                }
            };
            ctx.stash_set(name, next.clone());
            Ok(Flow::Normal(next))
        }
        Stmt::If { arms, fallback } => {
            for (cond, body) in arms {
                if eval(cond, ctx)?.is_truthy() {
                    return exec_block(body, ctx);
                }
            }
            exec_block(fallback, ctx)
        }
    }
}

fn eval(expr: &Expr, ctx: &mut LineContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Num(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Regex(pat) => Ok(Value::Regex(pat.clone())),
        Expr::StashGet(name) => Ok(ctx.stash_get(name)),
        Expr::Incr { name, by, postfix } => {
            let old = ctx.stash_get(name).as_num();
            let new = old + by;
            ctx.stash_set(name, Value::Num(new));
            Ok(Value::Num(if *postfix { old } else { new }))
        }
        Expr::Unary(op, inner) => {
            let v = eval(inner, ctx)?;
            Ok(match op {
                UnOp::Neg => Value::Num(-v.as_num()),
                UnOp::Not => Value::Bool(!v.is_truthy()),
            })
        }
        Expr::Ternary(cond, then, alt) => {
            if eval(cond, ctx)?.is_truthy() { eval(then, ctx) } else { eval(alt, ctx) }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, ctx)?);
            }
            call_builtin(name, values, ctx)
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &mut LineContext<'_>) -> Result<Value, EvalError> {
    // Logic short-circuits and, Perl-style, yields the deciding operand.
    match op {
        BinOp::And => {
            let l = eval(lhs, ctx)?;
            return if l.is_truthy() { eval(rhs, ctx) } else { Ok(l) };
        }
        BinOp::Or => {
            let l = eval(lhs, ctx)?;
            return if l.is_truthy() { Ok(l) } else { eval(rhs, ctx) };
        }
        _ => {}
    }

    let l = eval(lhs, ctx)?;
    let r = eval(rhs, ctx)?;
    Ok(match op {
        BinOp::Add => Value::Num(l.as_num() + r.as_num()),
        BinOp::Sub => Value::Num(l.as_num() - r.as_num()),
        BinOp::Mul => Value::Num(l.as_num() * r.as_num()),
        BinOp::Div => {
            let d = r.as_num();
            if d == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Num(l.as_num() / d)
        }
        BinOp::Mod => {
            let d = r.as_num();
            if d == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Num(l.as_num() % d)
        }
        BinOp::Concat => {
            let mut s = l.as_str();
            s.push_str(&r.as_str());
            Value::Str(s)
        }
        BinOp::NumEq => Value::Bool(l.as_num() == r.as_num()),
        BinOp::NumNe => Value::Bool(l.as_num() != r.as_num()),
        BinOp::NumLt => Value::Bool(l.as_num() < r.as_num()),
        BinOp::NumLe => Value::Bool(l.as_num() <= r.as_num()),
        BinOp::NumGt => Value::Bool(l.as_num() > r.as_num()),
        BinOp::NumGe => Value::Bool(l.as_num() >= r.as_num()),
        BinOp::StrEq => Value::Bool(l.as_str() == r.as_str()),
        BinOp::StrNe => Value::Bool(l.as_str() != r.as_str()),
        BinOp::StrLt => Value::Bool(l.as_str() < r.as_str()),
        BinOp::StrLe => Value::Bool(l.as_str() <= r.as_str()),
        BinOp::StrGt => Value::Bool(l.as_str() > r.as_str()),
        BinOp::StrGe => Value::Bool(l.as_str() >= r.as_str()),
        BinOp::Match => Value::Bool(match_regex(&l, &r)?),
        BinOp::NotMatch => Value::Bool(!match_regex(&l, &r)?),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    })
}

fn match_regex(subject: &Value, pattern: &Value) -> Result<bool, EvalError> {
    let Value::Regex(pat) = pattern else {
        return Err(EvalError::BadArgument { func: "=~".to_string(), expected: "a regex literal on the right-hand side" });
    };
    Ok(pat.regex().is_match(&subject.as_str()))
}

// --- Builtins ----------------------------------------------------------------

fn call_builtin(name: &str, mut args: Vec<Value>, ctx: &mut LineContext<'_>) -> Result<Value, EvalError> {
    match name {
        "this_line" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Str(ctx.this_line()?.to_string()))
        }
        "NF" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Num(ctx.nf() as f64))
        }
        "NR" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Num(ctx.nr() as f64))
        }
        "this_indent" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Num(ctx.this_indent() as f64))
        }
        "field" => {
            arity(name, &args, 1, 1)?;
            let index = args[0].as_num() as isize;
            Ok(Value::Str(ctx.field(index)?.to_string()))
        }
        "field_range" => {
            arity(name, &args, 2, 2)?;
            let from = args[0].as_num() as isize;
            let to = args[1].as_num() as isize;
            Ok(Value::List(ctx.field_range(from, to)?.into_iter().map(Value::Str).collect()))
        }
        "join_range" => {
            arity(name, &args, 2, 3)?;
            let from = args[0].as_num() as isize;
            let to = args[1].as_num() as isize;
            let sep = args.get(2).map(Value::as_str).unwrap_or_else(|| " ".to_string());
            Ok(Value::Str(ctx.join_range(from, to, &sep)?))
        }
        "find_field" => {
            arity(name, &args, 1, 1)?;
            let pat = as_regex(name, &args[0])?;
            Ok(ctx.find_field(|f| pat.regex().is_match(f)).map(|f| Value::Str(f.to_string())).unwrap_or(Value::Null))
        }
        "find_field_index" => {
            arity(name, &args, 1, 1)?;
            let pat = as_regex(name, &args[0])?;
            let found = ctx.find_field_index(|f| pat.regex().is_match(f));
            Ok(Value::Num(found.map(|i| i as f64).unwrap_or(-1.0)))
        }
        "splice_fields" => {
            arity(name, &args, 1, usize::MAX)?;
            let offset = args[0].as_num() as isize;
            let len = args.get(1).map(|v| v.as_num() as isize);
            let replacement: Vec<String> = args.drain(..).skip(2).flat_map(flatten).map(|v| v.as_str()).collect();
            let removed = ctx.splice_fields(offset, len, replacement);
            Ok(Value::List(removed.into_iter().map(Value::Str).collect()))
        }
        "stash" => {
            arity(name, &args, 1, 1)?;
            Ok(ctx.stash_get(&args[0].as_str()))
        }
        "prestash" => {
            arity(name, &args, 1, 1)?;
            Ok(ctx.prestash_get(&args[0].as_str()))
        }
        "abort_reading" => {
            arity(name, &args, 0, 0)?;
            ctx.abort_reading();
            Ok(Value::Null)
        }
        "uc" => map_str(name, &args, |s| s.to_uppercase()),
        "lc" => map_str(name, &args, |s| s.to_lowercase()),
        "ucfirst" => map_str(name, &args, |s| change_first(s, char::to_uppercase)),
        "lcfirst" => map_str(name, &args, |s| change_first(s, char::to_lowercase)),
        "trim" => map_str(name, &args, |s| s.trim().to_string()),
        "length" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Num(args[0].as_str().chars().count() as f64))
        }
        "substr" => {
            arity(name, &args, 2, 3)?;
            let s = args[0].as_str();
            let offset = args[1].as_num() as isize;
            let len = args.get(2).map(|v| v.as_num() as isize);
            Ok(Value::Str(substr(&s, offset, len)))
        }
        "index" => {
            arity(name, &args, 2, 3)?;
            let haystack: Vec<char> = args[0].as_str().chars().collect();
            let needle: Vec<char> = args[1].as_str().chars().collect();
            let from = args.get(2).map(|v| v.as_num().max(0.0) as usize).unwrap_or(0);
            Ok(Value::Num(char_index(&haystack, &needle, from).map(|i| i as f64).unwrap_or(-1.0)))
        }
        "join" => {
            arity(name, &args, 1, usize::MAX)?;
            let sep = args[0].as_str();
            let parts: Vec<String> = args.drain(..).skip(1).flat_map(flatten).map(|v| v.as_str()).collect();
            Ok(Value::Str(parts.join(&sep)))
        }
        "split" => {
            arity(name, &args, 2, 2)?;
            let subject = args[1].as_str();
            let parts: Vec<Value> = match &args[0] {
                Value::Regex(pat) => pat.regex().split(&subject).map(|p| Value::Str(p.to_string())).collect(),
                sep => {
                    let sep = sep.as_str();
                    if sep.is_empty() {
                        subject.chars().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        subject.split(&sep).map(|p| Value::Str(p.to_string())).collect()
                    }
                }
            };
            Ok(Value::List(parts))
        }
        "defined" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(!args[0].is_null()))
        }
        "not" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(!args[0].is_truthy()))
        }
        "num" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Num(args[0].as_num()))
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn arity(func: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        let expected: &'static str = match (min, max) {
            (0, 0) => "no",
            (1, 1) => "exactly 1",
            (2, 2) => "exactly 2",
            (1, _) => "at least 1",
            (2, 3) => "2 or 3",
            _ => "a different number of",
        };
        return Err(EvalError::WrongArity { func: func.to_string(), expected, got: args.len() });
    }
    Ok(())
}

fn as_regex<'v>(func: &str, value: &'v Value) -> Result<&'v Pat, EvalError> {
    match value {
        Value::Regex(pat) => Ok(pat),
        _ => Err(EvalError::BadArgument { func: func.to_string(), expected: "a regex literal" }),
    }
}

fn map_str(func: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, EvalError> {
    arity(func, args, 1, 1)?;
    Ok(Value::Str(f(&args[0].as_str())))
}

fn change_first<I>(s: &str, f: impl Fn(char) -> I) -> String
where
    I: Iterator<Item = char>,
{
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => f(first).chain(chars).collect(),
    }
}

fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::List(items) => items,
        other => vec![other],
    }
}

/// Perl `substr`: negative offset counts from the end, negative length
/// leaves that many characters at the end. Works on characters.
fn substr(s: &str, offset: isize, len: Option<isize>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as isize;
    let start = if offset < 0 { (n + offset).max(0) } else { offset.min(n) };
    let end = match len {
        None => n,
        Some(l) if l >= 0 => (start + l).min(n),
        Some(l) => (n + l).max(start),
    };
    chars[start as usize..end.max(start) as usize].iter().collect()
}

fn char_index(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}
