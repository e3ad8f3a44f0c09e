//! textrules: an AWK-inspired, rule-based text parsing engine.
//!
//! Instead of a hand-written read loop, you declare **rules** -- small
//! condition/action pairs in an AWK-flavored mini-language -- and run them
//! over the lines of an input. Matching actions accumulate **records**; a
//! named-variable **stash** carries state between rules (and, for
//! pre-stashed entries, between reads). Physical lines can be joined into
//! logical lines first by a configurable unwrap step (trailing backslashes,
//! SPICE `+` continuations, slurp, or custom routines).
//!
//! ```
//! use textrules::{Parser, Value, rule};
//!
//! let mut parser = Parser::default();
//! parser.set_auto_chomp(true);
//! parser.begin_rule(rule!(do: "~errors = 0")).unwrap();
//! parser.add_rule(rule!(if: "$1 eq \"ERROR:\"", do: "~errors++", dont_record: true)).unwrap();
//! parser.add_rule(rule!(if: "$1 eq \"NAME:\"", do: "return ${2+}")).unwrap();
//! parser.end_rule(rule!(do: "return ~errors")).unwrap();
//!
//! parser.read_string("NAME: Audrey C Miller\nERROR: one\nERROR: two\n").unwrap();
//! assert_eq!(parser.get_records(), [Value::Str("Audrey C Miller".into()), Value::Num(2.0)]);
//! ```
//!
//! The mini-language surface, in short: `$0` is the whole line, `$1`..`$N`
//! are fields (auto-split on a configurable separator), `${-1}` counts from
//! the end, `${2+}` joins a field range, `@{1+}` is a field range as a
//! sequence, and `~name` reads/writes the stash. Perl-style operators
//! (`eq`/`ne`/`lt`..., `==`/`<`..., `=~ /re/`, `.` for concat) plus a small
//! builtin library (`substr`, `uc`, `split`, `join`, ...) cover the usual
//! extraction chores. [`CompiledExpr`] exposes the compiled form of a
//! single source string, including its lowering and field analysis.
//!
//! Parser "subclasses" can be registered process-wide with
//! [`ParserClass`]: a class inherits its parents' rules, may anchor new
//! rules `before`/`after` inherited ones, disable inherited rules, or clone
//! and tweak them. A [`Parser`] bound to a class (see [`Parser::of_class`])
//! dispatches the class chain before its own instance rules.

extern crate self as textrules;

#[macro_use]
mod macros;

mod engine;
mod error;
mod expr;

pub use engine::{
    LineContext, LineTrimmer, LineWrapStyle, MultilineType, Options, Parser, ParserClass, ReadMetrics, Rule,
    RuleMatcher, RuleSpec, Trim, WrapCheck, WrapJoin,
};
pub use error::{Error, EvalError, Result};
pub use expr::{CompiledExpr, Pat, Value};

/// Records are plain [`Value`]s; the alias reads better in user code.
pub type Record = Value;
