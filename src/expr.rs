//! Rule-source compilation and evaluation.
//!
//! Rule predicates and actions are written in a tiny AWK-flavored language.
//! Turning one of those source strings into something the engine can run is
//! a four-stage pipeline, one submodule per stage:
//!
//! ```text
//! "$1 eq \"ERROR:\""
//!        │
//!        │  lower::lower            (lower.rs)
//!        │    - rewrite $N / ${N+} / @{N+} / ~name to host calls
//!        │    - collect min_nf (largest field index referenced)
//!        v
//! "field(0) eq \"ERROR:\""
//!        │
//!        │  lexer::tokenize         (lexer.rs)
//!        v
//!   [Ident, LParen, Num, RParen, StrEq, Str]
//!        │
//!        │  parser::parse_program   (parser.rs)
//!        v
//!     Program (statement AST)
//!        │
//!        │  eval::run_program       (eval.rs)  -- at dispatch time,
//!        v                                        per line context
//!      Value
//! ```
//!
//! The first three stages happen once, when a rule is defined; a failure in
//! any of them is reported synchronously as [`Error::RuleCompile`] carrying
//! both the original source and the lowered form. The last stage runs per
//! line and reports faults as [`EvalError`]s, which the dispatcher wraps
//! with the rule name and line number.
//!
//! Values (and records) are [`Value`]s; see `value.rs` for the coercion
//! rules.

#[path = "expr/eval.rs"]
mod eval;
#[path = "expr/lexer.rs"]
mod lexer;
#[path = "expr/lower.rs"]
mod lower;
#[path = "expr/parser.rs"]
mod parser;
#[path = "expr/value.rs"]
mod value;

pub use value::{Pat, Value};

use crate::engine::LineContext;
use crate::error::{Error, EvalError, Result};

/// A rule source string compiled down to an evaluable program.
///
/// Carries the original source, the lowered form (useful in diagnostics),
/// and the field-reference analysis the engine uses to skip rules on short
/// lines.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    lowered: String,
    min_nf: usize,
    program: parser::Program,
}

impl CompiledExpr {
    /// Lower, lex and parse `src`. Fails with [`Error::RuleCompile`].
    pub fn compile(src: &str) -> Result<Self> {
        let low = lower::lower(src);
        let fail = |msg: String| Error::RuleCompile { code: src.to_string(), subroutine: low.text.clone(), msg };
        let toks = lexer::tokenize(&low.text).map_err(fail)?;
        let program = parser::parse_program(&toks)
            .map_err(|msg| Error::RuleCompile { code: src.to_string(), subroutine: low.text.clone(), msg })?;
        Ok(CompiledExpr { source: src.to_string(), lowered: low.text, min_nf: low.min_nf, program })
    }

    /// Evaluate against a line context, returning raw evaluation faults.
    pub(crate) fn eval_raw(&self, ctx: &mut LineContext<'_>) -> std::result::Result<Value, EvalError> {
        eval::run_program(&self.program, ctx)
    }

    /// Evaluate as a predicate: the truthiness of the program's value.
    pub(crate) fn test_raw(&self, ctx: &mut LineContext<'_>) -> std::result::Result<bool, EvalError> {
        Ok(self.eval_raw(ctx)?.is_truthy())
    }

    /// The source string as the user wrote it.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The lowered form handed to the expression parser.
    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    /// Largest field index the source references (0 when it references none).
    pub fn min_nf(&self) -> usize {
        self.min_nf
    }
}
