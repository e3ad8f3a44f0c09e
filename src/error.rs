//! Error taxonomy for the engine.
//!
//! Everything fallible in the crate reports through [`Error`]; the set of
//! variants is closed and grouped by the stage that raises them:
//!
//! - input acquisition (bad paths, unreadable or binary files),
//! - line unwrapping (dangling continuations at either end of the input),
//! - rule compilation and rule shape (raised synchronously when a rule is
//!   defined),
//! - rule execution (a rule body faulting mid-read),
//! - the class rule registry.
//!
//! Runtime faults inside a compiled rule body are a separate, smaller enum
//! ([`EvalError`]) so the evaluator stays independent of engine concerns; the
//! dispatcher wraps them into [`Error::RuleRun`] together with the rule name
//! and line number.
//!
//! `abort_reading` is deliberately *not* here: aborting is a cooperative flag
//! on the engine, not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the engine can report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // --- Input files ---------------------------------------------------------
    /// The configured input path does not exist.
    #[error("input file '{path}' not found")]
    FileNotFound {
        /// Offending path.
        path: PathBuf,
    },

    /// The configured input path exists but could not be opened.
    #[error("input file '{path}' is not readable: {source}")]
    FileUnreadable {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The configured input path does not look like a plain text file
    /// (a NUL byte was found in the leading block).
    #[error("input file '{path}' is not a plain text file")]
    NotPlainText {
        /// Offending path.
        path: PathBuf,
    },

    /// An I/O failure while pulling lines from an already-open source.
    #[error("I/O failure while reading input: {0}")]
    Io(#[from] std::io::Error),

    // --- Line unwrapping -----------------------------------------------------
    /// Input ended while a `join_next` style was still accumulating a line.
    #[error("unexpected EOF at line {nr}: still unwrapping '{line}'")]
    UnexpectedEof {
        /// The pending, partially unwrapped logical line.
        line: String,
        /// Physical line number of the last line folded into the buffer.
        nr: usize,
    },

    /// A `join_last` style saw a continuation line with nothing before it.
    #[error("line {nr} continues a previous line, but there is none: '{line}'")]
    UnexpectedContinuation {
        /// The offending physical line.
        line: String,
        /// Its physical line number.
        nr: usize,
    },

    /// `line_wrap_style` is `custom` but no unwrap routines were installed.
    #[error("line_wrap_style is 'custom' but no unwrap routines are installed")]
    NoUnwrapRoutines,

    /// Custom unwrap routines were supplied while the style is not `custom`.
    #[error("custom unwrap routines require line_wrap_style 'custom' (currently '{style}')")]
    CustomRoutinesNeedCustomStyle {
        /// Name of the currently selected style.
        style: &'static str,
    },

    // --- Rule compilation and shape ------------------------------------------
    /// A predicate/action/precondition source failed to lower and compile.
    #[error("cannot compile rule source '{code}' (lowered to '{subroutine}'): {msg}")]
    RuleCompile {
        /// The original source string as the user wrote it.
        code: String,
        /// The lowered form handed to the expression parser.
        subroutine: String,
        /// The compiler's diagnostic.
        msg: String,
    },

    /// A rule was created with neither a condition nor an action.
    #[error("a rule needs at least one of a condition or an action")]
    EmptyRule,

    /// `continue_to_next` was requested without `dont_record`.
    #[error("illegal rule cont: continue_to_next requires dont_record")]
    IllegalRuleCont,

    /// A BEGIN or END rule was given a condition; they run unconditionally.
    #[error("BEGIN/END rules cannot have a condition")]
    BeginEndCondition,

    /// `before`/`after` anchors only make sense for class-registered rules.
    #[error("'before'/'after' anchors apply only to class-registered rules")]
    AnchorOutsideRegistry,

    // --- Rule execution ------------------------------------------------------
    /// A rule body needed a current line but ran without one.
    #[error("rule run improperly: no line context")]
    RuleRunImproperly,

    /// A rule body faulted while evaluating against a line.
    #[error("rule '{rule}' failed at line {nr}: {source}")]
    RuleRun {
        /// Name of the faulting rule, or `<anon>`.
        rule: String,
        /// Line number the rule was evaluating.
        nr: usize,
        /// The underlying evaluation fault.
        source: EvalError,
    },

    // --- Rule registry -------------------------------------------------------
    /// Rules cannot live in the top-level namespace.
    #[error("rules cannot be registered in the top-level namespace")]
    MainNamespace,

    /// A class was defined twice.
    #[error("parser class '{name}' is already defined")]
    DuplicateClass {
        /// Offending class name.
        name: String,
    },

    /// A registry operation referenced a class that was never defined.
    #[error("parser class '{name}' is not defined")]
    NoSuchClass {
        /// Offending class name.
        name: String,
    },

    /// A registered rule needs a non-empty name.
    #[error("a registered rule needs a non-empty name")]
    MissingRuleName,

    /// The rule name collides with a reserved one.
    #[error("'{name}' is a reserved rule name")]
    ReservedRuleName {
        /// Offending name.
        name: String,
    },

    /// The fully-qualified rule name already exists in this class.
    #[error("duplicate rule name '{name}'")]
    DuplicateRule {
        /// Offending qualified name.
        name: String,
    },

    /// Both `before` and `after` were given.
    #[error("exactly one of 'before' and 'after' may be given")]
    AmbiguousAnchor,

    /// The anchor is not a rule inherited from a superclass.
    #[error("anchor '{anchor}' is not a rule inherited from a superclass")]
    BadAnchor {
        /// Offending anchor name.
        anchor: String,
    },

    /// A registry lookup failed.
    #[error("no rule named '{name}' in the registry")]
    NoSuchRule {
        /// Offending qualified name.
        name: String,
    },

    /// A class tried to disable one of its own rules.
    #[error("rule '{name}' belongs to this class and cannot be disabled")]
    DisableOwnRule {
        /// Offending qualified name.
        name: String,
    },
}

/// Runtime faults raised while evaluating a compiled rule body.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// A positional field reference fell outside the current field list.
    #[error("field index {index} out of range (NF = {nf})")]
    FieldOutOfRange {
        /// The resolved index as written (0-based, negative from the end).
        index: isize,
        /// Number of fields on the current line.
        nf: usize,
    },

    /// A line accessor was used where no current line exists (BEGIN/END).
    #[error("no current line")]
    NoLine,

    /// The rule body called a function the host does not provide.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A builtin was called with the wrong number of arguments.
    #[error("{func}() takes {expected} argument(s), got {got}")]
    WrongArity {
        /// Builtin name.
        func: String,
        /// Human-readable arity description.
        expected: &'static str,
        /// Number of arguments received.
        got: usize,
    },

    /// A builtin was called with an argument of the wrong shape.
    #[error("{func}() expects {expected}")]
    BadArgument {
        /// Builtin name.
        func: String,
        /// What the builtin wanted.
        expected: &'static str,
    },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
}
