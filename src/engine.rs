//! The parsing engine.
//!
//! This module is the public entry point for the rule-driven parser. The
//! pieces live in focused submodules under `src/engine/` and are re-exported
//! here so public paths stay stable (for example `crate::engine::Parser`,
//! surfaced at the crate root as `textrules::Parser`).
//!
//! ## How the parts work together
//!
//! ```text
//! filename / filehandle ──► source.rs ──(physical lines, terminators kept)
//!                                   │
//!                                   v
//!                         unwrap.rs  (join_next / join_last FSM)
//!                                   │ logical lines
//!                                   v
//!                         parser.rs  read loop
//!                            - chomp / trim / split / indent
//!                            - build a context.rs LineContext
//!                            - walk registry.rs class rules,
//!                              then instance rules
//!                                   │ per rule
//!                                   v
//!                          rule.rs  test -> run
//!                                   │ via compiled exprs (crate::expr)
//!                                   v
//!                   records + stash.rs  (two-tier named variables)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `options.rs`: configuration surface (`Options`, `Trim`, wrap styles).
//! - `source.rs`: input acquisition and the plain-text sniff.
//! - `unwrap.rs`: logical-line assembly with the two join directions.
//! - `context.rs`: the per-line window rule bodies evaluate against.
//! - `rule.rs`: compiled condition/action pairs and dispatch flags.
//! - `registry.rs`: the process-wide class registry (inheritance, anchors,
//!   disabling, cloning).
//! - `stash.rs`: persistent/transient named variables.
//! - `metrics.rs`: opt-in timings for `read_with_metrics`.
//! - `parser.rs`: the engine itself plus the whole public API.
//!
//! ## Debugging
//!
//! Set `TEXTRULES_DEBUG_RULES=1` to print rule dispatch traces.

#[path = "engine/context.rs"]
mod context;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/options.rs"]
mod options;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/registry.rs"]
mod registry;
#[path = "engine/rule.rs"]
mod rule;
#[path = "engine/source.rs"]
mod source;
#[path = "engine/stash.rs"]
mod stash;
#[path = "engine/unwrap.rs"]
mod unwrap;

pub use context::LineContext;
pub use metrics::ReadMetrics;
pub use options::{LineTrimmer, LineWrapStyle, MultilineType, Options, Trim};
pub use parser::Parser;
pub use registry::{ParserClass, RuleMatcher};
pub use rule::{Rule, RuleSpec};
pub use unwrap::{WrapCheck, WrapJoin};

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;
