//! Rules: a compiled condition/action pair with dispatch flags.
//!
//! A rule is declared from a [`RuleSpec`] (usually built with the [`rule!`]
//! macro) and compiled once. Compilation failures surface immediately at
//! definition time, with the offending source attached.
//!
//! Dispatch contract, per logical line:
//!
//! - `test` is false when auto-split is off or the line has fewer fields
//!   than the rule references (`min_nf`); then preconditions AND the
//!   condition decide.
//! - `run` evaluates the action; unless `dont_record` is set, whatever the
//!   action returns -- including an explicit null -- is pushed as a record.
//! - A matched rule normally ends the line's dispatch; `continue_to_next`
//!   lets the walk carry on, and is only legal on non-recording rules.
//!
//! [`rule!`]: crate::rule

use crate::error::{Error, EvalError, Result};
use crate::expr::CompiledExpr;

use super::context::LineContext;

/// Declarative description of a rule, consumed by `add_rule`,
/// `applies_rule` and friends. Build one with the [`rule!`] macro or fill
/// the fields directly.
///
/// [`rule!`]: crate::rule
#[derive(Debug, Clone, Default)]
pub struct RuleSpec {
    /// Rule name; required for class-registered rules.
    pub name: Option<String>,
    /// Condition source (`if`). Empty means always-true.
    pub condition: Option<String>,
    /// Action source (`do`). Missing means "record the whole line".
    pub action: Option<String>,
    /// Suppress recording of the action's value.
    pub dont_record: Option<bool>,
    /// Keep walking the rule chain after this rule matches.
    pub continue_to_next: Option<bool>,
    /// Registry insertion anchor: place before this inherited rule.
    pub before: Option<String>,
    /// Registry insertion anchor: place after this inherited rule.
    pub after: Option<String>,
    /// Extra condition ANDed in front of the main one (cloning).
    pub add_precondition: Option<String>,
    /// Source prepended to the cloned rule's action.
    pub prepend_to_do: Option<String>,
    /// Source appended to the cloned rule's action.
    pub append_to_do: Option<String>,
}

impl RuleSpec {
    pub(crate) fn has_anchor(&self) -> bool {
        self.before.is_some() || self.after.is_some()
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: Option<String>,
    condition: Option<CompiledExpr>,
    condition_src: String,
    action: Option<CompiledExpr>,
    action_src: String,
    preconditions: Vec<CompiledExpr>,
    min_nf: usize,
    dont_record: bool,
    continue_to_next: bool,
}

/// Default action for rules declared with a condition only.
const DEFAULT_ACTION: &str = "return $0";

impl Rule {
    /// Compile a rule from its spec. Anchors are not interpreted here; the
    /// registry handles them.
    pub(crate) fn from_spec(spec: &RuleSpec) -> Result<Self> {
        if spec.condition.is_none() && spec.action.is_none() {
            return Err(Error::EmptyRule);
        }

        let condition_src = spec.condition.clone().unwrap_or_default();
        let condition = match condition_src.trim() {
            "" => None,
            src => Some(CompiledExpr::compile(src)?),
        };

        let (action, action_src) = match &spec.action {
            None => (Some(CompiledExpr::compile(DEFAULT_ACTION)?), DEFAULT_ACTION.to_string()),
            Some(src) if src.trim().is_empty() => (None, src.clone()),
            Some(src) => (Some(CompiledExpr::compile(src)?), src.clone()),
        };

        let mut rule = Rule {
            name: spec.name.clone(),
            condition,
            condition_src,
            action,
            action_src,
            preconditions: Vec::new(),
            min_nf: 0,
            dont_record: spec.dont_record.unwrap_or(false),
            continue_to_next: false,
        };
        rule.recompute_min_nf();
        rule.set_continue_to_next(spec.continue_to_next.unwrap_or(false))?;
        if let Some(pre) = &spec.add_precondition {
            rule.add_precondition(pre)?;
        }
        Ok(rule)
    }

    /// Should this rule fire on `ctx`?
    pub fn test(&self, ctx: &mut LineContext<'_>) -> Result<bool> {
        if !ctx.is_split() || ctx.nf() < self.min_nf {
            return Ok(false);
        }
        for pre in &self.preconditions {
            if !pre.test_raw(ctx).map_err(|e| self.run_error(ctx, e))? {
                return Ok(false);
            }
        }
        match &self.condition {
            None => Ok(true),
            Some(cond) => cond.test_raw(ctx).map_err(|e| self.run_error(ctx, e)),
        }
    }

    /// Execute the action, recording its value unless `dont_record`.
    pub fn run(&self, ctx: &mut LineContext<'_>) -> Result<()> {
        let Some(action) = &self.action else {
            return Ok(());
        };
        let value = action.eval_raw(ctx).map_err(|e| self.run_error(ctx, e))?;
        if !self.dont_record {
            ctx.push_record(value);
        }
        Ok(())
    }

    fn run_error(&self, ctx: &LineContext<'_>, fault: EvalError) -> Error {
        // A line accessor faulting on a boundary context is the classic
        // "rule run improperly" case.
        if fault == EvalError::NoLine && !ctx.has_line() {
            return Error::RuleRunImproperly;
        }
        Error::RuleRun { rule: self.display_name().to_string(), nr: ctx.nr(), source: fault }
    }

    /// AND another condition in front of the existing chain.
    pub(crate) fn add_precondition(&mut self, src: &str) -> Result<()> {
        let compiled = CompiledExpr::compile(src)?;
        self.preconditions.push(compiled);
        self.recompute_min_nf();
        Ok(())
    }

    pub(crate) fn set_continue_to_next(&mut self, on: bool) -> Result<()> {
        if on && !self.dont_record {
            return Err(Error::IllegalRuleCont);
        }
        self.continue_to_next = on;
        Ok(())
    }

    fn recompute_min_nf(&mut self) {
        let mut nf = self.condition.as_ref().map(CompiledExpr::min_nf).unwrap_or(0);
        nf = nf.max(self.action.as_ref().map(CompiledExpr::min_nf).unwrap_or(0));
        for pre in &self.preconditions {
            nf = nf.max(pre.min_nf());
        }
        self.min_nf = nf;
    }

    /// Rebuild this rule's spec (used by registry cloning).
    pub(crate) fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            name: self.name.clone(),
            condition: if self.condition_src.is_empty() { None } else { Some(self.condition_src.clone()) },
            action: Some(self.action_src.clone()),
            dont_record: Some(self.dont_record),
            continue_to_next: Some(self.continue_to_next),
            ..RuleSpec::default()
        }
    }

    pub(crate) fn precondition_sources(&self) -> Vec<String> {
        self.preconditions.iter().map(|p| p.source().to_string()).collect()
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    /// Rule name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anon>")
    }

    /// Smallest NF a line needs before `test` will even consider this rule.
    pub fn min_nf(&self) -> usize {
        self.min_nf
    }

    /// Whether the action's value stays out of the record list.
    pub fn dont_record(&self) -> bool {
        self.dont_record
    }

    /// Whether dispatch continues past this rule after a match.
    pub fn continue_to_next(&self) -> bool {
        self.continue_to_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{line_ctx, state};
    use crate::expr::Value;

    #[test]
    fn rejects_empty_rules() {
        assert!(matches!(Rule::from_spec(&RuleSpec::default()), Err(Error::EmptyRule)));
    }

    #[test]
    fn continue_to_next_requires_dont_record() {
        let spec = RuleSpec {
            condition: Some("1".into()),
            continue_to_next: Some(true),
            ..RuleSpec::default()
        };
        assert!(matches!(Rule::from_spec(&spec), Err(Error::IllegalRuleCont)));

        let spec = RuleSpec {
            condition: Some("1".into()),
            dont_record: Some(true),
            continue_to_next: Some(true),
            ..RuleSpec::default()
        };
        assert!(Rule::from_spec(&spec).is_ok());
    }

    #[test]
    fn missing_action_records_the_line() {
        let rule = Rule::from_spec(&RuleSpec { condition: Some("1".into()), ..RuleSpec::default() }).unwrap();
        let mut st = state();
        let mut ctx = line_ctx("hello world", &["hello", "world"], &mut st);
        assert!(rule.test(&mut ctx).unwrap());
        rule.run(&mut ctx).unwrap();
        assert_eq!(st.records, vec![Value::Str("hello world".into())]);
    }

    #[test]
    fn empty_action_runs_with_no_effect() {
        let rule = Rule::from_spec(&RuleSpec {
            condition: Some("1".into()),
            action: Some("  ".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        let mut st = state();
        let mut ctx = line_ctx("x", &["x"], &mut st);
        rule.run(&mut ctx).unwrap();
        assert!(st.records.is_empty());
    }

    #[test]
    fn empty_condition_is_always_true() {
        let rule = Rule::from_spec(&RuleSpec {
            condition: Some("   ".into()),
            action: Some("return $1".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        assert_eq!(rule.min_nf(), 1);
        let mut st = state();
        let mut ctx = line_ctx("x", &["x"], &mut st);
        assert!(rule.test(&mut ctx).unwrap());
    }

    #[test]
    fn min_nf_skips_short_lines() {
        let rule = Rule::from_spec(&RuleSpec {
            condition: Some("$3 eq \"x\"".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        assert_eq!(rule.min_nf(), 3);
        let mut st = state();
        let mut ctx = line_ctx("a b", &["a", "b"], &mut st);
        assert!(!rule.test(&mut ctx).unwrap());
    }

    #[test]
    fn test_is_false_without_auto_split() {
        let rule = Rule::from_spec(&RuleSpec { condition: Some("1".into()), ..RuleSpec::default() }).unwrap();
        let mut st = state();
        let mut ctx = crate::engine::test_support::unsplit_ctx("a b", &mut st);
        assert!(!rule.test(&mut ctx).unwrap());
    }

    #[test]
    fn preconditions_and_in_order() {
        let mut rule = Rule::from_spec(&RuleSpec {
            condition: Some("$1 eq \"a\"".into()),
            action: Some("return $2".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        rule.add_precondition("NF() >= 2").unwrap();
        rule.add_precondition("$2 ne \"skip\"").unwrap();
        assert_eq!(rule.min_nf(), 2);

        let mut st = state();
        let mut ctx = line_ctx("a skip", &["a", "skip"], &mut st);
        assert!(!rule.test(&mut ctx).unwrap());
        let mut ctx = line_ctx("a go", &["a", "go"], &mut st);
        assert!(rule.test(&mut ctx).unwrap());
    }

    #[test]
    fn null_is_a_valid_record() {
        let rule = Rule::from_spec(&RuleSpec {
            condition: Some("1".into()),
            action: Some("return".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        let mut st = state();
        let mut ctx = line_ctx("x", &["x"], &mut st);
        rule.run(&mut ctx).unwrap();
        assert_eq!(st.records, vec![Value::Null]);
    }

    #[test]
    fn boundary_context_faults_as_improper_run() {
        let rule = Rule::from_spec(&RuleSpec {
            condition: Some("1".into()),
            action: Some("return $1".into()),
            ..RuleSpec::default()
        })
        .unwrap();
        let mut st = state();
        let mut ctx = LineContext::boundary(&mut st);
        assert!(matches!(rule.run(&mut ctx), Err(Error::RuleRunImproperly)));
    }
}
