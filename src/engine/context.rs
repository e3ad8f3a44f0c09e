//! Per-line evaluation context.
//!
//! A [`LineContext`] is built for each logical line just before rule
//! dispatch and torn down right after: it owns the line's fields and borrows
//! the engine's read state (records, stash, abort flag) for the duration.
//! Compiled rule bodies only ever touch the engine through this context, so
//! there is no cycle between the engine and its rules -- just a short-lived
//! mutable borrow.
//!
//! BEGIN and END rules run against a *boundary* context: no line, no
//! fields, but full access to the stash and the record list. Line accessors
//! fail there with [`EvalError::NoLine`].
//!
//! Field indexing is 0-based with negative-from-the-end, matching the
//! lowered forms (`$1` lowers to `field(0)`, `${-1}` to `field(-1)`).

use crate::error::EvalError;
use crate::expr::Value;

use super::stash::Stash;

/// Mutable engine state a rule body may touch while running.
///
/// Owned by the engine; lent to one [`LineContext`] at a time.
#[derive(Debug, Default)]
pub(crate) struct ReadState {
    pub records: Vec<Value>,
    pub stash: Stash,
    pub lines_parsed: usize,
    pub aborted: bool,
    pub this_line: Option<String>,
    pub this_indent: usize,
}

/// The window a compiled rule body sees onto one logical line.
pub struct LineContext<'p> {
    nr: usize,
    indent: usize,
    line: Option<String>,
    fields: Vec<String>,
    split: bool,
    state: &'p mut ReadState,
}

impl<'p> LineContext<'p> {
    /// Context for one logical line. `fields` is empty unless auto-split is
    /// on; `split` records which of the two it was.
    pub(crate) fn for_line(
        line: String,
        fields: Vec<String>,
        nr: usize,
        indent: usize,
        split: bool,
        state: &'p mut ReadState,
    ) -> Self {
        LineContext { nr, indent, line: Some(line), fields, split, state }
    }

    /// Line-less context for BEGIN/END rules.
    pub(crate) fn boundary(state: &'p mut ReadState) -> Self {
        LineContext { nr: 0, indent: 0, line: None, fields: Vec::new(), split: false, state }
    }

    /// Whether this context has a current line at all.
    pub fn has_line(&self) -> bool {
        self.line.is_some()
    }

    /// Whether auto-split was on when this context was built.
    pub(crate) fn is_split(&self) -> bool {
        self.split
    }

    /// Number of fields; 0 when auto-split is off.
    pub fn nf(&self) -> usize {
        self.fields.len()
    }

    /// Logical line number (1-based; the number of the last physical line
    /// folded into this one).
    pub fn nr(&self) -> usize {
        self.nr
    }

    /// Leading-indent count for this line (0 unless indent tracking is on).
    pub fn this_indent(&self) -> usize {
        self.indent
    }

    /// The full logical line.
    pub fn this_line(&self) -> Result<&str, EvalError> {
        self.line.as_deref().ok_or(EvalError::NoLine)
    }

    /// Resolve a 0-based / negative-from-end index into the field list.
    fn resolve(&self, index: isize) -> Result<usize, EvalError> {
        let nf = self.nf() as isize;
        let resolved = if index < 0 { nf + index } else { index };
        if self.line.is_none() {
            return Err(EvalError::NoLine);
        }
        if resolved < 0 || resolved >= nf {
            return Err(EvalError::FieldOutOfRange { index, nf: self.nf() });
        }
        Ok(resolved as usize)
    }

    /// Field lookup; `field(0)` is the first field, `field(-1)` the last.
    pub fn field(&self, index: isize) -> Result<&str, EvalError> {
        Ok(&self.fields[self.resolve(index)?])
    }

    /// Inclusive range of fields. Negative indices resolve from the end; a
    /// start past the end yields the range reversed.
    pub fn field_range(&self, from: isize, to: isize) -> Result<Vec<String>, EvalError> {
        let a = self.resolve(from)?;
        let b = self.resolve(to)?;
        if a <= b {
            Ok(self.fields[a..=b].to_vec())
        } else {
            let mut out = self.fields[b..=a].to_vec();
            out.reverse();
            Ok(out)
        }
    }

    /// `field_range` joined with `sep` (the callers default to `" "`).
    pub fn join_range(&self, from: isize, to: isize, sep: &str) -> Result<String, EvalError> {
        Ok(self.field_range(from, to)?.join(sep))
    }

    /// First field satisfying `pred`.
    pub fn find_field(&self, pred: impl Fn(&str) -> bool) -> Option<&str> {
        self.fields.iter().map(String::as_str).find(|f| pred(f))
    }

    /// Index of the first field satisfying `pred`.
    pub fn find_field_index(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.fields.iter().position(|f| pred(f))
    }

    /// Splice the field list like Perl's `splice`: remove `len` fields at
    /// `offset` (negative counts from the end; a negative `len` leaves that
    /// many fields at the end) and insert `replacement` there. Returns the
    /// removed fields. The mutation is visible to later rules on this line.
    pub fn splice_fields(&mut self, offset: isize, len: Option<isize>, replacement: Vec<String>) -> Vec<String> {
        let nf = self.fields.len() as isize;
        let start = if offset < 0 { (nf + offset).max(0) } else { offset.min(nf) } as usize;
        let remaining = self.fields.len() - start;
        let count = match len {
            None => remaining,
            Some(l) if l >= 0 => (l as usize).min(remaining),
            Some(l) => remaining.saturating_sub((-l) as usize),
        };
        self.fields.splice(start..start + count, replacement).collect()
    }

    /// Unified stash read; missing names read as [`Value::Null`].
    pub fn stash_get(&self, name: &str) -> Value {
        self.state.stash.get(name).cloned().unwrap_or(Value::Null)
    }

    /// `~name = ...` (transient tier).
    pub fn stash_set(&mut self, name: &str, value: Value) {
        self.state.stash.set(name, value);
    }

    /// `delete ~name` (transient tier only).
    pub fn stash_delete(&mut self, name: &str) {
        self.state.stash.delete_transient(name);
    }

    /// Read the persistent tier only.
    pub fn prestash_get(&self, name: &str) -> Value {
        self.state.stash.prestash_get(name).cloned().unwrap_or(Value::Null)
    }

    /// Cooperative stop: the engine finishes this line's dispatch, then
    /// stops reading. Not an error.
    pub fn abort_reading(&mut self) {
        self.state.aborted = true;
    }

    pub(crate) fn push_record(&mut self, value: Value) {
        self.state.records.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positive_and_negative_indexing() {
        let mut state = ReadState::default();
        let ctx = LineContext::for_line("a b c".into(), fields(&["a", "b", "c"]), 1, 0, true, &mut state);
        assert_eq!(ctx.nf(), 3);
        assert_eq!(ctx.field(0).unwrap(), "a");
        assert_eq!(ctx.field(2).unwrap(), "c");
        assert_eq!(ctx.field(-1).unwrap(), "c");
        assert_eq!(ctx.field(-3).unwrap(), "a");
        assert_eq!(ctx.field(3), Err(EvalError::FieldOutOfRange { index: 3, nf: 3 }));
        assert_eq!(ctx.field(-4), Err(EvalError::FieldOutOfRange { index: -4, nf: 3 }));
    }

    #[test]
    fn ranges_and_reversal() {
        let mut state = ReadState::default();
        let ctx = LineContext::for_line("a b c d".into(), fields(&["a", "b", "c", "d"]), 1, 0, true, &mut state);
        assert_eq!(ctx.field_range(1, -1).unwrap(), fields(&["b", "c", "d"]));
        assert_eq!(ctx.field_range(-1, 0).unwrap(), fields(&["d", "c", "b", "a"]));
        assert_eq!(ctx.join_range(0, 1, " ").unwrap(), "a b");
        assert_eq!(ctx.join_range(0, -1, ",").unwrap(), "a,b,c,d");
    }

    #[test]
    fn splice_semantics() {
        let mut state = ReadState::default();
        let mut ctx = LineContext::for_line("a b c d".into(), fields(&["a", "b", "c", "d"]), 1, 0, true, &mut state);
        let removed = ctx.splice_fields(1, Some(2), fields(&["X"]));
        assert_eq!(removed, fields(&["b", "c"]));
        assert_eq!(ctx.nf(), 3);
        assert_eq!(ctx.field(1).unwrap(), "X");

        // Negative length leaves that many at the end.
        let removed = ctx.splice_fields(0, Some(-1), vec![]);
        assert_eq!(removed, fields(&["a", "X"]));
        assert_eq!(ctx.field(0).unwrap(), "d");
    }

    #[test]
    fn boundary_context_has_no_line() {
        let mut state = ReadState::default();
        let ctx = LineContext::boundary(&mut state);
        assert_eq!(ctx.this_line(), Err(EvalError::NoLine));
        assert_eq!(ctx.field(0), Err(EvalError::NoLine));
        assert_eq!(ctx.nf(), 0);
    }

    #[test]
    fn stash_and_records_reach_the_state() {
        let mut state = ReadState::default();
        {
            let mut ctx = LineContext::boundary(&mut state);
            ctx.stash_set("k", Value::Num(7.0));
            ctx.push_record(Value::Str("r".into()));
            ctx.abort_reading();
        }
        assert_eq!(state.stash.get("k"), Some(&Value::Num(7.0)));
        assert_eq!(state.records.len(), 1);
        assert!(state.aborted);
    }
}
