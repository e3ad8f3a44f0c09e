//! The parsing engine: read loop, per-line dispatch, and the public API.
//!
//! A [`Parser`] owns its configuration, its instance rules, and the state a
//! read accumulates (records, stash, line counters). `read` is one pass:
//!
//! ```text
//! acquire source (filename | filehandle; none -> no-op)
//!      │
//!      │  reset records / transient stash / counters / abort flag
//!      v
//!  BEGIN rule (boundary context)
//!      │
//!      │  per physical line:  unwrap FSM ──(logical line)──┐
//!      │                        │                          │
//!      │                        └── buffering: nothing     │
//!      v                                                   v
//!  chomp -> trim -> split -> indent -> LineContext -> dispatch:
//!      walk class rules then instance rules, test -> run,
//!      stop at the first match without continue_to_next;
//!      leave the loop once aborted
//!      │
//!      v
//!  END rule (boundary context; runs on abort too)
//!      │
//!      v
//!  clear transient stash + line context; release the source
//! ```
//!
//! Rule evaluation errors abort the read and propagate out of `read` after
//! the source is released; they do not set the `aborted` flag -- that flag
//! belongs to the cooperative `abort_reading` exit path.
//!
//! Set `TEXTRULES_DEBUG_RULES=1` to print dispatch traces.

use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{Error, Result};
use crate::expr::Value;

use super::context::{LineContext, ReadState};
use super::metrics::ReadMetrics;
use super::options::{LineWrapStyle, MultilineType, Options, Trim};
use super::registry::{self, ParserClass};
use super::rule::{Rule, RuleSpec};
use super::source::{self, Source};
use super::unwrap::{Unwrapper, WrapCheck, WrapJoin, chomp};

/// A rule-driven text parser.
///
/// # Example
///
/// ```
/// use textrules::{Parser, Value, rule};
///
/// let mut parser = Parser::default();
/// parser.add_rule(rule!(if: "$1 eq \"NAME:\"", do: "return ${2+}")).unwrap();
/// parser.read_string("NAME: Audrey C Miller\nignored line\n").unwrap();
/// assert_eq!(parser.get_records(), [Value::Str("Audrey C Miller".into())]);
/// ```
pub struct Parser {
    options: Options,
    class: Option<String>,
    rules: Vec<Rule>,
    begin: Option<Rule>,
    begin_src: String,
    end: Option<Rule>,
    end_src: String,
    custom_unwrap: Option<(WrapCheck, WrapJoin)>,
    filename: Option<PathBuf>,
    filehandle: Option<Box<dyn BufRead + Send>>,
    state: ReadState,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new(Options::default())
    }
}

impl Parser {
    /// Create a parser with the given options.
    pub fn new(options: Options) -> Self {
        Parser {
            options,
            class: None,
            rules: Vec::new(),
            begin: None,
            begin_src: String::new(),
            end: None,
            end_src: String::new(),
            custom_unwrap: None,
            filename: None,
            filehandle: None,
            state: ReadState::default(),
        }
    }

    /// Create a parser bound to a registered class: the class's rules
    /// dispatch before any instance rules, and the class's defaults
    /// (auto-split, wrap style, custom unwrap routines) apply.
    pub fn of_class(class: &ParserClass) -> Result<Self> {
        let snapshot = registry::class_snapshot(class.name())?;
        let mut options = Options::default();
        options.auto_split = snapshot.auto_split;
        if let Some(style) = snapshot.wrap_style {
            options.line_wrap_style = style;
            options.multiline_type = snapshot.multiline_type.unwrap_or_else(|| style.multiline_type());
        }
        let mut parser = Parser::new(options);
        parser.class = Some(class.name().to_string());
        parser.custom_unwrap = snapshot.custom_unwrap;
        Ok(parser)
    }

    // --- Configuration -------------------------------------------------------

    pub fn auto_chomp(&self) -> bool {
        self.options.auto_chomp
    }

    pub fn set_auto_chomp(&mut self, on: bool) {
        self.options.auto_chomp = on;
    }

    pub fn auto_split(&self) -> bool {
        self.options.auto_split
    }

    pub fn set_auto_split(&mut self, on: bool) {
        self.options.auto_split = on;
    }

    pub fn auto_trim(&self) -> Trim {
        self.options.auto_trim
    }

    pub fn set_auto_trim(&mut self, trim: Trim) {
        self.options.auto_trim = trim;
    }

    /// Install a whole-line trimmer that replaces [`Trim`] handling.
    pub fn set_custom_line_trimmer(&mut self, trimmer: impl Fn(String) -> String + Send + Sync + 'static) {
        self.options.custom_line_trimmer = Some(Arc::new(trimmer));
    }

    pub fn clear_custom_line_trimmer(&mut self) {
        self.options.custom_line_trimmer = None;
    }

    pub fn field_separator(&self) -> &Regex {
        &self.options.field_separator
    }

    pub fn set_field_separator(&mut self, fs: Regex) {
        self.options.field_separator = fs;
    }

    pub fn track_indentation(&self) -> bool {
        self.options.track_indentation
    }

    pub fn set_track_indentation(&mut self, on: bool) {
        self.options.track_indentation = on;
    }

    pub fn indentation_str(&self) -> &str {
        &self.options.indentation_str
    }

    pub fn set_indentation_str(&mut self, unit: &str) {
        self.options.indentation_str = unit.to_string();
    }

    pub fn line_wrap_style(&self) -> LineWrapStyle {
        self.options.line_wrap_style
    }

    /// Select an unwrap style. The join direction is derived from the style
    /// except for `Custom`, which keeps whatever direction is set.
    pub fn set_line_wrap_style(&mut self, style: LineWrapStyle) {
        self.options.line_wrap_style = style;
        if style != LineWrapStyle::Custom {
            self.options.multiline_type = style.multiline_type();
        } else if self.options.multiline_type == MultilineType::None {
            self.options.multiline_type = MultilineType::JoinNext;
        }
    }

    pub fn multiline_type(&self) -> MultilineType {
        self.options.multiline_type
    }

    pub fn set_multiline_type(&mut self, mode: MultilineType) {
        self.options.multiline_type = mode;
    }

    /// Install the `is_wrapped`/`unwrap` pair for the `Custom` style. The
    /// style must already be `Custom`.
    pub fn custom_line_unwrap_routines(
        &mut self,
        is_wrapped: impl Fn(&str) -> bool + Send + Sync + 'static,
        unwrap_routine: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) -> Result<()> {
        if self.options.line_wrap_style != LineWrapStyle::Custom {
            return Err(Error::CustomRoutinesNeedCustomStyle { style: self.options.line_wrap_style.name() });
        }
        self.custom_unwrap = Some((Arc::new(is_wrapped), Arc::new(unwrap_routine)));
        Ok(())
    }

    // --- Rules ---------------------------------------------------------------

    /// Add an instance rule to the end of the dispatch chain. Turns
    /// auto-split on, the way registering a class rule does.
    pub fn add_rule(&mut self, spec: RuleSpec) -> Result<()> {
        if spec.has_anchor() {
            return Err(Error::AnchorOutsideRegistry);
        }
        let rule = Rule::from_spec(&spec)?;
        self.options.auto_split = true;
        self.rules.push(rule);
        Ok(())
    }

    /// Drop all instance rules, including BEGIN and END.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
        self.begin = None;
        self.begin_src.clear();
        self.end = None;
        self.end_src.clear();
    }

    /// Set (or extend) the BEGIN rule, run once before the first line with
    /// no line context. Successive calls concatenate their action sources.
    /// BEGIN rules default to `dont_record`.
    pub fn begin_rule(&mut self, spec: RuleSpec) -> Result<()> {
        let combined = Self::boundary_action(&self.begin_src, &spec)?;
        let rule = Rule::from_spec(&RuleSpec {
            name: Some("BEGIN".to_string()),
            action: Some(combined.clone()),
            dont_record: Some(spec.dont_record.unwrap_or(true)),
            ..RuleSpec::default()
        })?;
        self.begin_src = combined;
        self.begin = Some(rule);
        Ok(())
    }

    /// Set (or extend) the END rule, run after the last line with no line
    /// context. Unlike BEGIN, its value is recorded by default (a common
    /// way to emit a summary record).
    pub fn end_rule(&mut self, spec: RuleSpec) -> Result<()> {
        let combined = Self::boundary_action(&self.end_src, &spec)?;
        let rule = Rule::from_spec(&RuleSpec {
            name: Some("END".to_string()),
            action: Some(combined.clone()),
            dont_record: Some(spec.dont_record.unwrap_or(false)),
            ..RuleSpec::default()
        })?;
        self.end_src = combined;
        self.end = Some(rule);
        Ok(())
    }

    fn boundary_action(existing: &str, spec: &RuleSpec) -> Result<String> {
        if spec.condition.as_ref().is_some_and(|c| !c.trim().is_empty()) {
            return Err(Error::BeginEndCondition);
        }
        let action = spec.action.clone().ok_or(Error::EmptyRule)?;
        Ok(if existing.is_empty() { action } else { format!("{existing};{action}") })
    }

    // --- Input selection -----------------------------------------------------

    /// Select a file to read. Validated now (existence, readability, plain
    /// text); clears any configured filehandle.
    pub fn set_filename(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        source::open_validated(&path)?;
        self.filename = Some(path);
        self.filehandle = None;
        Ok(())
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Select a caller-owned reader. The engine never closes it; it is kept
    /// (at EOF) across reads until replaced. Clears any configured
    /// filename.
    pub fn set_filehandle(&mut self, reader: impl BufRead + Send + 'static) {
        self.filehandle = Some(Box::new(reader));
        self.filename = None;
    }

    // --- Reading -------------------------------------------------------------

    /// Run one read over the configured source. With no source configured
    /// this is a no-op that leaves all state untouched.
    pub fn read(&mut self) -> Result<()> {
        self.read_with_metrics().map(|_| ())
    }

    /// Like [`read`](Parser::read), returning timing and tallies.
    pub fn read_with_metrics(&mut self) -> Result<ReadMetrics> {
        let Some(mut source) = self.acquire_source()? else {
            return Ok(ReadMetrics::default());
        };
        let outcome = self.read_source(&mut source);
        self.release_source(source);
        outcome
    }

    /// `set_filename` + `read`.
    pub fn read_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.set_filename(path)?;
        self.read()
    }

    /// `set_filehandle` + `read`.
    pub fn read_reader(&mut self, reader: impl BufRead + Send + 'static) -> Result<()> {
        self.set_filehandle(reader);
        self.read()
    }

    /// Read directly from a string (a cursor behind the same line-iterator
    /// contract). Handy in tests and doctests.
    pub fn read_string(&mut self, text: &str) -> Result<()> {
        self.read_reader(Cursor::new(text.as_bytes().to_vec()))
    }

    fn acquire_source(&mut self) -> Result<Option<Source>> {
        if let Some(path) = &self.filename {
            return Ok(Some(Source::File(source::open_validated(path)?)));
        }
        Ok(self.filehandle.take().map(Source::Handle))
    }

    /// A user-owned handle goes back into its slot; an owned file drops
    /// (closes) here.
    fn release_source(&mut self, source: Source) {
        if let Source::Handle(handle) = source {
            self.filehandle = Some(handle);
        }
    }

    fn read_source(&mut self, source: &mut Source) -> Result<ReadMetrics> {
        let started = Instant::now();
        let mut metrics = ReadMetrics::default();

        self.state.records.clear();
        self.state.stash.clear_transient();
        self.state.lines_parsed = 0;
        self.state.aborted = false;
        self.state.this_line = None;
        self.state.this_indent = 0;

        let class_rules: Vec<Rule> = match &self.class {
            Some(name) => registry::class_snapshot(name)?.rules,
            None => Vec::new(),
        };
        let mut unwrapper =
            Unwrapper::new(self.options.line_wrap_style, self.options.multiline_type, self.custom_unwrap.as_ref())?;

        Self::run_boundary(&self.begin, &mut self.state)?;

        let mut dispatch = Duration::ZERO;
        while let Some(raw) = source.next_line()? {
            self.state.lines_parsed += 1;
            metrics.physical_lines += 1;
            if let Some((line, nr)) = unwrapper.push(raw, self.state.lines_parsed)? {
                metrics.logical_lines += 1;
                let t = Instant::now();
                self.dispatch_line(line, nr, &class_rules)?;
                dispatch += t.elapsed();
                if self.state.aborted {
                    break;
                }
            }
        }
        if !self.state.aborted {
            if let Some((line, nr)) = unwrapper.finish()? {
                metrics.logical_lines += 1;
                let t = Instant::now();
                self.dispatch_line(line, nr, &class_rules)?;
                dispatch += t.elapsed();
            }
        }

        // END runs on the cooperative abort path too.
        Self::run_boundary(&self.end, &mut self.state)?;

        self.state.this_line = None;
        self.state.stash.clear_transient();

        metrics.dispatch = dispatch;
        metrics.records = self.state.records.len();
        metrics.total = started.elapsed();
        Ok(metrics)
    }

    fn run_boundary(rule: &Option<Rule>, state: &mut ReadState) -> Result<()> {
        if let Some(rule) = rule {
            let mut ctx = LineContext::boundary(state);
            rule.run(&mut ctx)?;
        }
        Ok(())
    }

    fn dispatch_line(&mut self, logical: String, nr: usize, class_rules: &[Rule]) -> Result<()> {
        let line = self.prepare_line(logical);
        let fields =
            if self.options.auto_split { split_fields(&self.options.field_separator, &line) } else { Vec::new() };
        let indent =
            if self.options.track_indentation { leading_indent(&line, &self.options.indentation_str) } else { 0 };
        let debug = debug_rules();

        self.state.this_line = Some(line.clone());
        self.state.this_indent = indent;

        let Parser { rules, state, options, .. } = self;
        let mut ctx = LineContext::for_line(line, fields, nr, indent, options.auto_split, state);
        for rule in class_rules.iter().chain(rules.iter()) {
            if rule.test(&mut ctx)? {
                if debug {
                    eprintln!(
                        "[rule:matched] name=\"{}\" nr={nr} dont_record={} continue={}",
                        rule.display_name(),
                        rule.dont_record(),
                        rule.continue_to_next(),
                    );
                }
                rule.run(&mut ctx)?;
                if !rule.continue_to_next() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn prepare_line(&self, mut line: String) -> String {
        if self.options.auto_chomp {
            let chomped = chomp(&line).len();
            line.truncate(chomped);
        }
        match &self.options.custom_line_trimmer {
            Some(trimmer) => trimmer(line),
            None => {
                let trim = self.options.auto_trim;
                if trim.contains(Trim::BOTH) {
                    line.trim().to_string()
                } else if trim.contains(Trim::LEFT) {
                    line.trim_start().to_string()
                } else if trim.contains(Trim::RIGHT) {
                    line.trim_end().to_string()
                } else {
                    line
                }
            }
        }
    }

    // --- Records -------------------------------------------------------------

    /// Records accumulated by the last read (plus any pushed manually).
    pub fn get_records(&self) -> &[Value] {
        &self.state.records
    }

    pub fn last_record(&self) -> Option<&Value> {
        self.state.records.last()
    }

    pub fn pop_record(&mut self) -> Option<Value> {
        self.state.records.pop()
    }

    pub fn push_records(&mut self, values: impl IntoIterator<Item = Value>) {
        self.state.records.extend(values);
    }

    // --- Stash ---------------------------------------------------------------

    /// Read a stashed variable (transient tier overlaying persistent).
    pub fn stashed(&self, name: &str) -> Option<&Value> {
        self.state.stash.get(name)
    }

    /// Set a persistent (pre-stashed) variable that survives reads.
    pub fn prestash(&mut self, name: &str, value: impl Into<Value>) {
        self.state.stash.prestash(name, value.into());
    }

    /// Erase names from both stash tiers.
    pub fn forget(&mut self, names: &[&str]) {
        for name in names {
            self.state.stash.forget(name);
        }
    }

    pub fn has_stashed(&self, name: &str) -> bool {
        self.state.stash.has(name)
    }

    pub fn has_empty_stash(&self) -> bool {
        self.state.stash.is_empty()
    }

    // --- Read-state accessors ------------------------------------------------

    /// Physical lines consumed by the last read.
    pub fn lines_parsed(&self) -> usize {
        self.state.lines_parsed
    }

    /// Whether the last read ended through `abort_reading`.
    pub fn has_aborted(&self) -> bool {
        self.state.aborted
    }

    /// The current logical line, while rules run; cleared after the read.
    pub fn this_line(&self) -> Option<&str> {
        self.state.this_line.as_deref()
    }

    /// Indent count of the current logical line.
    pub fn this_indent(&self) -> usize {
        self.state.this_indent
    }

    /// Cooperative stop, also reachable from rule bodies as
    /// `abort_reading()`.
    pub fn abort_reading(&mut self) {
        self.state.aborted = true;
    }
}

fn debug_rules() -> bool {
    std::env::var_os("TEXTRULES_DEBUG_RULES").is_some()
}

fn split_fields(fs: &Regex, line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    fs.split(trimmed).map(str::to_string).collect()
}

fn leading_indent(line: &str, unit: &str) -> usize {
    if unit.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = line;
    while let Some(next) = rest.strip_prefix(unit) {
        count += 1;
        rest = next;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trims_outer_whitespace_first() {
        let fs = crate::regex!(r"\s+");
        assert_eq!(split_fields(fs, "  a b  c \n"), vec!["a", "b", "c"]);
        assert_eq!(split_fields(fs, "   \n"), Vec::<String>::new());
        let commas = Regex::new(",").unwrap();
        assert_eq!(split_fields(&commas, "a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn indent_counts_whole_units() {
        assert_eq!(leading_indent("    x", " "), 4);
        assert_eq!(leading_indent("\t\tx", "\t"), 2);
        assert_eq!(leading_indent("    x", "  "), 2);
        assert_eq!(leading_indent("x", " "), 0);
    }

    #[test]
    fn no_source_is_a_quiet_no_op() {
        let mut parser = Parser::default();
        parser.push_records([Value::Num(1.0)]);
        parser.read().unwrap();
        assert_eq!(parser.get_records().len(), 1, "no-source read must not reset anything");
    }

    #[test]
    fn anchors_are_rejected_on_instance_rules() {
        let mut parser = Parser::default();
        let err = parser.add_rule(crate::rule!(if: "1", before: "X/y")).unwrap_err();
        assert!(matches!(err, Error::AnchorOutsideRegistry));
    }

    #[test]
    fn add_rule_turns_auto_split_on() {
        let mut parser = Parser::default();
        assert!(!parser.auto_split());
        parser.add_rule(crate::rule!(if: "1", dont_record: true)).unwrap();
        assert!(parser.auto_split());
    }

    #[test]
    fn begin_rules_concatenate() {
        let mut parser = Parser::default();
        parser.begin_rule(crate::rule!(do: "~a = 1")).unwrap();
        parser.begin_rule(crate::rule!(do: "~b = 2")).unwrap();
        parser.end_rule(crate::rule!(do: "return ~a + ~b")).unwrap();
        parser.read_string("x\n").unwrap();
        assert_eq!(parser.last_record(), Some(&Value::Num(3.0)));
    }

    #[test]
    fn begin_end_conditions_are_rejected() {
        let mut parser = Parser::default();
        let err = parser.begin_rule(crate::rule!(if: "1", do: "return 1")).unwrap_err();
        assert!(matches!(err, Error::BeginEndCondition));
        let err = parser.end_rule(crate::rule!(if: "1", do: "return 1")).unwrap_err();
        assert!(matches!(err, Error::BeginEndCondition));
    }

    #[test]
    fn custom_routines_need_custom_style() {
        let mut parser = Parser::default();
        let err = parser.custom_line_unwrap_routines(|_| false, |_, c| c.to_string()).unwrap_err();
        assert!(matches!(err, Error::CustomRoutinesNeedCustomStyle { style: "none" }));
    }

    #[test]
    fn custom_style_without_routines_fails_at_read() {
        let mut parser = Parser::default();
        parser.set_line_wrap_style(LineWrapStyle::Custom);
        parser.add_rule(crate::rule!(if: "1")).unwrap();
        let err = parser.read_string("x\n").unwrap_err();
        assert!(matches!(err, Error::NoUnwrapRoutines));
    }

    #[test]
    fn custom_trimmer_replaces_trim_flags() {
        let mut parser = Parser::default();
        parser.set_auto_chomp(true);
        parser.set_custom_line_trimmer(|line: String| line.trim_end_matches('!').to_string());
        parser.add_rule(crate::rule!(if: "1", do: "return $0")).unwrap();
        parser.read_string("keep this!!!\n").unwrap();
        assert_eq!(parser.get_records(), [Value::Str("keep this".into())]);
    }

    #[test]
    fn trim_flags() {
        for (trim, expected) in
            [(Trim::empty(), " a "), (Trim::LEFT, "a "), (Trim::RIGHT, " a"), (Trim::BOTH, "a")]
        {
            let mut parser = Parser::default();
            parser.set_auto_chomp(true);
            parser.set_auto_trim(trim);
            parser.add_rule(crate::rule!(if: "1", do: "return $0")).unwrap();
            parser.read_string(" a \n").unwrap();
            assert_eq!(parser.get_records(), [Value::Str(expected.into())], "trim = {trim:?}");
        }
    }
}
