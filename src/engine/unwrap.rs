//! Logical-line assembly: the unwrap state machine.
//!
//! Physical lines come in (terminator included); logical lines come out.
//! The machine has two states, `Idle` (no pending buffer) and `Buffering`
//! (a logical line under construction), and two directions:
//!
//! - `join_next`: a wrap marker on a line announces that the *next* line
//!   belongs to it (trailing backslash). A buffer still pending at EOF is an
//!   error: the marker promised a continuation that never came.
//! - `join_last`: a wrap marker on a line says it continues the *previous*
//!   one (SPICE `+` lines). The first line of the input can never be marked;
//!   a pending buffer at EOF flushes normally.
//!
//! Each buffered line carries the physical line number of the last line
//! folded into it, so a logical line flushed later still reports the right
//! `NR`.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::options::{LineWrapStyle, MultilineType};

/// User predicate deciding whether a physical line is wrap-marked.
pub type WrapCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;
/// User routine joining a buffered logical line with the next physical line.
pub type WrapJoin = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

enum WrapLogic {
    Passthrough,
    Builtin(LineWrapStyle),
    Custom { is_wrapped: WrapCheck, join: WrapJoin },
}

struct Buffered {
    line: String,
    nr: usize,
}

/// The unwrap FSM. Feed physical lines with [`push`](Unwrapper::push),
/// finish with [`finish`](Unwrapper::finish).
pub(crate) struct Unwrapper {
    mode: MultilineType,
    logic: WrapLogic,
    buffer: Option<Buffered>,
    seen_first: bool,
}

impl std::fmt::Debug for Unwrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unwrapper")
            .field("mode", &self.mode)
            .field("seen_first", &self.seen_first)
            .finish_non_exhaustive()
    }
}

impl Unwrapper {
    pub fn new(
        style: LineWrapStyle,
        mode: MultilineType,
        custom: Option<&(WrapCheck, WrapJoin)>,
    ) -> Result<Self> {
        let logic = match style {
            LineWrapStyle::None => WrapLogic::Passthrough,
            LineWrapStyle::Custom => {
                let (is_wrapped, join) = custom.ok_or(Error::NoUnwrapRoutines)?;
                WrapLogic::Custom { is_wrapped: Arc::clone(is_wrapped), join: Arc::clone(join) }
            }
            builtin => WrapLogic::Builtin(builtin),
        };
        let mode = if matches!(style, LineWrapStyle::None) { MultilineType::None } else { mode };
        Ok(Unwrapper { mode, logic, buffer: None, seen_first: false })
    }

    /// Feed one physical line. Returns a completed logical line (with the
    /// physical line number of its last constituent), or `None` while the
    /// machine buffers.
    pub fn push(&mut self, raw: String, nr: usize) -> Result<Option<(String, usize)>> {
        let first = !self.seen_first;
        self.seen_first = true;

        match self.mode {
            MultilineType::None => Ok(Some((raw, nr))),
            MultilineType::JoinNext => {
                let line = match self.buffer.take() {
                    None => raw,
                    Some(pending) => self.join(&pending.line, &raw),
                };
                if self.is_wrapped(&line, false) {
                    self.buffer = Some(Buffered { line, nr });
                    Ok(None)
                } else {
                    Ok(Some((line, nr)))
                }
            }
            MultilineType::JoinLast => {
                if self.is_wrapped(&raw, first) {
                    match self.buffer.take() {
                        None => Err(Error::UnexpectedContinuation { line: raw, nr }),
                        Some(pending) => {
                            let line = self.join(&pending.line, &raw);
                            self.buffer = Some(Buffered { line, nr });
                            Ok(None)
                        }
                    }
                } else {
                    let flushed = self.buffer.replace(Buffered { line: raw, nr });
                    Ok(flushed.map(|b| (b.line, b.nr)))
                }
            }
        }
    }

    /// End of input: flush (join_last) or reject (join_next) any pending
    /// buffer.
    pub fn finish(&mut self) -> Result<Option<(String, usize)>> {
        match self.buffer.take() {
            None => Ok(None),
            Some(pending) => match self.mode {
                MultilineType::JoinNext => Err(Error::UnexpectedEof { line: pending.line, nr: pending.nr }),
                _ => Ok(Some((pending.line, pending.nr))),
            },
        }
    }

    fn is_wrapped(&self, line: &str, first: bool) -> bool {
        match &self.logic {
            WrapLogic::Passthrough => false,
            WrapLogic::Custom { is_wrapped, .. } => is_wrapped(line),
            WrapLogic::Builtin(style) => match style {
                LineWrapStyle::TrailingBackslash => line.trim_end().ends_with('\\'),
                LineWrapStyle::Spice => line.starts_with('+'),
                LineWrapStyle::JustNextLine => !first && !line.trim().is_empty(),
                LineWrapStyle::Slurp => !first,
                _ => false,
            },
        }
    }

    fn join(&self, last: &str, cur: &str) -> String {
        match &self.logic {
            WrapLogic::Passthrough => cur.to_string(),
            WrapLogic::Custom { join, .. } => join(last, cur),
            WrapLogic::Builtin(style) => match style {
                LineWrapStyle::TrailingBackslash => {
                    let kept = last.trim_end();
                    let kept = kept.strip_suffix('\\').unwrap_or(kept).trim_end();
                    format!("{kept} {cur}")
                }
                LineWrapStyle::Spice => {
                    let cont = cur.strip_prefix('+').unwrap_or(cur);
                    format!("{}{cont}", chomp(last))
                }
                LineWrapStyle::JustNextLine => format!("{}{cur}", chomp(last)),
                LineWrapStyle::Slurp => format!("{last}{cur}"),
                _ => cur.to_string(),
            },
        }
    }
}

/// Strip one trailing line terminator (`\n` or `\r\n`).
pub(crate) fn chomp(s: &str) -> &str {
    s.strip_suffix('\n').map(|t| t.strip_suffix('\r').unwrap_or(t)).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(style: LineWrapStyle, input: &[&str]) -> Result<Vec<(String, usize)>> {
        let mut fsm = Unwrapper::new(style, style.multiline_type(), None)?;
        let mut out = Vec::new();
        for (i, raw) in input.iter().enumerate() {
            if let Some(emitted) = fsm.push(raw.to_string(), i + 1)? {
                out.push(emitted);
            }
        }
        if let Some(emitted) = fsm.finish()? {
            out.push(emitted);
        }
        Ok(out)
    }

    #[test]
    fn passthrough_emits_every_line() {
        let out = drive(LineWrapStyle::None, &["a\n", "b\n"]).unwrap();
        assert_eq!(out, vec![("a\n".to_string(), 1), ("b\n".to_string(), 2)]);
    }

    #[test]
    fn trailing_backslash_joins_forward() {
        let out = drive(LineWrapStyle::TrailingBackslash, &["Garbage In.\\\n", "Garbage Out!\n"]).unwrap();
        assert_eq!(out, vec![("Garbage In. Garbage Out!\n".to_string(), 2)]);
    }

    #[test]
    fn trailing_backslash_pending_at_eof_is_an_error() {
        let err = drive(LineWrapStyle::TrailingBackslash, &["dangling \\\n"]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { nr: 1, .. }));
    }

    #[test]
    fn spice_joins_backward() {
        let input = ["* comment\n", "Minst net1\n", "+ net2 net3\n", "+ net4 nmos l=0.09u w=0.13u\n"];
        let out = drive(LineWrapStyle::Spice, &input).unwrap();
        assert_eq!(
            out,
            vec![
                ("* comment\n".to_string(), 1),
                ("Minst net1 net2 net3 net4 nmos l=0.09u w=0.13u\n".to_string(), 4),
            ]
        );
    }

    #[test]
    fn spice_continuation_on_first_line_is_an_error() {
        let err = drive(LineWrapStyle::Spice, &["+ nope\n"]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedContinuation { nr: 1, .. }));
    }

    #[test]
    fn just_next_line_groups_paragraphs() {
        // The blank line ends the first group and starts the next buffer;
        // "c" then joins onto the (chomped, empty) blank.
        let out = drive(LineWrapStyle::JustNextLine, &["a\n", "b\n", "\n", "c\n"]).unwrap();
        assert_eq!(out, vec![("ab\n".to_string(), 2), ("c\n".to_string(), 4)]);
    }

    #[test]
    fn slurp_concatenates_everything() {
        let input = ["a\n", "b\n", "c\n"];
        let out = drive(LineWrapStyle::Slurp, &input).unwrap();
        assert_eq!(out, vec![("a\nb\nc\n".to_string(), 3)]);
        // Round-trip: the one logical line is exactly the concatenation.
        assert_eq!(out[0].0, input.concat());
    }

    #[test]
    fn custom_style_requires_routines() {
        let err = Unwrapper::new(LineWrapStyle::Custom, MultilineType::JoinNext, None).unwrap_err();
        assert!(matches!(err, Error::NoUnwrapRoutines));
    }

    #[test]
    fn custom_routines_drive_the_fsm() {
        let is_wrapped: WrapCheck = Arc::new(|line: &str| line.trim_end().ends_with('&'));
        let join: WrapJoin = Arc::new(|last: &str, cur: &str| {
            let kept = last.trim_end().trim_end_matches('&');
            format!("{kept}{cur}")
        });
        let pair = (is_wrapped, join);
        let mut fsm = Unwrapper::new(LineWrapStyle::Custom, MultilineType::JoinNext, Some(&pair)).unwrap();
        let mut out = Vec::new();
        for (i, raw) in ["x &\n", "y\n", "z\n"].iter().enumerate() {
            if let Some(emitted) = fsm.push(raw.to_string(), i + 1).unwrap() {
                out.push(emitted);
            }
        }
        assert!(fsm.finish().unwrap().is_none());
        assert_eq!(out, vec![("x y\n".to_string(), 2), ("z\n".to_string(), 3)]);
    }

    #[test]
    fn chomp_strips_one_terminator() {
        assert_eq!(chomp("x\n"), "x");
        assert_eq!(chomp("x\r\n"), "x");
        assert_eq!(chomp("x"), "x");
        assert_eq!(chomp("x\n\n"), "x\n");
    }
}
