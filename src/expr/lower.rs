//! Surface lowering: the AWK-like shorthands rewritten to host calls.
//!
//! Rule sources use positional shorthands (`$1`, `${2+}`, `@{1+}`, `${-1}`),
//! the whole-line `$0` and stash references (`~name`). Before a source is
//! lexed, this pass rewrites each shorthand to a canonical call the
//! evaluator provides:
//!
//! ```text
//! $0, $_      -> this_line()
//! $N          -> field(N-1)
//! ${-N}       -> field(-N)
//! ${N+}       -> join_range(N-1, -1)
//! ${-N+}      -> join_range(-N, -1)
//! @{N+}       -> field_range(N-1, -1)       (\@{N+} is accepted too)
//! @{-N+}      -> field_range(-N, -1)
//! ~name       -> stash("name")
//! ```
//!
//! The rewrite is textual but literal-aware: string literals and regex
//! literals pass through untouched, so `/^ERROR:$/` keeps its anchor and
//! `"$1"` stays a plain string.
//!
//! While scanning, the pass collects every positional index it rewrites and
//! reports `min_nf = max(p, q)` where `p` is the largest positive index and
//! `q` the largest absolute negative one. The engine skips a rule whenever
//! the current line has fewer fields than its `min_nf`.

/// A lowered source string plus its field-reference analysis.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lowered {
    pub text: String,
    pub min_nf: usize,
}

/// Rewrite `src` into canonical-call form. Never fails: anything that does
/// not match a shorthand is copied verbatim and left for the lexer to judge.
pub(crate) fn lower(src: &str) -> Lowered {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len() + 16);
    let mut min_nf = 0usize;
    let mut i = 0;
    // Whether the last significant character ended a value; decides if a
    // slash starts a regex literal or is division.
    let mut prev_value = false;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\'' | b'"' => {
                let end = string_end(bytes, i);
                out.push_str(&src[i..end]);
                i = end;
                prev_value = true;
            }
            b'/' if !prev_value => {
                let end = regex_end(bytes, i);
                out.push_str(&src[i..end]);
                i = end;
                prev_value = true;
            }
            b'\\' if bytes.get(i + 1) == Some(&b'@') => {
                // \@{N+} is the reference form of @{N+}; both lower the same.
                i += 1;
            }
            b'$' => {
                if let Some(next) = rewrite_dollar(bytes, i, &mut out, &mut min_nf) {
                    i = next;
                    prev_value = true;
                } else {
                    out.push('$');
                    i += 1;
                    prev_value = false;
                }
            }
            b'@' if bytes.get(i + 1) == Some(&b'{') => {
                if let Some(next) = rewrite_at(bytes, i, &mut out, &mut min_nf) {
                    i = next;
                    prev_value = true;
                } else {
                    out.push('@');
                    i += 1;
                    prev_value = false;
                }
            }
            b'~' if is_ident_start(bytes.get(i + 1).copied()) && !follows_match_op(bytes, i) => {
                let (name, next) = scan_ident(bytes, i + 1);
                out.push_str("stash(\"");
                out.push_str(&name);
                out.push_str("\")");
                i = next;
                prev_value = true;
            }
            _ => {
                let ch = src[i..].chars().next().expect("scanner is on a char boundary");
                out.push(ch);
                i += ch.len_utf8();
                if !ch.is_ascii_whitespace() {
                    prev_value = ch.is_alphanumeric() || matches!(ch, '_' | ')' | ']' | '}');
                }
            }
        }
    }

    Lowered { text: out, min_nf }
}

/// `$0`, `$_`, `$N`, `${N}`, `${-N}`, `${N+}`, `${-N+}`. Returns the index
/// past the shorthand, or `None` when the text after `$` is not one.
fn rewrite_dollar(bytes: &[u8], start: usize, out: &mut String, min_nf: &mut usize) -> Option<usize> {
    let mut i = start + 1;
    match bytes.get(i) {
        Some(b'_') if !is_ident_char(bytes.get(i + 1).copied()) => {
            out.push_str("this_line()");
            Some(i + 1)
        }
        Some(b'0'..=b'9') => {
            let (n, next) = scan_number(bytes, i);
            if n == 0 {
                out.push_str("this_line()");
            } else {
                out.push_str(&format!("field({})", n - 1));
                *min_nf = (*min_nf).max(n);
            }
            Some(next)
        }
        Some(b'{') => {
            i += 1;
            let negative = bytes.get(i) == Some(&b'-');
            if negative {
                i += 1;
            }
            if !bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
                return None;
            }
            let (n, mut next) = scan_number(bytes, i);
            let open_ended = bytes.get(next) == Some(&b'+');
            if open_ended {
                next += 1;
            }
            if bytes.get(next) != Some(&b'}') || n == 0 {
                return None;
            }
            next += 1;
            match (negative, open_ended) {
                (false, false) => out.push_str(&format!("field({})", n - 1)),
                (false, true) => out.push_str(&format!("join_range({}, -1)", n - 1)),
                (true, false) => out.push_str(&format!("field(-{n})")),
                (true, true) => out.push_str(&format!("join_range(-{n}, -1)")),
            }
            *min_nf = (*min_nf).max(n);
            Some(next)
        }
        _ => None,
    }
}

/// `@{N+}` and `@{-N+}` become `field_range(.., -1)`.
fn rewrite_at(bytes: &[u8], start: usize, out: &mut String, min_nf: &mut usize) -> Option<usize> {
    let mut i = start + 2;
    let negative = bytes.get(i) == Some(&b'-');
    if negative {
        i += 1;
    }
    if !bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
        return None;
    }
    let (n, mut next) = scan_number(bytes, i);
    if bytes.get(next) != Some(&b'+') || n == 0 {
        return None;
    }
    next += 1;
    if bytes.get(next) != Some(&b'}') {
        return None;
    }
    next += 1;
    if negative {
        out.push_str(&format!("field_range(-{n}, -1)"));
    } else {
        out.push_str(&format!("field_range({}, -1)", n - 1));
    }
    *min_nf = (*min_nf).max(n);
    Some(next)
}

fn scan_number(bytes: &[u8], start: usize) -> (usize, usize) {
    let mut i = start;
    let mut n = 0usize;
    while let Some(b @ b'0'..=b'9') = bytes.get(i) {
        n = n * 10 + usize::from(b - b'0');
        i += 1;
    }
    (n, i)
}

fn scan_ident(bytes: &[u8], start: usize) -> (String, usize) {
    let mut i = start;
    while is_ident_char(bytes.get(i).copied()) {
        i += 1;
    }
    (String::from_utf8_lossy(&bytes[start..i]).into_owned(), i)
}

/// End index (exclusive) of a quoted literal, honoring backslash escapes.
/// The delimiters are ASCII, so the boundary is always a char boundary.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c == b'\\' && i < bytes.len() {
            i += 1;
        } else if c == quote {
            break;
        }
    }
    i
}

/// End index (exclusive) of a `/.../flags` literal.
fn regex_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c == b'\\' && i < bytes.len() {
            i += 1;
        } else if c == b'/' {
            break;
        }
    }
    while bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
        i += 1;
    }
    i
}

fn is_ident_start(b: Option<u8>) -> bool {
    matches!(b, Some(b'a'..=b'z' | b'A'..=b'Z' | b'_'))
}

fn is_ident_char(b: Option<u8>) -> bool {
    matches!(b, Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_'))
}

/// A `~` immediately preceded by `=` or `!` is the match operator `=~`/`!~`,
/// not a stash sigil. `!= ~x` keeps the space, so the sigil survives there.
fn follows_match_op(bytes: &[u8], i: usize) -> bool {
    i > 0 && matches!(bytes[i - 1], b'=' | b'!')
}
