//! Token scanner for lowered rule sources.
//!
//! By the time a source reaches this lexer, the surface shorthands are gone
//! (see `lower.rs`); what is left is a small Perl-flavored expression
//! language: literals, identifiers, operators, and regex literals after the
//! match operators. The scanner is hand-rolled and position-aware: a `/`
//! starts a regex literal only in operator position, otherwise it is
//! division.

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Num(f64),
    Str(String),
    Regex { src: String, ci: bool },
    Ident(String),

    // Keywords.
    Return,
    Delete,
    If,
    Elsif,
    Else,
    StrEq,
    StrNe,
    StrLt,
    StrGt,
    StrLe,
    StrGe,

    // Punctuation and operators.
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DotAssign,
    PlusPlus,
    MinusMinus,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Match,
    NotMatch,
    Question,
    Colon,
}

impl Tok {
    /// Whether a `/` straight after this token is division (true) or the
    /// start of a regex literal (false).
    fn ends_value(&self) -> bool {
        matches!(self, Tok::Num(_) | Tok::Str(_) | Tok::Regex { .. } | Tok::Ident(_) | Tok::RParen | Tok::PlusPlus | Tok::MinusMinus)
    }
}

/// Scan `src` into tokens. Errors carry a plain message; the caller wraps
/// them into the rule-compile error together with the original source.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Tok>, String> {
    let bytes = src.as_bytes();
    let mut toks: Vec<Tok> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            b')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            b'{' => {
                toks.push(Tok::LBrace);
                i += 1;
            }
            b'}' => {
                toks.push(Tok::RBrace);
                i += 1;
            }
            b',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            b';' => {
                toks.push(Tok::Semi);
                i += 1;
            }
            b'?' => {
                toks.push(Tok::Question);
                i += 1;
            }
            b':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            b'%' => {
                toks.push(Tok::Percent);
                i += 1;
            }
            b'*' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::StarAssign);
                    i += 2;
                } else {
                    toks.push(Tok::Star);
                    i += 1;
                }
            }
            b'+' => match bytes.get(i + 1) {
                Some(b'+') => {
                    toks.push(Tok::PlusPlus);
                    i += 2;
                }
                Some(b'=') => {
                    toks.push(Tok::PlusAssign);
                    i += 2;
                }
                _ => {
                    toks.push(Tok::Plus);
                    i += 1;
                }
            },
            b'-' => match bytes.get(i + 1) {
                Some(b'-') => {
                    toks.push(Tok::MinusMinus);
                    i += 2;
                }
                Some(b'=') => {
                    toks.push(Tok::MinusAssign);
                    i += 2;
                }
                _ => {
                    toks.push(Tok::Minus);
                    i += 1;
                }
            },
            b'.' => {
                // A dot followed by a digit in non-value position is a
                // fractional literal like `.75`; otherwise concatenation.
                let value_pos = toks.last().is_some_and(Tok::ends_value);
                if !value_pos && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
                    let (n, next) = scan_number(src, i)?;
                    toks.push(Tok::Num(n));
                    i = next;
                } else if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::DotAssign);
                    i += 2;
                } else {
                    toks.push(Tok::Dot);
                    i += 1;
                }
            }
            b'=' => match bytes.get(i + 1) {
                Some(b'=') => {
                    toks.push(Tok::EqEq);
                    i += 2;
                }
                Some(b'~') => {
                    toks.push(Tok::Match);
                    i += 2;
                }
                _ => {
                    toks.push(Tok::Assign);
                    i += 1;
                }
            },
            b'!' => match bytes.get(i + 1) {
                Some(b'=') => {
                    toks.push(Tok::BangEq);
                    i += 2;
                }
                Some(b'~') => {
                    toks.push(Tok::NotMatch);
                    i += 2;
                }
                _ => {
                    toks.push(Tok::Bang);
                    i += 1;
                }
            },
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Le);
                    i += 2;
                } else {
                    toks.push(Tok::Lt);
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Ge);
                    i += 2;
                } else {
                    toks.push(Tok::Gt);
                    i += 1;
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    toks.push(Tok::AndAnd);
                    i += 2;
                } else {
                    return Err("single '&' is not an operator".to_string());
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    toks.push(Tok::OrOr);
                    i += 2;
                } else {
                    return Err("single '|' is not an operator".to_string());
                }
            }
            b'/' => {
                let value_pos = toks.last().is_some_and(Tok::ends_value);
                if value_pos {
                    if bytes.get(i + 1) == Some(&b'=') {
                        toks.push(Tok::SlashAssign);
                        i += 2;
                    } else {
                        toks.push(Tok::Slash);
                        i += 1;
                    }
                } else {
                    let (tok, next) = scan_regex(src, i)?;
                    toks.push(tok);
                    i = next;
                }
            }
            b'\'' | b'"' => {
                let (tok, next) = scan_string(src, i)?;
                toks.push(tok);
                i = next;
            }
            b'0'..=b'9' => {
                let (n, next) = scan_number(src, i)?;
                toks.push(Tok::Num(n));
                i = next;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
                    i += 1;
                }
                toks.push(keyword_or_ident(&src[start..i]));
            }
            other => {
                return Err(format!("unexpected character '{}'", other as char));
            }
        }
    }

    Ok(toks)
}

fn keyword_or_ident(word: &str) -> Tok {
    match word {
        "return" => Tok::Return,
        "delete" => Tok::Delete,
        "if" => Tok::If,
        "elsif" => Tok::Elsif,
        "else" => Tok::Else,
        "eq" => Tok::StrEq,
        "ne" => Tok::StrNe,
        "lt" => Tok::StrLt,
        "gt" => Tok::StrGt,
        "le" => Tok::StrLe,
        "ge" => Tok::StrGe,
        _ => Tok::Ident(word.to_string()),
    }
}

fn scan_number(src: &str, start: usize) -> Result<(f64, usize), String> {
    let bytes = src.as_bytes();
    let mut i = start;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            b'.' if !seen_dot && !seen_exp => {
                // Stop before a concat dot: `1 . 2` vs `1.2`.
                if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) || i == start {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            b'e' | b'E' if !seen_exp && i > start => {
                let mut j = i + 1;
                if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
                    j += 1;
                }
                if bytes.get(j).is_some_and(|b| b.is_ascii_digit()) {
                    seen_exp = true;
                    i = j;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    src[start..i].parse::<f64>().map(|n| (n, i)).map_err(|e| format!("bad number literal '{}': {e}", &src[start..i]))
}

/// Single quotes are literal (only `\'` and `\\` escape); double quotes
/// process the usual `\n`, `\t`, `\r`, `\0`, `\"`, `\\` escapes.
fn scan_string(src: &str, start: usize) -> Result<(Tok, usize), String> {
    let bytes = src.as_bytes();
    let quote = bytes[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == quote {
            return Ok((Tok::Str(out), i + 1));
        }
        if c == b'\\' {
            let esc = bytes.get(i + 1).copied().ok_or("unterminated string literal")?;
            if quote == b'\'' {
                match esc {
                    b'\'' | b'\\' => out.push(esc as char),
                    _ => {
                        out.push('\\');
                        out.push(esc as char);
                    }
                }
            } else {
                match esc {
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    b'r' => out.push('\r'),
                    b'0' => out.push('\0'),
                    _ => out.push(esc as char),
                }
            }
            i += 2;
        } else {
            // Copy the full UTF-8 scalar, not just one byte.
            let ch = src[i..].chars().next().ok_or("unterminated string literal")?;
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Err("unterminated string literal".to_string())
}

fn scan_regex(src: &str, start: usize) -> Result<(Tok, usize), String> {
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'/' {
            i += 1;
            let mut ci = false;
            while let Some(flag) = bytes.get(i).filter(|b| b.is_ascii_alphabetic()) {
                match flag {
                    b'i' => ci = true,
                    other => return Err(format!("unsupported regex flag '{}'", *other as char)),
                }
                i += 1;
            }
            return Ok((Tok::Regex { src: out, ci }, i));
        }
        if c == b'\\' && i + 1 < bytes.len() {
            out.push('\\');
            out.push(bytes[i + 1] as char);
            i += 2;
        } else {
            let ch = src[i..].chars().next().ok_or("unterminated regex literal")?;
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Err("unterminated regex literal".to_string())
}
