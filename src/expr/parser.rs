//! Statement and expression parser for the lowered rule language.
//!
//! The grammar is a deliberately small Perl subset:
//!
//! ```text
//! program   := stmt (';' stmt)* [';']
//! stmt      := 'return' [expr]
//!            | 'delete' stash-lvalue
//!            | 'if' '(' expr ')' block ('elsif' '(' expr ')' block)* ['else' block]
//!            | stash-lvalue assign-op expr
//!            | expr
//! expr      := ternary over || && over (in)equality, relational, match,
//!              additive (+ - .), multiplicative (* / %), unary (! -),
//!              postfix ++/-- on stash lvalues, primaries
//! ```
//!
//! `stash("name")` calls (produced by the lowering pass from `~name`) are
//! recognized structurally and become lvalues; everything else named is a
//! host builtin call resolved at evaluation time.

use super::lexer::Tok;
use super::value::Pat;

pub(crate) type Program = Vec<Stmt>;

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(Expr),
    Assign { name: String, op: AssignOp, value: Expr },
    Delete { name: String },
    Return(Option<Expr>),
    If { arms: Vec<(Expr, Program)>, fallback: Program },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    StrEq,
    StrNe,
    StrLt,
    StrLe,
    StrGt,
    StrGe,
    Match,
    NotMatch,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Num(f64),
    Str(String),
    Regex(Pat),
    StashGet(String),
    /// `++`/`--` on a stash variable. `by` is +1 or -1.
    Incr { name: String, by: f64, postfix: bool },
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
}

/// Parse a whole program. Errors carry a plain message for the rule-compile
/// wrapper.
pub(crate) fn parse_program(toks: &[Tok]) -> Result<Program, String> {
    let mut p = Parser { toks, pos: 0 };
    let prog = p.program(false)?;
    if p.pos != p.toks.len() {
        return Err(format!("unexpected trailing {:?}", p.toks[p.pos]));
    }
    Ok(prog)
}

struct Parser<'t> {
    toks: &'t [Tok],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Tok> {
        let t = self.toks.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), String> {
        if self.eat(tok) { Ok(()) } else { Err(format!("expected {what}, found {:?}", self.peek())) }
    }

    /// `inside_block` stops the statement list at a closing brace.
    fn program(&mut self, inside_block: bool) -> Result<Program, String> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Tok::Semi) {}
            match self.peek() {
                None => break,
                Some(Tok::RBrace) if inside_block => break,
                _ => {}
            }
            stmts.push(self.statement()?);
            let after_block = matches!(stmts.last(), Some(Stmt::If { .. }));
            match self.peek() {
                None => break,
                Some(Tok::RBrace) if inside_block => break,
                Some(Tok::Semi) => continue,
                // A block statement needs no ';' before the next statement.
                _ if after_block => continue,
                other => return Err(format!("expected ';' between statements, found {other:?}")),
            }
        }
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Program, String> {
        self.expect(&Tok::LBrace, "'{'")?;
        let body = self.program(true)?;
        self.expect(&Tok::RBrace, "'}'")?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Some(Tok::Return) => {
                self.bump();
                match self.peek() {
                    None | Some(Tok::Semi) | Some(Tok::RBrace) => Ok(Stmt::Return(None)),
                    _ => Ok(Stmt::Return(Some(self.expr()?))),
                }
            }
            Some(Tok::Delete) => {
                self.bump();
                match self.primary()? {
                    Expr::StashGet(name) => Ok(Stmt::Delete { name }),
                    other => Err(format!("delete needs a stash variable, found {other:?}")),
                }
            }
            Some(Tok::If) => self.if_statement(),
            _ => {
                let expr = self.expr()?;
                let op = match self.peek() {
                    Some(Tok::Assign) => Some(AssignOp::Set),
                    Some(Tok::PlusAssign) => Some(AssignOp::Add),
                    Some(Tok::MinusAssign) => Some(AssignOp::Sub),
                    Some(Tok::StarAssign) => Some(AssignOp::Mul),
                    Some(Tok::SlashAssign) => Some(AssignOp::Div),
                    Some(Tok::DotAssign) => Some(AssignOp::Concat),
                    _ => None,
                };
                match op {
                    None => Ok(Stmt::Expr(expr)),
                    Some(op) => {
                        self.bump();
                        let value = self.expr()?;
                        match expr {
                            Expr::StashGet(name) => Ok(Stmt::Assign { name, op, value }),
                            other => Err(format!("only stash variables are assignable, found {other:?}")),
                        }
                    }
                }
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, String> {
        self.expect(&Tok::If, "'if'")?;
        let mut arms = Vec::new();
        self.expect(&Tok::LParen, "'(' after if")?;
        let cond = self.expr()?;
        self.expect(&Tok::RParen, "')'")?;
        arms.push((cond, self.block()?));
        let mut fallback = Vec::new();
        loop {
            if self.eat(&Tok::Elsif) {
                self.expect(&Tok::LParen, "'(' after elsif")?;
                let cond = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                arms.push((cond, self.block()?));
            } else if self.eat(&Tok::Else) {
                fallback = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { arms, fallback })
    }

    fn expr(&mut self) -> Result<Expr, String> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr, String> {
        let cond = self.or_expr()?;
        if self.eat(&Tok::Question) {
            let then = self.expr()?;
            self.expect(&Tok::Colon, "':' in ternary")?;
            let alt = self.expr()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(alt)))
        } else {
            Ok(cond)
        }
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Tok::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.equality()?;
        while self.eat(&Tok::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, String> {
        let lhs = self.relational()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinOp::NumEq,
            Some(Tok::BangEq) => BinOp::NumNe,
            Some(Tok::StrEq) => BinOp::StrEq,
            Some(Tok::StrNe) => BinOp::StrNe,
            Some(Tok::Match) => BinOp::Match,
            Some(Tok::NotMatch) => BinOp::NotMatch,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.relational()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn relational(&mut self) -> Result<Expr, String> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Tok::Lt) => BinOp::NumLt,
            Some(Tok::Le) => BinOp::NumLe,
            Some(Tok::Gt) => BinOp::NumGt,
            Some(Tok::Ge) => BinOp::NumGe,
            Some(Tok::StrLt) => BinOp::StrLt,
            Some(Tok::StrLe) => BinOp::StrLe,
            Some(Tok::StrGt) => BinOp::StrGt,
            Some(Tok::StrGe) => BinOp::StrGe,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                Some(Tok::Dot) => BinOp::Concat,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Tok::Bang) => {
                self.bump();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.unary()?)))
            }
            Some(Tok::Minus) => {
                self.bump();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary()?)))
            }
            Some(Tok::PlusPlus) | Some(Tok::MinusMinus) => {
                let by = if self.peek() == Some(&Tok::PlusPlus) { 1.0 } else { -1.0 };
                self.bump();
                match self.postfix()? {
                    Expr::StashGet(name) => Ok(Expr::Incr { name, by, postfix: false }),
                    other => Err(format!("'++'/'--' need a stash variable, found {other:?}")),
                }
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let inner = self.primary()?;
        let by = match self.peek() {
            Some(Tok::PlusPlus) => 1.0,
            Some(Tok::MinusMinus) => -1.0,
            _ => return Ok(inner),
        };
        self.bump();
        match inner {
            Expr::StashGet(name) => Ok(Expr::Incr { name, by, postfix: true }),
            other => Err(format!("'++'/'--' need a stash variable, found {other:?}")),
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Expr::Num(*n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Tok::Regex { src, ci }) => {
                let pat = Pat::new(src, *ci).map_err(|e| format!("bad regex literal /{src}/: {e}"))?;
                Ok(Expr::Regex(pat))
            }
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => {
                if self.eat(&Tok::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(&Tok::Comma) {
                                continue;
                            }
                            self.expect(&Tok::RParen, "')' after arguments")?;
                            break;
                        }
                    }
                    // `stash("name")` is the lowered form of `~name`; make it
                    // an lvalue when the name is a literal.
                    if name == "stash" && args.len() == 1 {
                        if let Expr::Str(stash_name) = &args[0] {
                            return Ok(Expr::StashGet(stash_name.clone()));
                        }
                    }
                    Ok(Expr::Call { name: name.clone(), args })
                } else {
                    Err(format!("bare identifier '{name}' (did you mean '{name}(...)'?)"))
                }
            }
            other => Err(format!("unexpected {other:?} in expression")),
        }
    }
}
