//! Linear temporal logic formulas.
//!
//! The AST covers the usual boolean connectives plus the temporal operators
//! `X`, `F`, `G`, `U`, `W` and `R`. Verification works on the negation of
//! the property in negation normal form, where `F` and `G` are rewritten
//! into `U` and `R` and negations sit on atoms only.
//!
//! The concrete syntax is infix: `G(req -> F ack)`. Atomic propositions are
//! bare identifiers (letters, digits, `_` and `.`), or arbitrary text in
//! double quotes for propositions carrying comparison operators, e.g.
//! `G "count <= 2"`.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Formula {
    Atom(String),
    True,
    False,
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    /// X p: p holds in the next state.
    Next(Box<Formula>),
    /// F p: p holds eventually.
    Finally(Box<Formula>),
    /// G p: p holds forever.
    Globally(Box<Formula>),
    /// p U q: p holds until q does, and q eventually does.
    Until(Box<Formula>, Box<Formula>),
    /// p R q: q holds up to and including the first p, or forever.
    Release(Box<Formula>, Box<Formula>),
    /// p W q: p U q, or p forever.
    WeakUntil(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn atom(s: impl Into<String>) -> Self {
        Formula::Atom(s.into())
    }

    pub fn not(self) -> Self {
        Formula::Not(Box::new(self))
    }

    pub fn and(self, other: Self) -> Self {
        Formula::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Self) -> Self {
        Formula::Or(Box::new(self), Box::new(other))
    }

    pub fn implies(self, other: Self) -> Self {
        Formula::Implies(Box::new(self), Box::new(other))
    }

    pub fn next(self) -> Self {
        Formula::Next(Box::new(self))
    }

    pub fn finally(self) -> Self {
        Formula::Finally(Box::new(self))
    }

    pub fn globally(self) -> Self {
        Formula::Globally(Box::new(self))
    }

    pub fn until(self, other: Self) -> Self {
        Formula::Until(Box::new(self), Box::new(other))
    }

    pub fn release(self, other: Self) -> Self {
        Formula::Release(Box::new(self), Box::new(other))
    }

    pub fn weak_until(self, other: Self) -> Self {
        Formula::WeakUntil(Box::new(self), Box::new(other))
    }

    /// Negation normal form: negations on atoms only, `F`/`G`/`W`/`->`
    /// rewritten away. The result uses only atoms, constants, `And`, `Or`,
    /// `Not(Atom)`, `Next`, `Until` and `Release`.
    pub fn to_nnf(&self) -> Formula {
        match self {
            Formula::Atom(s) => Formula::atom(s),
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Not(p) => p.negate_to_nnf(),
            Formula::And(p, q) => p.to_nnf().and(q.to_nnf()),
            Formula::Or(p, q) => p.to_nnf().or(q.to_nnf()),
            Formula::Implies(p, q) => p.negate_to_nnf().or(q.to_nnf()),
            Formula::Next(p) => p.to_nnf().next(),
            // F p = true U p
            Formula::Finally(p) => Formula::True.until(p.to_nnf()),
            // G p = false R p
            Formula::Globally(p) => Formula::False.release(p.to_nnf()),
            Formula::Until(p, q) => p.to_nnf().until(q.to_nnf()),
            Formula::Release(p, q) => p.to_nnf().release(q.to_nnf()),
            // p W q = q R (q | p)
            Formula::WeakUntil(p, q) => {
                let q_nnf = q.to_nnf();
                q_nnf.clone().release(q_nnf.or(p.to_nnf()))
            }
        }
    }

    fn negate_to_nnf(&self) -> Formula {
        match self {
            Formula::Atom(s) => Formula::atom(s).not(),
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(p) => p.to_nnf(),
            Formula::And(p, q) => p.negate_to_nnf().or(q.negate_to_nnf()),
            Formula::Or(p, q) => p.negate_to_nnf().and(q.negate_to_nnf()),
            Formula::Implies(p, q) => p.to_nnf().and(q.negate_to_nnf()),
            Formula::Next(p) => p.negate_to_nnf().next(),
            // !F p = G !p
            Formula::Finally(p) => Formula::False.release(p.negate_to_nnf()),
            // !G p = F !p
            Formula::Globally(p) => Formula::True.until(p.negate_to_nnf()),
            // !(p U q) = !p R !q
            Formula::Until(p, q) => p.negate_to_nnf().release(q.negate_to_nnf()),
            // !(p R q) = !p U !q
            Formula::Release(p, q) => p.negate_to_nnf().until(q.negate_to_nnf()),
            // !(p W q) = !q U (!p & !q)
            Formula::WeakUntil(p, q) => {
                let not_q = q.negate_to_nnf();
                not_q.clone().until(p.negate_to_nnf().and(not_q))
            }
        }
    }

    /// Atomic proposition names, sorted and deduplicated.
    pub fn atoms(&self) -> Vec<String> {
        fn collect(f: &Formula, out: &mut BTreeSet<String>) {
            match f {
                Formula::Atom(s) => {
                    out.insert(s.clone());
                }
                Formula::True | Formula::False => {}
                Formula::Not(p) | Formula::Next(p) | Formula::Finally(p) | Formula::Globally(p) => {
                    collect(p, out)
                }
                Formula::And(p, q)
                | Formula::Or(p, q)
                | Formula::Implies(p, q)
                | Formula::Until(p, q)
                | Formula::Release(p, q)
                | Formula::WeakUntil(p, q) => {
                    collect(p, out);
                    collect(q, out);
                }
            }
        }
        let mut set = BTreeSet::new();
        collect(self, &mut set);
        set.into_iter().collect()
    }

    pub fn parse(text: &str) -> Result<Formula> {
        let mut parser = Parser::new(text)?;
        let f = parser.formula()?;
        match parser.tokens.front() {
            None => Ok(f),
            Some(tok) => Err(parser.fail_at(tok.offset, "trailing input")),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn needs_quotes(s: &str) -> bool {
            !s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        }
        match self {
            Formula::Atom(s) if needs_quotes(s) => write!(f, "\"{}\"", s),
            Formula::Atom(s) => write!(f, "{}", s),
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Not(p) => write!(f, "!{}", p.wrapped()),
            Formula::And(p, q) => write!(f, "{} & {}", p.wrapped(), q.wrapped()),
            Formula::Or(p, q) => write!(f, "{} | {}", p.wrapped(), q.wrapped()),
            Formula::Implies(p, q) => write!(f, "{} -> {}", p.wrapped(), q.wrapped()),
            Formula::Next(p) => write!(f, "X {}", p.wrapped()),
            Formula::Finally(p) => write!(f, "F {}", p.wrapped()),
            Formula::Globally(p) => write!(f, "G {}", p.wrapped()),
            Formula::Until(p, q) => write!(f, "{} U {}", p.wrapped(), q.wrapped()),
            Formula::Release(p, q) => write!(f, "{} R {}", p.wrapped(), q.wrapped()),
            Formula::WeakUntil(p, q) => write!(f, "{} W {}", p.wrapped(), q.wrapped()),
        }
    }
}

impl Formula {
    /// Parenthesized rendering for compound subformulas.
    fn wrapped(&self) -> String {
        match self {
            Formula::Atom(_) | Formula::True | Formula::False | Formula::Not(_) => {
                format!("{}", self)
            }
            _ => format!("({})", self),
        }
    }
}

#[derive(Debug)]
struct Token {
    offset: usize,
    kind: TokenKind,
}

#[derive(Debug, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Implies,
    Ident(String),
    Quoted(String),
}

struct Parser {
    /// Remaining tokens, consumed front to back.
    tokens: std::collections::VecDeque<Token>,
    len: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        let mut tokens = std::collections::VecDeque::new();
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i] as char;
            let offset = i;
            match c {
                ' ' | '\t' | '\n' => i += 1,
                '(' => {
                    tokens.push_back(Token { offset, kind: TokenKind::LParen });
                    i += 1;
                }
                ')' => {
                    tokens.push_back(Token { offset, kind: TokenKind::RParen });
                    i += 1;
                }
                '!' => {
                    tokens.push_back(Token { offset, kind: TokenKind::Not });
                    i += 1;
                }
                '&' => {
                    tokens.push_back(Token { offset, kind: TokenKind::And });
                    i += if bytes.get(i + 1) == Some(&b'&') { 2 } else { 1 };
                }
                '|' => {
                    tokens.push_back(Token { offset, kind: TokenKind::Or });
                    i += if bytes.get(i + 1) == Some(&b'|') { 2 } else { 1 };
                }
                '-' if bytes.get(i + 1) == Some(&b'>') => {
                    tokens.push_back(Token { offset, kind: TokenKind::Implies });
                    i += 2;
                }
                '"' => {
                    let start = i + 1;
                    let Some(end) = text[start..].find('"').map(|p| start + p) else {
                        return Err(Error::FormulaParse {
                            offset,
                            msg: "unterminated quoted proposition".to_string(),
                        });
                    };
                    tokens.push_back(Token {
                        offset,
                        kind: TokenKind::Quoted(text[start..end].to_string()),
                    });
                    i = end + 1;
                }
                c if c.is_alphanumeric() || c == '_' => {
                    let start = i;
                    while i < bytes.len() {
                        let c = bytes[i] as char;
                        if c.is_alphanumeric() || c == '_' || c == '.' {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    tokens.push_back(Token {
                        offset,
                        kind: TokenKind::Ident(text[start..i].to_string()),
                    });
                }
                other => {
                    return Err(Error::FormulaParse {
                        offset,
                        msg: format!("unexpected character `{}`", other),
                    });
                }
            }
        }
        Ok(Self { tokens, len: text.len() })
    }

    fn fail_at(&self, offset: usize, msg: impl Into<String>) -> Error {
        Error::FormulaParse { offset, msg: msg.into() }
    }

    fn fail_eof(&self, msg: impl Into<String>) -> Error {
        Error::FormulaParse { offset: self.len, msg: msg.into() }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        match self.tokens.front() {
            Some(Token { kind: TokenKind::Ident(s), .. }) if s == name => {
                self.tokens.pop_front();
                true
            }
            _ => false,
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        match self.tokens.front() {
            Some(tok) if tok.kind == kind => {
                self.tokens.pop_front();
                true
            }
            _ => false,
        }
    }

    // Grammar, loosest binding first:
    //   formula := or ('->' formula)?
    //   or      := and ('|' and)*
    //   and     := until ('&' until)*
    //   until   := unary (('U'|'W'|'R') until)?
    //   unary   := ('!'|'X'|'F'|'G') unary | primary
    fn formula(&mut self) -> Result<Formula> {
        let lhs = self.or()?;
        if self.eat(TokenKind::Implies) {
            let rhs = self.formula()?;
            return Ok(lhs.implies(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Formula> {
        let mut lhs = self.and()?;
        while self.eat(TokenKind::Or) {
            lhs = lhs.or(self.and()?);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Formula> {
        let mut lhs = self.until()?;
        while self.eat(TokenKind::And) {
            lhs = lhs.and(self.until()?);
        }
        Ok(lhs)
    }

    fn until(&mut self) -> Result<Formula> {
        let lhs = self.unary()?;
        if self.eat_ident("U") {
            return Ok(lhs.until(self.until()?));
        }
        if self.eat_ident("W") {
            return Ok(lhs.weak_until(self.until()?));
        }
        if self.eat_ident("R") {
            return Ok(lhs.release(self.until()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Formula> {
        if self.eat(TokenKind::Not) {
            return Ok(self.unary()?.not());
        }
        if self.eat_ident("X") {
            return Ok(self.unary()?.next());
        }
        if self.eat_ident("F") {
            return Ok(self.unary()?.finally());
        }
        if self.eat_ident("G") {
            return Ok(self.unary()?.globally());
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Formula> {
        let Some(tok) = self.tokens.pop_front() else {
            return Err(self.fail_eof("unexpected end of formula"));
        };
        match tok.kind {
            TokenKind::LParen => {
                let f = self.formula()?;
                if !self.eat(TokenKind::RParen) {
                    return Err(self.fail_at(tok.offset, "unclosed `(`"));
                }
                Ok(f)
            }
            TokenKind::Ident(s) if s == "true" || s == "1" => Ok(Formula::True),
            TokenKind::Ident(s) if s == "false" || s == "0" => Ok(Formula::False),
            TokenKind::Ident(s) => Ok(Formula::Atom(s)),
            TokenKind::Quoted(s) => Ok(Formula::Atom(s)),
            other => Err(self.fail_at(tok.offset, format!("unexpected token `{:?}`", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precedence() {
        let f = Formula::parse("G(req -> F ack)").unwrap();
        let expected = Formula::atom("req")
            .implies(Formula::atom("ack").finally())
            .globally();
        assert_eq!(f, expected);
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let f = Formula::parse("a | b & c").unwrap();
        let expected = Formula::atom("a").or(Formula::atom("b").and(Formula::atom("c")));
        assert_eq!(f, expected);
    }

    #[test]
    fn test_parse_quoted_atom() {
        let f = Formula::parse("F \"count >= 3\"").unwrap();
        assert_eq!(f, Formula::atom("count >= 3").finally());
    }

    #[test]
    fn test_parse_until_right_assoc() {
        let f = Formula::parse("a U b U c").unwrap();
        let expected =
            Formula::atom("a").until(Formula::atom("b").until(Formula::atom("c")));
        assert_eq!(f, expected);
    }

    #[test]
    fn test_parse_error_has_offset() {
        match Formula::parse("G (a ->") {
            Err(Error::FormulaParse { offset, .. }) => assert_eq!(offset, 7),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_nnf_pushes_negations_to_atoms() {
        let f = Formula::parse("!(G(a -> F b))").unwrap();
        let nnf = f.to_nnf();
        // !G(a -> F b) = F(a & G !b) = true U (a & (false R !b))
        let expected = Formula::True.until(
            Formula::atom("a").and(Formula::False.release(Formula::atom("b").not())),
        );
        assert_eq!(nnf, expected);
    }

    #[test]
    fn test_atoms_sorted() {
        let f = Formula::parse("b U (a & c)").unwrap();
        assert_eq!(f.atoms(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_display_roundtrip() {
        let f = Formula::parse("G(\"n >= 1\" -> X done)").unwrap();
        let printed = f.to_string();
        assert_eq!(Formula::parse(&printed).unwrap(), f);
    }
}
