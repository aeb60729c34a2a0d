//! Recursive-descent parser for the filter grammar (spec §4.A):
//!
//! ```text
//! filter := or ('|' or)*
//! or     := and ('&' and)*
//! and    := ['!'] atom
//! atom   := identifier | identifier op value | '(' filter ')'
//! ```
//!
//! Precedence from loosest to tightest is `|` (or) > `&` (and) > `!` (not) >
//! atom, regardless of how the production names map onto that in the
//! grammar above.

use crate::ast::{CompareOp, Filter};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::percent::percent_decode;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter parse error at line {}, column {} (offset {}): {}",
            self.line, self.col, self.offset, self.message
        )
    }
}

impl std::error::Error for ParseError {}

pub fn parse(input: &str) -> Result<Filter, ParseError> {
    let mut parser = Parser {
        lexer: Lexer::new(input),
        current: None,
    };
    parser.bump();
    let filter = parser.parse_or_chain()?;
    parser.expect_end()?;
    Ok(filter)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Option<Token>,
}

impl<'a> Parser<'a> {
    fn bump(&mut self) -> Token {
        let next = self.lexer.next_token();
        self.current.replace(next).unwrap_or_else(|| self.peek_owned())
    }

    fn peek_owned(&self) -> Token {
        self.current.clone().expect("current token not primed")
    }

    fn peek(&self) -> &Token {
        self.current.as_ref().expect("current token not primed")
    }

    fn err(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError {
            line: tok.line,
            col: tok.col,
            offset: tok.offset,
            message: message.into(),
        }
    }

    // Top-level: `|`-separated terms, each itself `&`-separated.
    fn parse_or_chain(&mut self) -> Result<Filter, ParseError> {
        let mut terms = vec![self.parse_and_chain()?];
        while matches!(self.peek().kind, TokenKind::Or) {
            self.bump();
            terms.push(self.parse_and_chain()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Filter::Or(terms)
        })
    }

    fn parse_and_chain(&mut self) -> Result<Filter, ParseError> {
        let mut terms = vec![self.parse_negatable_atom()?];
        while matches!(self.peek().kind, TokenKind::And) {
            self.bump();
            terms.push(self.parse_negatable_atom()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Filter::And(terms)
        })
    }

    fn parse_negatable_atom(&mut self) -> Result<Filter, ParseError> {
        if matches!(self.peek().kind, TokenKind::Not) {
            self.bump();
            let inner = self.parse_negatable_atom()?;
            return Ok(Filter::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Filter, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_or_chain()?;
                match self.peek().kind {
                    TokenKind::RParen => {
                        self.bump();
                        Ok(inner)
                    }
                    _ => Err(self.err(self.peek(), "expected closing ')'")),
                }
            }
            TokenKind::Text(key) => {
                self.bump();
                let key = percent_decode(&key);
                if let Some(op) = compare_op(&self.peek().kind) {
                    self.bump();
                    let value_tok = self.peek().clone();
                    match value_tok.kind {
                        TokenKind::Text(value) => {
                            self.bump();
                            Ok(Filter::Compare(key, op, percent_decode(&value)))
                        }
                        _ => Err(self.err(&value_tok, "expected a value after comparison operator")),
                    }
                } else {
                    Ok(Filter::Exists(key))
                }
            }
            TokenKind::RParen => Err(self.err(&tok, "unexpected ')'")),
            TokenKind::End => Err(self.err(&tok, "unexpected end of filter expression")),
            _ => Err(self.err(&tok, "expected an identifier or '('")),
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.peek().kind {
            TokenKind::End => Ok(()),
            TokenKind::RParen => Err(self.err(self.peek(), "unmatched closing ')'")),
            _ => Err(self.err(self.peek(), "trailing input after filter expression")),
        }
    }
}

fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
    match kind {
        TokenKind::Eq => Some(CompareOp::Eq),
        TokenKind::Ne => Some(CompareOp::Ne),
        TokenKind::Like => Some(CompareOp::Like),
        TokenKind::NotLike => Some(CompareOp::NotLike),
        TokenKind::Lt => Some(CompareOp::Lt),
        TokenKind::Le => Some(CompareOp::Le),
        TokenKind::Gt => Some(CompareOp::Gt),
        TokenKind::Ge => Some(CompareOp::Ge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_identifier_as_exists() {
        assert_eq!(parse("maintenance").unwrap(), Filter::Exists("maintenance".into()));
    }

    #[test]
    fn parses_equality() {
        assert_eq!(
            parse("state=ok").unwrap(),
            Filter::Compare("state".into(), CompareOp::Eq, "ok".into())
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = parse("a=1&b=2|c=3").unwrap();
        assert_eq!(
            parsed,
            Filter::Or(vec![
                Filter::And(vec![
                    Filter::Compare("a".into(), CompareOp::Eq, "1".into()),
                    Filter::Compare("b".into(), CompareOp::Eq, "2".into()),
                ]),
                Filter::Compare("c".into(), CompareOp::Eq, "3".into()),
            ])
        );
    }

    #[test]
    fn not_binds_to_single_atom() {
        let parsed = parse("!a=1&b=2").unwrap();
        assert_eq!(
            parsed,
            Filter::And(vec![
                Filter::Not(Box::new(Filter::Compare("a".into(), CompareOp::Eq, "1".into()))),
                Filter::Compare("b".into(), CompareOp::Eq, "2".into()),
            ])
        );
    }

    #[test]
    fn parses_parenthesized_group() {
        let parsed = parse("(a=1|b=2)&c=3").unwrap();
        assert_eq!(
            parsed,
            Filter::And(vec![
                Filter::Or(vec![
                    Filter::Compare("a".into(), CompareOp::Eq, "1".into()),
                    Filter::Compare("b".into(), CompareOp::Eq, "2".into()),
                ]),
                Filter::Compare("c".into(), CompareOp::Eq, "3".into()),
            ])
        );
    }

    #[test]
    fn rejects_unmatched_opening_paren() {
        let err = parse("(a=1").unwrap_err();
        assert!(err.message.contains("closing"));
    }

    #[test]
    fn rejects_unmatched_closing_paren() {
        let err = parse("a=1)").unwrap_err();
        assert!(err.message.contains(')'));
    }

    #[test]
    fn rejects_dangling_operator() {
        let err = parse("a=").unwrap_err();
        assert!(err.message.contains("value"));
    }

    #[test]
    fn decodes_percent_escapes_during_parse() {
        assert_eq!(
            parse("col%7Cumn=val%7Cue").unwrap(),
            Filter::Compare("col|umn".into(), CompareOp::Eq, "val|ue".into())
        );
    }
}
