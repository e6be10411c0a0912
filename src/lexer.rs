//! Lexer for kscope source text.
//!
//! Produces one [`Token`] at a time; the parser holds a single token of
//! lookahead and never pushes one back. Whitespace and `#` line comments are
//! skipped between tokens.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Half-open range of character offsets into the source, used to attach
/// diagnostics to the text that produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Token payloads.
///
/// Keywords get their own variants; every other single character (parentheses,
/// commas, operator characters, and anything a user might later declare as an
/// operator) surfaces as [`TokenKind::Op`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Ident(String),
    Number(f64),
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Unary,
    Binary,
    Var,
    Op(char),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Number(value) => write!(f, "number {}", value),
            TokenKind::Def => write!(f, "'def'"),
            TokenKind::Extern => write!(f, "'extern'"),
            TokenKind::If => write!(f, "'if'"),
            TokenKind::Then => write!(f, "'then'"),
            TokenKind::Else => write!(f, "'else'"),
            TokenKind::For => write!(f, "'for'"),
            TokenKind::In => write!(f, "'in'"),
            TokenKind::Unary => write!(f, "'unary'"),
            TokenKind::Binary => write!(f, "'binary'"),
            TokenKind::Var => write!(f, "'var'"),
            TokenKind::Op(ch) => write!(f, "'{}'", ch),
        }
    }
}

/// A token together with the source range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Error)]
pub enum LexError {
    #[error("malformed number literal '{literal}'")]
    MalformedNumber { literal: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::MalformedNumber { span, .. } => *span,
        }
    }
}

/// Streaming tokenizer over a source string.
pub struct Lexer<'src> {
    chars: Peekable<Chars<'src>>,
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars().peekable(),
            pos: 0,
        }
    }

    /// Returns the next token. At end of input this yields
    /// [`TokenKind::Eof`] and keeps yielding it on every subsequent call.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let ch = match self.advance() {
            Some(ch) => ch,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                })
            }
        };

        if ch.is_ascii_alphabetic() {
            return Ok(self.identifier_or_keyword(ch, start));
        }

        if ch.is_ascii_digit() || ch == '.' {
            return self.number(ch, start);
        }

        Ok(Token {
            kind: TokenKind::Op(ch),
            span: Span::new(start, self.pos),
        })
    }

    /// Identifiers are `[a-zA-Z][a-zA-Z0-9]*`; underscores are not part of
    /// the surface language.
    fn identifier_or_keyword(&mut self, first: char, start: usize) -> Token {
        let mut ident = String::new();
        ident.push(first);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match ident.as_str() {
            "def" => TokenKind::Def,
            "extern" => TokenKind::Extern,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "unary" => TokenKind::Unary,
            "binary" => TokenKind::Binary,
            "var" => TokenKind::Var,
            _ => TokenKind::Ident(ident),
        };

        Token {
            kind,
            span: Span::new(start, self.pos),
        }
    }

    /// Number literals are one contiguous run of digits and dots. The run is
    /// collected lexically and validated as a whole, so `1.2.3` is a single
    /// malformed literal rather than a number followed by stray characters.
    fn number(&mut self, first: char, start: usize) -> Result<Token, LexError> {
        let mut literal = String::new();
        literal.push(first);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                literal.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let span = Span::new(start, self.pos);
        let value = literal
            .parse::<f64>()
            .map_err(|_| LexError::MalformedNumber { literal, span })?;

        Ok(Token {
            kind: TokenKind::Number(value),
            span,
        })
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    // Line comment: runs to end of line.
                    while let Some(ch) = self.advance() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }
}
