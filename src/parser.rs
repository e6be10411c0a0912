//! Recursive-descent parser with one token of lookahead.
//!
//! Binary expressions use precedence climbing over a dynamic operator table:
//! `binary`/`unary` prototypes extend the table at parse time, which is what
//! makes user-defined operators usable by every later expression (including
//! the body of their own definition).

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ast::{Expr, Function, Item, Prototype, PrototypeKind};
use crate::lexer::{LexError, Lexer, Span, Token, TokenKind};

/// Dynamic operator registry: binary precedences plus the set of declared
/// unary operators. Precedences are positive; entries persist for the rest
/// of the session once the declaring unit has parsed successfully.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    binary: HashMap<char, u32>,
    unary: HashSet<char>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        // Built-ins, lowest to highest binding strength. Assignment is an
        // ordinary binary operator at parse time and is special-cased only
        // during code generation.
        let mut binary = HashMap::new();
        binary.insert('=', 2);
        binary.insert('<', 10);
        binary.insert('+', 20);
        binary.insert('-', 20);
        binary.insert('*', 40);
        Self {
            binary,
            unary: HashSet::new(),
        }
    }
}

impl OperatorTable {
    /// Precedence of `op`, if it is a known binary operator.
    pub fn binary_precedence(&self, op: char) -> Option<u32> {
        self.binary.get(&op).copied()
    }

    /// Whether `op` has been declared as a unary operator.
    pub fn is_unary(&self, op: char) -> bool {
        self.unary.contains(&op)
    }

    fn set_binary(&mut self, op: char, precedence: u32) -> Option<u32> {
        self.binary.insert(op, precedence)
    }

    fn restore_binary(&mut self, op: char, previous: Option<u32>) {
        match previous {
            Some(precedence) => {
                self.binary.insert(op, precedence);
            }
            None => {
                self.binary.remove(&op);
            }
        }
    }

    fn set_unary(&mut self, op: char) -> bool {
        self.unary.insert(op)
    }

    fn restore_unary(&mut self, op: char, newly_added: bool) {
        if newly_added {
            self.unary.remove(&op);
        }
    }
}

/// Parser state that outlives a single input: the operator table and the
/// counter minting unique names for anonymous top-level expressions. One
/// `Session` spans one REPL-style run; each input chunk gets its own
/// [`Parser`] borrowing the session.
pub struct Session {
    pub operators: OperatorTable,
    next_anon: usize,
}

impl Session {
    pub fn new() -> Self {
        Self {
            operators: OperatorTable::default(),
            next_anon: 0,
        }
    }

    fn fresh_anon_name(&mut self) -> String {
        let name = format!("__anon_expr_{}", self.next_anon);
        self.next_anon += 1;
        name
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        span: Span,
    },
    #[error("expected an expression, found {found}")]
    ExpectedExpression { found: TokenKind, span: Span },
    #[error("operator precedence must be a whole number between 1 and 100, got {value}")]
    InvalidPrecedence { value: f64, span: Span },
    #[error("'{keyword}' prototype expects {expected} parameter(s), found {found}")]
    OperatorArity {
        keyword: &'static str,
        expected: usize,
        found: usize,
        span: Span,
    },
}

impl ParseError {
    /// The source range a diagnostic should point at.
    pub fn span(&self) -> Span {
        match self {
            ParseError::Lex(err) => err.span(),
            ParseError::UnexpectedToken { span, .. }
            | ParseError::ExpectedExpression { span, .. }
            | ParseError::InvalidPrecedence { span, .. }
            | ParseError::OperatorArity { span, .. } => *span,
        }
    }
}

/// Record of an operator-table mutation made while parsing a prototype, kept
/// so a failed definition can restore the table's previous state.
enum Registration {
    None,
    Binary { op: char, previous: Option<u32> },
    Unary { op: char, newly_added: bool },
}

pub struct Parser<'src, 'sess> {
    lexer: Lexer<'src>,
    cur: Token,
    pending: Option<ParseError>,
    session: &'sess mut Session,
}

impl<'src, 'sess> Parser<'src, 'sess> {
    /// Construction never fails. When the very first token is malformed, the
    /// error is held back and surfaced by the first [`Parser::parse_item`]
    /// call, so drivers recover from it the same way as from any other
    /// failed unit.
    pub fn new(source: &'src str, session: &'sess mut Session) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            cur: Token {
                kind: TokenKind::Eof,
                span: Span::new(0, 0),
            },
            pending: None,
            session,
        };
        if let Err(err) = parser.advance() {
            parser.pending = Some(err);
        }
        parser
    }

    /// Parses the next top-level unit, or `None` at end of input. Stray `;`
    /// separators between units are consumed and ignored.
    pub fn parse_item(&mut self) -> Result<Option<Item>, ParseError> {
        if let Some(err) = self.pending.take() {
            // The lexer is already past the malformed characters; pull the
            // token after them so later units stay reachable.
            if let Err(next) = self.advance() {
                self.pending = Some(next);
            }
            return Err(err);
        }
        loop {
            match self.cur.kind {
                TokenKind::Eof => return Ok(None),
                TokenKind::Op(';') => self.advance()?,
                TokenKind::Def => return self.parse_definition().map(Some),
                TokenKind::Extern => return self.parse_extern().map(Some),
                _ => return self.parse_toplevel_expression().map(Some),
            }
        }
    }

    /// Drops tokens until the start of a plausible next unit (`def`,
    /// `extern`, a `;` separator, or end of input). Used by drivers to move
    /// past a failed unit; the parser itself never resynchronizes.
    pub fn skip_to_next_item(&mut self) {
        loop {
            match self.cur.kind {
                TokenKind::Eof | TokenKind::Def | TokenKind::Extern | TokenKind::Op(';') => return,
                // Malformed lexemes encountered while skipping are dropped
                // too; the lexer has already consumed their characters.
                _ => {
                    let _ = self.advance();
                }
            }
        }
    }

    /// definition := 'def' prototype expression
    ///
    /// An operator prototype registers itself before the body parse so the
    /// operator works recursively inside its own definition. If the body
    /// then fails to parse, the registration is rolled back and the table is
    /// exactly as the unit found it.
    fn parse_definition(&mut self) -> Result<Item, ParseError> {
        self.advance()?; // consume 'def'
        let (proto, registration) = self.parse_prototype()?;
        match self.parse_expression() {
            Ok(body) => Ok(Item::Definition(Function { proto, body })),
            Err(err) => {
                self.rollback(registration);
                Err(err)
            }
        }
    }

    /// external := 'extern' prototype
    ///
    /// The prototype is the whole unit, so a successful parse commits any
    /// operator registration immediately.
    fn parse_extern(&mut self) -> Result<Item, ParseError> {
        self.advance()?; // consume 'extern'
        let (proto, _registration) = self.parse_prototype()?;
        Ok(Item::Extern(proto))
    }

    fn parse_toplevel_expression(&mut self) -> Result<Item, ParseError> {
        let body = self.parse_expression()?;
        let proto = Prototype {
            name: self.session.fresh_anon_name(),
            params: Vec::new(),
            kind: PrototypeKind::Function,
        };
        Ok(Item::Expression(Function { proto, body }))
    }

    /// prototype := identifier '(' identifier* ')'
    ///            | 'unary' CHAR '(' identifier ')'
    ///            | 'binary' CHAR NUMBER '(' identifier identifier ')'
    fn parse_prototype(&mut self) -> Result<(Prototype, Registration), ParseError> {
        match self.cur.kind.clone() {
            TokenKind::Ident(name) => {
                self.advance()?;
                let params = self.parse_parameter_list()?;
                let proto = Prototype {
                    name,
                    params,
                    kind: PrototypeKind::Function,
                };
                Ok((proto, Registration::None))
            }
            TokenKind::Unary => {
                self.advance()?;
                let op = self.expect_operator_char()?;
                let list_span = self.cur.span;
                let params = self.parse_parameter_list()?;
                if params.len() != 1 {
                    return Err(ParseError::OperatorArity {
                        keyword: "unary",
                        expected: 1,
                        found: params.len(),
                        span: list_span,
                    });
                }
                let newly_added = self.session.operators.set_unary(op);
                let proto = Prototype {
                    name: format!("unary{}", op),
                    params,
                    kind: PrototypeKind::UnaryOp(op),
                };
                Ok((proto, Registration::Unary { op, newly_added }))
            }
            TokenKind::Binary => {
                self.advance()?;
                let op = self.expect_operator_char()?;
                let precedence = self.parse_precedence()?;
                let list_span = self.cur.span;
                let params = self.parse_parameter_list()?;
                if params.len() != 2 {
                    return Err(ParseError::OperatorArity {
                        keyword: "binary",
                        expected: 2,
                        found: params.len(),
                        span: list_span,
                    });
                }
                let previous = self.session.operators.set_binary(op, precedence);
                let proto = Prototype {
                    name: format!("binary{}", op),
                    params,
                    kind: PrototypeKind::BinaryOp { op, precedence },
                };
                Ok((proto, Registration::Binary { op, previous }))
            }
            _ => Err(self.unexpected("a function name, 'unary', or 'binary'")),
        }
    }

    fn rollback(&mut self, registration: Registration) {
        match registration {
            Registration::None => {}
            Registration::Binary { op, previous } => {
                self.session.operators.restore_binary(op, previous);
            }
            Registration::Unary { op, newly_added } => {
                self.session.operators.restore_unary(op, newly_added);
            }
        }
    }

    /// '(' identifier* ')'; prototype parameters are space-separated.
    fn parse_parameter_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_op('(', "'(' before the parameter list")?;
        let mut params = Vec::new();
        while let TokenKind::Ident(name) = &self.cur.kind {
            params.push(name.clone());
            self.advance()?;
        }
        self.expect_op(')', "')' after the parameter list")?;
        Ok(params)
    }

    /// The precedence literal of a `binary` prototype: a whole number in
    /// 1..=100.
    fn parse_precedence(&mut self) -> Result<u32, ParseError> {
        match self.cur.kind {
            TokenKind::Number(value) => {
                if value.fract() != 0.0 || !(1.0..=100.0).contains(&value) {
                    return Err(ParseError::InvalidPrecedence {
                        value,
                        span: self.cur.span,
                    });
                }
                self.advance()?;
                Ok(value as u32)
            }
            _ => Err(self.unexpected("an operator precedence")),
        }
    }

    /// expression := unary (OP unary)*
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(1, lhs)
    }

    /// Precedence climbing: consume operators while their precedence is at
    /// least `min_precedence`. Ties associate to the left; the right operand
    /// only absorbs operators that bind strictly tighter.
    fn parse_binary_rhs(&mut self, min_precedence: u32, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            let (op, precedence) = match self.cur.kind {
                TokenKind::Op(op) => match self.session.operators.binary_precedence(op) {
                    Some(p) if p >= min_precedence => (op, p),
                    _ => break,
                },
                _ => break,
            };
            self.advance()?;

            let mut rhs = self.parse_unary()?;
            if self
                .current_binary_precedence()
                .is_some_and(|next| next > precedence)
            {
                rhs = self.parse_binary_rhs(precedence + 1, rhs)?;
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// unary := OPCHAR unary | primary
    ///
    /// Only declared unary operators start a unary application; everything
    /// else falls through to primary parsing. `(` and `,` never apply as
    /// unary operators, or grouping and argument lists would stop parsing.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let TokenKind::Op(op) = self.cur.kind {
            if op != '(' && op != ',' && self.session.operators.is_unary(op) {
                self.advance()?;
                let operand = self.parse_unary()?;
                return Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                });
            }
        }
        self.parse_primary()
    }

    /// primary := NUMBER | identifier | identifier '(' args ')'
    ///          | '(' expression ')' | ifexpr | forexpr | varexpr
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.cur.kind.clone() {
            TokenKind::Number(value) => {
                self.advance()?;
                Ok(Expr::Number(value))
            }
            TokenKind::Ident(name) => {
                self.advance()?;
                if self.check_op('(') {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::Op('(') => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect_op(')', "')' to close the parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Var => self.parse_var(),
            _ => Err(ParseError::ExpectedExpression {
                found: self.cur.kind.clone(),
                span: self.cur.span,
            }),
        }
    }

    /// Call arguments: '(' (expression (',' expression)*)? ')'.
    fn parse_call(&mut self, callee: String) -> Result<Expr, ParseError> {
        self.advance()?; // consume '('
        let mut args = Vec::new();
        if !self.check_op(')') {
            loop {
                args.push(self.parse_expression()?);
                if self.check_op(',') {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect_op(')', "')' after call arguments")?;
        Ok(Expr::Call { callee, args })
    }

    /// ifexpr := 'if' expression 'then' expression 'else' expression
    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // consume 'if'
        let cond = self.parse_expression()?;
        self.expect_kind(TokenKind::Then, "'then' after the condition")?;
        let then_expr = self.parse_expression()?;
        self.expect_kind(TokenKind::Else, "'else' after the then-branch")?;
        let else_expr = self.parse_expression()?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// forexpr := 'for' identifier '=' expr ',' expr (',' expr)? 'in' expr
    fn parse_for(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // consume 'for'
        let var = self.expect_identifier("a loop variable name")?;
        self.expect_op('=', "'=' after the loop variable")?;
        let start = self.parse_expression()?;
        self.expect_op(',', "',' after the start value")?;
        let end = self.parse_expression()?;
        // An omitted step becomes the literal 1.0 right here in the AST.
        let step = if self.check_op(',') {
            self.advance()?;
            self.parse_expression()?
        } else {
            Expr::Number(1.0)
        };
        self.expect_kind(TokenKind::In, "'in' before the loop body")?;
        let body = self.parse_expression()?;
        Ok(Expr::For {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step: Box::new(step),
            body: Box::new(body),
        })
    }

    /// varexpr := 'var' identifier ('=' expr)? (',' identifier ('=' expr)?)* 'in' expr
    ///
    /// Initializer expressions belong to the enclosing scope; the bindings
    /// only become visible inside the body.
    fn parse_var(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // consume 'var'
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_identifier("a variable name after 'var'")?;
            let init = if self.check_op('=') {
                self.advance()?;
                self.parse_expression()?
            } else {
                Expr::Number(0.0)
            };
            bindings.push((name, init));
            if self.check_op(',') {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect_kind(TokenKind::In, "'in' after the variable bindings")?;
        let body = self.parse_expression()?;
        Ok(Expr::VarIn {
            bindings,
            body: Box::new(body),
        })
    }

    fn current_binary_precedence(&self) -> Option<u32> {
        match self.cur.kind {
            TokenKind::Op(op) => self.session.operators.binary_precedence(op),
            _ => None,
        }
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.cur = self.lexer.next_token()?;
        Ok(())
    }

    fn check_op(&self, ch: char) -> bool {
        self.cur.kind == TokenKind::Op(ch)
    }

    fn expect_op(&mut self, ch: char, what: &str) -> Result<(), ParseError> {
        if self.check_op(ch) {
            self.advance()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if self.cur.kind == kind {
            self.advance()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.cur.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_operator_char(&mut self) -> Result<char, ParseError> {
        match self.cur.kind {
            TokenKind::Op(op) => {
                self.advance()?;
                Ok(op)
            }
            _ => Err(self.unexpected("an operator character")),
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: self.cur.kind.clone(),
            span: self.cur.span,
        }
    }
}
