//! Recursive-descent parser producing an [`Ast`].
//!
//! A program is `module <name>? ... end`; input that does not start with
//! `module` is read as the body of an anonymous module, which is what the
//! REPL feeds in.
//!
//! Operator precedence, loosest first:
//!
//! | level | operators                                  | assoc |
//! |-------|--------------------------------------------|-------|
//! | 1     | `< <= > >= == !=` and unknown symbols      | left  |
//! | 2     | `+ -`                                      | left  |
//! | 3     | `* / %`                                    | left  |
//! | 4     | `^`                                        | right |
//!
//! `if f(x) { ... }` reads the block as the body of the `if`, not as a
//! block argument of `f`: predicates are parsed with block calls off.
use crate::ast::{Ast, NodeId, NodeKind};
use crate::ids::UniqueIds;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Characters shown on each side of the offending character.
const ERROR_WINDOW: usize = 10;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("{span}: {message} (found {found}) near {snippet}")]
pub struct ParseError {
    pub message: String,
    pub found: String,
    pub token: Token,
    pub span: Span,
    /// Source around the error with the offending character in backticks.
    pub snippet: String,
}

fn snippet(source: &str, offset: usize) -> String {
    let offset = offset.min(source.len());
    let before: String = source[..offset]
        .chars()
        .rev()
        .take(ERROR_WINDOW)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let mut rest = source[offset..].chars();
    let current = rest.next();
    let after: String = rest.take(ERROR_WINDOW).collect();
    let current = current.map(String::from).unwrap_or_default();
    format!("{before}`{current}`{after}").replace('\n', "\\n")
}

fn precedence(op: &str) -> (u8, bool) {
    match op {
        "^" => (4, true),
        "*" | "/" | "%" => (3, false),
        "+" | "-" => (2, false),
        _ => (1, false),
    }
}

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: Lexer::tokenize(source),
            pos: 0,
            ast: Ast::new(),
        }
    }

    /// Parse a whole module. `ids` names anonymous modules.
    pub fn parse(mut self, ids: &mut UniqueIds) -> Result<Ast, ParseError> {
        let root = self.module(ids)?;
        self.ast.set_root(root);
        Ok(self.ast)
    }

    // ── token helpers ──────────────────────────────────────────────

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {}", kind.name())))
        }
    }

    fn skip_terms(&mut self) {
        while self.check(&TokenKind::Term) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek().clone();
        let message = match &token.kind {
            TokenKind::Error(reason) => reason.clone(),
            _ => message.into(),
        };
        ParseError {
            message,
            found: token.kind.name().to_string(),
            span: token.span,
            snippet: snippet(self.source, token.span.start.offset),
            token,
        }
    }

    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn node(&mut self, kind: NodeKind, start: Span) -> NodeId {
        let span = start.merge(self.previous_span());
        self.ast.alloc(kind, span)
    }

    fn value_id(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::ValueId(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn optional_type(&mut self) -> Option<String> {
        match self.peek_kind().clone() {
            TokenKind::TypeId(name) => {
                self.advance();
                Some(name)
            }
            _ => None,
        }
    }

    // ── structure ──────────────────────────────────────────────────

    fn module(&mut self, ids: &mut UniqueIds) -> Result<NodeId, ParseError> {
        self.skip_terms();
        let start = self.peek().span;
        let (name, terminator) = if self.check(&TokenKind::Module) {
            self.advance();
            let name = match self.peek_kind().clone() {
                TokenKind::ValueId(name) | TokenKind::TypeId(name) => {
                    self.advance();
                    name
                }
                _ => ids.anonymous("module"),
            };
            if !self.check(&TokenKind::Term) && !self.check(&TokenKind::End) {
                return Err(self.error("expected end of statement"));
            }
            (name, TokenKind::End)
        } else {
            (ids.anonymous("module"), TokenKind::Eof)
        };

        let exprs = self.statements(&terminator)?;
        if terminator == TokenKind::End {
            self.expect(TokenKind::End)?;
            self.skip_terms();
        }
        if !self.check(&TokenKind::Eof) {
            return Err(self.error("expected end of input"));
        }
        Ok(self.node(NodeKind::Module { name, exprs }, start))
    }

    fn statements(
        &mut self,
        terminator: &TokenKind,
    ) -> Result<Vec<NodeId>, ParseError> {
        let mut exprs = Vec::new();
        loop {
            self.skip_terms();
            if self.check(terminator) {
                return Ok(exprs);
            }
            if self.check(&TokenKind::Eof) {
                return Err(self.error(format!("expected {}", terminator.name())));
            }
            exprs.push(self.statement()?);
            if !self.check(&TokenKind::Term) && !self.check(terminator) {
                return Err(self.error("expected end of statement"));
            }
        }
    }

    fn statement(&mut self) -> Result<NodeId, ParseError> {
        match self.peek_kind() {
            TokenKind::Val | TokenKind::Var => self.declaration(),
            TokenKind::Def => self.def(),
            TokenKind::Else => {
                let start = self.advance().span;
                let body = self.else_body()?;
                Ok(self.node(NodeKind::Else { body }, start))
            }
            TokenKind::ValueId(_)
                if *self.peek_nth_kind(1) == TokenKind::Assign =>
            {
                self.assignment()
            }
            _ => self.expression(false),
        }
    }

    fn block(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let exprs = self.statements(&TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;
        Ok(self.node(NodeKind::Block { exprs }, start))
    }

    fn declaration(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let name = self.value_id()?;
        let ty = self.optional_type();
        let value = if self.check(&TokenKind::Assign) {
            self.advance();
            self.expression(false)?
        } else if self.check(&TokenKind::LBrace) {
            self.block()?
        } else {
            let span = self.previous_span();
            self.ast.alloc(NodeKind::Unit, span)
        };
        let kind = if keyword.kind == TokenKind::Val {
            NodeKind::Val { name, value, ty }
        } else {
            NodeKind::Var { name, value, ty }
        };
        Ok(self.node(kind, keyword.span))
    }

    fn assignment(&mut self) -> Result<NodeId, ParseError> {
        let start = self.peek().span;
        let name = self.value_id()?;
        self.expect(TokenKind::Assign)?;
        let value = self.expression(false)?;
        Ok(self.node(NodeKind::Assign { name, value }, start))
    }

    fn def(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(TokenKind::Def)?.span;
        let name = self.value_id()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let param_start = self.peek().span;
            let param = self.value_id()?;
            let ty = self.optional_type();
            params.push(
                self.node(NodeKind::Param { name: param, ty }, param_start),
            );
            if !self.check(&TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;
        let return_type = self.optional_type();
        let body = self.block()?;
        Ok(self.node(
            NodeKind::Def {
                name,
                params,
                body,
                return_type,
            },
            start,
        ))
    }

    fn if_expr(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(TokenKind::If)?.span;
        let pred = self.expression(true)?;
        let if_body = self.block()?;
        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            self.else_body()?
        } else {
            let span = self.previous_span();
            self.ast.alloc(NodeKind::Unit, span)
        };
        Ok(self.node(
            NodeKind::If {
                pred,
                if_body,
                else_body,
            },
            start,
        ))
    }

    fn else_body(&mut self) -> Result<NodeId, ParseError> {
        if self.check(&TokenKind::If) {
            self.if_expr()
        } else {
            self.block()
        }
    }

    fn while_expr(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(TokenKind::While)?.span;
        let pred = self.expression(true)?;
        let body = self.block()?;
        Ok(self.node(NodeKind::While { pred, body }, start))
    }

    // ── expressions ────────────────────────────────────────────────

    /// `guard` is set while parsing an `if`/`while` predicate.
    fn expression(&mut self, guard: bool) -> Result<NodeId, ParseError> {
        self.binary(1, guard)
    }

    fn binary(&mut self, min: u8, guard: bool) -> Result<NodeId, ParseError> {
        let start = self.peek().span;
        let mut left = self.unary(guard)?;
        while let TokenKind::SymbolId(op) = self.peek_kind().clone() {
            let (prec, right_assoc) = precedence(&op);
            if prec < min {
                break;
            }
            self.advance();
            let next = if right_assoc { prec } else { prec + 1 };
            let right = self.binary(next, guard)?;
            left = self.node(
                NodeKind::BinOp {
                    op,
                    args: [left, right],
                },
                start,
            );
        }
        Ok(left)
    }

    fn unary(&mut self, guard: bool) -> Result<NodeId, ParseError> {
        if *self.peek_kind() == TokenKind::SymbolId("-".to_string()) {
            let start = self.advance().span;
            let zero = self.ast.alloc(NodeKind::Int("0".into()), start);
            let operand = self.unary(guard)?;
            return Ok(self.node(
                NodeKind::BinOp {
                    op: "-".into(),
                    args: [zero, operand],
                },
                start,
            ));
        }
        self.primary(guard)
    }

    fn primary(&mut self, guard: bool) -> Result<NodeId, ParseError> {
        let start = self.peek().span;
        let kind = match self.peek_kind().clone() {
            TokenKind::Int(text) => {
                self.advance();
                NodeKind::Int(text)
            }
            TokenKind::Real(text) => {
                self.advance();
                NodeKind::Real(text)
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                NodeKind::Bool(token.lexeme)
            }
            TokenKind::TypeId(name) => {
                self.advance();
                NodeKind::TypeId(name)
            }
            TokenKind::SymbolId(name) => {
                self.advance();
                NodeKind::SymbolId(name)
            }
            TokenKind::ValueId(name) => {
                self.advance();
                let func = self.node(NodeKind::ValueId(name), start);
                if !self.check(&TokenKind::LParen) {
                    return Ok(func);
                }
                return self.call(func, start, guard);
            }
            TokenKind::LParen => return self.parenthesized(),
            TokenKind::LBracket => {
                self.advance();
                let values = self.sequence(&TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket)?;
                NodeKind::List(values)
            }
            TokenKind::LBrace => return self.block(),
            TokenKind::If => return self.if_expr(),
            TokenKind::While => return self.while_expr(),
            _ => return Err(self.error("expected expression")),
        };
        Ok(self.node(kind, start))
    }

    fn call(
        &mut self,
        func: NodeId,
        start: Span,
        guard: bool,
    ) -> Result<NodeId, ParseError> {
        self.expect(TokenKind::LParen)?;
        let args = self.sequence(&TokenKind::RParen)?;
        self.expect(TokenKind::RParen)?;
        let block = if !guard && self.check(&TokenKind::LBrace) {
            Some(self.block()?)
        } else {
            None
        };
        Ok(self.node(NodeKind::Call { func, args, block }, start))
    }

    fn parenthesized(&mut self) -> Result<NodeId, ParseError> {
        let start = self.expect(TokenKind::LParen)?.span;
        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(self.node(NodeKind::Unit, start));
        }
        let first = self.expression(false)?;
        if !self.check(&TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RParen) {
                break;
            }
            values.push(self.expression(false)?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(self.node(NodeKind::Tuple(values), start))
    }

    /// Comma separated expressions up to (not including) `close`.
    fn sequence(
        &mut self,
        close: &TokenKind,
    ) -> Result<Vec<NodeId>, ParseError> {
        let mut values = Vec::new();
        while !self.check(close) {
            values.push(self.expression(false)?);
            if !self.check(close) {
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(values)
    }
}
