// checkgraph-sandbox/src/parser.rs
// ============================================================================
// Module: Sandbox Parser
// Description: Recursive-descent parser over the token stream from lexer.rs.
// Purpose: Build an Expr tree while enforcing the nesting-depth limit.
// Dependencies: crate::ast, crate::error, crate::lexer
// ============================================================================

//! ## Overview
//! Operator precedence, loosest to tightest: ternary, `||`, `&&`, equality
//! (`==`/`!=`/`===`/`!==`), relational (`<`/`<=`/`>`/`>=`), additive
//! (`+`/`-`), multiplicative (`*`/`/`/`%`), unary (`!`/`-`), postfix
//! (`.field`, `[index]`, `(args)`), primary (literals, identifiers, `(...)`,
//! array/object literals, arrow functions).

use crate::ast::BinOp;
use crate::ast::Expr;
use crate::error::MAX_EXPR_NESTING;
use crate::error::SandboxError;
use crate::lexer::Token;
use crate::lexer::TokenKind;
use crate::lexer::lex;

/// Parses `source` into an [`Expr`].
///
/// # Errors
///
/// Returns [`SandboxError`] on empty input, lexical errors, unexpected
/// tokens, trailing input, or nesting beyond [`crate::error::MAX_EXPR_NESTING`].
pub fn parse(source: &str) -> Result<Expr, SandboxError> {
    if source.trim().is_empty() {
        return Err(SandboxError::EmptyInput);
    }
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_ternary()?;
    match parser.peek().kind {
        TokenKind::Eof => Ok(expr),
        _ => Err(SandboxError::TrailingInput {
            position: parser.peek().position,
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn enter(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_NESTING {
            return Err(SandboxError::NestingTooDeep {
                max_depth: MAX_EXPR_NESTING,
                position: self.peek().position,
            });
        }
        Ok(())
    }

    const fn exit(&mut self) {
        self.depth -= 1;
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), SandboxError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind) {
            self.advance();
            Ok(())
        } else {
            Err(SandboxError::UnexpectedToken {
                expected,
                found: format!("{:?}", self.peek().kind),
                position: self.peek().position,
            })
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, SandboxError> {
        self.enter()?;
        // Arrow functions bind looser than everything else we parse here:
        // `x => x.valid` is recognized up front by lookahead so the rest of
        // the grammar never has to special-case a bare identifier followed
        // by `=>`.
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::FatArrow)) {
                self.advance();
                self.advance();
                let body = self.parse_ternary()?;
                self.exit();
                return Ok(Expr::Arrow {
                    param: name,
                    body: Box::new(body),
                });
            }
        }
        let cond = self.parse_or()?;
        if matches!(self.peek().kind, TokenKind::Question) {
            self.advance();
            let then = self.parse_ternary()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let else_ = self.parse_ternary()?;
            self.exit();
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                else_: Box::new(else_),
            });
        }
        self.exit();
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().kind, TokenKind::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek().kind, TokenKind::AndAnd) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinOp::LooseEq,
                TokenKind::EqEqEq => BinOp::StrictEq,
                TokenKind::NotEq => BinOp::LooseNe,
                TokenKind::NotEqEq => BinOp::StrictNe,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        match self.peek().kind {
            TokenKind::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = match self.advance().kind {
                        TokenKind::Ident(name) => name,
                        other => {
                            return Err(SandboxError::UnexpectedToken {
                                expected: "identifier after '.'",
                                found: format!("{other:?}"),
                                position: self.peek().position,
                            });
                        }
                    };
                    expr = Expr::Member { base: Box::new(expr), field: name };
                }
                TokenKind::LBracket => {
                    self.enter()?;
                    self.advance();
                    let index = self.parse_ternary()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    self.exit();
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index) };
                }
                TokenKind::LParen => {
                    self.enter()?;
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek().kind, TokenKind::RParen) {
                        loop {
                            args.push(self.parse_ternary()?);
                            if matches!(self.peek().kind, TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    self.exit();
                    expr = Expr::Call { callee: Box::new(expr), args };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SandboxError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::String(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_ternary()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.exit();
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.enter()?;
                let mut items = Vec::new();
                if !matches!(self.peek().kind, TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_ternary()?);
                        if matches!(self.peek().kind, TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                self.exit();
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => {
                self.enter()?;
                let mut entries = Vec::new();
                if !matches!(self.peek().kind, TokenKind::RBrace) {
                    loop {
                        let key = match self.advance().kind {
                            TokenKind::Ident(name) => name,
                            TokenKind::String(s) => s,
                            other => {
                                return Err(SandboxError::UnexpectedToken {
                                    expected: "object key",
                                    found: format!("{other:?}"),
                                    position: self.peek().position,
                                });
                            }
                        };
                        self.expect(&TokenKind::Colon, "':'")?;
                        let value = self.parse_ternary()?;
                        entries.push((key, value));
                        if matches!(self.peek().kind, TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                self.exit();
                Ok(Expr::Object(entries))
            }
            other => Err(SandboxError::UnexpectedToken {
                expected: "expression",
                found: format!("{other:?}"),
                position: tok.position,
            }),
        }
    }
}
