//! The parser

use std::fmt::Debug;

use derive_more::derive::Display;

use super::ast::*;
use super::lex::*;
use crate::common::Id;

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(String);

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        ParseError(msg.into())
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();

    while let Some(tok) = lexer
        .next()
        .map_err(|e| ParseError::new(e.to_string()))?
    {
        tokens.push(tok);
    }

    Ok(tokens)
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.advance() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(ParseError::new(format!(
                "expected {kind}, found {}",
                tok.kind
            ))),
            None => Err(ParseError::new(format!("expected {kind}, found end of input"))),
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut funcs = Vec::new();
        while self.peek().is_some() {
            funcs.push(self.parse_func_decl()?);
        }
        Ok(Program { funcs })
    }

    fn parse_type(&mut self) -> Result<DataType, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::KwInt, .. }) => Ok(DataType::Int),
            Some(Token { kind: TokenKind::KwChar, .. }) => Ok(DataType::Char),
            Some(Token { kind: TokenKind::KwVoid, .. }) => Ok(DataType::Void),
            Some(tok) => Err(ParseError::new(format!("expected a type, found {}", tok.kind))),
            None => Err(ParseError::new("expected a type, found end of input")),
        }
    }

    fn parse_func_decl(&mut self) -> Result<FuncDecl, ParseError> {
        let ret_type = self.parse_type()?;
        let name_tok = self.expect(TokenKind::Id)?;
        let name: Id = Id::new(name_tok.text.to_string());

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                let param_name = self.expect(TokenKind::Id)?;
                params.push(Param {
                    name: Id::new(param_name.text.to_string()),
                    ty,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;

        Ok(FuncDecl { name, params, ret_type, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwInt) | Some(TokenKind::KwChar) => self.parse_var_decl(),
            Some(TokenKind::KwIf) => self.parse_if(),
            Some(TokenKind::KwReturn) => self.parse_return(),
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::ExprStmt(expr))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let ty = self.parse_type()?;
        let name_tok = self.expect(TokenKind::Id)?;
        self.expect(TokenKind::Assign)?;
        let init = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::VarDecl {
            name: Id::new(name_tok.text.to_string()),
            ty,
            init,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwIf)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let tt = self.parse_block()?;
        let ff = if self.eat(TokenKind::KwElse) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::If { cond, tt, ff })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwReturn)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Return(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_logic_or()?;
        if self.eat(TokenKind::Assign) {
            if !matches!(lhs, Expr::Var(_)) {
                return Err(ParseError::new("assignment target must be a variable"));
            }
            let rhs = self.parse_assignment()?;
            return Ok(Expr::Assign(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logic_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.parse_logic_and()?;
            lhs = Expr::Binary { op: BinOp::LogicOr, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinOp::LogicAnd, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::Neq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::LtEq) => BinOp::Lte,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::GtEq) => BinOp::Gte,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(TokenKind::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Neg, inner: Box::new(inner) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Num, text }) => {
                let value: i64 = text
                    .parse()
                    .map_err(|_| ParseError::new(format!("malformed integer literal '{text}'")))?;
                Ok(Expr::IntLit(value))
            }
            Some(Token { kind: TokenKind::CharLit, text }) => {
                let value = decode_char_literal(text)?;
                Ok(Expr::IntLit(value as i64))
            }
            Some(Token { kind: TokenKind::Id, text }) => {
                let name: Id = Id::new(text.to_string());
                if self.eat(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call { callee: name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token { kind: TokenKind::LParen, .. }) => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ParseError::new(format!("unexpected token {}", tok.kind))),
            None => Err(ParseError::new("unexpected end of input")),
        }
    }
}

/// Decode a single-quoted char literal's text (including the quotes) into
/// its ordinal value. Supports the common single-character escapes; any
/// other escape is a parse error.
fn decode_char_literal(text: &str) -> Result<u8, ParseError> {
    let inner = &text[1..text.len() - 1];
    let value = if let Some(escape) = inner.strip_prefix('\\') {
        match escape {
            "n" => b'\n',
            "t" => b'\t',
            "0" => 0,
            "\\" => b'\\',
            "'" => b'\'',
            other => {
                return Err(ParseError::new(format!(
                    "unsupported character escape '\\{other}'"
                )))
            }
        }
    } else {
        inner.as_bytes()[0]
    };
    Ok(value)
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}
