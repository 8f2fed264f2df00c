// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for model files.
//!
//! Syntax errors inside a model body are recorded and the parser
//! resynchronizes at the next statement terminator (or the end of the
//! enclosing block), so that one pass over a file reports as many
//! problems as possible.  Callers must check the returned error count
//! before running any semantic pass.

use std::mem;

use crate::ast::{
    BinaryOp, Block, Decl, Expr, File, KindDecl, Loc, ModelDecl, ObjKind, Object, Pos, Stmt,
    UnaryOp, VarDecl,
};
use crate::common::ErrorCode::*;
use crate::common::{ErrorCode, SyntaxError};
use crate::token::{Lexer, Spanned, Token};


type ParseResult<T> = Result<T, SyntaxError>;

/// parse turns model source text into a File.  The second element of
/// the result is the number of lexical and syntax errors, which are
/// also available as `File::errors`.
pub fn parse(text: &str) -> (File, usize) {
    let mut tokens = Vec::new();
    for result in Lexer::new(text) {
        match result {
            Ok(tok) => tokens.push(tok),
            Err(err) => {
                // lexical errors are fatal
                let file = File {
                    errors: vec![err],
                    ..File::default()
                };
                return (file, 1);
            }
        }
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        eof: end_pos(text),
        errors: Vec::new(),
    };
    let file = parser.parse_file();
    let count = file.errors.len();
    (file, count)
}

fn end_pos(text: &str) -> Pos {
    let line_start = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
    Pos {
        offset: text.len(),
        line: text.matches('\n').count() + 1,
        col: text[line_start..].chars().count() + 1,
    }
}

fn same_kind(a: &Token, b: &Token) -> bool {
    mem::discriminant(a) == mem::discriminant(b)
}

fn is_decl_keyword(tok: &Token) -> bool {
    matches!(tok, Token::Model | Token::Interface | Token::Kind)
}

struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    eof: Pos,
    errors: Vec<SyntaxError>,
}

impl<'input> Parser<'input> {
    fn peek(&self) -> Option<Token<'input>> {
        self.tokens.get(self.pos).map(|(_, tok, _)| *tok)
    }

    fn is(&self, tok: Token) -> bool {
        self.peek().is_some_and(|t| same_kind(&t, &tok))
    }

    fn advance(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// the start of the next token, or the end of input
    fn here(&self) -> Pos {
        self.tokens
            .get(self.pos)
            .map(|(start, _, _)| *start)
            .unwrap_or(self.eof)
    }

    /// the end of the most recently consumed token
    fn prev_end(&self) -> Pos {
        match self.pos {
            0 => Pos::default(),
            n => self.tokens[n - 1].2,
        }
    }

    fn error_here(&self, code: ErrorCode, msg: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.here(), code, msg)
    }

    fn unexpected(&self, wanted: &str) -> SyntaxError {
        match self.peek() {
            Some(tok) => self.error_here(
                UnrecognizedToken,
                format!("expected {}, found {}", wanted, tok.describe()),
            ),
            None => self.error_here(
                UnrecognizedEof,
                format!("expected {wanted}, found end of file"),
            ),
        }
    }

    fn expect(&mut self, tok: Token) -> ParseResult<Spanned<Token<'input>>> {
        if self.is(tok) {
            Ok(self.take())
        } else {
            Err(self.unexpected(&tok.describe()))
        }
    }

    /// take consumes a token the caller has already peeked at
    fn take(&mut self) -> Spanned<Token<'input>> {
        let tok = self.tokens[self.pos];
        self.pos += 1;
        tok
    }

    fn expect_ident(&mut self) -> ParseResult<(&'input str, Loc)> {
        match self.peek() {
            Some(Token::Ident(id)) => {
                let (start, _, end) = self.take();
                Ok((id, Loc::new(start, end)))
            }
            Some(tok) => Err(self.error_here(
                ExpectedIdent,
                format!("expected identifier, found {}", tok.describe()),
            )),
            None => Err(self.error_here(
                UnrecognizedEof,
                "expected identifier, found end of file",
            )),
        }
    }

    /// a statement ends at an explicit or inserted terminator, or
    /// immediately before the '}' closing its block.
    fn expect_terminator(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Semi) => {
                self.advance();
                Ok(())
            }
            Some(Token::RBrace) | None => Ok(()),
            Some(tok) => Err(self.error_here(
                ExpectedTerminator,
                format!("expected end of statement, found {}", tok.describe()),
            )),
        }
    }

    fn skip_semis(&mut self) {
        while self.is(Token::Semi) {
            self.advance();
        }
    }

    /// sync_stmt discards the tokens of a malformed statement, starting
    /// over from its first token so that brackets opened before the
    /// error are balanced.
    fn sync_stmt(&mut self, start: usize) {
        self.pos = start;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok {
                Token::LBrace | Token::LParen | Token::LBracket => depth += 1,
                Token::RBrace if depth == 0 => return,
                Token::RBrace | Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
                Token::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                ref tok if is_decl_keyword(tok) => return,
                _ => {}
            }
            self.advance();
        }
    }

    /// sync_decl skips to the start of the next top-level declaration.
    fn sync_decl(&mut self) {
        self.advance();
        while let Some(tok) = self.peek() {
            if is_decl_keyword(&tok) {
                return;
            }
            self.advance();
        }
    }

    fn parse_file(&mut self) -> File {
        let mut file = File::default();

        self.skip_semis();
        if self.is(Token::Package) {
            match self.package() {
                Ok(name) => file.package = Some(name),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_decl();
                }
            }
        }

        loop {
            self.skip_semis();
            if !self.is(Token::Import) {
                break;
            }
            match self.import() {
                Ok(path) => file.imports.push(path),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_decl();
                }
            }
        }

        loop {
            self.skip_semis();
            let decl = match self.peek() {
                None => break,
                Some(Token::Model) | Some(Token::Interface) => self.model_decl(),
                Some(Token::Kind) => self.kind_decl(),
                Some(_) => Err(self.unexpected("'model', 'interface' or 'kind'")),
            };
            match decl {
                Ok(decl) => {
                    let kind = match decl {
                        Decl::Model(_) => ObjKind::Model,
                        Decl::Interface(_) => ObjKind::Interface,
                        Decl::Kind(_) => ObjKind::Kind,
                    };
                    // duplicates are reported by the scope pass; the
                    // first declaration wins here
                    file.scope.insert(Object {
                        name: decl.name().to_string(),
                        kind,
                        loc: decl.get_loc(),
                    });
                    file.decls.push(decl);
                }
                Err(err) => {
                    self.errors.push(err);
                    self.sync_decl();
                }
            }
        }

        file.errors = mem::take(&mut self.errors);
        file
    }

    fn package(&mut self) -> ParseResult<String> {
        self.expect(Token::Package)?;
        let (name, _) = self.expect_ident()?;
        self.expect_terminator()?;
        Ok(name.to_string())
    }

    fn import(&mut self) -> ParseResult<String> {
        self.expect(Token::Import)?;
        let path = match self.peek() {
            Some(Token::Str(path)) => {
                self.advance();
                path.to_string()
            }
            _ => return Err(self.unexpected("import path")),
        };
        self.expect_terminator()?;
        Ok(path)
    }

    fn kind_decl(&mut self) -> ParseResult<Decl> {
        let (start, _, _) = self.expect(Token::Kind)?;
        let (name, _) = self.expect_ident()?;
        let units = self.units_literal(true);
        let loc = Loc::new(start, self.prev_end());
        self.expect_terminator()?;
        Ok(Decl::Kind(KindDecl {
            name: name.to_string(),
            units,
            loc,
        }))
    }

    fn model_decl(&mut self) -> ParseResult<Decl> {
        let (start, kw, _) = match self.advance() {
            Some(tok) => tok,
            None => return Err(self.unexpected("'model' or 'interface'")),
        };
        let (name, _) = self.expect_ident()?;
        let specializes = if self.is(Token::Specializes) {
            self.advance();
            let (parent, loc) = self.expect_ident()?;
            Some((parent.to_string(), loc))
        } else {
            None
        };
        let units = self.units_literal(true);
        let body = self.block()?;

        let model = ModelDecl {
            name: name.to_string(),
            specializes,
            units,
            loc: Loc::new(start, body.loc.end),
            body,
        };
        Ok(match kw {
            Token::Interface => Decl::Interface(model),
            _ => Decl::Model(model),
        })
    }

    /// units_literal consumes an optional units annotation.  Model and
    /// kind headers also accept a backtick literal; in a variable
    /// declaration that position is taken by the kind.
    fn units_literal(&mut self, allow_typedecl: bool) -> Option<Expr> {
        let units = match self.peek() {
            Some(Token::Str(s)) => s,
            Some(Token::TypeDecl(s)) if allow_typedecl => s,
            _ => return None,
        };
        let (start, _, end) = self.take();
        Some(Expr::Str(units.to_string(), Loc::new(start, end)))
    }

    fn block(&mut self) -> ParseResult<Block> {
        let (start, _, _) = self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            match self.peek() {
                Some(Token::RBrace) => {
                    let (_, _, end) = self.take();
                    return Ok(Block {
                        stmts,
                        loc: Loc::new(start, end),
                    });
                }
                Some(ref tok) if is_decl_keyword(tok) => {
                    // an unclosed block: keep what we have and let the
                    // next declaration parse normally
                    let err = self.unexpected("'}'");
                    self.errors.push(err);
                    return Ok(Block {
                        stmts,
                        loc: Loc::new(start, self.prev_end()),
                    });
                }
                None => return Err(self.unexpected("'}'")),
                _ => {}
            }

            let stmt_start = self.pos;
            match self.stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_stmt(stmt_start);
                }
            }
        }
    }

    fn stmt(&mut self) -> ParseResult<Stmt> {
        let (name, name_loc) = self.expect_ident()?;
        let kind = match self.peek() {
            Some(Token::Ident(k)) | Some(Token::TypeDecl(k)) => {
                let (start, _, end) = self.take();
                Some((k.to_string(), Loc::new(start, end)))
            }
            _ => None,
        };
        let units = self.units_literal(false);
        let decl = VarDecl {
            name: name.to_string(),
            kind,
            units,
            loc: Loc::new(name_loc.start, self.prev_end()),
        };

        let stmt = if self.is(Token::Eq) {
            self.advance();
            let rhs = self.annotated_expr()?;
            Stmt::Assign(decl, rhs)
        } else {
            Stmt::Decl(decl)
        };
        self.expect_terminator()?;
        Ok(stmt)
    }

    /// an expression, optionally followed by a units literal
    fn annotated_expr(&mut self) -> ParseResult<Expr> {
        let expr = self.expr()?;
        match self.units_literal(false) {
            Some(units) => {
                let loc = expr.get_loc().union(&units.get_loc());
                Ok(Expr::Units(Box::new(expr), Box::new(units), loc))
            }
            None => Ok(expr),
        }
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.additive()
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let loc = left.get_loc().union(&right.get_loc());
        Expr::Op2(op, Box::new(left), Box::new(right), loc)
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplicative()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.power()?;

        loop {
            let op = match self.peek() {
                Some(Token::Mul) => BinaryOp::Mul,
                Some(Token::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.power()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    /// exponentiation is right associative: `a^b^c` is `a^(b^c)`
    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.unary()?;
        if !self.is(Token::Exp) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.power()?;
        Ok(Self::binary(BinaryOp::Exp, base, exponent))
    }

    /// unary minus binds tighter than any binary operator
    fn unary(&mut self) -> ParseResult<Expr> {
        if self.is(Token::Minus) {
            let (start, _, _) = self.take();
            let operand = self.unary()?;
            let loc = Loc::new(start, operand.get_loc().end);
            return Ok(Expr::Op1(UnaryOp::Negative, Box::new(operand), loc));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        while self.is(Token::LBracket) {
            self.advance();
            let index = self.expr()?;
            let (_, _, end) = self.expect(Token::RBracket)?;
            let loc = Loc::new(expr.get_loc().start, end);
            expr = Expr::Index(Box::new(expr), Box::new(index), loc);
        }

        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let tok = match self.peek() {
            Some(tok) => tok,
            None => return Err(self.unexpected("expression")),
        };

        match tok {
            Token::Num(n) => {
                let value: f64 = n.parse().map_err(|_| {
                    self.error_here(ExpectedNumber, format!("invalid number '{n}'"))
                })?;
                let (start, _, end) = self.take();
                Ok(Expr::Const(n.to_string(), value, Loc::new(start, end)))
            }
            Token::Str(s) => {
                let (start, _, end) = self.take();
                Ok(Expr::Str(s.to_string(), Loc::new(start, end)))
            }
            Token::Ident(id) => {
                let (start, _, end) = self.take();
                match self.peek() {
                    Some(Token::LParen) => {
                        self.advance();
                        let args = self.call_args()?;
                        Ok(Expr::App(id.to_string(), args, Loc::new(start, self.prev_end())))
                    }
                    Some(Token::LBrace) => {
                        self.advance();
                        self.composite(Some(id.to_string()), start)
                    }
                    _ => Ok(Expr::Var(id.to_string(), Loc::new(start, end))),
                }
            }
            Token::LParen => {
                let (start, _, _) = self.take();
                let inner = self.expr()?;
                let (_, _, end) = self.expect(Token::RParen)?;
                Ok(Expr::Paren(Box::new(inner), Loc::new(start, end)))
            }
            Token::LBrace => {
                let (start, _, _) = self.take();
                self.composite(None, start)
            }
            Token::LBracket => {
                let (start, _, _) = self.take();
                self.table(start)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// call arguments after the opening '('
    fn call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.is(Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::RParen) => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    /// composite literal elements after the opening '{': `key: value`
    /// pairs separated by commas or line ends.
    fn composite(&mut self, ty: Option<String>, start: Pos) -> ParseResult<Expr> {
        let mut elts = Vec::new();
        loop {
            self.skip_semis();
            if self.is(Token::RBrace) {
                let (_, _, end) = self.take();
                return Ok(Expr::Composite(ty, elts, Loc::new(start, end)));
            }

            let (key, key_loc) = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let value = self.annotated_expr()?;
            let loc = key_loc.union(&value.get_loc());
            elts.push(Expr::KeyValue(key.to_string(), Box::new(value), loc));

            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::Semi) | Some(Token::RBrace) => {}
                _ => return Err(self.unexpected("',', '}' or end of line")),
            }
        }
    }

    /// table literal points after the opening '['
    fn table(&mut self, start: Pos) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        loop {
            self.skip_semis();
            if self.is(Token::RBracket) {
                let (_, _, end) = self.take();
                return Ok(Expr::Table(pairs, Loc::new(start, end)));
            }

            let (pair_start, _, _) = self.expect(Token::LParen)?;
            let x = self.expr()?;
            self.expect(Token::Comma)?;
            let y = self.expr()?;
            let (_, _, pair_end) = self.expect(Token::RParen)?;
            pairs.push(Expr::Pair(
                Box::new(x),
                Box::new(y),
                Loc::new(pair_start, pair_end),
            ));

            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::Semi) | Some(Token::RBracket) => {}
                _ => return Err(self.unexpected("',' or ']'")),
            }
        }
    }
}
