// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// a hand-written tokenizer in the style of LALRPOP's, plus automatic
// statement terminator insertion: a newline (or the end of input)
// following a value-like token ends the statement.

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::ast::Pos;
use crate::common::ErrorCode::*;
use crate::common::{ErrorCode, SyntaxError};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Package,
    Import,
    Kind,
    Model,
    Interface,
    Specializes,
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
    Eq,
    Comma,
    Colon,
    Semi,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Ident(&'input str),
    Num(&'input str),
    /// contents of a double-quoted literal, without the quotes
    Str(&'input str),
    /// contents of a backtick-delimited type literal
    TypeDecl(&'input str),
}

impl Token<'_> {
    /// ends_value is true for tokens after which a newline ends
    /// the current statement.
    fn ends_value(&self) -> bool {
        matches!(
            self,
            Ident(_) | Num(_) | Str(_) | TypeDecl(_) | RParen | RBrace | RBracket
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Ident(id) => format!("identifier '{id}'"),
            Num(n) => format!("number '{n}'"),
            Str(s) => format!("literal \"{s}\""),
            TypeDecl(t) => format!("type `{t}`"),
            Semi => "end of statement".to_string(),
            Package => "'package'".to_string(),
            Import => "'import'".to_string(),
            Kind => "'kind'".to_string(),
            Model => "'model'".to_string(),
            Interface => "'interface'".to_string(),
            Specializes => "'specializes'".to_string(),
            Plus => "'+'".to_string(),
            Minus => "'-'".to_string(),
            Mul => "'*'".to_string(),
            Div => "'/'".to_string(),
            Exp => "'^'".to_string(),
            Eq => "'='".to_string(),
            Comma => "','".to_string(),
            Colon => "':'".to_string(),
            LParen => "'('".to_string(),
            RParen => "')'".to_string(),
            LBrace => "'{'".to_string(),
            RBrace => "'}'".to_string(),
            LBracket => "'['".to_string(),
            RBracket => "']'".to_string(),
        }
    }
}

pub type Spanned<T> = (Pos, T, Pos);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
    line: usize,
    line_start: usize,
    // set when the last emitted token was value-like
    insert_semi: bool,
    // a lexical error ends the token stream
    done: bool,
}

const KEYWORDS: &[(&str, Token<'static>)] = &[
    ("package", Package),
    ("import", Import),
    ("kind", Kind),
    ("model", Model),
    ("interface", Interface),
    ("specializes", Specializes),
];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
            line: 1,
            line_start: 0,
            insert_semi: false,
            done: false,
        };
        t.lookahead = t.chars.next();
        t
    }

    /// pos converts a byte offset on the current line into a Pos.
    pub fn pos(&self, offset: usize) -> Pos {
        let line_start = self.line_start.min(offset);
        Pos {
            offset,
            line: self.line,
            col: self.text[line_start..offset].chars().count() + 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        if let Some((i, '\n')) = self.lookahead {
            self.line += 1;
            self.line_start = i + 1;
        }
        self.lookahead = self.chars.next();
        self.lookahead
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        for _ in 0..n {
            self.bump();
        }
        self.lookahead
    }

    fn peek_second(&self) -> Option<char> {
        let (i, c) = self.lookahead?;
        self.text[i + c.len_utf8()..].chars().next()
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn span(&self, start: usize, tok: Token<'input>, end: usize) -> Spanned<Token<'input>> {
        (self.pos(start), tok, self.pos(end))
    }

    fn error<T>(&mut self, code: ErrorCode, offset: usize, msg: String) -> Option<Result<T, SyntaxError>> {
        self.done = true;
        Some(Err(SyntaxError::new(self.pos(offset), code, msg)))
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let end = self
            .take_while(is_identifier_continue)
            .unwrap_or(self.text.len());
        let word = &self.text[idx0..end];

        let tok = KEYWORDS
            .iter()
            .filter(|&&(w, _)| w == word)
            .map(|(_, t)| *t)
            .next()
            .unwrap_or(Ident(word));

        self.span(idx0, tok, end)
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::Regex;

        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        // next_token only calls us when at least one character matches
        let len = NUMBER_RE
            .find(&self.text[idx0..])
            .map(|m| m.end())
            .unwrap_or(1);

        self.bump_n(len);

        let end = idx0 + len;
        self.span(idx0, Num(&self.text[idx0..end]), end)
    }

    /// quoted lexes a `"..."` or `` `...` `` literal, which may not
    /// span lines.
    fn quoted(&mut self, idx0: usize, quote: char) -> Option<Result<Spanned<Token<'input>>, SyntaxError>> {
        // eat the opening quote
        self.bump();

        match self.take_until(|c| c == quote || c == '\n') {
            Some(idx1) if self.text[idx1..].starts_with(quote) => {
                // eat the trailing quote
                self.bump();
                let contents = &self.text[idx0 + 1..idx1];
                let tok = if quote == '`' {
                    TypeDecl(contents)
                } else {
                    Str(contents)
                };
                Some(Ok(self.span(idx0, tok, idx1 + 1)))
            }
            _ => {
                let (code, what) = if quote == '`' {
                    (UnclosedTypeDecl, "type declaration")
                } else {
                    (UnclosedLiteral, "literal")
                };
                self.error(code, idx0, format!("unterminated {what}"))
            }
        }
    }

    /// block_comment skips a `/* ... */` comment, returning the offset
    /// of the first newline inside it (if any).
    /// block_comment skips a `/* */` comment, returning the position
    /// of its first newline, if it has one.
    fn block_comment(&mut self, idx0: usize) -> Result<Option<(Pos, Pos)>, SyntaxError> {
        let start = self.pos(idx0);
        // eat "/*"
        self.bump_n(2);
        let mut newline = None;
        loop {
            match self.lookahead {
                None => {
                    return Err(SyntaxError::new(
                        start,
                        UnclosedComment,
                        "unterminated comment",
                    ));
                }
                Some((_, '*')) if self.peek_second() == Some('/') => {
                    self.bump_n(2);
                    return Ok(newline);
                }
                Some((i, '\n')) => {
                    if newline.is_none() {
                        newline = Some((self.pos(i), self.pos(i + 1)));
                    }
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn consume(&mut self, i: usize, tok: Token<'input>) -> Option<Result<Spanned<Token<'input>>, SyntaxError>> {
        self.bump();
        Some(Ok(self.span(i, tok, i + 1)))
    }

    fn terminator(&mut self, i: usize, len: usize) -> Option<Result<Spanned<Token<'input>>, SyntaxError>> {
        Some(Ok(self.span(i, Semi, i + len)))
    }

    fn next_token(&mut self) -> Option<Result<Spanned<Token<'input>>, SyntaxError>> {
        loop {
            return match self.lookahead {
                Some((i, '\n')) => {
                    if self.insert_semi {
                        // the Pos must be taken before bumping past the
                        // newline so it stays on this line
                        let tok = self.terminator(i, 1);
                        self.bump();
                        tok
                    } else {
                        self.bump();
                        continue;
                    }
                }
                Some((i, '/')) => match self.peek_second() {
                    Some('/') => {
                        self.take_until(|c| c == '\n');
                        continue;
                    }
                    Some('*') => match self.block_comment(i) {
                        Ok(Some((start, end))) if self.insert_semi => Some(Ok((start, Semi, end))),
                        Ok(_) => continue,
                        Err(err) => {
                            self.done = true;
                            Some(Err(err))
                        }
                    },
                    _ => self.consume(i, Div),
                },
                Some((i, '=')) => self.consume(i, Eq),
                Some((i, '^')) => self.consume(i, Exp),
                Some((i, '-')) => self.consume(i, Minus),
                Some((i, '+')) => self.consume(i, Plus),
                Some((i, '*')) => self.consume(i, Mul),
                Some((i, ':')) => self.consume(i, Colon),
                Some((i, ';')) => self.consume(i, Semi),
                Some((i, ',')) => self.consume(i, Comma),
                Some((i, '(')) => self.consume(i, LParen),
                Some((i, ')')) => self.consume(i, RParen),
                Some((i, '{')) => self.consume(i, LBrace),
                Some((i, '}')) => self.consume(i, RBrace),
                Some((i, '[')) => self.consume(i, LBracket),
                Some((i, ']')) => self.consume(i, RBracket),
                Some((i, '"')) => self.quoted(i, '"'),
                Some((i, '`')) => self.quoted(i, '`'),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifierish(i))),
                Some((i, c)) if is_digit(c) || (c == '.' && self.peek_second().is_some_and(is_digit)) => {
                    Some(Ok(self.number(i)))
                }
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, c)) => self.error(UnrecognizedChar, i, format!("unrecognized char: '{c}'")),
                None => {
                    if self.insert_semi {
                        let end = self.text.len();
                        self.terminator(end, 0)
                    } else {
                        None
                    }
                }
            };
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tok = self.next_token();
        if let Some(Ok((_, ref t, _))) = tok {
            self.insert_semi = t.ends_value();
        }
        tok
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}
