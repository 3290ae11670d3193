// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Token-stream bookkeeping and error recovery.
//!
//! `Parser` owns the lexer and the one-token lookahead every Pratt parser
//! needs (`current`/`previous`). It does not know anything about bytecode;
//! [`crate::compiler::Compiler`] drives it and emits as it goes.

use hobbyl_diagnostics::CompileError;
use hobbyl_lexer::{Lexer, Token, TokenKind};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    pub current: Token<'src>,
    pub previous: Token<'src>,
    pub had_error: bool,
    panic_mode: bool,
    pub errors: Vec<CompileError>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token();
        Self {
            lexer,
            current: first,
            previous: first,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
        }
    }

    /// Advance past `current`, skipping (and reporting) any run of ERROR
    /// tokens the lexer produces.
    pub fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    #[must_use]
    pub fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Whether an error was reported since the last [`Self::synchronize`].
    /// Callers use this to decide whether a resync pass is needed after a
    /// declaration, rather than running one unconditionally.
    #[must_use]
    pub const fn in_panic_mode(&self) -> bool {
        self.panic_mode
    }

    pub fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    pub fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    pub fn error_at_previous(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    /// Record a compile error, unless panic mode is already set.
    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let error = if token.kind == TokenKind::Eof {
            CompileError::at_end(token.line, message)
        } else {
            CompileError::at_token(token.line, token.lexeme, message)
        };
        tracing::debug!(line = error.line, %error, "compile error recorded");
        self.errors.push(error);
    }

    /// Skip tokens until a semicolon boundary or a token that starts a new
    /// top-level declaration, then clear panic mode.
    pub fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Func
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Loop
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }
}
