// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Lexer for Hobbyl source code.
//!
//! Converts a string of source code into a stream of [`Token`]s. This is a
//! forward byte-scanner: no lookahead beyond two bytes, no backtracking.
//! Whitespace and `// line comments` are skipped; newlines bump the line
//! counter a token carries for later error reporting.

mod lexer;
mod token;

#[cfg(test)]
mod lexer_test;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};
