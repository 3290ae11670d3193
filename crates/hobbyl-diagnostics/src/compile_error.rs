// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Compile-time diagnostics.

use core::fmt;

/// Where a [`CompileError`] points: a specific offending token, or end of
/// input when the parser ran out of tokens mid-production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    Token(String),
    End,
}

/// A single compile error, already formatted to its exact wire text
/// (`[line N] Error at 'tok': msg`). The compiler collects every error up
/// to `synchronize()` boundaries (it never stops at the first one);
/// `hobbyl-cli` prints each in order and the run exits non-zero if the
/// list is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

impl CompileError {
    #[must_use]
    pub fn at_token(line: u32, lexeme: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            location: ErrorLocation::Token(lexeme.to_string()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at_end(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            location: ErrorLocation::End,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            ErrorLocation::Token(lexeme) => {
                write!(f, "[line {}] Error at '{}': {}", self.line, lexeme, self.message)
            }
            ErrorLocation::End => {
                write!(f, "[line {}] Error at end: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_token_location() {
        let err = CompileError::at_token(12, "+", "Expect expression.");
        assert_eq!(err.to_string(), "[line 12] Error at '+': Expect expression.");
    }

    #[test]
    fn formats_end_location() {
        let err = CompileError::at_end(5, "Expect ';' after value.");
        assert_eq!(err.to_string(), "[line 5] Error at end: Expect ';' after value.");
    }
}
