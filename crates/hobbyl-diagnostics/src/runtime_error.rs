// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Runtime diagnostics.
//!
//! On a runtime error the VM prints the message, then a stack trace from the
//! top frame down to the bottom using each frame's current IP-1 to look up
//! the source line, then resets its stack. [`RuntimeError`] carries exactly
//! what that printer needs; the VM builds one, `hobbyl-cli` prints it.

use core::fmt;
use thiserror::Error;

/// Every distinct condition the VM can raise at runtime. `Custom` is the
/// script-level primitive (`error("...")`): its message is already the
/// string form of the script's argument, so it carries no further
/// structure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operands must be strings.")]
    OperandsMustBeStrings,
    #[error("Undefined variable '{0}'.")]
    UndefinedGlobal(String),
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Undefined field '{0}'.")]
    UndefinedField(String),
    #[error("Undefined static member '{0}'.")]
    UndefinedStatic(String),
    #[error("Only instances have properties.")]
    NotAnInstance,
    #[error("Only structs and enums have static members.")]
    NotAStructOrEnum,
    #[error("Can only call functions.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: u8, got: u8 },
    #[error("Only arrays can be subscripted.")]
    NotAnArray,
    #[error("Subscript must be a number.")]
    SubscriptMustBeNumber,
    #[error("Index out of bounds.")]
    IndexOutOfBounds,
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Invalid opcode.")]
    InvalidOpcode,
    #[error("{0}")]
    Custom(String),
}

/// One entry of the top-to-bottom stack trace asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// `"script"` for the top-level function, else the function's name.
    pub name: String,
    /// The source line of the faulting instruction within this frame
    /// (looked up via the frame's IP-1, since the IP already advanced past
    /// the opcode that raised).
    pub line: u32,
}

/// A raised runtime error together with the call-frame trace captured at the
/// moment it was raised, top frame first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    #[must_use]
    pub fn new(kind: RuntimeErrorKind, trace: Vec<TraceFrame>) -> Self {
        Self { kind, trace }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        for frame in &self.trace {
            if frame.name == "script" {
                writeln!(f, "[line {}] in script", frame.line)?;
            } else {
                writeln!(f, "[line {}] in {}()", frame.line, frame.name)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_message_then_trace_top_to_bottom() {
        let err = RuntimeError::new(
            RuntimeErrorKind::UndefinedGlobal("x".to_string()),
            vec![
                TraceFrame { name: "incr".to_string(), line: 4 },
                TraceFrame { name: "script".to_string(), line: 9 },
            ],
        );
        let rendered = err.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Undefined variable 'x'.");
        assert_eq!(lines[1], "[line 4] in incr()");
        assert_eq!(lines[2], "[line 9] in script");
    }

    #[test]
    fn arity_mismatch_message() {
        let kind = RuntimeErrorKind::ArityMismatch { expected: 2, got: 1 };
        assert_eq!(kind.to_string(), "Expected 2 arguments but got 1.");
    }
}
