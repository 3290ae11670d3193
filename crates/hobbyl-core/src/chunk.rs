// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode chunks: the linear, 1-byte-opcode instruction format the
//! compiler emits into and the VM reads back out of.
//!
//! Hobbyl is a stack machine, not a register machine: each instruction is
//! one opcode byte followed by zero, one or two operand bytes, rather than
//! a fixed-width encoding with packed register fields.

use crate::Value;

#[cfg(test)]
mod chunk_test;

pub mod op {
    //! Opcode constants.

    pub const CONSTANT: u8 = 0;
    pub const NIL: u8 = 1;
    pub const TRUE: u8 = 2;
    pub const FALSE: u8 = 3;
    pub const POP: u8 = 4;
    pub const ARRAY: u8 = 5;
    pub const GET_SUBSCRIPT: u8 = 6;
    pub const SET_SUBSCRIPT: u8 = 7;
    pub const DEFINE_GLOBAL: u8 = 8;
    pub const GET_GLOBAL: u8 = 9;
    pub const SET_GLOBAL: u8 = 10;
    pub const GET_LOCAL: u8 = 11;
    pub const SET_LOCAL: u8 = 12;
    pub const GET_UPVALUE: u8 = 13;
    pub const SET_UPVALUE: u8 = 14;
    pub const GET_PROPERTY: u8 = 15;
    pub const PUSH_PROPERTY: u8 = 16;
    pub const SET_PROPERTY: u8 = 17;
    pub const INIT_PROPERTY: u8 = 18;
    pub const GET_STATIC: u8 = 19;
    pub const EQUAL: u8 = 20;
    pub const NOT_EQUAL: u8 = 21;
    pub const GREATER: u8 = 22;
    pub const GREATER_EQUAL: u8 = 23;
    pub const LESSER: u8 = 24;
    pub const LESSER_EQUAL: u8 = 25;
    pub const CONCAT: u8 = 26;
    pub const ADD: u8 = 27;
    pub const SUBTRACT: u8 = 28;
    pub const MULTIPLY: u8 = 29;
    pub const DIVIDE: u8 = 30;
    pub const MODULO: u8 = 31;
    pub const POW: u8 = 32;
    pub const NEGATE: u8 = 33;
    pub const NOT: u8 = 34;
    pub const JUMP: u8 = 35;
    pub const JUMP_IF_FALSE: u8 = 36;
    pub const INEQUALITY_JUMP: u8 = 37;
    pub const LOOP: u8 = 38;
    pub const CALL: u8 = 39;
    pub const INVOKE: u8 = 40;
    pub const INSTANCE: u8 = 41;
    pub const CLOSURE: u8 = 42;
    pub const CLOSE_UPVALUE: u8 = 43;
    pub const RETURN: u8 = 44;
    pub const ENUM: u8 = 45;
    pub const STRUCT: u8 = 46;
    pub const ENUM_VALUE: u8 = 47;
    pub const STRUCT_FIELD: u8 = 48;
    pub const METHOD: u8 = 49;
    pub const STATIC_METHOD: u8 = 50;
    pub const BREAK: u8 = 51;

    /// Human-readable name for disassembly and panic messages.
    #[must_use]
    pub const fn name(opcode: u8) -> &'static str {
        match opcode {
            CONSTANT => "CONSTANT",
            NIL => "NIL",
            TRUE => "TRUE",
            FALSE => "FALSE",
            POP => "POP",
            ARRAY => "ARRAY",
            GET_SUBSCRIPT => "GET_SUBSCRIPT",
            SET_SUBSCRIPT => "SET_SUBSCRIPT",
            DEFINE_GLOBAL => "DEFINE_GLOBAL",
            GET_GLOBAL => "GET_GLOBAL",
            SET_GLOBAL => "SET_GLOBAL",
            GET_LOCAL => "GET_LOCAL",
            SET_LOCAL => "SET_LOCAL",
            GET_UPVALUE => "GET_UPVALUE",
            SET_UPVALUE => "SET_UPVALUE",
            GET_PROPERTY => "GET_PROPERTY",
            PUSH_PROPERTY => "PUSH_PROPERTY",
            SET_PROPERTY => "SET_PROPERTY",
            INIT_PROPERTY => "INIT_PROPERTY",
            GET_STATIC => "GET_STATIC",
            EQUAL => "EQUAL",
            NOT_EQUAL => "NOT_EQUAL",
            GREATER => "GREATER",
            GREATER_EQUAL => "GREATER_EQUAL",
            LESSER => "LESSER",
            LESSER_EQUAL => "LESSER_EQUAL",
            CONCAT => "CONCAT",
            ADD => "ADD",
            SUBTRACT => "SUBTRACT",
            MULTIPLY => "MULTIPLY",
            DIVIDE => "DIVIDE",
            MODULO => "MODULO",
            POW => "POW",
            NEGATE => "NEGATE",
            NOT => "NOT",
            JUMP => "JUMP",
            JUMP_IF_FALSE => "JUMP_IF_FALSE",
            INEQUALITY_JUMP => "INEQUALITY_JUMP",
            LOOP => "LOOP",
            CALL => "CALL",
            INVOKE => "INVOKE",
            INSTANCE => "INSTANCE",
            CLOSURE => "CLOSURE",
            CLOSE_UPVALUE => "CLOSE_UPVALUE",
            RETURN => "RETURN",
            ENUM => "ENUM",
            STRUCT => "STRUCT",
            ENUM_VALUE => "ENUM_VALUE",
            STRUCT_FIELD => "STRUCT_FIELD",
            METHOD => "METHOD",
            STATIC_METHOD => "STATIC_METHOD",
            BREAK => "BREAK",
            _ => "UNKNOWN",
        }
    }
}

/// A compiled bytecode chunk: the instruction stream, a parallel per-byte
/// line-number table (for runtime error stack traces), and the constant
/// pool.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    /// `lines[i]` is the source line that emitted `code[i]`.
    pub lines: Vec<u32>,
    pub constants: Vec<Value>,
}

impl Chunk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Add a constant to the pool, returning its index.
    ///
    /// Returns `None` once the pool holds 256 entries.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if self.constants.len() >= 256 {
            return None;
        }
        self.constants.push(value);
        #[expect(clippy::cast_possible_truncation, reason = "length checked above")]
        Some(self.constants.len() as u8 - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
