// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Single-pass Pratt parser and bytecode emitter for Hobbyl.
//!
//! There is no intermediate AST: [`compile`] walks the token stream once,
//! emitting [`hobbyl_core::Chunk`] bytecode as each expression and statement
//! is recognized. A disassembler is included for debugging but never runs
//! as part of compilation itself.

mod compiler;
mod decl;
mod disassemble;
mod expr;
mod parser;
mod precedence;

#[cfg(test)]
mod compiler_test;

pub use compiler::{Compiler, FunctionState, FunctionType, Local, LoopContext};
pub use disassemble::{disassemble_chunk, disassemble_instruction};
pub use precedence::{infix_precedence, Precedence};

use hobbyl_core::{chunk::op, GcRef, Heap, Obj};
use hobbyl_diagnostics::CompileError;
use hobbyl_lexer::TokenKind;

/// Compile `source` into a top-level script function, or the list of
/// compile errors collected along the way.
pub fn compile(source: &str, heap: &mut Heap) -> Result<GcRef, Vec<CompileError>> {
    let mut compiler = Compiler::new(source, heap);

    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_op(op::NIL);
    compiler.emit_op(op::RETURN);

    if compiler.parser.had_error {
        return Err(compiler.parser.errors);
    }

    let script = compiler.functions.pop().expect("script FunctionState always present");
    let handle = compiler.alloc_obj(Obj::Function(script.function));
    Ok(handle)
}
