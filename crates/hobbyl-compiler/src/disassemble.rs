// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode disassembly. Not wired into the
//! compile path; `hobbyl-cli` calls this when the user asks for it.

use hobbyl_core::{chunk::op, Chunk, Heap, Obj, Value};

#[must_use]
pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (line, next) = disassemble_instruction(chunk, heap, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassemble the instruction at `offset`, returning its text and the
/// offset of the next instruction.
#[must_use]
pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize) -> (String, usize) {
    let mut out = format!("{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        out.push_str(" | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let opcode = chunk.code[offset];
    let name = op::name(opcode);

    match opcode {
        op::CONSTANT
        | op::DEFINE_GLOBAL
        | op::GET_GLOBAL
        | op::SET_GLOBAL
        | op::GET_PROPERTY
        | op::PUSH_PROPERTY
        | op::SET_PROPERTY
        | op::INIT_PROPERTY
        | op::GET_STATIC
        | op::ENUM
        | op::STRUCT
        | op::ENUM_VALUE
        | op::STRUCT_FIELD
        | op::METHOD
        | op::STATIC_METHOD => {
            let index = chunk.code[offset + 1];
            out.push_str(&format!("{name:<16} {index:4} '{}'", constant_repr(chunk, heap, index)));
            (out, offset + 2)
        }
        op::ARRAY | op::CALL | op::GET_LOCAL | op::SET_LOCAL | op::GET_UPVALUE | op::SET_UPVALUE => {
            let operand = chunk.code[offset + 1];
            out.push_str(&format!("{name:<16} {operand:4}"));
            (out, offset + 2)
        }
        op::INVOKE => {
            let index = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            out.push_str(&format!(
                "{name:<16} {index:4} '{}' ({argc} args)",
                constant_repr(chunk, heap, index)
            ));
            (out, offset + 3)
        }
        op::JUMP | op::JUMP_IF_FALSE | op::INEQUALITY_JUMP | op::BREAK => {
            let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
            out.push_str(&format!("{name:<16} {offset:4} -> {}", offset + 3 + jump as usize));
            (out, offset + 3)
        }
        op::LOOP => {
            let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
            out.push_str(&format!("{name:<16} {offset:4} -> {}", offset + 3 - jump as usize));
            (out, offset + 3)
        }
        op::CLOSURE => {
            let index = chunk.code[offset + 1];
            out.push_str(&format!("{name:<16} {index:4} '{}'", constant_repr(chunk, heap, index)));
            let mut next = offset + 2;
            let upvalue_count = match chunk.constants.get(index as usize) {
                Some(Value::Obj(handle)) => match heap.get(*handle) {
                    Obj::Function(f) => f.upvalue_count,
                    _ => 0,
                },
                _ => 0,
            };
            for _ in 0..upvalue_count {
                let is_local = chunk.code[next];
                let slot = chunk.code[next + 1];
                let kind = if is_local != 0 { "local" } else { "upvalue" };
                out.push_str(&format!("\n{next:04} | {kind} {slot}"));
                next += 2;
            }
            (out, next)
        }
        _ => {
            out.push_str(name);
            (out, offset + 1)
        }
    }
}

fn constant_repr(chunk: &Chunk, heap: &Heap, index: u8) -> String {
    match chunk.constants.get(index as usize) {
        Some(Value::Obj(handle)) => match heap.get(*handle) {
            Obj::String(s) => s.as_str().to_string(),
            other => other.kind_name().to_string(),
        },
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Nil) | None => "nil".to_string(),
    }
}
