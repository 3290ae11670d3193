// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The per-function compiler state and the emission primitives every
//! expression/statement compiler function shares.
//!
//! A textbook single-pass compiler describes its nested-function state as
//! "a stack of per-function `Compiler` records linked by an `enclosing`
//! reference". We implement that stack literally as a `Vec<FunctionState>`
//! inside one [`Compiler`] value rather than a chain of boxed,
//! self-referential structs: the top of the vector is always "the function
//! currently being compiled", and resolving a name in an enclosing function
//! is just indexing further down the vector. This sidesteps lifetime
//! gymnastics with no change in observable behavior.

use hobbyl_core::object::UpvalueDesc;
use hobbyl_core::{chunk::op, Chunk, GcRef, Heap, HeapFunction, Obj, Value};
use hobbyl_lexer::{Token, TokenKind};

use crate::parser::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    Script,
    Function,
    Method,
}

/// A compile-time local binding. `depth == -1` marks "declared but not yet
/// initialized": reading it is a compile error.
pub struct Local<'src> {
    pub name: &'src str,
    pub depth: i32,
    pub is_captured: bool,
}

/// An in-flight `loop`/`while` target: where `continue` jumps back to, the
/// scope depth it must unwind to, and the patch sites `break` leaves behind
/// to fix up once the loop's end address is known.
pub struct LoopContext {
    pub loop_start: usize,
    pub scope_depth: i32,
    pub break_jumps: Vec<usize>,
}

/// Per-function compilation state: the function under construction, its
/// locals, its recorded upvalue captures and its loop-context stack.
pub struct FunctionState<'src> {
    pub function: HeapFunction,
    pub fn_type: FunctionType,
    pub locals: Vec<Local<'src>>,
    pub scope_depth: i32,
    pub upvalues: Vec<UpvalueDesc>,
    pub loops: Vec<LoopContext>,
}

impl<'src> FunctionState<'src> {
    fn new(fn_type: FunctionType, name: Option<GcRef>) -> Self {
        // Slot 0 is reserved: `self` for methods, an unnamed
        // placeholder otherwise. Either way it is never resolvable by name
        // lookup for FUNCTION/SCRIPT bodies (empty lexeme matches nothing a
        // source program can spell).
        let slot_zero_name = if fn_type == FunctionType::Method { "self" } else { "" };
        Self {
            function: HeapFunction::new(name),
            fn_type,
            locals: vec![Local { name: slot_zero_name, depth: 0, is_captured: false }],
            scope_depth: 0,
            upvalues: Vec::new(),
            loops: Vec::new(),
        }
    }
}

pub struct Compiler<'src, 'heap> {
    pub parser: Parser<'src>,
    pub heap: &'heap mut Heap,
    pub functions: Vec<FunctionState<'src>>,
}

impl<'src, 'heap> Compiler<'src, 'heap> {
    pub fn new(source: &'src str, heap: &'heap mut Heap) -> Self {
        Self {
            parser: Parser::new(source),
            heap,
            functions: vec![FunctionState::new(FunctionType::Script, None)],
        }
    }

    // --- current-function accessors ------------------------------------

    pub fn current(&mut self) -> &mut FunctionState<'src> {
        self.functions.last_mut().expect("at least the script FunctionState is always present")
    }

    pub fn chunk(&mut self) -> &mut Chunk {
        &mut self.current().function.chunk
    }

    pub fn current_line(&self) -> u32 {
        self.parser.previous.line
    }

    // --- GC-coupled allocation -------------------------------------------

    /// Mark every function currently under construction as a GC root
    ///: each in-progress
    /// [`FunctionState`] is plain Rust data owned by the compiler, not yet
    /// wrapped in a heap `Obj::Function`, so its name and constant pool
    /// would otherwise be invisible to a collection triggered mid-compile.
    fn mark_compiler_roots(&mut self) {
        for index in 0..self.functions.len() {
            if let Some(name) = self.functions[index].function.name {
                self.heap.mark_object(name);
            }
            for i in 0..self.functions[index].function.chunk.constants.len() {
                let constant = self.functions[index].function.chunk.constants[i];
                self.heap.mark_value(constant);
            }
        }
    }

    /// Intern a string, triggering a collection first if the heap's
    /// threshold has been crossed.
    pub fn intern(&mut self, bytes: &[u8]) -> GcRef {
        if self.heap.should_collect() {
            self.mark_compiler_roots();
            self.heap.collect();
        }
        self.heap.intern(bytes)
    }

    /// Allocate a heap object, triggering a collection first if needed.
    ///
    /// A just-finished [`FunctionState`] is already popped off
    /// `self.functions` by the time its `Obj::Function` reaches here, so
    /// [`Self::mark_compiler_roots`] alone would miss its name and constant
    /// pool for the one collection that could interleave with this very
    /// call; mark `obj` itself first to cover that window.
    pub fn alloc_obj(&mut self, obj: Obj) -> GcRef {
        if self.heap.should_collect() {
            if let Obj::Function(f) = &obj {
                if let Some(name) = f.name {
                    self.heap.mark_object(name);
                }
                for &constant in &f.chunk.constants {
                    self.heap.mark_value(constant);
                }
            }
            self.mark_compiler_roots();
            self.heap.collect();
        }
        self.heap.alloc(obj)
    }

    // --- emission --------------------------------------------------------

    pub fn emit_byte(&mut self, byte: u8) {
        let line = self.current_line();
        self.chunk().write(byte, line);
    }

    pub fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    pub fn emit_op(&mut self, opcode: u8) {
        self.emit_byte(opcode);
    }

    /// Add `value` to the current function's constant pool and emit
    /// `CONSTANT idx`.
    pub fn emit_constant(&mut self, value: Value) {
        match self.chunk().add_constant(value) {
            Some(index) => self.emit_bytes(op::CONSTANT, index),
            None => self.parser.error_at_previous("Too many constants in one chunk."),
        }
    }

    /// Intern `name` and add it to the constant pool, returning its index
    /// without emitting anything. Used for operand bytes of opcodes like
    /// `DEFINE_GLOBAL`/`GET_PROPERTY` that carry a name-constant index.
    pub fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = self.intern(name.as_bytes());
        match self.chunk().add_constant(Value::obj(handle)) {
            Some(index) => index,
            None => {
                self.parser.error_at_previous("Too many constants in one chunk.");
                0
            }
        }
    }

    /// Emit a two-byte-operand jump and return the index of its first
    /// operand byte, to be back-patched by [`Self::patch_jump`].
    pub fn emit_jump(&mut self, opcode: u8) -> usize {
        self.emit_op(opcode);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().len() - 2
    }

    /// Back-patch a jump emitted by [`Self::emit_jump`] to land here.
    pub fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk().len() - offset - 2;
        if jump > u16::MAX as usize {
            self.parser.error_at_previous("Too much code to jump over.");
            return;
        }
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let jump = jump as u16;
        let bytes = jump.to_be_bytes();
        self.chunk().code[offset] = bytes[0];
        self.chunk().code[offset + 1] = bytes[1];
    }

    /// Emit `LOOP` back to `loop_start`.
    pub fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(op::LOOP);
        let offset = self.chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.parser.error_at_previous("Loop body too large.");
        }
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let offset = offset as u16;
        for b in offset.to_be_bytes() {
            self.emit_byte(b);
        }
    }

    // --- scopes ------------------------------------------------------------

    pub fn begin_scope(&mut self) {
        self.current().scope_depth += 1;
    }

    /// Leave the current scope: one `POP` per non-captured local and one
    /// `CLOSE_UPVALUE` per captured one, in reverse declaration order.
    pub fn end_scope(&mut self) {
        self.current().scope_depth -= 1;
        let depth = self.current().scope_depth;
        while let Some(local) = self.current().locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.emit_op(op::CLOSE_UPVALUE);
            } else {
                self.emit_op(op::POP);
            }
            self.current().locals.pop();
        }
    }

    // --- locals --------------------------------------------------------

    /// Declare `name` as a local of the current scope. A no-op at global
    /// scope (top-level `var` instead emits `DEFINE_GLOBAL`).
    /// Redeclaring a name already local to *this exact* scope is a compile
    /// error; shadowing an outer scope is fine.
    pub fn declare_local(&mut self, name: Token<'src>) {
        if self.current().scope_depth == 0 {
            return;
        }
        let depth = self.current().scope_depth;
        for local in self.current().locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name.lexeme {
                self.parser.error_at_previous("Already a variable with this name in this scope.");
                return;
            }
        }
        if self.current().locals.len() >= 256 {
            self.parser.error_at_previous("Too many local variables in function.");
            return;
        }
        self.current().locals.push(Local { name: name.lexeme, depth: -1, is_captured: false });
    }

    /// Mark the most recently declared local as initialized (its own
    /// initializer expression has now been fully compiled).
    pub fn mark_initialized(&mut self) {
        if self.current().scope_depth == 0 {
            return;
        }
        let depth = self.current().scope_depth;
        if let Some(local) = self.current().locals.last_mut() {
            local.depth = depth;
        }
    }

    /// Resolve `name` to a local slot index of `self.functions[fn_index]`.
    pub fn resolve_local_in(&mut self, fn_index: usize, name: &str) -> Option<u8> {
        let locals = &self.functions[fn_index].locals;
        for (i, local) in locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.parser
                        .error_at_previous("Can't read local variable in its own initializer.");
                }
                #[expect(clippy::cast_possible_truncation, reason = "at most 256 locals fit in a u8 slot")]
                return Some(i as u8);
            }
        }
        None
    }

    pub fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let top = self.functions.len() - 1;
        self.resolve_local_in(top, name)
    }

    /// Resolve `name` as an upvalue of `self.functions[fn_index]`, recursing
    /// into enclosing functions and recording a capture chain as it unwinds.
    pub fn resolve_upvalue_in(&mut self, fn_index: usize, name: &str) -> Option<u8> {
        if fn_index == 0 {
            return None;
        }
        let enclosing = fn_index - 1;
        if let Some(local_slot) = self.resolve_local_in(enclosing, name) {
            self.functions[enclosing].locals[local_slot as usize].is_captured = true;
            return Some(self.add_upvalue(fn_index, true, local_slot));
        }
        if let Some(up_index) = self.resolve_upvalue_in(enclosing, name) {
            return Some(self.add_upvalue(fn_index, false, up_index));
        }
        None
    }

    pub fn resolve_upvalue(&mut self, name: &str) -> Option<u8> {
        let top = self.functions.len() - 1;
        self.resolve_upvalue_in(top, name)
    }

    /// De-duplicated insert: an identical `{is_local, index}` pair reuses
    /// its existing slot.
    fn add_upvalue(&mut self, fn_index: usize, is_local: bool, index: u8) -> u8 {
        for (i, up) in self.functions[fn_index].upvalues.iter().enumerate() {
            if up.is_local == is_local && up.index == index {
                #[expect(clippy::cast_possible_truncation, reason = "at most 256 upvalues fit in a u8 slot")]
                return i as u8;
            }
        }
        if self.functions[fn_index].upvalues.len() >= 256 {
            self.parser.error_at_previous("Too many closure variables in function.");
            return 0;
        }
        self.functions[fn_index].upvalues.push(UpvalueDesc { is_local, index });
        let count = self.functions[fn_index].upvalues.len();
        #[expect(clippy::cast_possible_truncation, reason = "length capped at 256 above")]
        let count_u8 = count as u8;
        self.functions[fn_index].function.upvalue_count = count_u8;
        count_u8 - 1
    }

    /// Register the value already sitting on top of the stack as a local
    /// under a name no source token can spell, without emitting any
    /// bytecode. Used to thread a receiver/index through a compound
    /// subscript assignment without re-evaluating it.
    pub fn bind_synthetic_local(&mut self) -> u8 {
        let depth = self.current().scope_depth;
        let slot = self.current().locals.len();
        self.current().locals.push(Local { name: "@synthetic", depth, is_captured: false });
        #[expect(clippy::cast_possible_truncation, reason = "caller bounds total locals at 256")]
        let slot_u8 = slot as u8;
        slot_u8
    }

    /// Drop the most recently bound synthetic locals from compile-time
    /// bookkeeping without emitting `POP`: their stack cells were already
    /// consumed by the opcode that used them.
    pub fn unbind_synthetic_locals(&mut self, count: usize) {
        let new_len = self.current().locals.len() - count;
        self.current().locals.truncate(new_len);
    }

    // --- identifiers ---------------------------------------------------

    pub fn in_global_scope(&mut self) -> bool {
        self.current().scope_depth == 0
    }

    /// Check for, and consume, `kind` without advancing on mismatch, used
    /// by callers that want to branch rather than hard-error.
    pub fn check(&self, kind: TokenKind) -> bool {
        self.parser.check(kind)
    }

    pub fn matches(&mut self, kind: TokenKind) -> bool {
        self.parser.matches(kind)
    }

    pub fn advance(&mut self) {
        self.parser.advance();
    }

    pub fn consume(&mut self, kind: TokenKind, message: &str) {
        self.parser.consume(kind, message);
    }
}
