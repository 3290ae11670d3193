// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The stack machine's dispatch loop.
//!
//! One opcode byte is read from the active frame's IP per iteration; the
//! active frame is always re-derived from `self.frames.last()` rather than
//! cached across iterations, so there is no "refresh the frame pointer
//! after CALL/INVOKE/RETURN" bookkeeping to get wrong: a fresh frame is
//! simply whatever is on top after the opcode ran.

use std::io::Write;

use hobbyl_core::object::UpvalueState;
use hobbyl_core::{
    chunk::op, Chunk, GcRef, Heap, HeapArray, HeapBoundMethod, HeapClosure, HeapEnum, HeapInstance,
    HeapStruct, HeapUpvalue, Obj, Table, Value,
};
use hobbyl_diagnostics::{RuntimeError, RuntimeErrorKind, TraceFrame};

use crate::builtins;
use crate::frame::CallFrame;

#[cfg(test)]
mod vm_test;

/// Call-depth ceiling: a small fixed bound rather than growing the frame
/// vector without limit.
const FRAMES_MAX: usize = 64;

/// The result of classifying a `CALL`/`INVOKE` target, extracted up front so
/// the borrow of `self.heap` ends before the dispatch that follows needs
/// `&mut self` (the same split-the-borrow idiom `Heap::children_of` uses).
enum CallTarget {
    Closure(GcRef),
    HostFn(GcRef),
    Bound { receiver: Value, method: GcRef },
    Invalid,
}

/// Owns the heap, the global table, the value stack, the call-frame stack
/// and the open-upvalue list: every piece of mutable state one Hobbyl
/// program execution needs.
pub struct Vm {
    heap: Heap,
    globals: Table,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// Sorted by descending stack slot.
    open_upvalues: Vec<GcRef>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let mut globals = Table::new();
        builtins::install(&mut heap, &mut globals);
        Self { heap, globals, stack: Vec::new(), frames: Vec::new(), open_upvalues: Vec::new() }
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[must_use]
    pub fn globals(&self) -> &Table {
        &self.globals
    }

    /// Run a freshly compiled top-level script function to completion.
    ///
    /// On a runtime error the stack and frames are reset, so the same
    /// `Vm`, and its globals, can go on to interpret the next REPL line.
    pub fn interpret(&mut self, script: GcRef, out: &mut dyn Write) -> Result<Value, RuntimeError> {
        self.stack.push(Value::obj(script));
        let closure = self.alloc(Obj::Closure(HeapClosure {
            function: script,
            upvalues: Vec::new().into_boxed_slice(),
        }));
        self.stack.pop();
        self.stack.push(Value::obj(closure));

        let outcome = self.call_closure(closure, 0).and_then(|()| self.run(out));
        if outcome.is_err() {
            self.stack.clear();
            self.frames.clear();
            self.open_upvalues.clear();
        }
        outcome
    }

    // --- GC-coupled allocation -------------------------------------------

    /// Mark every live root: the value stack, every
    /// frame's closure, every open upvalue, and the globals table.
    fn mark_roots(&mut self) {
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
    }

    fn alloc(&mut self, obj: Obj) -> GcRef {
        if self.heap.should_collect() {
            self.mark_roots();
            self.heap.collect();
        }
        self.heap.alloc(obj)
    }

    fn intern(&mut self, bytes: &[u8]) -> GcRef {
        if self.heap.should_collect() {
            self.mark_roots();
            self.heap.collect();
        }
        self.heap.intern(bytes)
    }

    // --- errors ------------------------------------------------------------

    /// Build a [`RuntimeError`] with a stack trace captured from the current
    /// frames, top to bottom.
    fn runtime_error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| TraceFrame { name: self.frame_name(frame), line: self.frame_line(frame) })
            .collect();
        tracing::debug!(%kind, "runtime error raised");
        RuntimeError::new(kind, trace)
    }

    fn frame_function(&self, frame: &CallFrame) -> GcRef {
        match self.heap.get(frame.closure) {
            Obj::Closure(c) => c.function,
            _ => unreachable!("CallFrame::closure always references a Closure"),
        }
    }

    fn frame_name(&self, frame: &CallFrame) -> String {
        match self.heap.get(self.frame_function(frame)) {
            Obj::Function(f) => match f.name {
                Some(name) => self.string_contents(name),
                None => "script".to_string(),
            },
            _ => unreachable!("frame function handles always reference a Function"),
        }
    }

    /// The source line of the faulting instruction within `frame` (its IP
    /// minus one, since the IP already advanced past the opcode byte).
    fn frame_line(&self, frame: &CallFrame) -> u32 {
        match self.heap.get(self.frame_function(frame)) {
            Obj::Function(f) => f.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0),
            _ => unreachable!("frame function handles always reference a Function"),
        }
    }

    fn string_contents(&self, handle: GcRef) -> String {
        match self.heap.get(handle) {
            Obj::String(s) => s.as_str().to_string(),
            _ => String::new(),
        }
    }

    // --- bytecode reading --------------------------------------------------

    fn current_chunk(&self) -> &Chunk {
        let frame = self.frames.last().expect("run always has an active frame");
        &match self.heap.get(self.frame_function(frame)) {
            Obj::Function(f) => f,
            _ => unreachable!("frame function handles always reference a Function"),
        }
            .chunk
    }

    fn read_byte(&mut self) -> u8 {
        let ip = self.frames.last().expect("active frame").ip;
        let byte = self.current_chunk().code[ip];
        self.frames.last_mut().expect("active frame").ip = ip + 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        self.current_chunk().constants[index as usize]
    }

    fn read_string(&mut self) -> GcRef {
        self.read_constant().as_obj().expect("name constants are always interned strings")
    }

    fn jump_forward(&mut self, offset: u16) {
        let index = self.frames.len() - 1;
        self.frames[index].ip += offset as usize;
    }

    fn jump_backward(&mut self, offset: u16) {
        let index = self.frames.len() - 1;
        self.frames[index].ip -= offset as usize;
    }

    // --- stack helpers -------------------------------------------------

    fn pop2(&mut self) -> (Value, Value) {
        let b = self.stack.pop().expect("binary op needs two operands");
        let a = self.stack.pop().expect("binary op needs two operands");
        (a, b)
    }

    fn binary_number_op(&mut self, f: impl Fn(f64, f64) -> Value) -> Result<(), RuntimeError> {
        let (a, b) = self.pop2();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.stack.push(f(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error(RuntimeErrorKind::OperandsMustBeNumbers)),
        }
    }

    fn string_bytes(&self, value: Value) -> Result<Vec<u8>, RuntimeError> {
        match value {
            Value::Obj(h) => match self.heap.get(h) {
                Obj::String(s) => Ok(s.bytes.to_vec()),
                _ => Err(self.runtime_error(RuntimeErrorKind::OperandsMustBeStrings)),
            },
            _ => Err(self.runtime_error(RuntimeErrorKind::OperandsMustBeStrings)),
        }
    }

    fn concat(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop2();
        let mut bytes = self.string_bytes(a)?;
        bytes.extend_from_slice(&self.string_bytes(b)?);
        let handle = self.intern(&bytes);
        self.stack.push(Value::obj(handle));
        Ok(())
    }

    fn negate(&mut self) -> Result<(), RuntimeError> {
        let value = self.stack.pop().expect("NEGATE operand");
        match value.as_number() {
            Some(n) => {
                self.stack.push(Value::number(-n));
                Ok(())
            }
            None => Err(self.runtime_error(RuntimeErrorKind::OperandMustBeNumber)),
        }
    }

    fn not_op(&mut self) {
        let value = self.stack.pop().expect("NOT operand");
        self.stack.push(Value::bool(!value.is_truthy()));
    }

    // --- arrays & subscripts -------------------------------------------

    /// Allocate the (still-empty) array before popping its elements off the
    /// stack, so the elements stay rooted by the stack itself through the
    /// allocation (mirrors `original_source/src/vm.c`'s `OP_ARRAY`, which
    /// peeks rather than pops while building the array).
    fn op_array(&mut self, count: u8) {
        let n = count as usize;
        let handle = self.alloc(Obj::Array(HeapArray::default()));
        let start = self.stack.len() - n;
        let values = self.stack.split_off(start);
        match self.heap.get_mut(handle) {
            Obj::Array(a) => a.values = values,
            _ => unreachable!("just allocated an Array"),
        }
        self.stack.push(Value::obj(handle));
    }

    fn expect_array(&self, value: Value) -> Result<GcRef, RuntimeError> {
        match value {
            Value::Obj(h) if matches!(self.heap.get(h), Obj::Array(_)) => Ok(h),
            _ => Err(self.runtime_error(RuntimeErrorKind::NotAnArray)),
        }
    }

    fn expect_index(&self, value: Value) -> Result<f64, RuntimeError> {
        value.as_number().ok_or_else(|| self.runtime_error(RuntimeErrorKind::SubscriptMustBeNumber))
    }

    /// `index >= count` is rejected (SPEC_FULL.md §3: the source's
    /// `index > count` one-past-end read is a bug, not a feature).
    fn checked_index(&self, idx: f64, len: usize) -> Result<usize, RuntimeError> {
        if idx < 0.0 || idx >= len as f64 {
            return Err(self.runtime_error(RuntimeErrorKind::IndexOutOfBounds));
        }
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "bounds checked above")]
        let index = idx as usize;
        Ok(index)
    }

    fn get_subscript(&mut self) -> Result<(), RuntimeError> {
        let (arr, idx) = self.pop2();
        let idx = self.expect_index(idx)?;
        let arr_handle = self.expect_array(arr)?;
        let len = match self.heap.get(arr_handle) {
            Obj::Array(a) => a.values.len(),
            _ => unreachable!("checked above"),
        };
        let index = self.checked_index(idx, len)?;
        let value = match self.heap.get(arr_handle) {
            Obj::Array(a) => a.values[index],
            _ => unreachable!("checked above"),
        };
        self.stack.push(value);
        Ok(())
    }

    /// `arr, idx, v -> v`, written from scratch: `original_source`'s
    /// `OP_SET_SUBSCRIPT` is an unimplemented stub, not a reference.
    fn set_subscript(&mut self) -> Result<(), RuntimeError> {
        let value = self.stack.pop().expect("SET_SUBSCRIPT value");
        let idx = self.stack.pop().expect("SET_SUBSCRIPT index");
        let arr = self.stack.pop().expect("SET_SUBSCRIPT receiver");
        let idx = self.expect_index(idx)?;
        let arr_handle = self.expect_array(arr)?;
        let len = match self.heap.get(arr_handle) {
            Obj::Array(a) => a.values.len(),
            _ => unreachable!("checked above"),
        };
        let index = self.checked_index(idx, len)?;
        match self.heap.get_mut(arr_handle) {
            Obj::Array(a) => a.values[index] = value,
            _ => unreachable!("checked above"),
        }
        self.stack.push(value);
        Ok(())
    }

    // --- globals/locals/upvalues -----------------------------------------

    fn define_global(&mut self, name_handle: GcRef) {
        let value = self.stack.pop().expect("DEFINE_GLOBAL value");
        let hash = self.heap.hash_of_string(name_handle);
        self.globals.set(name_handle, hash, value);
    }

    fn get_global(&mut self, name_handle: GcRef) -> Result<Value, RuntimeError> {
        let hash = self.heap.hash_of_string(name_handle);
        self.globals.get(name_handle, hash).ok_or_else(|| {
            let name = self.string_contents(name_handle);
            self.runtime_error(RuntimeErrorKind::UndefinedGlobal(name))
        })
    }

    fn set_global(&mut self, name_handle: GcRef, value: Value) -> Result<(), RuntimeError> {
        let hash = self.heap.hash_of_string(name_handle);
        if !self.globals.contains(name_handle, hash) {
            let name = self.string_contents(name_handle);
            return Err(self.runtime_error(RuntimeErrorKind::UndefinedGlobal(name)));
        }
        self.globals.set(name_handle, hash, value);
        Ok(())
    }

    fn get_local(&self, slot: u8) -> Value {
        let base = self.frames.last().expect("active frame").base;
        self.stack[base + slot as usize]
    }

    fn set_local(&mut self, slot: u8, value: Value) {
        let base = self.frames.last().expect("active frame").base;
        self.stack[base + slot as usize] = value;
    }

    fn get_upvalue(&self, index: u8) -> Value {
        let closure = self.frames.last().expect("active frame").closure;
        let handle = match self.heap.get(closure) {
            Obj::Closure(c) => c.upvalues[index as usize],
            _ => unreachable!("active frame's closure is always a Closure"),
        };
        match self.heap.get(handle) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => self.stack[slot],
                UpvalueState::Closed(value) => value,
            },
            _ => unreachable!("upvalue handles always reference an Upvalue"),
        }
    }

    fn set_upvalue(&mut self, index: u8, value: Value) {
        let closure = self.frames.last().expect("active frame").closure;
        let handle = match self.heap.get(closure) {
            Obj::Closure(c) => c.upvalues[index as usize],
            _ => unreachable!("active frame's closure is always a Closure"),
        };
        let open_slot = match self.heap.get(handle) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => Some(slot),
                UpvalueState::Closed(_) => None,
            },
            _ => unreachable!("upvalue handles always reference an Upvalue"),
        };
        match open_slot {
            Some(slot) => self.stack[slot] = value,
            None => match self.heap.get_mut(handle) {
                Obj::Upvalue(u) => u.state = UpvalueState::Closed(value),
                _ => unreachable!("upvalue handles always reference an Upvalue"),
            },
        }
    }

    fn open_upvalue_slot(&self, handle: GcRef) -> Option<usize> {
        match self.heap.get(handle) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => Some(slot),
                UpvalueState::Closed(_) => None,
            },
            _ => None,
        }
    }

    /// Reuse an existing open upvalue for `stack_slot`, or insert a new one
    /// keeping `open_upvalues` sorted by descending slot.
    fn capture_upvalue(&mut self, stack_slot: usize) -> GcRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &handle) in self.open_upvalues.iter().enumerate() {
            match self.open_upvalue_slot(handle) {
                Some(slot) if slot == stack_slot => return handle,
                Some(slot) if slot < stack_slot => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let handle = self.alloc(Obj::Upvalue(HeapUpvalue { state: UpvalueState::Open(stack_slot) }));
        self.open_upvalues.insert(insert_at, handle);
        handle
    }

    /// Close every open upvalue at or above `from_slot`, moving the stack
    /// value into the upvalue itself.
    fn close_upvalues_from(&mut self, from_slot: usize) {
        while let Some(&handle) = self.open_upvalues.first() {
            match self.open_upvalue_slot(handle) {
                Some(slot) if slot >= from_slot => {
                    let value = self.stack[slot];
                    match self.heap.get_mut(handle) {
                        Obj::Upvalue(u) => u.state = UpvalueState::Closed(value),
                        _ => unreachable!("open_upvalues only ever holds Upvalue handles"),
                    }
                    self.open_upvalues.remove(0);
                }
                _ => break,
            }
        }
    }

    // --- properties, statics, structs, enums ----------------------------

    fn expect_instance(&self, value: Value) -> Result<GcRef, RuntimeError> {
        match value {
            Value::Obj(h) if matches!(self.heap.get(h), Obj::Instance(_)) => Ok(h),
            _ => Err(self.runtime_error(RuntimeErrorKind::NotAnInstance)),
        }
    }

    fn get_property(&mut self, name_handle: GcRef, keep_receiver: bool) -> Result<(), RuntimeError> {
        let receiver = *self.stack.last().expect("GET_PROPERTY/PUSH_PROPERTY needs a receiver");
        let instance_handle = self.expect_instance(receiver)?;
        let hash = self.heap.hash_of_string(name_handle);
        let field = match self.heap.get(instance_handle) {
            Obj::Instance(i) => i.fields.get(name_handle, hash),
            _ => unreachable!("checked above"),
        };
        let value = match field {
            Some(v) => v,
            None => {
                let struct_ref = match self.heap.get(instance_handle) {
                    Obj::Instance(i) => i.struct_ref,
                    _ => unreachable!("checked above"),
                };
                let method = match self.heap.get(struct_ref) {
                    Obj::Struct(s) => s.methods.get(name_handle, hash),
                    _ => None,
                };
                match method {
                    Some(Value::Obj(method_handle)) => {
                        let bound = self
                            .alloc(Obj::BoundMethod(HeapBoundMethod { receiver, method: method_handle }));
                        Value::obj(bound)
                    }
                    _ => {
                        let name = self.string_contents(name_handle);
                        return Err(self.runtime_error(RuntimeErrorKind::UndefinedProperty(name)));
                    }
                }
            }
        };
        if !keep_receiver {
            self.stack.pop();
        }
        self.stack.push(value);
        Ok(())
    }

    /// `SET_PROPERTY`/`INIT_PROPERTY` share the same validation.
    fn write_existing_field(
        &mut self,
        instance_handle: GcRef,
        name_handle: GcRef,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let hash = self.heap.hash_of_string(name_handle);
        let exists = match self.heap.get(instance_handle) {
            Obj::Instance(i) => i.fields.contains(name_handle, hash),
            _ => unreachable!("checked by caller"),
        };
        if !exists {
            let name = self.string_contents(name_handle);
            return Err(self.runtime_error(RuntimeErrorKind::UndefinedField(name)));
        }
        match self.heap.get_mut(instance_handle) {
            Obj::Instance(i) => {
                i.fields.set(name_handle, hash, value);
            }
            _ => unreachable!("checked by caller"),
        }
        Ok(())
    }

    fn set_property(&mut self, name_handle: GcRef) -> Result<(), RuntimeError> {
        let value = self.stack.pop().expect("SET_PROPERTY value");
        let receiver = self.stack.pop().expect("SET_PROPERTY instance");
        let instance_handle = self.expect_instance(receiver)?;
        self.write_existing_field(instance_handle, name_handle, value)?;
        self.stack.push(value);
        Ok(())
    }

    fn init_property(&mut self, name_handle: GcRef) -> Result<(), RuntimeError> {
        let value = self.stack.pop().expect("INIT_PROPERTY value");
        let receiver = self.stack.pop().expect("INIT_PROPERTY instance");
        let instance_handle = self.expect_instance(receiver)?;
        self.write_existing_field(instance_handle, name_handle, value)?;
        self.stack.push(receiver);
        Ok(())
    }

    fn get_static(&mut self, name_handle: GcRef) -> Result<(), RuntimeError> {
        let receiver = self.stack.pop().expect("GET_STATIC receiver");
        let handle = match receiver {
            Value::Obj(h) => h,
            _ => return Err(self.runtime_error(RuntimeErrorKind::NotAStructOrEnum)),
        };
        let hash = self.heap.hash_of_string(name_handle);
        let value = match self.heap.get(handle) {
            Obj::Struct(s) => s.statics.get(name_handle, hash),
            Obj::Enum(e) => e.values.get(name_handle, hash),
            _ => return Err(self.runtime_error(RuntimeErrorKind::NotAStructOrEnum)),
        };
        match value {
            Some(v) => {
                self.stack.push(v);
                Ok(())
            }
            None => {
                let name = self.string_contents(name_handle);
                Err(self.runtime_error(RuntimeErrorKind::UndefinedStatic(name)))
            }
        }
    }

    /// Struct on top; allocate the instance before copying default fields,
    /// so the struct stays rooted on the stack through the allocation
    /// (mirrors `original_source/src/object.c`'s `newInstance`).
    fn op_instance(&mut self) -> Result<(), RuntimeError> {
        let struct_val = *self.stack.last().expect("INSTANCE needs a struct");
        let struct_handle = match struct_val {
            Value::Obj(h) if matches!(self.heap.get(h), Obj::Struct(_)) => h,
            _ => return Err(self.runtime_error(RuntimeErrorKind::Custom(
                "Can only use struct initialization on structs.".to_string(),
            ))),
        };
        let handle =
            self.alloc(Obj::Instance(HeapInstance { struct_ref: struct_handle, fields: Table::new() }));
        let default_fields = match self.heap.get(struct_handle) {
            Obj::Struct(s) => s.default_fields.clone(),
            _ => unreachable!("checked above"),
        };
        match self.heap.get_mut(handle) {
            Obj::Instance(i) => i.fields = default_fields,
            _ => unreachable!("just allocated an Instance"),
        }
        self.stack.pop();
        self.stack.push(Value::obj(handle));
        Ok(())
    }

    fn op_struct(&mut self, name_handle: GcRef) {
        let handle = self.alloc(Obj::Struct(HeapStruct::new(name_handle)));
        self.stack.push(Value::obj(handle));
    }

    fn op_enum(&mut self, name_handle: GcRef) {
        let handle = self.alloc(Obj::Enum(HeapEnum::new(name_handle)));
        self.stack.push(Value::obj(handle));
    }

    /// `struct, defaultVal -> struct`.
    fn struct_field(&mut self, name_handle: GcRef) {
        let value = self.stack.pop().expect("STRUCT_FIELD value");
        let struct_handle = self
            .stack
            .last()
            .expect("STRUCT_FIELD struct")
            .as_obj()
            .expect("struct_declaration pushes a Struct");
        let hash = self.heap.hash_of_string(name_handle);
        match self.heap.get_mut(struct_handle) {
            Obj::Struct(s) => {
                s.default_fields.set(name_handle, hash, value);
            }
            _ => unreachable!("STRUCT_FIELD always follows STRUCT"),
        }
    }

    /// `struct, closure -> struct`.
    fn define_member(&mut self, name_handle: GcRef, is_static: bool) {
        let closure_val = self.stack.pop().expect("METHOD/STATIC_METHOD closure");
        let struct_handle = self
            .stack
            .last()
            .expect("METHOD/STATIC_METHOD struct")
            .as_obj()
            .expect("struct_declaration pushes a Struct");
        let hash = self.heap.hash_of_string(name_handle);
        match self.heap.get_mut(struct_handle) {
            Obj::Struct(s) => {
                if is_static {
                    s.statics.set(name_handle, hash, closure_val);
                } else {
                    s.methods.set(name_handle, hash, closure_val);
                }
            }
            _ => unreachable!("METHOD/STATIC_METHOD always follows STRUCT"),
        }
    }

    /// `enumOnTop, value -> enumOnTop`. The value was pushed via `CONSTANT`
    /// rather than carried as a raw operand byte (unlike `original_source`'s
    /// `OP_ENUM_VALUE`, capped at 255 distinct values): Hobbyl's compiler
    /// routes it through the constant pool like every other pushed value.
    fn enum_value(&mut self, name_handle: GcRef) {
        let value = self.stack.pop().expect("ENUM_VALUE value");
        let enum_handle = self
            .stack
            .last()
            .expect("ENUM_VALUE enum")
            .as_obj()
            .expect("enum_declaration pushes an Enum");
        let hash = self.heap.hash_of_string(name_handle);
        match self.heap.get_mut(enum_handle) {
            Obj::Enum(e) => {
                e.values.set(name_handle, hash, value);
            }
            _ => unreachable!("ENUM_VALUE always follows ENUM"),
        }
    }

    // --- calls -----------------------------------------------------------

    fn classify_callable(&self, handle: GcRef) -> CallTarget {
        match self.heap.get(handle) {
            Obj::Closure(_) => CallTarget::Closure(handle),
            Obj::HostFn(_) => CallTarget::HostFn(handle),
            Obj::BoundMethod(b) => CallTarget::Bound { receiver: b.receiver, method: b.method },
            _ => CallTarget::Invalid,
        }
    }

    /// `stack[top - argc - 1]` is the callee; dispatch
    /// "Call protocol".
    fn call_value(&mut self, argc: u8, out: &mut dyn Write) -> Result<(), RuntimeError> {
        let callee_index = self.stack.len() - argc as usize - 1;
        let target = match self.stack[callee_index] {
            Value::Obj(handle) => self.classify_callable(handle),
            _ => CallTarget::Invalid,
        };
        match target {
            CallTarget::Closure(handle) => self.call_closure(handle, argc),
            CallTarget::HostFn(handle) => self.call_host_fn(handle, argc, callee_index, out),
            CallTarget::Bound { receiver, method } => {
                self.stack[callee_index] = receiver;
                self.call_closure(method, argc)
            }
            CallTarget::Invalid => Err(self.runtime_error(RuntimeErrorKind::NotCallable)),
        }
    }

    fn call_closure(&mut self, closure_handle: GcRef, argc: u8) -> Result<(), RuntimeError> {
        let function_handle = match self.heap.get(closure_handle) {
            Obj::Closure(c) => c.function,
            _ => unreachable!("callers only pass an actual Closure handle"),
        };
        let arity = match self.heap.get(function_handle) {
            Obj::Function(f) => f.arity,
            _ => unreachable!("Closure::function always references a Function"),
        };
        if argc != arity {
            return Err(self.runtime_error(RuntimeErrorKind::ArityMismatch { expected: arity, got: argc }));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error(RuntimeErrorKind::StackOverflow));
        }
        let base = self.stack.len() - argc as usize - 1;
        self.frames.push(CallFrame { closure: closure_handle, ip: 0, base });
        Ok(())
    }

    fn call_host_fn(
        &mut self,
        handle: GcRef,
        argc: u8,
        callee_index: usize,
        out: &mut dyn Write,
    ) -> Result<(), RuntimeError> {
        let (arity, func) = match self.heap.get(handle) {
            Obj::HostFn(h) => (h.arity, h.func),
            _ => unreachable!("callers only pass an actual HostFn handle"),
        };
        if let Some(expected) = arity {
            if argc != expected {
                return Err(self.runtime_error(RuntimeErrorKind::ArityMismatch { expected, got: argc }));
            }
        }
        let args: Vec<Value> = self.stack[callee_index + 1..].to_vec();
        let result = (func)(&mut self.heap, &args, out);
        self.stack.truncate(callee_index);
        match result {
            Ok(value) => {
                self.stack.push(value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(RuntimeErrorKind::Custom(message))),
        }
    }

    fn invoke(&mut self, name_handle: GcRef, argc: u8, out: &mut dyn Write) -> Result<(), RuntimeError> {
        let callee_index = self.stack.len() - argc as usize - 1;
        let receiver = self.stack[callee_index];
        let instance_handle = self.expect_instance(receiver)?;
        let hash = self.heap.hash_of_string(name_handle);
        let field = match self.heap.get(instance_handle) {
            Obj::Instance(i) => i.fields.get(name_handle, hash),
            _ => unreachable!("checked above"),
        };
        if let Some(value) = field {
            self.stack[callee_index] = value;
            return self.call_value(argc, out);
        }
        let struct_ref = match self.heap.get(instance_handle) {
            Obj::Instance(i) => i.struct_ref,
            _ => unreachable!("checked above"),
        };
        let method = match self.heap.get(struct_ref) {
            Obj::Struct(s) => s.methods.get(name_handle, hash),
            _ => None,
        };
        match method {
            Some(Value::Obj(method_handle)) => self.call_closure(method_handle, argc),
            _ => {
                let name = self.string_contents(name_handle);
                Err(self.runtime_error(RuntimeErrorKind::UndefinedProperty(name)))
            }
        }
    }

    fn op_closure(&mut self) -> Result<(), RuntimeError> {
        let function_value = self.read_constant();
        let function_handle =
            function_value.as_obj().expect("CLOSURE's operand constant is always a Function");
        let upvalue_count = match self.heap.get(function_handle) {
            Obj::Function(f) => f.upvalue_count,
            _ => unreachable!("checked above"),
        };
        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte();
            let upvalue = if is_local {
                let base = self.frames.last().expect("active frame").base;
                self.capture_upvalue(base + index as usize)
            } else {
                let enclosing = self.frames.last().expect("active frame").closure;
                match self.heap.get(enclosing) {
                    Obj::Closure(c) => c.upvalues[index as usize],
                    _ => unreachable!("active frame's closure is always a Closure"),
                }
            };
            upvalues.push(upvalue);
        }
        let handle = self.alloc(Obj::Closure(HeapClosure {
            function: function_handle,
            upvalues: upvalues.into_boxed_slice(),
        }));
        self.stack.push(Value::obj(handle));
        Ok(())
    }

    /// Pop the result, close upvalues from the frame base, pop the frame.
    /// `None` means the caller should keep running; `Some` means the
    /// outermost (script) frame just returned and `run` should halt.
    fn op_return(&mut self) -> Option<Value> {
        let result = self.stack.pop().expect("RETURN value");
        let base = self.frames.last().expect("active frame").base;
        self.close_upvalues_from(base);
        self.frames.pop();
        if self.frames.is_empty() {
            self.stack.pop().expect("the script closure itself is still at slot 0");
            Some(result)
        } else {
            self.stack.truncate(base);
            self.stack.push(result);
            None
        }
    }

    // --- the loop ----------------------------------------------------------

    fn run(&mut self, out: &mut dyn Write) -> Result<Value, RuntimeError> {
        loop {
            let instruction = self.read_byte();
            match instruction {
                op::CONSTANT => {
                    let value = self.read_constant();
                    self.stack.push(value);
                }
                op::NIL => self.stack.push(Value::nil()),
                op::TRUE => self.stack.push(Value::bool(true)),
                op::FALSE => self.stack.push(Value::bool(false)),
                op::POP => {
                    self.stack.pop();
                }
                op::ARRAY => {
                    let count = self.read_byte();
                    self.op_array(count);
                }
                op::GET_SUBSCRIPT => self.get_subscript()?,
                op::SET_SUBSCRIPT => self.set_subscript()?,
                op::DEFINE_GLOBAL => {
                    let name = self.read_string();
                    self.define_global(name);
                }
                op::GET_GLOBAL => {
                    let name = self.read_string();
                    let value = self.get_global(name)?;
                    self.stack.push(value);
                }
                op::SET_GLOBAL => {
                    let name = self.read_string();
                    let value = *self.stack.last().expect("SET_GLOBAL value");
                    self.set_global(name, value)?;
                }
                op::GET_LOCAL => {
                    let slot = self.read_byte();
                    let value = self.get_local(slot);
                    self.stack.push(value);
                }
                op::SET_LOCAL => {
                    let slot = self.read_byte();
                    let value = *self.stack.last().expect("SET_LOCAL value");
                    self.set_local(slot, value);
                }
                op::GET_UPVALUE => {
                    let index = self.read_byte();
                    let value = self.get_upvalue(index);
                    self.stack.push(value);
                }
                op::SET_UPVALUE => {
                    let index = self.read_byte();
                    let value = *self.stack.last().expect("SET_UPVALUE value");
                    self.set_upvalue(index, value);
                }
                op::GET_PROPERTY => {
                    let name = self.read_string();
                    self.get_property(name, false)?;
                }
                op::PUSH_PROPERTY => {
                    let name = self.read_string();
                    self.get_property(name, true)?;
                }
                op::SET_PROPERTY => {
                    let name = self.read_string();
                    self.set_property(name)?;
                }
                op::INIT_PROPERTY => {
                    let name = self.read_string();
                    self.init_property(name)?;
                }
                op::GET_STATIC => {
                    let name = self.read_string();
                    self.get_static(name)?;
                }
                op::EQUAL => {
                    let (a, b) = self.pop2();
                    self.stack.push(Value::bool(a.values_equal(b)));
                }
                op::NOT_EQUAL => {
                    let (a, b) = self.pop2();
                    self.stack.push(Value::bool(!a.values_equal(b)));
                }
                op::GREATER => self.binary_number_op(|a, b| Value::bool(a > b))?,
                op::GREATER_EQUAL => self.binary_number_op(|a, b| Value::bool(a >= b))?,
                op::LESSER => self.binary_number_op(|a, b| Value::bool(a < b))?,
                op::LESSER_EQUAL => self.binary_number_op(|a, b| Value::bool(a <= b))?,
                op::CONCAT => self.concat()?,
                op::ADD => self.binary_number_op(|a, b| Value::number(a + b))?,
                op::SUBTRACT => self.binary_number_op(|a, b| Value::number(a - b))?,
                op::MULTIPLY => self.binary_number_op(|a, b| Value::number(a * b))?,
                op::DIVIDE => self.binary_number_op(|a, b| Value::number(a / b))?,
                op::MODULO => self.binary_number_op(|a, b| Value::number(a % b))?,
                op::POW => self.binary_number_op(|a, b| Value::number(a.powf(b)))?,
                op::NEGATE => self.negate()?,
                op::NOT => self.not_op(),
                op::JUMP => {
                    let offset = self.read_u16();
                    self.jump_forward(offset);
                }
                op::JUMP_IF_FALSE => {
                    let offset = self.read_u16();
                    if !self.stack.last().expect("JUMP_IF_FALSE condition").is_truthy() {
                        self.jump_forward(offset);
                    }
                }
                op::INEQUALITY_JUMP => {
                    // Both operands are popped unconditionally: hobbyl's
                    // `match` re-pushes a fresh copy of the scrutinee per
                    // case (decl.rs `match_statement`) rather than peeking
                    // one persistent value the way `original_source`'s
                    // compiler does, so nothing is left to clean up on
                    // either branch.
                    let offset = self.read_u16();
                    let (a, b) = self.pop2();
                    if !a.values_equal(b) {
                        self.jump_forward(offset);
                    }
                }
                op::LOOP => {
                    let offset = self.read_u16();
                    self.jump_backward(offset);
                }
                op::CALL => {
                    let argc = self.read_byte();
                    self.call_value(argc, out)?;
                }
                op::INVOKE => {
                    let name = self.read_string();
                    let argc = self.read_byte();
                    self.invoke(name, argc, out)?;
                }
                op::INSTANCE => self.op_instance()?,
                op::CLOSURE => self.op_closure()?,
                op::CLOSE_UPVALUE => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues_from(top);
                    self.stack.pop();
                }
                op::RETURN => {
                    if let Some(value) = self.op_return() {
                        return Ok(value);
                    }
                }
                op::ENUM => {
                    let name = self.read_string();
                    self.op_enum(name);
                }
                op::STRUCT => {
                    let name = self.read_string();
                    self.op_struct(name);
                }
                op::ENUM_VALUE => {
                    let name = self.read_string();
                    self.enum_value(name);
                }
                op::STRUCT_FIELD => {
                    let name = self.read_string();
                    self.struct_field(name);
                }
                op::METHOD => {
                    let name = self.read_string();
                    self.define_member(name, false);
                }
                op::STATIC_METHOD => {
                    let name = self.read_string();
                    self.define_member(name, true);
                }
                // BREAK is always rewritten to JUMP by the compiler
                // (decl.rs `pop_loop`); reaching it here means malformed
                // bytecode.
                _ => return Err(self.runtime_error(RuntimeErrorKind::InvalidOpcode)),
            }
        }
    }
}
