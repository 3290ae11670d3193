// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The object arena and the tracing garbage collector.
//!
//! `Heap` owns every object ever allocated. Nothing is ever freed by a
//! destructor call from user code; the only way an object's storage is
//! reclaimed is the `sweep` half of a collection cycle finding its slot
//! still unmarked. Handles ([`GcRef`]) are arena indices, so the "object
//! graph" is ordinary Rust data with no unsafe pointer chasing.
//!
//! The heap itself has no notion of VM stacks, call frames or in-progress
//! compilers: those roots live in `hobbyl-vm` and `hobbyl-compiler`. A
//! collection cycle is driven from outside: the caller marks its roots by
//! calling [`Heap::mark_value`]/[`Heap::mark_object`], then calls
//! [`Heap::collect`] to trace and sweep.

use crate::object::{fnv1a, Obj};
use crate::table::Table;
use crate::value::{GcRef, Value};

#[cfg(test)]
mod heap_test;

/// Initial GC threshold.
const INITIAL_NEXT_GC: usize = 1024 * 1024;

struct Slot {
    obj: Obj,
    marked: bool,
}

/// Intermediate result of [`Heap::children_of`]; see its doc comment.
enum BlackenChildren {
    None,
    Function {
        name: Option<GcRef>,
        constants: Vec<Value>,
    },
    Closure {
        function: GcRef,
        upvalues: Vec<GcRef>,
    },
    UpvalueClosed(Option<Value>),
    BoundMethod {
        receiver: Value,
        method: GcRef,
    },
    Tables {
        name: GcRef,
        tables: Vec<Table>,
    },
    Array(Vec<Value>),
}

pub struct Heap {
    objects: Vec<Option<Slot>>,
    free: Vec<u32>,
    /// The interned-string set. Weakly holds string handles:
    /// the table itself is swept of dead entries every GC cycle.
    strings: Table,
    gray_stack: Vec<GcRef>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Incremented every completed cycle; surfaced only for diagnostics.
    pub collections_run: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            gray_stack: Vec::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            collections_run: 0,
        }
    }

    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Whether the next allocation should trigger a collection first.
    #[must_use]
    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    fn insert(&mut self, obj: Obj) -> GcRef {
        self.bytes_allocated += obj.byte_size();
        let slot = Some(Slot {
            obj,
            marked: false,
        });
        if let Some(index) = self.free.pop() {
            self.objects[index as usize] = slot;
            GcRef::from_index(index)
        } else {
            let index = self.objects.len();
            self.objects.push(slot);
            #[expect(clippy::cast_possible_truncation, reason = "heaps stay far below u32::MAX objects")]
            GcRef::from_index(index as u32)
        }
    }

    /// Allocate a raw, uninterned object. A discipline applies to callers:
    /// push the returned handle as a `Value` onto a GC root (typically the
    /// VM stack) before any further allocation that might itself trigger a
    /// collection.
    pub fn alloc(&mut self, obj: Obj) -> GcRef {
        self.insert(obj)
    }

    pub fn get(&self, handle: GcRef) -> &Obj {
        self.objects[handle.index() as usize]
            .as_ref()
            .map(|s| &s.obj)
            .expect("dangling GcRef: object was swept while still referenced")
    }

    pub fn get_mut(&mut self, handle: GcRef) -> &mut Obj {
        self.objects[handle.index() as usize]
            .as_mut()
            .map(|s| &mut s.obj)
            .expect("dangling GcRef: object was swept while still referenced")
    }

    /// Intern a byte string. Returns the existing handle if an
    /// equal-bytes string is already interned, otherwise allocates and
    /// registers a new one.
    pub fn intern(&mut self, bytes: &[u8]) -> GcRef {
        let hash = fnv1a(bytes);
        if let Some(existing) =
            self.strings.find_by_bytes(hash, |candidate| self.string_bytes(candidate) == bytes)
        {
            return existing;
        }
        let handle = self.insert(Obj::String(crate::object::HeapString {
            bytes: bytes.into(),
            hash,
        }));
        self.strings.set(handle, hash, Value::Bool(true));
        handle
    }

    fn string_bytes(&self, handle: GcRef) -> &[u8] {
        match self.get(handle) {
            Obj::String(s) => &s.bytes,
            _ => &[],
        }
    }

    #[must_use]
    pub fn hash_of_string(&self, handle: GcRef) -> u64 {
        match self.get(handle) {
            Obj::String(s) => s.hash,
            _ => 0,
        }
    }

    // --- Garbage collection -------------------------------------------

    /// Mark a value's object (if it has one) gray. Idempotent: marking an
    /// already-black or already-gray object is a no-op.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(handle) = value {
            self.mark_object(handle);
        }
    }

    pub fn mark_object(&mut self, handle: GcRef) {
        let Some(slot) = self.objects.get_mut(handle.index() as usize).and_then(Option::as_mut)
        else {
            return;
        };
        if slot.marked {
            return;
        }
        slot.marked = true;
        self.gray_stack.push(handle);
    }

    /// Pop the gray stack until empty, blackening each object by marking
    /// its outgoing references.
    fn trace_references(&mut self) {
        while let Some(handle) = self.gray_stack.pop() {
            self.blacken(handle);
        }
    }

    /// The references blacken needs to walk, extracted up front so the
    /// immutable borrow of `self.objects` ends before we recursively mark
    /// (which needs `&mut self`). Only the handles/values are cloned, never
    /// an object's bulk data (e.g. a function's bytecode bytes).
    fn children_of(&self, handle: GcRef) -> BlackenChildren {
        let Some(slot) = self.objects[handle.index() as usize].as_ref() else {
            return BlackenChildren::None;
        };
        match &slot.obj {
            Obj::String(_) | Obj::HostFn(_) => BlackenChildren::None,
            Obj::Function(f) => BlackenChildren::Function {
                name: f.name,
                constants: f.chunk.constants.clone(),
            },
            Obj::Closure(c) => BlackenChildren::Closure {
                function: c.function,
                upvalues: c.upvalues.to_vec(),
            },
            Obj::Upvalue(u) => BlackenChildren::UpvalueClosed(match u.state {
                crate::object::UpvalueState::Closed(v) => Some(v),
                crate::object::UpvalueState::Open(_) => None,
            }),
            Obj::BoundMethod(b) => BlackenChildren::BoundMethod {
                receiver: b.receiver,
                method: b.method,
            },
            Obj::Struct(s) => BlackenChildren::Tables {
                name: s.name,
                tables: vec![s.default_fields.clone(), s.methods.clone(), s.statics.clone()],
            },
            Obj::Instance(i) => BlackenChildren::Tables {
                name: i.struct_ref,
                tables: vec![i.fields.clone()],
            },
            Obj::Enum(e) => BlackenChildren::Tables {
                name: e.name,
                tables: vec![e.values.clone()],
            },
            Obj::Array(a) => BlackenChildren::Array(a.values.clone()),
        }
    }

    fn blacken(&mut self, handle: GcRef) {
        match self.children_of(handle) {
            BlackenChildren::None => {}
            BlackenChildren::Function { name, constants } => {
                if let Some(name) = name {
                    self.mark_object(name);
                }
                for c in constants {
                    self.mark_value(c);
                }
            }
            BlackenChildren::Closure { function, upvalues } => {
                self.mark_object(function);
                for u in upvalues {
                    self.mark_object(u);
                }
            }
            BlackenChildren::UpvalueClosed(value) => {
                if let Some(v) = value {
                    self.mark_value(v);
                }
            }
            BlackenChildren::BoundMethod { receiver, method } => {
                self.mark_value(receiver);
                self.mark_object(method);
            }
            BlackenChildren::Tables { name, tables } => {
                self.mark_object(name);
                for table in &tables {
                    self.mark_table(table);
                }
            }
            BlackenChildren::Array(values) => {
                for v in values {
                    self.mark_value(v);
                }
            }
        }
    }

    /// Mark every key and value of a table that lives outside the heap
    /// (the globals table, owned by the VM). Struct/instance/enum tables are
    /// marked internally during blackening instead.
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Run a full collection cycle: the caller has already marked roots by
    /// calling [`Heap::mark_value`]/[`mark_object`](Heap::mark_object) for
    /// everything reachable from the VM stack, call frames, open upvalues,
    /// globals table and in-progress compilers.
    pub fn collect(&mut self) {
        let before = self.bytes_allocated;
        self.trace_references();
        // The intern table holds weak references: drop any string that
        // nothing else marked reachable.
        self.strings.retain_keys(|handle| {
            self.objects[handle.index() as usize]
                .as_ref()
                .is_some_and(|s| s.marked)
        });
        self.sweep();
        self.next_gc = self.bytes_allocated * 2;
        self.collections_run += 1;
        tracing::debug!(
            collection = self.collections_run,
            bytes_before = before,
            bytes_after = self.bytes_allocated,
            next_gc = self.next_gc,
            "garbage collection cycle complete"
        );
    }

    fn sweep(&mut self) {
        #[expect(clippy::cast_possible_truncation, reason = "heaps stay far below u32::MAX objects")]
        for index in 0..self.objects.len() {
            let Some(slot) = self.objects[index].as_mut() else {
                continue;
            };
            if slot.marked {
                slot.marked = false;
            } else {
                let freed = self.objects[index].take().expect("checked Some above");
                self.bytes_allocated = self.bytes_allocated.saturating_sub(freed.obj.byte_size());
                self.free.push(index as u32);
            }
        }
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.iter().filter(|s| s.is_some()).count()
    }
}
