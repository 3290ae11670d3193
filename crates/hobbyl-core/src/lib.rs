// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Foundational types for the Hobbyl runtime.
//!
//! This crate provides the pieces every other Hobbyl crate shares:
//!
//! - [`Value`], the tagged runtime value representation
//! - [`GcRef`] handles and the heap object layouts they point to
//! - [`Heap`], the arena allocator and mark-and-sweep collector
//! - [`Table`], the open-addressed hash table used for globals, struct
//!   fields/methods, instance fields and enum values
//! - [`Chunk`], the bytecode container shared by the compiler and the VM
//!
//! Nothing here executes a program; it only defines the shapes that the
//! compiler writes and the VM reads.

pub mod chunk;
pub mod heap;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::Chunk;
pub use heap::Heap;
pub use object::{
    HeapArray, HeapBoundMethod, HeapClosure, HeapEnum, HeapFunction, HeapHostFn, HeapInstance,
    HeapStruct, HeapString, HeapUpvalue, HostFn, Obj, UpvalueDesc, UpvalueState,
};
pub use table::Table;
pub use value::{GcRef, Value};
