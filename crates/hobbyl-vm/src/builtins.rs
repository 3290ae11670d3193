// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The four built-in global names: `clock`, `print`, `error`, `toString`.
//! Registered into a fresh VM's global table at construction time rather
//! than special-cased in the dispatch loop.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use hobbyl_core::{Heap, HeapHostFn, HostFn, Obj, Table, Value};

use crate::stringify::stringify;

pub fn install(heap: &mut Heap, globals: &mut Table) {
    register(heap, globals, "clock", Some(0), clock);
    register(heap, globals, "print", None, print);
    register(heap, globals, "error", Some(1), raise_error);
    register(heap, globals, "toString", Some(1), to_string_builtin);
}

fn register(heap: &mut Heap, globals: &mut Table, name: &str, arity: Option<u8>, func: HostFn) {
    let name_handle = heap.intern(name.as_bytes());
    let hash = heap.hash_of_string(name_handle);
    let handle = heap.alloc(Obj::HostFn(HeapHostFn { name: name_handle, arity, func }));
    globals.set(name_handle, hash, Value::obj(handle));
}

fn clock(_heap: &mut Heap, _args: &[Value], _out: &mut dyn Write) -> Result<Value, String> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| e.to_string())?;
    Ok(Value::number(elapsed.as_secs_f64()))
}

fn print(heap: &mut Heap, args: &[Value], out: &mut dyn Write) -> Result<Value, String> {
    let rendered: Vec<String> = args.iter().map(|&v| stringify(heap, v)).collect();
    writeln!(out, "{}", rendered.join("\t")).map_err(|e| e.to_string())?;
    Ok(Value::nil())
}

fn raise_error(heap: &mut Heap, args: &[Value], _out: &mut dyn Write) -> Result<Value, String> {
    let message = args.first().copied().unwrap_or(Value::Nil);
    Err(stringify(heap, message))
}

fn to_string_builtin(heap: &mut Heap, args: &[Value], _out: &mut dyn Write) -> Result<Value, String> {
    let value = args.first().copied().unwrap_or(Value::Nil);
    let rendered = stringify(heap, value);
    Ok(Value::obj(heap.intern(rendered.as_bytes())))
}

#[cfg(test)]
mod builtins_test;
