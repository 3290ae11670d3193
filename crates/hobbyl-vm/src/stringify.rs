// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The string form of a Value, used
//! by `print`, `toString` and error messages alike.

use hobbyl_core::{GcRef, Heap, Obj, Value};

/// Render `value`'s string form. Needs the heap to look inside object
/// handles (a string's bytes, a function's name, …).
#[must_use]
pub fn stringify(heap: &Heap, value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Obj(handle) => stringify_object(heap, handle),
    }
}

fn stringify_object(heap: &Heap, handle: GcRef) -> String {
    match heap.get(handle) {
        Obj::String(s) => s.as_str().to_string(),
        Obj::Function(f) => match f.name {
            Some(name) => format!("<function {} {}>", name_str(heap, name), ptr(handle)),
            None => "<script>".to_string(),
        },
        Obj::Closure(c) => stringify_object(heap, c.function),
        Obj::BoundMethod(b) => stringify_object(heap, b.method),
        Obj::HostFn(_) => format!("<cfunction {}>", ptr(handle)),
        Obj::Struct(s) => format!("<struct {}>", name_str(heap, s.name)),
        Obj::Instance(i) => {
            let struct_name = match heap.get(i.struct_ref) {
                Obj::Struct(s) => name_str(heap, s.name),
                _ => "?".to_string(),
            };
            format!("<{struct_name} instance {}>", ptr(handle))
        }
        Obj::Enum(e) => format!("<enum {}>", name_str(heap, e.name)),
        Obj::Array(_) => format!("<array {}>", ptr(handle)),
        Obj::Upvalue(_) => format!("<upvalue {}>", ptr(handle)),
    }
}

fn name_str(heap: &Heap, handle: GcRef) -> String {
    match heap.get(handle) {
        Obj::String(s) => s.as_str().to_string(),
        _ => "?".to_string(),
    }
}

/// A stand-in for the source's raw pointer print: the arena index, in the
/// same `0x...` shape a pointer would render as.
fn ptr(handle: GcRef) -> String {
    format!("{:#06x}", handle.index())
}

/// Approximates C's `%.14g`: 14 significant digits, trailing zeros and a
/// trailing decimal point stripped, switching to scientific notation the
/// same way `printf` does (exponent < -4 or >= precision).
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }

    const PRECISION: i32 = 14;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp_str) = sci.split_once('e').expect("scientific format always has 'e'");
    let exp: i32 = exp_str.parse().expect("exponent is always a valid integer");

    if exp < -4 || exp >= PRECISION {
        let mantissa = strip_trailing_zeros(mantissa);
        let sign = if exp >= 0 { "+" } else { "-" };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        strip_trailing_zeros(&format!("{n:.decimals$}"))
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod stringify_test;
