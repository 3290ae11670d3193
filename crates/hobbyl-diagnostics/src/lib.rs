// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Compile-error and runtime-error formatting shared by `hobbyl-compiler` and
//! `hobbyl-vm`.
//!
//! This crate only formats; it never decides *whether* to raise an error.
//! `hobbyl-compiler` reports [`CompileError`]s as it parses (collecting more
//! than one, since compile errors recover at the next synchronization
//! point); `hobbyl-vm` raises a single [`RuntimeError`] and halts.

mod compile_error;
mod runtime_error;

pub use compile_error::CompileError;
pub use runtime_error::{RuntimeError, RuntimeErrorKind, TraceFrame};
