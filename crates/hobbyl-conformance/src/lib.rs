// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! This crate has no public API of its own: it exists to hold the
//! end-to-end and property tests under `tests/` that exercise
//! `hobbyl-core`, `hobbyl-compiler` and `hobbyl-vm` together as a whole
//! interpreter rather than as individual units.
