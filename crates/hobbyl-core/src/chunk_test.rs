// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use crate::chunk::Chunk;
use crate::value::Value;

#[test]
fn write_tracks_parallel_line_numbers() {
 let mut chunk = Chunk::new();
 chunk.write(1, 10);
 chunk.write(2, 10);
 chunk.write(3, 11);
 assert_eq!(chunk.lines, vec![10, 10, 11]);
}

#[test]
fn constant_pool_caps_at_256_entries() {
 let mut chunk = Chunk::new();
 for _ in 0..256 {
 assert!(chunk.add_constant(Value::nil()).is_some());
 }
 assert!(
 chunk.add_constant(Value::nil()).is_none(),
 "at most 256 constants fit in the pool"
 );
}
