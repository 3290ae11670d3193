// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use crate::heap::Heap;
use crate::value::Value;

#[test]
fn set_then_get_round_trips() {
    let mut heap = Heap::new();
    let key = heap.intern(b"x");
    let hash = heap.hash_of_string(key);
    let mut table = crate::table::Table::new();
    assert!(table.set(key, hash, Value::number(42.0)));
    assert_eq!(table.get(key, hash), Some(Value::number(42.0)));
}

#[test]
fn overwrite_returns_false_for_existing_key() {
    let mut heap = Heap::new();
    let key = heap.intern(b"x");
    let hash = heap.hash_of_string(key);
    let mut table = crate::table::Table::new();
    assert!(table.set(key, hash, Value::number(1.0)));
    assert!(!table.set(key, hash, Value::number(2.0)));
    assert_eq!(table.get(key, hash), Some(Value::number(2.0)));
}

#[test]
fn delete_leaves_tombstone_but_later_keys_still_found() {
    let mut heap = Heap::new();
    let a = heap.intern(b"a");
    let b = heap.intern(b"b");
    let c = heap.intern(b"c");
    let ha = heap.hash_of_string(a);
    let hb = heap.hash_of_string(b);
    let hc = heap.hash_of_string(c);

    let mut table = crate::table::Table::new();
    table.set(a, ha, Value::number(1.0));
    table.set(b, hb, Value::number(2.0));
    table.set(c, hc, Value::number(3.0));

    assert!(table.delete(b, hb));
    assert_eq!(table.get(b, hb), None);
    // a and c must still be reachable even though the probe sequence may
    // pass through b's now-tombstoned slot.
    assert_eq!(table.get(a, ha), Some(Value::number(1.0)));
    assert_eq!(table.get(c, hc), Some(Value::number(3.0)));
}

#[test]
fn grows_past_load_factor_without_losing_entries() {
    let mut heap = Heap::new();
    let mut table = crate::table::Table::new();
    let mut keys = Vec::new();
    for i in 0..200 {
        let bytes = format!("key{i}");
        let key = heap.intern(bytes.as_bytes());
        let hash = heap.hash_of_string(key);
        table.set(key, hash, Value::number(f64::from(i)));
        keys.push((key, hash, i));
    }
    for (key, hash, i) in keys {
        assert_eq!(table.get(key, hash), Some(Value::number(f64::from(i))));
    }
    assert_eq!(table.len(), 200);
}

#[test]
fn empty_table_lookups_do_not_panic() {
    let heap = Heap::new();
    let table = crate::table::Table::new();
    // Any handle works here; the table has zero capacity so `get` must
    // short-circuit before indexing.
    let bogus = crate::value::GcRef::from_index(0);
    assert_eq!(table.get(bogus, 0), None);
    let _ = heap;
}
