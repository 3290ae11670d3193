// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The open-addressed hash table used throughout the runtime: globals,
//! struct default-field/method/static tables, instance fields, enum values.
//! The interned-string set ([`crate::heap::Heap`]'s `strings` field) is the
//! one other user of this same probe sequence, specialized to compare raw
//! bytes instead of handles (see `Heap::intern`).
//!
//! Linear probing, power-of-two capacity, 0.75 load factor, tombstone
//! deletion. Keys are interned string handles, so key equality is handle
//! (pointer) equality; no byte comparison is ever needed once a string is
//! interned.

use crate::value::{GcRef, Value};

#[cfg(test)]
mod table_test;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Debug, Clone)]
struct Entry {
    /// `None` + tombstone flag distinguishes "never used" from "deleted".
    key: Option<GcRef>,
    hash: u64,
    value: Value,
    tombstone: bool,
}

impl Entry {
    const fn empty() -> Self {
        Self {
            key: None,
            hash: 0,
            value: Value::Nil,
            tombstone: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Count of live entries plus tombstones, used for the load-factor
    /// check: a tombstone still counts against growth so probe sequences
    /// stay bounded.
    occupied: usize,
    len: usize,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            occupied: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.entries.len() * core::mem::size_of::<Entry>()
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Find the slot a key should occupy: the first matching live entry, or
    /// else the first tombstone/empty slot seen along the probe sequence
    /// (so reinserting after deletions reuses an earlier tombstone).
    fn find_slot(entries: &[Entry], capacity: usize, key: GcRef, hash: u64) -> usize {
        let mut index = (hash as usize) & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            if entry.key.is_none() {
                if entry.tombstone {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                } else {
                    return first_tombstone.unwrap_or(index);
                }
            } else if entry.key == Some(key) {
                return index;
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };
        let mut new_entries = vec![Entry::empty(); new_capacity];
        let mut live = 0;
        for entry in self.entries.drain(..) {
            if let Some(key) = entry.key {
                let index = Self::find_slot(&new_entries, new_capacity, key, entry.hash);
                new_entries[index] = Entry {
                    key: Some(key),
                    hash: entry.hash,
                    value: entry.value,
                    tombstone: false,
                };
                live += 1;
            }
        }
        self.entries = new_entries;
        self.occupied = live;
    }

    /// Insert or overwrite. Returns `true` if this created a new key.
    pub fn set(&mut self, key: GcRef, hash: u64, value: Value) -> bool {
        if self.capacity() == 0
            || (self.occupied + 1) as f64 > self.capacity() as f64 * MAX_LOAD
        {
            self.grow();
        }
        let capacity = self.capacity();
        let index = Self::find_slot(&self.entries, capacity, key, hash);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_none();
        if is_new_key {
            self.len += 1;
            if !entry.tombstone {
                self.occupied += 1;
            }
        }
        *entry = Entry {
            key: Some(key),
            hash,
            value,
            tombstone: false,
        };
        is_new_key
    }

    #[must_use]
    pub fn get(&self, key: GcRef, hash: u64) -> Option<Value> {
        if self.capacity() == 0 {
            return None;
        }
        let index = Self::find_slot(&self.entries, self.capacity(), key, hash);
        self.entries[index].key.and_then(|found| {
            if found == key {
                Some(self.entries[index].value)
            } else {
                None
            }
        })
    }

    #[must_use]
    pub fn contains(&self, key: GcRef, hash: u64) -> bool {
        self.get(key, hash).is_some()
    }

    /// Delete, leaving a tombstone so later probe sequences that passed
    /// through this slot still terminate correctly.
    pub fn delete(&mut self, key: GcRef, hash: u64) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let index = Self::find_slot(&self.entries, self.capacity(), key, hash);
        if self.entries[index].key != Some(key) {
            return false;
        }
        self.entries[index] = Entry {
            key: None,
            hash: 0,
            value: Value::Bool(true),
            tombstone: true,
        };
        self.len -= 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (GcRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    /// Remove every entry whose key handle fails `keep`. Used by the GC to
    /// drop unmarked strings from the interning set.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(GcRef) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key
                && !keep(key)
            {
                *entry = Entry {
                    key: None,
                    hash: 0,
                    value: Value::Bool(true),
                    tombstone: true,
                };
                self.len -= 1;
            }
        }
    }

    /// Specialized lookup used only by string interning: find an entry by
    /// raw byte content rather than handle identity, since the candidate
    /// string is not interned yet and therefore has no handle to compare.
    /// `matches` is given each same-hash candidate handle and decides
    /// whether its bytes equal the string being looked up.
    #[must_use]
    pub fn find_by_bytes(&self, hash: u64, matches: impl Fn(GcRef) -> bool) -> Option<GcRef> {
        if self.capacity() == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            if entry.key.is_none() && !entry.tombstone {
                return None;
            }
            if let Some(key) = entry.key
                && entry.hash == hash
                && matches(key)
            {
                return Some(key);
            }
            index = (index + 1) & (capacity - 1);
        }
    }
}
