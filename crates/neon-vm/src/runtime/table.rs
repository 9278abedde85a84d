// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Open-addressing hash table keyed by [`Value`].
//!
//! Backs the globals table, instance fields, class method tables and dict
//! storage. Capacity is always zero or a power of two so probing can mask
//! instead of taking a modulo.
//!
//! Slots are explicitly three-state: never used, tombstone (deleted) or
//! occupied. A probe skips tombstones but only stops at a never-used slot,
//! so deleting a key never cuts the probe chain of a key inserted after it.
//!
//! `count` tracks occupied slots plus tombstones and drives the load-factor
//! check; `live` tracks occupied slots only. When an insert would push
//! `count` past the load factor the table is rebuilt with only its live
//! entries, at the same capacity if they fit and at the next power of two
//! otherwise.

use crate::gc::{GcRef, GcTrace, StringPool, hash_string};

use super::value::Value;

/// Smallest non-zero capacity.
pub const MIN_CAPACITY: usize = 8;

/// Maximum load factor, as numerator/denominator.
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

/// How a table entry is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    /// A plain stored value
    #[default]
    Value,
    /// A getter called with the receiver when the entry is read
    Getter,
}

/// A live table entry.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    /// The key
    pub key: Value,
    /// The stored value
    pub value: Value,
    /// How the value is read
    pub kind: FieldKind,
    hash: u32,
}

impl Entry {
    /// Returns the cached key hash.
    #[inline]
    pub fn hash(&self) -> u32 {
        self.hash
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Tombstone,
    Occupied(Entry),
}

/// Supplies key hashing and comparison to a table.
///
/// String keys hash by their cached content hash and compare by content
/// (length and hash checked first); every other key uses [`Value::equals`]
/// and [`Value::identity_hash`].
pub trait KeyContext {
    /// Returns the text and cached hash of a string key.
    fn string_parts(&self, key: Value) -> Option<(&str, u32)>;

    /// Hashes a key.
    fn hash_key(&self, key: Value) -> u32 {
        match self.string_parts(key) {
            Some((_, hash)) => hash,
            None => key.identity_hash(),
        }
    }

    /// Compares two keys.
    fn keys_equal(&self, a: Value, b: Value) -> bool {
        if let (Value::Obj(ra), Value::Obj(rb)) = (a, b) {
            if ra == rb {
                return true;
            }
            if let (Some((ta, ha)), Some((tb, hb))) = (self.string_parts(a), self.string_parts(b)) {
                return ta.len() == tb.len() && ha == hb && ta == tb;
            }
        }
        Value::equals(a, b)
    }
}

impl KeyContext for StringPool {
    fn string_parts(&self, key: Value) -> Option<(&str, u32)> {
        match key {
            Value::Obj(r) if r.is_string() => self.get(r).map(|s| (s.as_str(), s.hash())),
            _ => None,
        }
    }
}

/// An open-addressing hash table.
#[derive(Debug, Clone, Default)]
pub struct HashTable {
    slots: Vec<Slot>,
    /// Occupied slots plus tombstones
    count: usize,
    /// Occupied slots
    live: usize,
}

impl HashTable {
    /// Creates an empty table with no backing storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns whether the table has no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of tombstones currently held.
    pub fn tombstones(&self) -> usize {
        self.count - self.live
    }

    /// Looks up the entry for `key`.
    pub fn get_field<C: KeyContext + ?Sized>(&self, ctx: &C, key: Value) -> Option<&Entry> {
        if self.slots.is_empty() {
            return None;
        }
        let index = find_slot(&self.slots, ctx, key, ctx.hash_key(key));
        match &self.slots[index] {
            Slot::Occupied(entry) => Some(entry),
            _ => None,
        }
    }

    /// Looks up the value for `key`.
    #[inline]
    pub fn get<C: KeyContext + ?Sized>(&self, ctx: &C, key: Value) -> Option<Value> {
        self.get_field(ctx, key).map(|entry| entry.value)
    }

    /// Looks up a string key by content without interning it.
    ///
    /// Only string entries can match; other keys in the probe chain are
    /// stepped over.
    pub fn get_str<C: KeyContext + ?Sized>(&self, ctx: &C, text: &str) -> Option<&Entry> {
        if self.slots.is_empty() {
            return None;
        }
        let hash = hash_string(text);
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied(entry) => {
                    if let Some((key_text, key_hash)) = ctx.string_parts(entry.key) {
                        if key_text.len() == text.len() && key_hash == hash && key_text == text {
                            return Some(entry);
                        }
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Inserts or overwrites a plain value. Returns true iff a new live entry was created.
    #[inline]
    pub fn set<C: KeyContext + ?Sized>(&mut self, ctx: &C, key: Value, value: Value) -> bool {
        self.set_with_kind(ctx, key, value, FieldKind::Value)
    }

    /// Inserts or overwrites an entry of the given kind.
    pub fn set_with_kind<C: KeyContext + ?Sized>(
        &mut self,
        ctx: &C,
        key: Value,
        value: Value,
        kind: FieldKind,
    ) -> bool {
        let hash = ctx.hash_key(key);
        if !self.slots.is_empty() {
            let index = find_slot(&self.slots, ctx, key, hash);
            if let Slot::Occupied(entry) = &mut self.slots[index] {
                entry.key = key;
                entry.value = value;
                entry.kind = kind;
                return false;
            }
        }
        self.reserve_one();
        let index = find_slot(&self.slots, ctx, key, hash);
        if matches!(self.slots[index], Slot::Empty) {
            self.count += 1;
        }
        self.slots[index] = Slot::Occupied(Entry {
            key,
            value,
            kind,
            hash,
        });
        self.live += 1;
        true
    }

    /// Deletes `key`, leaving a tombstone. Returns true iff an entry was removed.
    pub fn remove<C: KeyContext + ?Sized>(&mut self, ctx: &C, key: Value) -> bool {
        if self.live == 0 {
            return false;
        }
        let index = find_slot(&self.slots, ctx, key, ctx.hash_key(key));
        if matches!(self.slots[index], Slot::Occupied(_)) {
            self.slots[index] = Slot::Tombstone;
            self.live -= 1;
            true
        } else {
            false
        }
    }

    /// Reinserts every live entry of `from` through the normal insert path.
    ///
    /// Entries whose key already exists here are overwritten.
    pub fn add_all<C: KeyContext + ?Sized>(&mut self, ctx: &C, from: &HashTable) {
        self.extend_entries(ctx, from.iter().copied());
    }

    /// Inserts each entry through the normal insert path.
    pub fn extend_entries<C, I>(&mut self, ctx: &C, entries: I)
    where
        C: KeyContext + ?Sized,
        I: IntoIterator<Item = Entry>,
    {
        for entry in entries {
            self.set_with_kind(ctx, entry.key, entry.value, entry.kind);
        }
    }

    /// Iterates over live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(entry) => Some(entry),
            _ => None,
        })
    }

    /// Removes every entry and releases the backing storage.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.count = 0;
        self.live = 0;
    }

    /// Makes room for one more occupied slot.
    fn reserve_one(&mut self) {
        let capacity = self.slots.len();
        if exceeds_load(self.count + 1, capacity) {
            let mut target = capacity;
            while exceeds_load(self.live + 1, target) {
                target = grow_capacity(target);
            }
            self.rebuild(target);
        }
    }

    /// Rehashes live entries into `capacity` slots, dropping tombstones.
    fn rebuild(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; capacity]);
        let mask = capacity - 1;
        for slot in old {
            if let Slot::Occupied(entry) = slot {
                let mut index = entry.hash as usize & mask;
                while !matches!(self.slots[index], Slot::Empty) {
                    index = (index + 1) & mask;
                }
                self.slots[index] = Slot::Occupied(entry);
            }
        }
        self.count = self.live;
    }
}

impl GcTrace for HashTable {
    fn trace_refs(&self, refs: &mut Vec<GcRef>) {
        for entry in self.iter() {
            if let Value::Obj(r) = entry.key {
                refs.push(r);
            }
            if let Value::Obj(r) = entry.value {
                refs.push(r);
            }
        }
    }
}

#[inline]
fn exceeds_load(count: usize, capacity: usize) -> bool {
    count * MAX_LOAD_DEN > capacity * MAX_LOAD_NUM
}

#[inline]
fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

/// Finds the slot holding `key`, or the slot an insert of `key` should use.
///
/// The insertion slot is the first tombstone on the probe path if there is
/// one, otherwise the never-used slot that ended the probe.
fn find_slot<C: KeyContext + ?Sized>(slots: &[Slot], ctx: &C, key: Value, hash: u32) -> usize {
    let mask = slots.len() - 1;
    let mut index = hash as usize & mask;
    let mut tombstone = None;
    loop {
        match &slots[index] {
            Slot::Empty => return tombstone.unwrap_or(index),
            Slot::Tombstone => {
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            }
            Slot::Occupied(entry) => {
                // equal keys always hash equal, so a hash mismatch skips the compare
                if entry.hash == hash && ctx.keys_equal(entry.key, key) {
                    return index;
                }
            }
        }
        index = (index + 1) & mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_empty_table_lookup() {
        let pool = StringPool::new();
        let table = HashTable::new();
        assert_eq!(table.capacity(), 0);
        assert!(table.get(&pool, num(1.0)).is_none());
        assert!(table.get_str(&pool, "x").is_none());
    }

    #[test]
    fn test_set_get_overwrite() {
        let pool = StringPool::new();
        let mut table = HashTable::new();
        assert!(table.set(&pool, num(1.0), num(10.0)));
        assert!(!table.set(&pool, num(1.0), num(11.0)));
        assert_eq!(table.get(&pool, num(1.0)), Some(num(11.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_string_keys_by_content() {
        let mut pool = StringPool::new();
        let (name, _) = pool.intern("name");
        let mut table = HashTable::new();
        table.set(&pool, Value::Obj(name), num(1.0));

        let entry = table.get_str(&pool, "name").map(|e| e.value);
        assert_eq!(entry, Some(num(1.0)));
        assert!(table.get_str(&pool, "other").is_none());
    }

    #[test]
    fn test_remove_leaves_tombstone() {
        let pool = StringPool::new();
        let mut table = HashTable::new();
        table.set(&pool, num(1.0), Value::Bool(true));
        assert!(table.remove(&pool, num(1.0)));
        assert!(!table.remove(&pool, num(1.0)));
        assert!(table.get(&pool, num(1.0)).is_none());
        assert_eq!(table.tombstones(), 1);
    }

    #[test]
    fn test_tombstone_does_not_break_probe_chain() {
        let pool = StringPool::new();
        let mut table = HashTable::new();
        for i in 0..5 {
            table.set(&pool, num(i as f64), num(i as f64));
        }
        table.remove(&pool, num(0.0));
        table.remove(&pool, num(2.0));
        for i in [1, 3, 4] {
            assert_eq!(table.get(&pool, num(i as f64)), Some(num(i as f64)));
        }
    }

    #[test]
    fn test_mixed_key_kinds() {
        let mut pool = StringPool::new();
        let (one, _) = pool.intern("1");
        let mut table = HashTable::new();
        table.set(&pool, num(1.0), Value::Bool(true));
        table.set(&pool, Value::Obj(one), Value::Bool(false));
        table.set(&pool, Value::Bool(true), Value::Nil);

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&pool, num(1.0)), Some(Value::Bool(true)));
        assert_eq!(table.get(&pool, Value::Obj(one)), Some(Value::Bool(false)));
        assert_eq!(table.get(&pool, Value::Bool(true)), Some(Value::Nil));
    }

    #[test]
    fn test_add_all_overwrites() {
        let pool = StringPool::new();
        let mut from = HashTable::new();
        from.set(&pool, num(1.0), num(100.0));
        from.set_with_kind(&pool, num(2.0), num(200.0), FieldKind::Getter);

        let mut to = HashTable::new();
        to.set(&pool, num(1.0), num(1.0));
        to.set(&pool, num(3.0), num(3.0));
        to.add_all(&pool, &from);

        assert_eq!(to.len(), 3);
        assert_eq!(to.get(&pool, num(1.0)), Some(num(100.0)));
        assert_eq!(to.get_field(&pool, num(2.0)).map(|e| e.kind), Some(FieldKind::Getter));
    }

    #[test]
    fn test_growth_keeps_power_of_two() {
        let pool = StringPool::new();
        let mut table = HashTable::new();
        for i in 0..100 {
            table.set(&pool, num(i as f64), Value::Nil);
            assert!(table.capacity().is_power_of_two());
            assert!(table.len() * 4 <= table.capacity() * 3);
        }
        assert_eq!(table.capacity(), 256);
    }
}
