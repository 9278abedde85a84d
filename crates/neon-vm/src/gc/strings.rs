// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interned string pool.
//!
//! Equal contents always map to one slot, so string equality reduces to
//! reference identity. Each string caches its content hash at creation.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::arena::{Arena, SweepStats};
use super::object::GcRef;

/// Computes the 32-bit FNV-1a hash of `text`.
pub fn hash_string(text: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in text.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// A string stored in the pool.
#[derive(Debug, Clone)]
pub struct InternedStr {
    text: Rc<str>,
    hash: u32,
}

impl InternedStr {
    /// Returns the string contents.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the cached content hash.
    #[inline]
    pub fn hash(&self) -> u32 {
        self.hash
    }
}

/// Pool of interned strings.
#[derive(Default)]
pub struct StringPool {
    arena: Arena<InternedStr>,
    /// Content to slot index
    index: FxHashMap<Rc<str>, usize>,
}

impl StringPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning its reference and whether it was newly created.
    pub fn intern(&mut self, text: &str) -> (GcRef, bool) {
        if let Some(&slot) = self.index.get(text) {
            return (GcRef::string(slot), false);
        }
        let text: Rc<str> = Rc::from(text);
        let size = std::mem::size_of::<InternedStr>() + text.len();
        let interned = InternedStr {
            hash: hash_string(&text),
            text: Rc::clone(&text),
        };
        let slot = self.arena.allocate(interned, size);
        self.index.insert(text, slot);
        (GcRef::string(slot), true)
    }

    /// Looks up already-interned content without creating it.
    pub fn lookup(&self, text: &str) -> Option<GcRef> {
        self.index.get(text).map(|&slot| GcRef::string(slot))
    }

    /// Returns the pooled string behind `r`.
    #[inline]
    pub fn get(&self, r: GcRef) -> Option<&InternedStr> {
        if !r.is_string() {
            return None;
        }
        self.arena.get(r.index())
    }

    /// Returns the contents behind `r`, or the empty string for a dangling reference.
    #[inline]
    pub fn text(&self, r: GcRef) -> &str {
        match self.get(r) {
            Some(s) => s.as_str(),
            None => {
                debug_assert!(false, "dangling string reference {:?}", r);
                ""
            }
        }
    }

    /// Returns the cached hash behind `r`.
    #[inline]
    pub fn hash_of(&self, r: GcRef) -> u32 {
        self.get(r).map_or(0, InternedStr::hash)
    }

    /// Marks a string as reachable.
    #[inline]
    pub fn mark(&mut self, r: GcRef) {
        if self.arena.mark(r.index()) {
            // strings hold no references
            self.arena.blacken(r.index());
        }
    }

    /// Returns whether the string behind `r` was reached this cycle.
    #[inline]
    pub fn is_marked(&self, r: GcRef) -> bool {
        self.arena.is_marked(r.index())
    }

    /// Frees unmarked strings, dropping them from the intern map first.
    pub fn sweep(&mut self) -> SweepStats {
        let index = &mut self.index;
        self.arena.sweep(|_, dead| {
            index.remove(&dead.text);
        })
    }

    /// Returns the number of live strings.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = StringPool::new();
        let (a, created_a) = pool.intern("hello");
        let (b, created_b) = pool.intern("hello");
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.text(a), "hello");
    }

    #[test]
    fn test_hash_is_cached() {
        let mut pool = StringPool::new();
        let (r, _) = pool.intern("abc");
        assert_eq!(pool.hash_of(r), hash_string("abc"));
    }

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(hash_string(""), 2_166_136_261);
        assert_eq!(hash_string("a"), 0xe40c_292c);
    }

    #[test]
    fn test_sweep_removes_from_index() {
        let mut pool = StringPool::new();
        let (keep, _) = pool.intern("keep");
        pool.intern("drop");

        pool.mark(keep);
        let stats = pool.sweep();

        assert_eq!(stats.freed, 1);
        assert!(pool.lookup("drop").is_none());
        assert_eq!(pool.lookup("keep"), Some(keep));

        // re-interning after a sweep creates a fresh entry
        let (_, created) = pool.intern("drop");
        assert!(created);
    }

    #[test]
    fn test_object_ref_is_not_a_string() {
        let pool = StringPool::new();
        assert!(pool.get(GcRef::object(0)).is_none());
    }
}
