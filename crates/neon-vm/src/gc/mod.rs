// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Garbage-collected heap.
//!
//! Tri-color mark-sweep over two index arenas: one for objects and one for
//! interned strings. The interpreter decides what the roots are (see
//! `vm::roots`); this module only knows how to shade, trace and sweep.
//!
//! Collection never runs in the middle of an instruction. The interpreter
//! checks [`Heap::should_collect`] at the top of its dispatch loop, where
//! every live value is reachable from a root.

pub mod arena;
pub mod object;
pub mod strings;

pub use arena::{Arena, SweepStats};
pub use object::{Color, GcRef, GcTrace, ObjectHeader};
pub use strings::{InternedStr, StringPool, hash_string};

use crate::bytecode::ConstantInfo;
use crate::runtime::object::Object;
use crate::runtime::value::Value;

/// Result of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Objects released
    pub objects_freed: usize,
    /// Strings released
    pub strings_freed: usize,
    /// Bytes released
    pub bytes_freed: usize,
    /// Threshold for the next cycle
    pub next_gc: usize,
}

/// The managed heap.
pub struct Heap {
    objects: Arena<Object>,
    strings: StringPool,
    bytes_allocated: usize,
    next_gc: usize,
    min_threshold: usize,
    growth_factor: usize,
    stress: bool,
    gray: Vec<GcRef>,
    scratch: Vec<GcRef>,
}

impl Heap {
    /// Creates a heap that first collects after `initial_threshold` bytes.
    pub fn new(initial_threshold: usize, growth_factor: usize, stress: bool) -> Self {
        Self {
            objects: Arena::new(),
            strings: StringPool::new(),
            bytes_allocated: 0,
            next_gc: initial_threshold,
            min_threshold: initial_threshold,
            growth_factor: growth_factor.max(1),
            stress,
            gray: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Allocates an object.
    pub fn alloc(&mut self, object: Object) -> GcRef {
        let size = object.size_hint();
        self.bytes_allocated += size;
        GcRef::object(self.objects.allocate(object, size))
    }

    /// Interns a string and returns it as a value.
    pub fn intern(&mut self, text: &str) -> Value {
        let (r, created) = self.strings.intern(text);
        if created {
            self.bytes_allocated += std::mem::size_of::<InternedStr>() + text.len();
        }
        Value::Obj(r)
    }

    /// Returns the object behind `r`.
    #[inline]
    pub fn get(&self, r: GcRef) -> Option<&Object> {
        if r.is_string() {
            return None;
        }
        self.objects.get(r.index())
    }

    /// Returns the object behind `r` mutably.
    #[inline]
    pub fn get_mut(&mut self, r: GcRef) -> Option<&mut Object> {
        if r.is_string() {
            return None;
        }
        self.objects.get_mut(r.index())
    }

    /// Returns the object behind `r` together with the string pool.
    ///
    /// Table operations on an object need the pool for key comparison
    /// while the object itself is borrowed mutably.
    #[inline]
    pub fn get_mut_with_strings(&mut self, r: GcRef) -> Option<(&mut Object, &StringPool)> {
        if r.is_string() {
            return None;
        }
        let object = self.objects.get_mut(r.index())?;
        Some((object, &self.strings))
    }

    /// Returns the object behind a value, if it is one.
    #[inline]
    pub fn object_of(&self, value: Value) -> Option<&Object> {
        match value {
            Value::Obj(r) => self.get(r),
            _ => None,
        }
    }

    /// Returns the string pool.
    #[inline]
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// Returns the contents of the string behind `r`.
    #[inline]
    pub fn str(&self, r: GcRef) -> &str {
        self.strings.text(r)
    }

    /// Returns the contents of a string value.
    #[inline]
    pub fn string_of(&self, value: Value) -> Option<&str> {
        match value {
            Value::Obj(r) if r.is_string() => self.strings.get(r).map(InternedStr::as_str),
            _ => None,
        }
    }

    /// Bytes currently attributed to live allocations.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of live strings.
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Returns whether the allocation threshold has been passed.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.stress || self.bytes_allocated > self.next_gc
    }

    /// Shades the referent of `value` gray.
    #[inline]
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_ref(r);
        }
    }

    /// Shades `r` gray, queueing objects for tracing.
    pub fn mark_ref(&mut self, r: GcRef) {
        if r.is_string() {
            self.strings.mark(r);
        } else if self.objects.mark(r.index()) {
            self.gray.push(r);
        }
    }

    /// Traces gray objects until none are left.
    pub fn trace(&mut self) {
        let mut children = std::mem::take(&mut self.scratch);
        while let Some(r) = self.gray.pop() {
            children.clear();
            if let Some(object) = self.objects.get(r.index()) {
                object.trace_refs(&mut children);
            }
            self.objects.blacken(r.index());
            for &child in &children {
                self.mark_ref(child);
            }
        }
        self.scratch = children;
    }

    /// Frees everything left white and moves the threshold.
    pub fn sweep(&mut self) -> CollectStats {
        let objects = self.objects.sweep(|_, _| {});
        let strings = self.strings.sweep();
        let freed = objects.bytes + strings.bytes;
        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
        self.next_gc = self
            .bytes_allocated
            .saturating_mul(self.growth_factor)
            .max(self.min_threshold);
        CollectStats {
            objects_freed: objects.freed,
            strings_freed: strings.freed,
            bytes_freed: freed,
            next_gc: self.next_gc,
        }
    }

    /// Returns whether `r` survived marking this cycle.
    pub fn is_marked(&self, r: GcRef) -> bool {
        if r.is_string() {
            self.strings.is_marked(r)
        } else {
            self.objects.is_marked(r.index())
        }
    }
}

impl ConstantInfo for Heap {
    fn upvalue_count(&self, constant: Value) -> Option<usize> {
        match self.object_of(constant)? {
            Object::Function(proto) => Some(proto.upvalue_count),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(1 << 20, 2, false)
    }

    #[test]
    fn test_intern_is_identity() {
        let mut heap = heap();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert!(Value::equals(a, b));
        assert_eq!(heap.string_of(a), Some("hello"));
        assert_eq!(heap.string_count(), 1);
    }

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = heap();
        let kept = heap.alloc(Object::Array(vec![Value::Number(1.0)]));
        let _dropped = heap.alloc(Object::Array(Vec::new()));
        heap.mark_ref(kept);
        heap.trace();
        let stats = heap.sweep();
        assert_eq!(stats.objects_freed, 1);
        assert_eq!(heap.object_count(), 1);
        assert!(heap.get(kept).is_some());
    }

    #[test]
    fn test_trace_reaches_nested_values() {
        let mut heap = heap();
        let text = heap.intern("inner");
        let inner = heap.alloc(Object::Array(vec![text]));
        let outer = heap.alloc(Object::Array(vec![Value::Obj(inner)]));
        heap.mark_ref(outer);
        heap.trace();
        let stats = heap.sweep();
        assert_eq!(stats.objects_freed, 0);
        assert_eq!(stats.strings_freed, 0);
        assert_eq!(heap.string_of(text), Some("inner"));
    }

    #[test]
    fn test_dead_strings_leave_intern_map() {
        let mut heap = heap();
        let first = heap.intern("temp");
        heap.trace();
        let stats = heap.sweep();
        assert_eq!(stats.strings_freed, 1);
        assert!(heap.string_of(first).is_none());
        // re-interning creates a fresh entry
        let again = heap.intern("temp");
        assert_eq!(heap.string_of(again), Some("temp"));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = heap();
        let a = heap.alloc(Object::Array(Vec::new()));
        let b = heap.alloc(Object::Array(vec![Value::Obj(a)]));
        if let Some(Object::Array(items)) = heap.get_mut(a) {
            items.push(Value::Obj(b));
        }
        heap.trace();
        let stats = heap.sweep();
        assert_eq!(stats.objects_freed, 2);
    }

    #[test]
    fn test_stress_always_collects() {
        let heap = Heap::new(1 << 20, 2, true);
        assert!(heap.should_collect());
    }
}
