// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Index arena with a free list.
//!
//! Slots are addressed by index, so growing the backing vector never
//! invalidates outstanding references. Freed slots are recycled through a
//! free list.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ [Entry0][None][Entry2][Entry3][None]...               │
//! │           ↑                   ↑                      │
//! │           free list ──────────┘                      │
//! └──────────────────────────────────────────────────────┘
//! ```

use super::object::{Color, ObjectHeader};

/// An entry in the arena combining header and value.
struct ArenaEntry<T> {
    header: ObjectHeader,
    value: T,
}

/// Result of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Number of slots released
    pub freed: usize,
    /// Bytes released, as recorded in the headers
    pub bytes: usize,
}

/// A slot arena for GC-managed values.
pub struct Arena<T> {
    /// Storage; `None` marks a free slot
    entries: Vec<Option<ArenaEntry<T>>>,
    /// Indices of free slots
    free: Vec<usize>,
    /// Number of occupied slots
    live: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty arena with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Stores `value` and returns its slot index.
    pub fn allocate(&mut self, value: T, size: usize) -> usize {
        let entry = ArenaEntry {
            header: ObjectHeader::new(size),
            value,
        };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    /// Returns the value at `index`, if the slot is occupied.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|entry| &entry.value)
    }

    /// Returns the value at `index` mutably, if the slot is occupied.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries
            .get_mut(index)
            .and_then(|slot| slot.as_mut())
            .map(|entry| &mut entry.value)
    }

    /// Returns the header at `index`, if the slot is occupied.
    pub fn header(&self, index: usize) -> Option<&ObjectHeader> {
        self.entries
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|entry| &entry.header)
    }

    /// Shades a white slot gray. Returns true if the color changed.
    pub fn mark(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index).and_then(|slot| slot.as_mut()) {
            Some(entry) if entry.header.color == Color::White => {
                entry.header.color = Color::Gray;
                true
            }
            _ => false,
        }
    }

    /// Marks a slot as fully traced.
    pub fn blacken(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index).and_then(|slot| slot.as_mut()) {
            entry.header.color = Color::Black;
        }
    }

    /// Returns whether the slot at `index` was reached this cycle.
    pub fn is_marked(&self, index: usize) -> bool {
        self.header(index).is_some_and(|header| header.is_marked())
    }

    /// Releases every white slot and resets survivors to white.
    ///
    /// `on_free` sees each released value before it is dropped. The slot is
    /// emptied first, so the value is unreachable through the arena while
    /// the callback runs.
    pub fn sweep(&mut self, mut on_free: impl FnMut(usize, T)) -> SweepStats {
        let mut stats = SweepStats::default();
        for (index, slot) in self.entries.iter_mut().enumerate() {
            let reached = match slot {
                Some(entry) => entry.header.is_marked(),
                None => continue,
            };
            if reached {
                if let Some(entry) = slot.as_mut() {
                    entry.header.color = Color::White;
                }
                continue;
            }
            if let Some(entry) = slot.take() {
                stats.freed += 1;
                stats.bytes += entry.header.size();
                self.free.push(index);
                on_free(index, entry.value);
            }
        }
        self.live -= stats.freed;
        stats
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns whether the arena holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (index, &entry.value)))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
