// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! GC references and per-allocation headers.
//!
//! Every heap allocation is addressed by a [`GcRef`], a compact index that
//! stays valid across arena growth. Strings and objects live in separate
//! arenas; one bit of the reference says which.

/// Tri-color mark state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Not yet reached in the current cycle
    #[default]
    White,
    /// Reached, children not yet traced
    Gray,
    /// Reached and fully traced
    Black,
}

/// Compact header for GC metadata.
#[derive(Debug, Clone, Default)]
pub struct ObjectHeader {
    /// Current mark color
    pub color: Color,
    /// Approximate size of the allocation in bytes
    size: usize,
}

impl ObjectHeader {
    /// Creates a new white header for an allocation of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            color: Color::White,
            size,
        }
    }

    /// Returns whether the allocation has been reached this cycle.
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.color != Color::White
    }

    /// Returns the recorded allocation size.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A reference to a garbage-collected allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef {
    /// Packed value: bit 31 = string pool, bits 0-30 = index
    value: u32,
}

impl GcRef {
    const STRING_BIT: u32 = 1 << 31;
    const INDEX_MASK: u32 = !Self::STRING_BIT;

    /// Creates a reference to an object arena slot.
    #[inline]
    pub fn object(index: usize) -> Self {
        Self {
            value: index as u32 & Self::INDEX_MASK,
        }
    }

    /// Creates a reference to a string pool slot.
    #[inline]
    pub fn string(index: usize) -> Self {
        Self {
            value: (index as u32 & Self::INDEX_MASK) | Self::STRING_BIT,
        }
    }

    /// Returns the arena index of this reference.
    #[inline]
    pub fn index(&self) -> usize {
        (self.value & Self::INDEX_MASK) as usize
    }

    /// Returns whether this reference points into the string pool.
    #[inline]
    pub fn is_string(&self) -> bool {
        self.value & Self::STRING_BIT != 0
    }

    /// Returns whether this reference points into the object arena.
    #[inline]
    pub fn is_object(&self) -> bool {
        !self.is_string()
    }

    /// Returns the raw packed bits, used for identity hashing.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.value
    }
}

impl std::fmt::Debug for GcRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_string() {
            write!(f, "GcRef(str:{})", self.index())
        } else {
            write!(f, "GcRef(obj:{})", self.index())
        }
    }
}

/// Trait for heap values that hold references to other allocations.
pub trait GcTrace {
    /// Appends every reference held by `self` to `refs`.
    fn trace_refs(&self, refs: &mut Vec<GcRef>);
}
