// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tagged value representation.

use crate::gc::GcRef;

/// A VM value.
///
/// Values are plain copies; object references do not own what they point
/// to. Ownership of heap data lives with the garbage collector.
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    /// nil
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// Reference to a string or heap object
    Obj(GcRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Value::equals(*self, *other)
    }
}

impl Value {
    /// Value equality.
    ///
    /// Object references compare by identity. Strings are interned, so
    /// identity equality is content equality for them.
    pub fn equals(a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // NaN never equals itself
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => false,
        }
    }

    /// Returns true if this value is nil.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true if this value is a boolean.
    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Returns true if this value is a number.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Returns true if this value references a heap object or string.
    #[inline]
    pub fn is_obj(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    /// Returns true if this value references an interned string.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::Obj(r) if r.is_string())
    }

    /// Returns the number payload.
    ///
    /// Calling this on a non-number is a programming error: it asserts in
    /// debug builds and yields NaN otherwise.
    #[inline]
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            _ => {
                debug_assert!(false, "as_number on {:?}", self);
                f64::NAN
            }
        }
    }

    /// Returns the boolean payload.
    ///
    /// Calling this on a non-boolean asserts in debug builds and yields
    /// `false` otherwise.
    #[inline]
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => {
                debug_assert!(false, "as_bool on {:?}", self);
                false
            }
        }
    }

    /// Returns the object reference payload.
    ///
    /// Calling this on a non-object asserts in debug builds and yields a
    /// reference to slot 0 otherwise.
    #[inline]
    pub fn as_obj(&self) -> GcRef {
        match self {
            Value::Obj(r) => *r,
            _ => {
                debug_assert!(false, "as_obj on {:?}", self);
                GcRef::object(0)
            }
        }
    }

    /// Returns the number payload, if any.
    #[inline]
    pub fn number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the object reference, if any.
    #[inline]
    pub fn obj(&self) -> Option<GcRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    /// Stable 32-bit hash for non-string values.
    ///
    /// String keys hash by content through the string pool instead; for
    /// them this returns the identity hash of the reference.
    pub fn identity_hash(&self) -> u32 {
        match self {
            Value::Nil => 0,
            Value::Bool(true) => 3,
            Value::Bool(false) => 5,
            Value::Number(n) => hash_number(*n),
            Value::Obj(r) => hash_bits(r.bits() as u64),
        }
    }
}

/// Hashes a number by its bit pattern, folding `-0.0` into `0.0`.
pub fn hash_number(n: f64) -> u32 {
    let n = if n == 0.0 { 0.0 } else { n };
    hash_bits(n.to_bits())
}

/// Mixes 64 bits down to 32 (Thomas Wang's integer hash).
pub fn hash_bits(mut hash: u64) -> u32 {
    hash = (!hash).wrapping_add(hash << 18);
    hash ^= hash >> 31;
    hash = hash.wrapping_mul(21);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 6);
    hash ^= hash >> 22;
    (hash & 0x3fff_ffff) as u32
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_equals_nil() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Bool(false));
    }

    #[test]
    fn test_number_equality() {
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
    }

    #[test]
    fn test_object_identity() {
        let a = Value::Obj(GcRef::object(1));
        let b = Value::Obj(GcRef::object(2));
        assert_eq!(a, a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_hashes_agree() {
        assert_eq!(
            Value::Number(0.0).identity_hash(),
            Value::Number(-0.0).identity_hash()
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Number(2.0).as_number(), 2.0);
        assert!(Value::Bool(true).as_bool());
        assert_eq!(Value::Obj(GcRef::string(9)).as_obj(), GcRef::string(9));
        assert!(Value::Obj(GcRef::string(9)).is_string());
        assert_eq!(Value::Nil.number(), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_wrong_accessor_asserts_in_debug() {
        let _ = Value::Nil.as_number();
    }
}
