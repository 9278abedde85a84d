// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Heap object representation.
//!
//! Strings are not here; they live in the interned [`StringPool`].
//!
//! [`StringPool`]: crate::gc::StringPool

use std::rc::Rc;

use crate::gc::{GcRef, GcTrace};

use super::function::{BoundMethod, Closure, FunctionProto, NativeFunction, Upvalue};
use super::table::HashTable;
use super::value::Value;

/// A class.
#[derive(Debug, Clone, Default)]
pub struct Class {
    /// The class name
    pub name: String,
    /// The superclass, once inherited
    pub superclass: Option<GcRef>,
    /// Instance methods
    pub methods: HashTable,
    /// Static methods
    pub static_methods: HashTable,
    /// Field defaults copied into every new instance
    pub default_properties: HashTable,
    /// Properties stored on the class itself
    pub static_properties: HashTable,
    /// The constructor closure or native, if any
    pub constructor: Option<Value>,
}

impl Class {
    /// Creates an empty class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An instance of a class.
#[derive(Debug, Clone)]
pub struct Instance {
    /// The instance's class
    pub class: GcRef,
    /// Own fields
    pub fields: HashTable,
}

/// A dictionary preserving key insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    /// Keys in insertion order
    pub keys: Vec<Value>,
    /// Key to value storage
    pub table: HashTable,
}

/// A half-open numeric range `lower .. upper`.
///
/// Counts up when `lower < upper` and down otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// First element
    pub lower: f64,
    /// Bound, excluded
    pub upper: f64,
}

impl Range {
    /// Number of elements, saturating at `i64::MAX`.
    pub fn len(&self) -> usize {
        let span = (self.upper - self.lower).abs().ceil();
        if span >= i64::MAX as f64 {
            i64::MAX as usize
        } else {
            span as usize
        }
    }

    /// Returns whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.len() {
            return None;
        }
        let step = if self.lower <= self.upper { 1.0 } else { -1.0 };
        Some(self.lower + step * index as f64)
    }
}

/// A multi-way jump table.
///
/// Offsets are relative to the end of the switch instruction.
#[derive(Debug, Clone, Default)]
pub struct SwitchTable {
    /// Case value to jump offset (stored as a number)
    pub cases: HashTable,
    /// Offset taken when no case matches
    pub default_jump: Option<u16>,
    /// Offset taken when no case matches and there is no default
    pub exit_jump: u16,
}

/// A heap-allocated object.
#[derive(Debug, Clone)]
pub enum Object {
    /// A compiled function (only ever a constant; calls go through closures)
    Function(Rc<FunctionProto>),
    /// A function plus captured upvalues
    Closure(Closure),
    /// A captured-variable cell
    Upvalue(Upvalue),
    /// A host function
    Native(NativeFunction),
    /// A method bound to its receiver
    BoundMethod(BoundMethod),
    /// A class
    Class(Class),
    /// An instance
    Instance(Instance),
    /// A growable array
    Array(Vec<Value>),
    /// An ordered dictionary
    Dict(Dict),
    /// A numeric range
    Range(Range),
    /// A switch jump table
    Switch(SwitchTable),
}

impl Object {
    /// The name `typeof` reports for this object.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Function(_)
            | Object::Closure(_)
            | Object::Native(_)
            | Object::BoundMethod(_) => "function",
            Object::Upvalue(_) => "upvalue",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::Array(_) => "array",
            Object::Dict(_) => "dict",
            Object::Range(_) => "range",
            Object::Switch(_) => "switch",
        }
    }

    /// Returns whether the object can be called.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Object::Closure(_) | Object::Native(_) | Object::BoundMethod(_) | Object::Class(_)
        )
    }

    /// Approximate heap footprint in bytes, used for collection pacing.
    pub fn size_hint(&self) -> usize {
        let value = std::mem::size_of::<Value>();
        let table = |t: &HashTable| t.capacity() * (value * 2 + 8);
        std::mem::size_of::<Object>()
            + match self {
                Object::Function(proto) => {
                    proto.blob.instructions.len() * 8 + proto.blob.constants.len() * value
                }
                Object::Closure(closure) => closure.upvalues.len() * 4,
                Object::Class(class) => {
                    table(&class.methods)
                        + table(&class.static_methods)
                        + table(&class.default_properties)
                        + table(&class.static_properties)
                }
                Object::Instance(instance) => table(&instance.fields),
                Object::Array(items) => items.capacity() * value,
                Object::Dict(dict) => dict.keys.capacity() * value + table(&dict.table),
                Object::Switch(switch) => table(&switch.cases),
                Object::Upvalue(_)
                | Object::Native(_)
                | Object::BoundMethod(_)
                | Object::Range(_) => 0,
            }
    }
}

fn push_value(refs: &mut Vec<GcRef>, value: Value) {
    if let Value::Obj(r) = value {
        refs.push(r);
    }
}

impl GcTrace for Object {
    fn trace_refs(&self, refs: &mut Vec<GcRef>) {
        match self {
            Object::Function(proto) => {
                for constant in &proto.blob.constants {
                    push_value(refs, *constant);
                }
            }
            Object::Closure(closure) => {
                refs.push(closure.function);
                refs.extend(closure.upvalues.iter().copied());
            }
            Object::Upvalue(Upvalue::Closed(value)) => push_value(refs, *value),
            // open upvalues point into the stack, which is a root already
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Native(_) | Object::Range(_) => {}
            Object::BoundMethod(bound) => {
                push_value(refs, bound.receiver);
                push_value(refs, bound.method);
            }
            Object::Class(class) => {
                refs.extend(class.superclass);
                class.methods.trace_refs(refs);
                class.static_methods.trace_refs(refs);
                class.default_properties.trace_refs(refs);
                class.static_properties.trace_refs(refs);
                if let Some(constructor) = class.constructor {
                    push_value(refs, constructor);
                }
            }
            Object::Instance(instance) => {
                refs.push(instance.class);
                instance.fields.trace_refs(refs);
            }
            Object::Array(items) => {
                for item in items {
                    push_value(refs, *item);
                }
            }
            Object::Dict(dict) => {
                for key in &dict.keys {
                    push_value(refs, *key);
                }
                dict.table.trace_refs(refs);
            }
            Object::Switch(switch) => switch.cases.trace_refs(refs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_ascending() {
        let range = Range {
            lower: 2.0,
            upper: 5.0,
        };
        assert_eq!(range.len(), 3);
        assert_eq!(range.get(0), Some(2.0));
        assert_eq!(range.get(2), Some(4.0));
        assert_eq!(range.get(3), None);
    }

    #[test]
    fn test_range_descending() {
        let range = Range {
            lower: 3.0,
            upper: 0.0,
        };
        assert_eq!(range.len(), 3);
        assert_eq!(range.get(1), Some(2.0));
    }

    #[test]
    fn test_empty_range() {
        let range = Range {
            lower: 1.0,
            upper: 1.0,
        };
        assert!(range.is_empty());
        assert_eq!(range.get(0), None);
    }

    #[test]
    fn test_huge_range_length_saturates() {
        let range = Range {
            lower: 0.0,
            upper: 1e300,
        };
        assert_eq!(range.len(), i64::MAX as usize);
        assert_eq!(range.get(7), Some(7.0));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Object::Array(Vec::new()).type_name(), "array");
        assert_eq!(Object::Dict(Dict::default()).type_name(), "dict");
        assert_eq!(Object::Class(Class::new("A")).type_name(), "class");
    }

    #[test]
    fn test_trace_array_skips_primitives() {
        let array = Object::Array(vec![
            Value::Number(1.0),
            Value::Obj(GcRef::object(4)),
            Value::Nil,
            Value::Obj(GcRef::string(2)),
        ]);
        let mut refs = Vec::new();
        array.trace_refs(&mut refs);
        assert_eq!(refs, vec![GcRef::object(4), GcRef::string(2)]);
    }

    #[test]
    fn test_trace_closure() {
        let closure = Object::Closure(Closure {
            function: GcRef::object(1),
            proto: Rc::new(FunctionProto::new("f", Default::default())),
            upvalues: vec![GcRef::object(2), GcRef::object(3)],
        });
        let mut refs = Vec::new();
        closure.trace_refs(&mut refs);
        assert_eq!(refs.len(), 3);
    }
}
