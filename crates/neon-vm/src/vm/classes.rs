// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Classes, instances and property access.
//!
//! Method lookup walks the single-inheritance chain through
//! `Class::superclass`. Numbers, strings, arrays, dicts, ranges and
//! functions have a class of their own so the host can give them methods.

use tracing::debug;

use crate::error::{Error, Result};
use crate::gc::{GcRef, Heap};
use crate::runtime::function::{BoundMethod, FunctionKind, NativeFn, NativeFunction};
use crate::runtime::object::{Class, Instance, Object};
use crate::runtime::table::{Entry, FieldKind, HashTable};
use crate::runtime::value::Value;

use super::exceptions::ExceptionKind;
use super::interpreter::Vm;

/// Built-in value categories with a host-extensible class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Numbers
    Number,
    /// Strings
    String,
    /// Arrays
    Array,
    /// Dicts
    Dict,
    /// Ranges
    Range,
    /// Closures, natives and bound methods
    Function,
}

impl Primitive {
    /// Every primitive category.
    pub const ALL: [Primitive; 6] = [
        Primitive::Number,
        Primitive::String,
        Primitive::Array,
        Primitive::Dict,
        Primitive::Range,
        Primitive::Function,
    ];

    /// The class name.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Number => "Number",
            Primitive::String => "String",
            Primitive::Array => "Array",
            Primitive::Dict => "Dict",
            Primitive::Range => "Range",
            Primitive::Function => "Function",
        }
    }
}

/// The classes backing each [`Primitive`].
pub(crate) struct PrimitiveClasses {
    classes: [GcRef; 6],
}

impl PrimitiveClasses {
    pub(crate) fn new(heap: &mut Heap) -> Self {
        let classes = Primitive::ALL.map(|primitive| heap.alloc(Object::Class(Class::new(primitive.name()))));
        Self { classes }
    }

    pub(crate) fn class(&self, primitive: Primitive) -> GcRef {
        self.classes[primitive as usize]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.classes.iter().copied()
    }
}

/// A property found on a receiver.
enum Found {
    /// Stored value or getter
    Field(Entry),
    /// Method to bind to the receiver
    Method(Entry),
}

impl Vm {
    // =========================================================================
    // Host registration
    // =========================================================================

    /// Adds a native method to a primitive class.
    ///
    /// The native receives the primitive value as its receiver.
    pub fn define_primitive_method(
        &mut self,
        primitive: Primitive,
        name: &str,
        arity: Option<u8>,
        func: NativeFn,
    ) -> Value {
        self.define_primitive_entry(primitive, name, arity, func, FieldKind::Value)
    }

    /// Adds a native getter to a primitive class.
    ///
    /// Reading the property calls the getter with the receiver.
    pub fn define_primitive_getter(&mut self, primitive: Primitive, name: &str, func: NativeFn) -> Value {
        self.define_primitive_entry(primitive, name, Some(0), func, FieldKind::Getter)
    }

    fn define_primitive_entry(
        &mut self,
        primitive: Primitive,
        name: &str,
        arity: Option<u8>,
        func: NativeFn,
        kind: FieldKind,
    ) -> Value {
        let key = self.heap.intern(name);
        let native = self.alloc(Object::Native(NativeFunction {
            name: name.to_string(),
            arity,
            func,
        }));
        let class = self.primitives.class(primitive);
        if let Some((Object::Class(class), strings)) = self.heap.get_mut_with_strings(class) {
            class.methods.set_with_kind(strings, key, native, kind);
        }
        native
    }

    /// Returns the class of a primitive value.
    pub fn primitive_class(&self, primitive: Primitive) -> Value {
        Value::Obj(self.primitives.class(primitive))
    }

    fn primitive_of(&self, value: Value) -> Option<Primitive> {
        match value {
            Value::Number(_) => Some(Primitive::Number),
            Value::Obj(r) if r.is_string() => Some(Primitive::String),
            Value::Obj(r) => match self.heap.get(r)? {
                Object::Array(_) => Some(Primitive::Array),
                Object::Dict(_) => Some(Primitive::Dict),
                Object::Range(_) => Some(Primitive::Range),
                Object::Function(_)
                | Object::Closure(_)
                | Object::Native(_)
                | Object::BoundMethod(_) => Some(Primitive::Function),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn primitive_method(&self, receiver: Value, name: Value) -> Option<Entry> {
        let primitive = self.primitive_of(receiver)?;
        self.find_method(self.primitives.class(primitive), name)
    }

    // =========================================================================
    // Lookup helpers
    // =========================================================================

    /// Finds a method on `class` or the nearest superclass defining it.
    pub(crate) fn find_method(&self, class: GcRef, name: Value) -> Option<Entry> {
        let strings = self.heap.strings();
        let mut current = Some(class);
        while let Some(r) = current {
            let Some(Object::Class(class)) = self.heap.get(r) else {
                return None;
            };
            if let Some(entry) = class.methods.get_field(strings, name) {
                return Some(*entry);
            }
            current = class.superclass;
        }
        None
    }

    pub(crate) fn instance_class(&self, value: Value) -> Option<GcRef> {
        match self.heap.object_of(value)? {
            Object::Instance(instance) => Some(instance.class),
            _ => None,
        }
    }

    /// Returns whether `value` is an instance of `class` or a subclass.
    pub(crate) fn is_instance_of(&self, value: Value, class: GcRef) -> bool {
        let mut current = self.instance_class(value);
        while let Some(r) = current {
            if r == class {
                return true;
            }
            current = match self.heap.get(r) {
                Some(Object::Class(class)) => class.superclass,
                _ => None,
            };
        }
        false
    }

    /// Stores an own field on an instance; other values are ignored.
    pub(crate) fn set_field(&mut self, target: Value, key: Value, value: Value) {
        let Value::Obj(r) = target else {
            return;
        };
        if let Some((Object::Instance(instance), strings)) = self.heap.get_mut_with_strings(r) {
            instance.fields.set(strings, key, value);
        }
    }

    /// Reads an own field of an instance.
    pub(crate) fn get_field(&self, target: Value, key: Value) -> Option<Value> {
        match self.heap.object_of(target)? {
            Object::Instance(instance) => instance.fields.get(self.heap.strings(), key),
            _ => None,
        }
    }

    pub(crate) fn is_private(&self, name: Value) -> bool {
        self.heap
            .string_of(name)
            .is_some_and(|text| text.starts_with('_'))
    }

    pub(crate) fn name_str(&self, name: Value) -> &str {
        self.heap.string_of(name).unwrap_or("?")
    }

    pub(crate) fn class_name(&self, class: GcRef) -> &str {
        match self.heap.get(class) {
            Some(Object::Class(class)) => &class.name,
            _ => "?",
        }
    }

    pub(crate) fn pop_class(&mut self) -> Result<GcRef> {
        match self.pop()? {
            Value::Obj(r) if matches!(self.heap.get(r), Some(Object::Class(_))) => Ok(r),
            _ => Err(Error::internal("superclass operand is not a class")),
        }
    }

    fn class_mut(&mut self, class: Value) -> Result<(&mut Class, &crate::gc::StringPool)> {
        let Value::Obj(r) = class else {
            return Err(Error::internal("class operand is not a class"));
        };
        match self.heap.get_mut_with_strings(r) {
            Some((Object::Class(class), strings)) => Ok((class, strings)),
            _ => Err(Error::internal("class operand is not a class")),
        }
    }

    /// Allocates an instance with the default properties of the whole chain, root first.
    pub(crate) fn new_instance(&mut self, class: GcRef) -> Value {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(r) = current {
            match self.heap.get(r) {
                Some(Object::Class(c)) => {
                    chain.push(r);
                    current = c.superclass;
                }
                _ => break,
            }
        }

        let mut fields = HashTable::new();
        for r in chain.iter().rev() {
            if let Some(Object::Class(c)) = self.heap.get(*r) {
                fields.add_all(self.heap.strings(), &c.default_properties);
            }
        }
        self.alloc(Object::Instance(Instance { class, fields }))
    }

    fn bind(&mut self, receiver: Value, method: Value) -> Result<()> {
        let bound = self.alloc(Object::BoundMethod(BoundMethod { receiver, method }));
        self.set_top(bound)
    }

    // =========================================================================
    // Class instructions
    // =========================================================================

    pub(crate) fn make_class(&mut self, name: Value) {
        let class = Class::new(self.name_str(name));
        let class = self.alloc(Object::Class(class));
        self.push(class);
    }

    /// Stack: `class, method`. Binds the method and leaves the class.
    pub(crate) fn make_method(&mut self, name: Value) -> Result<()> {
        let method = self.pop()?;
        let kind = match self.heap.object_of(method) {
            Some(Object::Closure(closure)) => closure.proto.kind,
            _ => FunctionKind::Method,
        };
        let class = self.peek(0)?;
        let (class, strings) = self.class_mut(class)?;
        match kind {
            FunctionKind::Initializer => class.constructor = Some(method),
            FunctionKind::Static => {
                class.static_methods.set(strings, name, method);
            }
            _ => {
                class.methods.set(strings, name, method);
            }
        }
        Ok(())
    }

    /// Stack: `class, value`. Stores an instance default or a static property.
    pub(crate) fn define_property(&mut self, name: Value, is_static: bool) -> Result<()> {
        let value = self.pop()?;
        let class = self.peek(0)?;
        let (class, strings) = self.class_mut(class)?;
        if is_static {
            class.static_properties.set(strings, name, value);
        } else {
            class.default_properties.set(strings, name, value);
        }
        Ok(())
    }

    /// Stack: `superclass, subclass`. Pops the subclass, leaving the superclass.
    pub(crate) fn inherit(&mut self) -> Result<()> {
        let superclass = self.peek(1)?;
        let (methods, defaults, constructor) = match self.heap.object_of(superclass) {
            Some(Object::Class(parent)) => (
                parent.methods.clone(),
                parent.default_properties.clone(),
                parent.constructor,
            ),
            _ => {
                let message = format!(
                    "cannot inherit from non-class object of type {}",
                    self.type_name(superclass)
                );
                return self.throw_error(ExceptionKind::TypeError, message);
            }
        };

        let subclass = self.pop()?;
        let (class, strings) = self.class_mut(subclass)?;
        class.methods.add_all(strings, &methods);
        class.default_properties.add_all(strings, &defaults);
        if class.constructor.is_none() {
            class.constructor = constructor;
        }
        class.superclass = superclass.obj();
        debug!(class = %class.name, "inherit");
        Ok(())
    }

    /// Stack: `this, superclass`. Replaces both with the bound superclass method.
    pub(crate) fn get_super(&mut self, name: Value) -> Result<()> {
        let superclass = self.pop_class()?;
        let receiver = self.peek(0)?;
        match self.find_method(superclass, name) {
            Some(entry) => self.bind(receiver, entry.value),
            None => {
                let message = format!(
                    "class '{}' does not have a function '{}'",
                    self.class_name(superclass),
                    self.name_str(name)
                );
                self.throw_error(ExceptionKind::Exception, message)
            }
        }
    }

    /// Stack: `receiver`. Replaces it with the property value.
    pub(crate) fn property_get(&mut self, name: Value, from_self: bool) -> Result<()> {
        let receiver = self.peek(0)?;

        if let Some(class) = self.instance_class(receiver) {
            if !from_self && self.is_private(name) {
                let message = format!(
                    "cannot get private property '{}' from instance of {}",
                    self.name_str(name),
                    self.class_name(class)
                );
                return self.throw_error(ExceptionKind::TypeError, message);
            }
            let found = match self.heap.object_of(receiver) {
                Some(Object::Instance(instance)) => instance
                    .fields
                    .get_field(self.heap.strings(), name)
                    .map(|entry| Found::Field(*entry)),
                _ => None,
            }
            .or_else(|| self.find_method(class, name).map(Found::Method));
            return match found {
                Some(found) => self.push_found(receiver, found),
                None => {
                    let message = format!(
                        "instance of class {} does not have a property or method named '{}'",
                        self.class_name(class),
                        self.name_str(name)
                    );
                    self.throw_error(ExceptionKind::Exception, message)
                }
            };
        }

        if let Some(Object::Class(class)) = self.heap.object_of(receiver) {
            let strings = self.heap.strings();
            let found = class
                .static_methods
                .get_field(strings, name)
                .or_else(|| class.static_properties.get_field(strings, name))
                .copied();
            let class_name = class.name.clone();
            return match found {
                Some(_) if !from_self && self.is_private(name) => {
                    let message = format!(
                        "cannot call private property '{}' of class {}",
                        self.name_str(name),
                        class_name
                    );
                    self.throw_error(ExceptionKind::TypeError, message)
                }
                Some(entry) => self.push_found(receiver, Found::Field(entry)),
                None => {
                    let message = format!(
                        "class {} does not have a static property or method named '{}'",
                        class_name,
                        self.name_str(name)
                    );
                    self.throw_error(ExceptionKind::Exception, message)
                }
            };
        }

        if let Some(Object::Dict(dict)) = self.heap.object_of(receiver) {
            if let Some(entry) = dict.table.get_field(self.heap.strings(), name).copied() {
                return self.push_found(receiver, Found::Field(entry));
            }
        }

        match self.primitive_of(receiver) {
            Some(primitive) => match self.primitive_method(receiver, name) {
                Some(entry) => self.push_found(receiver, Found::Method(entry)),
                None => {
                    let message = format!(
                        "class {} has no named property '{}'",
                        primitive.name(),
                        self.name_str(name)
                    );
                    self.throw_error(ExceptionKind::Exception, message)
                }
            },
            None => {
                let message = format!(
                    "'{}' of type {} does not have properties",
                    self.render(receiver),
                    self.type_name(receiver)
                );
                self.throw_error(ExceptionKind::TypeError, message)
            }
        }
    }

    fn push_found(&mut self, receiver: Value, found: Found) -> Result<()> {
        match found {
            Found::Field(entry) => self.push_property(receiver, entry.value, entry.kind),
            Found::Method(entry) if entry.kind == FieldKind::Getter => {
                self.push_property(receiver, entry.value, entry.kind)
            }
            Found::Method(entry) => self.bind(receiver, entry.value),
        }
    }

    /// Stack: `target, value`. Stores the property and leaves the value.
    pub(crate) fn property_set(&mut self, name: Value) -> Result<()> {
        let value = self.pop()?;
        let target = self.pop()?;

        let Value::Obj(r) = target else {
            return self.cannot_carry(target);
        };
        let callable = self.heap.object_of(value).is_some_and(Object::is_callable);
        let class = match self.heap.get(r) {
            Some(Object::Instance(_)) => {
                self.set_field(target, name, value);
                self.push(value);
                return Ok(());
            }
            Some(Object::Dict(_)) => {
                if self.dict_insert(r, name, value)? {
                    self.push(value);
                }
                return Ok(());
            }
            Some(Object::Class(_)) => r,
            _ => match self.primitive_of(target) {
                Some(primitive) => self.primitives.class(primitive),
                None => return self.cannot_carry(target),
            },
        };

        let (class, strings) = self.class_mut(Value::Obj(class))?;
        if callable {
            class.methods.set(strings, name, value);
        } else {
            class.static_properties.set(strings, name, value);
        }
        self.push(value);
        Ok(())
    }

    fn cannot_carry(&mut self, target: Value) -> Result<()> {
        let message = format!(
            "object of type {} cannot carry properties",
            self.type_name(target)
        );
        self.throw_error(ExceptionKind::TypeError, message)
    }

    /// Stack: `value, class`. Pushes whether the value is an instance of the class.
    pub(crate) fn instance_of(&mut self) -> Result<()> {
        let class = self.pop()?;
        let value = self.pop()?;
        match class {
            Value::Obj(r) if matches!(self.heap.get(r), Some(Object::Class(_))) => {
                let result = self.is_instance_of(value, r);
                self.push(Value::Bool(result));
                Ok(())
            }
            _ => self.throw_error(
                ExceptionKind::TypeError,
                "invalid type for instanceof; expected class",
            ),
        }
    }
}
