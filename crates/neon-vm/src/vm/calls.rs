// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Calls, returns and method invocation.

use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::runtime::function::{CallFrame, FunctionKind, FunctionProto, NativeFunction};
use crate::runtime::object::Object;
use crate::runtime::table::{Entry, FieldKind};
use crate::runtime::value::Value;

use super::exceptions::{Completion, ExceptionKind};
use super::interpreter::{Outcome, Vm};

/// A resolved callee, copied out of the heap so the call can mutate it.
enum Callee {
    Closure(GcRef, Rc<FunctionProto>),
    Native(NativeFunction),
    Bound { receiver: Value, method: Value },
    Class(GcRef),
}

impl Vm {
    /// Calls a callable from the host.
    ///
    /// Only valid while no script is running; natives cannot re-enter the
    /// interpreter through this.
    pub fn call(&mut self, callee: Value, args: &[Value]) -> Result<Outcome> {
        if !self.frames.is_empty() {
            return Err(Error::internal("Vm::call while a script is executing"));
        }
        self.stack.push(callee);
        self.stack.extend_from_slice(args);
        let result = self.call_value(callee, args.len()).and_then(|()| {
            if self.frames.is_empty() {
                let value = self.pop()?;
                self.stack.clear();
                Ok(Outcome::Returned(value))
            } else {
                self.execute()
            }
        });
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn resolve_callee(&self, callee: Value) -> Option<Callee> {
        let Value::Obj(r) = callee else {
            return None;
        };
        match self.heap.get(r)? {
            Object::Closure(closure) => Some(Callee::Closure(r, Rc::clone(&closure.proto))),
            Object::Native(native) => Some(Callee::Native(native.clone())),
            Object::BoundMethod(bound) => Some(Callee::Bound {
                receiver: bound.receiver,
                method: bound.method,
            }),
            Object::Class(_) => Some(Callee::Class(r)),
            _ => None,
        }
    }

    /// Calls `callee` with `argc` arguments on top of the stack.
    ///
    /// The slot below the arguments becomes slot 0 of the new frame.
    pub(crate) fn call_value(&mut self, callee: Value, argc: usize) -> Result<()> {
        match self.resolve_callee(callee) {
            Some(Callee::Closure(closure, proto)) => self.call_closure(closure, proto, argc),
            Some(Callee::Native(native)) => self.call_native(&native, argc),
            Some(Callee::Bound { receiver, method }) => {
                let base = self.callee_slot(argc)?;
                self.stack[base] = receiver;
                self.call_value(method, argc)
            }
            Some(Callee::Class(class)) => self.instantiate(class, argc),
            None => {
                let message = format!("object of type {} is not callable", self.type_name(callee));
                self.throw_error(ExceptionKind::TypeError, message)
            }
        }
    }

    fn callee_slot(&self, argc: usize) -> Result<usize> {
        self.stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| Error::internal("stack underflow"))
    }

    fn arity_error(&mut self, name: &str, expected: usize, got: usize) -> Result<()> {
        let message = format!(
            "function '{}' expected {} arguments but got {}",
            name, expected, got
        );
        self.throw_error(ExceptionKind::ArgumentError, message)
    }

    pub(crate) fn call_closure(
        &mut self,
        closure: GcRef,
        proto: Rc<FunctionProto>,
        argc: usize,
    ) -> Result<()> {
        let arity = proto.arity as usize;
        let required = proto.required as usize;
        if argc < required {
            return self.arity_error(&proto.name, required, argc);
        }
        if argc > arity && !proto.variadic {
            return self.arity_error(&proto.name, arity, argc);
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(Error::FrameOverflow(self.config.max_frames));
        }

        if proto.variadic {
            let surplus = argc.saturating_sub(arity);
            let start = self.stack.len() - surplus;
            let rest: Vec<Value> = self.stack.drain(start..).collect();
            for _ in argc..arity {
                self.push(Value::Nil);
            }
            let rest = self.alloc(Object::Array(rest));
            self.push(rest);
        } else {
            for _ in argc..arity {
                self.push(Value::Nil);
            }
        }

        let base = self.stack.len() - proto.param_slots() - 1;
        debug!(function = %proto.name, depth = self.frames.len() + 1, "push frame");
        self.frames.push(CallFrame::new(closure, proto, base));
        Ok(())
    }

    /// Runs a native and returns its result, or `None` if it threw and
    /// control has moved to a handler.
    fn run_native(&mut self, native: &NativeFunction, argc: usize) -> Result<Option<Value>> {
        if let Some(arity) = native.arity {
            if argc != arity as usize {
                self.arity_error(&native.name, arity as usize, argc)?;
                return Ok(None);
            }
        }
        let base = self.callee_slot(argc)?;
        let receiver = self.stack[base];
        let args = self.stack[base + 1..].to_vec();
        match (native.func)(self, receiver, &args) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                let exception = self.take_pending()?;
                self.throw_value(exception)?;
                Ok(None)
            }
        }
    }

    fn call_native(&mut self, native: &NativeFunction, argc: usize) -> Result<()> {
        let base = self.callee_slot(argc)?;
        if let Some(result) = self.run_native(native, argc)? {
            self.stack.truncate(base);
            self.push(result);
        }
        Ok(())
    }

    /// Calls a class: allocates an instance and runs the nearest constructor.
    fn instantiate(&mut self, class: GcRef, argc: usize) -> Result<()> {
        let base = self.callee_slot(argc)?;
        let instance = self.new_instance(class);
        self.stack[base] = instance;

        let (name, constructor) = match self.heap.get(class) {
            Some(Object::Class(class)) => (class.name.clone(), class.constructor),
            _ => return Err(Error::internal("instantiating a non-class")),
        };
        match constructor.and_then(|ctor| self.resolve_callee(ctor)) {
            Some(Callee::Closure(closure, proto)) => self.call_closure(closure, proto, argc),
            Some(Callee::Native(native)) => {
                if self.run_native(&native, argc)?.is_some() {
                    self.stack.truncate(base);
                    self.push(instance);
                }
                Ok(())
            }
            Some(_) => Err(Error::internal("class constructor is not a function")),
            None if argc > 0 => {
                let message = format!(
                    "class '{}' has no constructor but got {} arguments",
                    name, argc
                );
                self.throw_error(ExceptionKind::ArgumentError, message)
            }
            None => Ok(()),
        }
    }

    /// Invokes a named method on the receiver below the arguments.
    pub(crate) fn invoke(&mut self, name: Value, argc: usize, from_self: bool) -> Result<()> {
        let receiver = self.peek(argc)?;
        let base = self.callee_slot(argc)?;

        if let Some(class) = self.instance_class(receiver) {
            let field = match self.heap.object_of(receiver) {
                Some(Object::Instance(instance)) => {
                    instance.fields.get_field(self.heap.strings(), name).copied()
                }
                _ => None,
            };
            if let Some(entry) = field {
                return self.invoke_property(receiver, entry, argc);
            }
            if !from_self && self.is_private(name) {
                let message = format!(
                    "cannot call private method '{}' from instance of {}",
                    self.name_str(name),
                    self.class_name(class)
                );
                return self.throw_error(ExceptionKind::TypeError, message);
            }
            return match self.find_method(class, name) {
                Some(entry) => self.invoke_method(receiver, entry, argc),
                None => {
                    let message = format!(
                        "'{}' has no method {}()",
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
                .get(strings, name)
                .or_else(|| class.static_properties.get(strings, name));
            let class_name = class.name.clone();
            return match found {
                Some(method) => self.call_value(method, argc),
                None => {
                    let message = format!(
                        "class {} does not have a static method named '{}'",
                        class_name,
                        self.name_str(name)
                    );
                    self.throw_error(ExceptionKind::Exception, message)
                }
            };
        }

        if let Some(Object::Dict(dict)) = self.heap.object_of(receiver) {
            if let Some(value) = dict.table.get(self.heap.strings(), name) {
                self.stack[base] = value;
                return self.call_value(value, argc);
            }
        }

        match self.primitive_method(receiver, name) {
            Some(entry) => self.invoke_method(receiver, entry, argc),
            None => {
                let message = format!(
                    "'{}' has no method {}()",
                    self.type_name(receiver),
                    self.name_str(name)
                );
                self.throw_error(ExceptionKind::Exception, message)
            }
        }
    }

    /// Calls a method entry with the receiver as `this`.
    fn invoke_method(&mut self, receiver: Value, entry: Entry, argc: usize) -> Result<()> {
        match entry.kind {
            FieldKind::Value => self.call_value(entry.value, argc),
            FieldKind::Getter => self.invoke_property(receiver, entry, argc),
        }
    }

    /// Calls the value a property yields, running getters on the receiver first.
    fn invoke_property(&mut self, receiver: Value, entry: Entry, argc: usize) -> Result<()> {
        let value = match entry.kind {
            FieldKind::Value => entry.value,
            FieldKind::Getter => match self.run_getter(receiver, entry.value)? {
                Some(value) => value,
                None => return Ok(()),
            },
        };
        let base = self.callee_slot(argc)?;
        self.stack[base] = value;
        self.call_value(value, argc)
    }

    /// Runs a native getter on `receiver` without touching the stack.
    ///
    /// Returns `None` if it threw and control has moved to a handler.
    fn run_getter(&mut self, receiver: Value, getter: Value) -> Result<Option<Value>> {
        let Some(Callee::Native(native)) = self.resolve_callee(getter) else {
            return Err(Error::internal("property getter is not a native function"));
        };
        match (native.func)(self, receiver, &[]) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                let exception = self.take_pending()?;
                self.throw_value(exception)?;
                Ok(None)
            }
        }
    }

    /// Stack: `this, args..., superclass`.
    pub(crate) fn invoke_super(&mut self, name: Value, argc: usize) -> Result<()> {
        let superclass = self.pop_class()?;
        match self.find_method(superclass, name) {
            Some(entry) => self.call_value(entry.value, argc),
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

    /// Stack: `this, args..., superclass`. Runs the superclass constructor on `this`.
    pub(crate) fn invoke_super_constructor(&mut self, argc: usize) -> Result<()> {
        let superclass = self.pop_class()?;
        let constructor = match self.heap.get(superclass) {
            Some(Object::Class(class)) => class.constructor,
            _ => None,
        };
        match constructor {
            Some(ctor) => match self.resolve_callee(ctor) {
                Some(Callee::Native(native)) => {
                    let base = self.callee_slot(argc)?;
                    let this = self.stack[base];
                    if self.run_native(&native, argc)?.is_some() {
                        self.stack.truncate(base);
                        self.push(this);
                    }
                    Ok(())
                }
                _ => self.call_value(ctor, argc),
            },
            None if argc > 0 => {
                let message = format!(
                    "class '{}' has no constructor but got {} arguments",
                    self.class_name(superclass),
                    argc
                );
                self.throw_error(ExceptionKind::ArgumentError, message)
            }
            None => Ok(()),
        }
    }

    /// Runs the finally blocks of the current frame, then pops it.
    ///
    /// Returns `Some` when the last frame returned.
    pub(crate) fn finish_return(&mut self, value: Value) -> Result<Option<Value>> {
        let depth = self.frames.len();
        while let Some(region) = self.try_stack.last().copied() {
            if region.frame_depth != depth {
                break;
            }
            self.try_stack.pop();
            if let Some(finally) = region.finally {
                self.close_upvalues(region.stack_depth);
                self.stack.truncate(region.stack_depth);
                self.push_completion(Completion::Return(value));
                self.jump_to(finally)?;
                return Ok(None);
            }
        }
        self.return_from_frame(value)
    }

    fn return_from_frame(&mut self, value: Value) -> Result<Option<Value>> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("return without an active frame"))?;
        self.close_upvalues(frame.base);
        let value = if frame.proto.kind == FunctionKind::Initializer {
            self.stack.get(frame.base).copied().unwrap_or_default()
        } else {
            value
        };
        self.stack.truncate(frame.base);
        let depth = self.frames.len();
        while self
            .completions
            .last()
            .is_some_and(|pending| pending.frame_depth > depth)
        {
            self.completions.pop();
        }
        debug!(function = %frame.proto.name, depth, "pop frame");

        if self.frames.is_empty() {
            return Ok(Some(value));
        }
        self.push(value);
        Ok(None)
    }

    /// Reads the value for a property entry, calling getters with the receiver.
    ///
    /// The receiver must be on top of the stack; it is replaced by the result.
    pub(crate) fn push_property(&mut self, receiver: Value, value: Value, kind: FieldKind) -> Result<()> {
        match kind {
            FieldKind::Value => self.set_top(value),
            FieldKind::Getter => {
                let base = self.callee_slot(0)?;
                self.stack[base] = receiver;
                self.call_value(value, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BlobBuilder, OpCode};
    use crate::runtime::function::{NativeResult, Thrown};
    use crate::runtime::object::{Class, Instance};
    use crate::runtime::table::HashTable;

    fn quiet_vm() -> Vm {
        let mut vm = Vm::new();
        vm.set_error_output(std::io::sink());
        vm
    }

    fn returned(outcome: Outcome) -> Value {
        match outcome {
            Outcome::Returned(value) => value,
            Outcome::Halted(status) => panic!("unexpected halt {}", status),
        }
    }

    fn add_function(vm: &mut Vm) -> Value {
        let mut body = BlobBuilder::new();
        body.op_short(OpCode::LocalGet, 1)
            .op_short(OpCode::LocalGet, 2)
            .op(OpCode::Add)
            .op(OpCode::Return);
        vm.make_function(FunctionProto::new("add", body.finish()).with_arity(2))
    }

    #[test]
    fn test_call_closure() {
        let mut vm = Vm::new();
        let function = add_function(&mut vm);
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        b.closure(index, &[]);
        b.push(Value::Number(2.0)).push(Value::Number(3.0));
        b.op_byte(OpCode::Call, 2).op(OpCode::Return);
        assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(5.0));
    }

    #[test]
    fn test_arity_mismatch_raises_argument_error() {
        let mut vm = quiet_vm();
        let function = add_function(&mut vm);
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        b.closure(index, &[]);
        b.push(Value::Number(2.0));
        b.op_byte(OpCode::Call, 1).op(OpCode::Return);
        let err = vm.run(b.finish()).unwrap_err();
        match err {
            Error::Unhandled { class, message, .. } => {
                assert_eq!(class, "ArgumentError");
                assert_eq!(message, "function 'add' expected 2 arguments but got 1");
            }
            other => panic!("Expected unhandled exception, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_parameter_default() {
        let mut vm = Vm::new();
        // f(a, b = 10) { return a + b }
        let mut body = BlobBuilder::new();
        body.push(Value::Number(10.0))
            .op_short(OpCode::FuncArgOptional, 2)
            .op_short(OpCode::LocalGet, 1)
            .op_short(OpCode::LocalGet, 2)
            .op(OpCode::Add)
            .op(OpCode::Return);
        let function = vm.make_function(
            FunctionProto::new("f", body.finish())
                .with_arity(2)
                .with_required(1),
        );
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        b.closure(index, &[]);
        b.push(Value::Number(1.0));
        b.op_byte(OpCode::Call, 1).op(OpCode::Return);
        assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(11.0));
    }

    #[test]
    fn test_variadic_collects_surplus() {
        let mut vm = Vm::new();
        let mut body = BlobBuilder::new();
        body.op_short(OpCode::LocalGet, 2).op(OpCode::Return);
        let function = vm.make_function(
            FunctionProto::new("rest", body.finish())
                .with_arity(1)
                .with_variadic(),
        );
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        b.closure(index, &[]);
        b.push(Value::Number(1.0))
            .push(Value::Number(2.0))
            .push(Value::Number(3.0));
        b.op_byte(OpCode::Call, 3).op(OpCode::Return);
        let value = returned(vm.run(b.finish()).unwrap());
        assert_eq!(vm.render(value), "[2, 3]");
    }

    #[test]
    fn test_native_call_and_raise() {
        fn halve(vm: &mut Vm, _this: Value, args: &[Value]) -> NativeResult {
            match args[0] {
                Value::Number(n) => Ok(Value::Number(n / 2.0)),
                _ => Err(vm.raise(ExceptionKind::TypeError, "halve expects a number")),
            }
        }

        let mut vm = quiet_vm();
        vm.define_native("halve", Some(1), halve);
        let name = vm.intern("halve");
        let mut b = BlobBuilder::new();
        b.op_const(OpCode::GlobalGet, name)
            .push(Value::Number(9.0))
            .op_byte(OpCode::Call, 1)
            .op(OpCode::Return);
        assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(4.5));

        let mut b = BlobBuilder::new();
        b.op_const(OpCode::GlobalGet, name)
            .op(OpCode::PushNil)
            .op_byte(OpCode::Call, 1)
            .op(OpCode::Return);
        let err = vm.run(b.finish()).unwrap_err();
        assert!(matches!(err, Error::Unhandled { ref class, .. } if class == "TypeError"));
    }

    #[test]
    fn test_native_thrown_without_raise_is_fatal() {
        fn broken(_vm: &mut Vm, _this: Value, _args: &[Value]) -> NativeResult {
            Err(Thrown)
        }

        let mut vm = Vm::new();
        let native = vm.define_native("broken", None, broken);
        assert!(matches!(vm.call(native, &[]), Err(Error::Internal(_))));
    }

    #[test]
    fn test_host_call() {
        let mut vm = Vm::new();
        let function = add_function(&mut vm);
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        let name = vm.intern("add");
        b.closure(index, &[]).op_const(OpCode::GlobalDefine, name);
        vm.run(b.finish()).unwrap();

        let add = vm.global("add").unwrap();
        let outcome = vm
            .call(add, &[Value::Number(4.0), Value::Number(6.0)])
            .unwrap();
        assert_eq!(outcome, Outcome::Returned(Value::Number(10.0)));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn test_calling_a_number_is_type_error() {
        let mut vm = quiet_vm();
        let mut b = BlobBuilder::new();
        b.push(Value::Number(1.0)).op_byte(OpCode::Call, 0);
        let err = vm.run(b.finish()).unwrap_err();
        assert!(matches!(err, Error::Unhandled { ref message, .. } if message == "object of type number is not callable"));
    }

    #[test]
    fn test_frame_overflow_is_fatal() {
        let mut vm = Vm::with_config(crate::config::VmConfig {
            max_frames: 8,
            ..Default::default()
        });
        // recurse() { return recurse() }
        let name = vm.intern("recurse");
        let mut body = BlobBuilder::new();
        body.op_const(OpCode::GlobalGet, name)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Return);
        let function = vm.make_function(FunctionProto::new("recurse", body.finish()));
        let mut b = BlobBuilder::new();
        let index = b.constant(function);
        b.closure(index, &[])
            .op_const(OpCode::GlobalDefine, name)
            .op_const(OpCode::GlobalGet, name)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Return);
        assert!(matches!(vm.run(b.finish()), Err(Error::FrameOverflow(8))));
    }

    #[test]
    fn test_invoke_runs_getter_field_before_calling() {
        fn double(vm: &mut Vm, _this: Value, args: &[Value]) -> NativeResult {
            match args[0] {
                Value::Number(n) => Ok(Value::Number(n * 2.0)),
                _ => Err(vm.raise(ExceptionKind::TypeError, "double expects a number")),
            }
        }
        fn pick_double(vm: &mut Vm, _this: Value, _args: &[Value]) -> NativeResult {
            match vm.global("double") {
                Some(native) => Ok(native),
                None => Err(vm.raise(ExceptionKind::NameError, "double is not bound")),
            }
        }

        let mut vm = Vm::new();
        vm.define_native("double", Some(1), double);
        let getter = vm.define_native("pick_double", Some(0), pick_double);
        let Value::Obj(class) = vm.alloc(Object::Class(Class::new("Box"))) else {
            panic!("class is not an object");
        };
        let instance = vm.alloc(Object::Instance(Instance {
            class,
            fields: HashTable::new(),
        }));
        let Value::Obj(r) = instance else {
            panic!("instance is not an object");
        };
        let op = vm.intern("op");
        if let Some((Object::Instance(instance), strings)) = vm.heap.get_mut_with_strings(r) {
            instance
                .fields
                .set_with_kind(strings, op, getter, FieldKind::Getter);
        }
        vm.define_global("box", instance);

        let boxed = vm.intern("box");
        let mut b = BlobBuilder::new();
        let op = b.constant(op);
        b.op_const(OpCode::GlobalGet, boxed)
            .push(Value::Number(21.0))
            .invoke(OpCode::Invoke, op, 1)
            .op(OpCode::Return);
        assert_eq!(returned(vm.run(b.finish()).unwrap()), Value::Number(42.0));
    }
}
