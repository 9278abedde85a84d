// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Closure creation and captured variables.
//!
//! Every captured stack slot has at most one open upvalue, so closures
//! capturing the same variable share it. Open upvalues are kept sorted by
//! slot; closing copies the slot value into the cell.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::runtime::function::{Closure, Upvalue};
use crate::runtime::object::Object;
use crate::runtime::value::Value;

use super::interpreter::Vm;

impl Vm {
    /// Returns the open upvalue for an absolute stack slot, creating it if needed.
    fn capture_upvalue(&mut self, slot: usize) -> GcRef {
        let position = self.open_upvalues.partition_point(|r| match self.heap.get(*r) {
            Some(Object::Upvalue(Upvalue::Open(open))) => *open < slot,
            _ => true,
        });
        if let Some(existing) = self.open_upvalues.get(position) {
            if let Some(Object::Upvalue(Upvalue::Open(open))) = self.heap.get(*existing) {
                if *open == slot {
                    return *existing;
                }
            }
        }
        let upvalue = self.heap.alloc(Object::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(position, upvalue);
        upvalue
    }

    /// Closes every open upvalue at or above `from`.
    pub(crate) fn close_upvalues(&mut self, from: usize) {
        while let Some(&last) = self.open_upvalues.last() {
            let slot = match self.heap.get(last) {
                Some(Object::Upvalue(Upvalue::Open(slot))) => *slot,
                _ => {
                    self.open_upvalues.pop();
                    continue;
                }
            };
            if slot < from {
                break;
            }
            let value = self.stack.get(slot).copied().unwrap_or_default();
            if let Some(Object::Upvalue(upvalue)) = self.heap.get_mut(last) {
                *upvalue = Upvalue::Closed(value);
            }
            self.open_upvalues.pop();
        }
    }

    fn frame_upvalue(&self, index: usize) -> Result<GcRef> {
        let closure = self.frame()?.closure;
        match self.heap.get(closure) {
            Some(Object::Closure(closure)) => closure
                .upvalues
                .get(index)
                .copied()
                .ok_or_else(|| Error::internal(format!("upvalue {} out of range", index))),
            _ => Err(Error::internal("frame is not running a closure")),
        }
    }

    pub(crate) fn upvalue_get(&self, index: usize) -> Result<Value> {
        let upvalue = self.frame_upvalue(index)?;
        match self.heap.get(upvalue) {
            Some(Object::Upvalue(Upvalue::Open(slot))) => self
                .stack
                .get(*slot)
                .copied()
                .ok_or_else(|| Error::internal("open upvalue past the top of the stack")),
            Some(Object::Upvalue(Upvalue::Closed(value))) => Ok(*value),
            _ => Err(Error::internal("upvalue slot holds a non-upvalue")),
        }
    }

    pub(crate) fn upvalue_set(&mut self, index: usize, value: Value) -> Result<()> {
        let upvalue = self.frame_upvalue(index)?;
        match self.heap.get_mut(upvalue) {
            Some(Object::Upvalue(Upvalue::Open(slot))) => {
                let slot = *slot;
                let target = self
                    .stack
                    .get_mut(slot)
                    .ok_or_else(|| Error::internal("open upvalue past the top of the stack"))?;
                *target = value;
                Ok(())
            }
            Some(Object::Upvalue(Upvalue::Closed(closed))) => {
                *closed = value;
                Ok(())
            }
            _ => Err(Error::internal("upvalue slot holds a non-upvalue")),
        }
    }

    /// Reads `MAKE_CLOSURE function (is_local index)*` and pushes the closure.
    pub(crate) fn make_closure(&mut self) -> Result<()> {
        let function = self.read_constant()?;
        let (function, proto) = match function {
            Value::Obj(r) => match self.heap.get(r) {
                Some(Object::Function(proto)) => (r, Rc::clone(proto)),
                _ => return Err(Error::internal("closure operand is not a function")),
            },
            _ => return Err(Error::internal("closure operand is not a function")),
        };

        let base = self.frame()?.base;
        let mut upvalues = Vec::with_capacity(proto.upvalue_count);
        for _ in 0..proto.upvalue_count {
            let is_local = self.read_byte()? != 0;
            let index = self.read_short()? as usize;
            let upvalue = if is_local {
                self.capture_upvalue(base + index)
            } else {
                self.frame_upvalue(index)?
            };
            upvalues.push(upvalue);
        }

        let closure = self.alloc(Object::Closure(Closure {
            function,
            proto,
            upvalues,
        }));
        self.push(closure);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BlobBuilder, Capture, OpCode};
    use crate::runtime::function::FunctionProto;
    use crate::vm::Outcome;

    /// `make_counter() { var n = 0; return fn() { n = n + 1; return n } }`
    fn counter_factory(vm: &mut Vm) -> Value {
        let mut inc = BlobBuilder::new();
        inc.op_short(OpCode::UpvalueGet, 0)
            .op(OpCode::PushOne)
            .op(OpCode::Add)
            .op_short(OpCode::UpvalueSet, 0)
            .op(OpCode::Return);
        let inc = vm.make_function(FunctionProto::new("inc", inc.finish()).with_upvalues(1));

        let mut factory = BlobBuilder::new();
        let index = factory.constant(inc);
        factory
            .push(Value::Number(0.0))
            .closure(index, &[Capture { is_local: true, index: 1 }])
            .op(OpCode::Return);
        vm.make_function(FunctionProto::new("make_counter", factory.finish()))
    }

    #[test]
    fn test_counter_survives_its_frame() {
        let mut vm = Vm::new();
        let factory = counter_factory(&mut vm);
        let mut b = BlobBuilder::new();
        let index = b.constant(factory);
        b.closure(index, &[])
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Dup)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Pop)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Return);
        assert_eq!(vm.run(b.finish()).unwrap(), Outcome::Returned(Value::Number(2.0)));
        assert!(vm.open_upvalues.is_empty());
    }

    #[test]
    fn test_closures_share_a_captured_slot() {
        let mut vm = Vm::new();
        // two closures over local 1; the first writes 5, the second reads it
        let mut writer = BlobBuilder::new();
        writer
            .push(Value::Number(5.0))
            .op_short(OpCode::UpvalueSet, 0)
            .op(OpCode::Return);
        let writer = vm.make_function(FunctionProto::new("w", writer.finish()).with_upvalues(1));
        let mut reader = BlobBuilder::new();
        reader.op_short(OpCode::UpvalueGet, 0).op(OpCode::Return);
        let reader = vm.make_function(FunctionProto::new("r", reader.finish()).with_upvalues(1));

        let mut b = BlobBuilder::new();
        let w = b.constant(writer);
        let r = b.constant(reader);
        let capture = [Capture { is_local: true, index: 1 }];
        b.push(Value::Number(0.0))
            .closure(w, &capture)
            .closure(r, &capture)
            .op_short(OpCode::LocalGet, 2)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Pop)
            .op_short(OpCode::LocalGet, 3)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Return);
        assert_eq!(vm.run(b.finish()).unwrap(), Outcome::Returned(Value::Number(5.0)));
    }

    #[test]
    fn test_close_upvalue_instruction() {
        let mut vm = Vm::new();
        let mut reader = BlobBuilder::new();
        reader.op_short(OpCode::UpvalueGet, 0).op(OpCode::Return);
        let reader = vm.make_function(FunctionProto::new("r", reader.finish()).with_upvalues(1));

        // { var x = 7; f = fn() { return x } } f()
        let mut b = BlobBuilder::new();
        let r = b.constant(reader);
        b.op(OpCode::PushNil)
            .push(Value::Number(7.0))
            .closure(r, &[Capture { is_local: true, index: 2 }])
            .op_short(OpCode::LocalSet, 1)
            .op(OpCode::Pop)
            .op(OpCode::CloseUpvalue)
            .op_short(OpCode::LocalGet, 1)
            .op_byte(OpCode::Call, 0)
            .op(OpCode::Return);
        assert_eq!(vm.run(b.finish()).unwrap(), Outcome::Returned(Value::Number(7.0)));
    }
}
