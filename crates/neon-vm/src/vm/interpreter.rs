// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode interpreter.

use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::{Blob, OpCode, validate};
use crate::config::VmConfig;
use crate::error::{Error, Result};
use crate::gc::{GcRef, Heap};
use crate::runtime::function::{CallFrame, Closure, FunctionProto, NativeFn, NativeFunction};
use crate::runtime::object::Object;
use crate::runtime::printer;
use crate::runtime::table::HashTable;
use crate::runtime::value::Value;

use super::classes::PrimitiveClasses;
use super::exceptions::{ExceptionKind, PendingCompletion, TryFrame};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The top-level function returned this value
    Returned(Value),
    /// A `HALT` instruction stopped the loop with this status
    Halted(u8),
}

/// Interned names the interpreter itself reads and writes.
pub(crate) struct Names {
    pub(crate) message: Value,
    pub(crate) stacktrace: Value,
}

/// One interpreter state.
///
/// Owns the value stack, the frame stack, the globals table and the heap.
/// Nothing here is shared with another `Vm`.
pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: HashTable,
    /// Open upvalues, ordered by stack slot
    pub(crate) open_upvalues: Vec<GcRef>,
    pub(crate) try_stack: Vec<TryFrame>,
    pub(crate) completions: Vec<PendingCompletion>,
    /// Exception raised by a native, waiting for its call site
    pub(crate) pending: Option<Value>,
    /// Built-in exception classes, indexed by [`ExceptionKind`]
    pub(crate) exception_classes: Vec<GcRef>,
    pub(crate) primitives: PrimitiveClasses,
    pub(crate) pinned: Vec<Value>,
    pub(crate) names: Names,
    output: Box<dyn Write>,
    error_output: Box<dyn Write>,
}

impl Vm {
    /// Creates a VM with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Creates a VM with the given configuration.
    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::new(
            config.gc_initial_threshold,
            config.gc_growth_factor,
            config.stress_gc,
        );
        let names = Names {
            message: heap.intern("message"),
            stacktrace: heap.intern("stacktrace"),
        };
        let primitives = PrimitiveClasses::new(&mut heap);
        let mut vm = Self {
            stack: Vec::with_capacity(config.initial_stack),
            frames: Vec::new(),
            globals: HashTable::new(),
            open_upvalues: Vec::new(),
            try_stack: Vec::new(),
            completions: Vec::new(),
            pending: None,
            exception_classes: Vec::new(),
            primitives,
            pinned: Vec::new(),
            names,
            output: Box::new(std::io::stdout()),
            error_output: Box::new(std::io::stderr()),
            heap,
            config,
        };
        vm.install_exception_classes();
        vm
    }

    /// Returns the configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Returns the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Replaces the writer `ECHO` prints to.
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = Box::new(output);
    }

    /// Replaces the writer unhandled-exception reports go to.
    pub fn set_error_output(&mut self, output: impl Write + 'static) {
        self.error_output = Box::new(output);
    }

    /// Interns a string.
    pub fn intern(&mut self, text: &str) -> Value {
        self.heap.intern(text)
    }

    /// Returns the contents of a string value.
    pub fn string_of(&self, value: Value) -> Option<&str> {
        self.heap.string_of(value)
    }

    /// Renders a value the way `ECHO` prints it.
    pub fn render(&self, value: Value) -> String {
        printer::render(&self.heap, value)
    }

    /// Allocates an object and returns a reference to it.
    pub fn alloc(&mut self, object: Object) -> Value {
        Value::Obj(self.heap.alloc(object))
    }

    /// Wraps a compiled function as a constant for a blob.
    pub fn make_function(&mut self, proto: FunctionProto) -> Value {
        self.alloc(Object::Function(Rc::new(proto)))
    }

    /// Binds a global.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let key = self.heap.intern(name);
        self.globals.set(self.heap.strings(), key, value);
    }

    /// Looks up a global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals
            .get_str(self.heap.strings(), name)
            .map(|entry| entry.value)
    }

    /// Binds a native function as a global.
    ///
    /// `arity` of `None` accepts any number of arguments.
    pub fn define_native(&mut self, name: &str, arity: Option<u8>, func: NativeFn) -> Value {
        let native = self.alloc(Object::Native(NativeFunction {
            name: name.to_string(),
            arity,
            func,
        }));
        self.define_global(name, native);
        native
    }

    /// Number of values currently on the stack.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Runs a top-level script blob.
    pub fn run(&mut self, blob: Blob) -> Result<Outcome> {
        self.run_function(FunctionProto::script(blob))
    }

    /// Runs a compiled function as the top-level script.
    pub fn run_function(&mut self, proto: FunctionProto) -> Result<Outcome> {
        if !self.frames.is_empty() {
            return Err(Error::internal("run called while a script is executing"));
        }
        validate(&proto.blob, &self.heap)?;
        let proto = Rc::new(proto);
        let function = self.heap.alloc(Object::Function(Rc::clone(&proto)));
        let closure = self.heap.alloc(Object::Closure(Closure {
            function,
            proto: Rc::clone(&proto),
            upvalues: Vec::new(),
        }));
        debug!(function = %proto.name, bytes = proto.blob.len(), "run");
        self.stack.push(Value::Obj(closure));
        self.frames
            .push(CallFrame::new(closure, proto, self.stack.len() - 1));
        self.execute()
    }

    /// Runs the dispatch loop until the frame stack empties.
    pub(crate) fn execute(&mut self) -> Result<Outcome> {
        let result = self.dispatch();
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn dispatch(&mut self) -> Result<Outcome> {
        loop {
            if self.heap.should_collect() {
                self.collect_garbage();
            }

            let (ip, len) = {
                let frame = self.frame()?;
                (frame.ip, frame.proto.blob.len())
            };
            if ip >= len {
                // running off the end returns nil
                if let Some(value) = self.finish_return(Value::Nil)? {
                    return Ok(Outcome::Returned(value));
                }
                continue;
            }

            let byte = self.read_byte()?;
            let op = OpCode::try_from(byte)
                .map_err(|byte| Error::malformed(ip, format!("unknown opcode {}", byte)))?;
            if self.config.trace_execution {
                trace!(offset = ip, op = %op, depth = self.stack.len(), "exec");
            }

            match op {
                OpCode::PushConst => {
                    let value = self.read_constant()?;
                    self.push(value);
                }
                OpCode::PushNil | OpCode::PushEmpty => self.push(Value::Nil),
                OpCode::PushTrue => self.push(Value::Bool(true)),
                OpCode::PushFalse => self.push(Value::Bool(false)),
                OpCode::PushOne => self.push(Value::Number(1.0)),
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::PopN => {
                    let count = self.read_short()? as usize;
                    self.pop_n(count)?;
                }
                OpCode::Dup => {
                    let value = self.peek(0)?;
                    self.push(value);
                }

                OpCode::GlobalDefine => {
                    let name = self.read_constant()?;
                    let value = self.pop()?;
                    self.globals.set(self.heap.strings(), name, value);
                }
                OpCode::GlobalGet => {
                    let name = self.read_constant()?;
                    match self.globals.get(self.heap.strings(), name) {
                        Some(value) => self.push(value),
                        None => self.undefined_global(name)?,
                    }
                }
                OpCode::GlobalSet => {
                    let name = self.read_constant()?;
                    let value = self.peek(0)?;
                    let strict = self.config.strict_globals;
                    if strict && self.globals.get(self.heap.strings(), name).is_none() {
                        self.undefined_global(name)?;
                    } else {
                        self.globals.set(self.heap.strings(), name, value);
                    }
                }
                OpCode::LocalGet => {
                    let slot = self.read_short()? as usize;
                    let value = self.local(slot)?;
                    self.push(value);
                }
                OpCode::LocalSet => {
                    let slot = self.read_short()? as usize;
                    let value = self.peek(0)?;
                    *self.local_mut(slot)? = value;
                }
                OpCode::FuncArgOptional => {
                    let slot = self.read_short()? as usize;
                    let default = self.pop()?;
                    let current = self.local_mut(slot)?;
                    if current.is_nil() {
                        *current = default;
                    }
                }
                OpCode::UpvalueGet => {
                    let index = self.read_short()? as usize;
                    let value = self.upvalue_get(index)?;
                    self.push(value);
                }
                OpCode::UpvalueSet => {
                    let index = self.read_short()? as usize;
                    let value = self.peek(0)?;
                    self.upvalue_set(index, value)?;
                }
                OpCode::CloseUpvalue => {
                    let top = self
                        .stack
                        .len()
                        .checked_sub(1)
                        .ok_or_else(|| Error::internal("stack underflow"))?;
                    self.close_upvalues(top);
                    self.pop()?;
                }

                OpCode::Add => self.binary_add()?,
                OpCode::Sub => self.binary_num_op("-", |a, b| a - b)?,
                OpCode::Mul => self.binary_mul()?,
                OpCode::Div => self.binary_num_op("/", |a, b| a / b)?,
                OpCode::FloorDiv => self.binary_num_op("//", |a, b| (a / b).floor())?,
                OpCode::Mod => self.binary_num_op("%", floored_mod)?,
                OpCode::Pow => self.binary_num_op("**", f64::powf)?,
                OpCode::Negate => match self.pop()? {
                    Value::Number(n) => self.push(Value::Number(-n)),
                    other => self.unary_error("-", other)?,
                },
                OpCode::Not => {
                    let value = self.pop()?;
                    let falsey = self.is_falsey(value);
                    self.push(Value::Bool(falsey));
                }
                OpCode::BitNot => match self.pop()? {
                    Value::Number(n) => self.push(Value::Number(!(n as i64) as f64)),
                    other => self.unary_error("~", other)?,
                },
                OpCode::BitAnd => self.bitwise_op("&", |a, b| a & b)?,
                OpCode::BitOr => self.bitwise_op("|", |a, b| a | b)?,
                OpCode::BitXor => self.bitwise_op("^", |a, b| a ^ b)?,
                OpCode::ShiftLeft => self.bitwise_op("<<", |a, b| a.wrapping_shl(b as u32))?,
                OpCode::ShiftRight => self.bitwise_op(">>", |a, b| a.wrapping_shr(b as u32))?,

                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(Value::equals(a, b)));
                }
                OpCode::Greater => self.compare_op(">", |a, b| a > b)?,
                OpCode::Less => self.compare_op("<", |a, b| a < b)?,

                OpCode::Jump => {
                    let displacement = self.read_short()? as usize;
                    self.frame_mut()?.ip += displacement;
                }
                OpCode::JumpIfFalse => {
                    let displacement = self.read_short()? as usize;
                    let condition = self.pop()?;
                    if self.is_falsey(condition) {
                        self.frame_mut()?.ip += displacement;
                    }
                }
                OpCode::Loop => {
                    let displacement = self.read_short()? as usize;
                    let frame = self.frame_mut()?;
                    frame.ip = frame
                        .ip
                        .checked_sub(displacement)
                        .ok_or_else(|| Error::malformed(ip, "loop target before start of blob"))?;
                }

                OpCode::Call => {
                    let argc = self.read_byte()? as usize;
                    let callee = self.peek(argc)?;
                    self.call_value(callee, argc)?;
                }
                OpCode::Invoke => {
                    let name = self.read_constant()?;
                    let argc = self.read_byte()? as usize;
                    self.invoke(name, argc, false)?;
                }
                OpCode::InvokeSelf => {
                    let name = self.read_constant()?;
                    let argc = self.read_byte()? as usize;
                    self.invoke(name, argc, true)?;
                }
                OpCode::InvokeSuper => {
                    let name = self.read_constant()?;
                    let argc = self.read_byte()? as usize;
                    self.invoke_super(name, argc)?;
                }
                OpCode::InvokeSuperSelf => {
                    let argc = self.read_byte()? as usize;
                    self.invoke_super_constructor(argc)?;
                }
                OpCode::MakeClosure => self.make_closure()?,
                OpCode::Return => {
                    let value = self.pop()?;
                    if let Some(value) = self.finish_return(value)? {
                        return Ok(Outcome::Returned(value));
                    }
                }

                OpCode::MakeClass => {
                    let name = self.read_constant()?;
                    self.make_class(name);
                }
                OpCode::MakeMethod => {
                    let name = self.read_constant()?;
                    self.make_method(name)?;
                }
                OpCode::PropertyDefine => {
                    let name = self.read_constant()?;
                    let is_static = self.read_byte()? != 0;
                    self.define_property(name, is_static)?;
                }
                OpCode::Inherit => self.inherit()?,
                OpCode::GetSuper => {
                    let name = self.read_constant()?;
                    self.get_super(name)?;
                }
                OpCode::PropertyGet => {
                    let name = self.read_constant()?;
                    self.property_get(name, false)?;
                }
                OpCode::PropertyGetSelf => {
                    let name = self.read_constant()?;
                    self.property_get(name, true)?;
                }
                OpCode::PropertySet => {
                    let name = self.read_constant()?;
                    self.property_set(name)?;
                }

                OpCode::MakeArray => {
                    let count = self.read_short()? as usize;
                    self.make_array(count)?;
                }
                OpCode::MakeDict => {
                    let count = self.read_short()? as usize;
                    self.make_dict(count)?;
                }
                OpCode::MakeRange => self.make_range()?,
                OpCode::IndexGet => {
                    let will_assign = self.read_byte()? != 0;
                    self.index_get(will_assign)?;
                }
                OpCode::IndexGetRanged => {
                    let will_assign = self.read_byte()? != 0;
                    self.index_get_ranged(will_assign)?;
                }
                OpCode::IndexSet => self.index_set()?,

                OpCode::Try => self.enter_try()?,
                OpCode::PopTry => self.pop_try()?,
                OpCode::EndFinally => {
                    if let Some(value) = self.end_finally()? {
                        return Ok(Outcome::Returned(value));
                    }
                }
                OpCode::Throw => self.throw_op()?,

                OpCode::Switch => {
                    let table = self.read_constant()?;
                    self.switch(table)?;
                }
                OpCode::TypeOf => {
                    let value = self.pop()?;
                    let name = self.type_name(value);
                    let name = self.heap.intern(name);
                    self.push(name);
                }
                OpCode::Stringify => {
                    let value = self.peek(0)?;
                    if !value.is_nil() && !value.is_string() {
                        let text = self.render(value);
                        let text = self.heap.intern(&text);
                        self.set_top(text)?;
                    }
                }
                OpCode::InstanceOf => self.instance_of()?,
                OpCode::Echo => {
                    let value = self.pop()?;
                    let text = self.render(value);
                    if let Err(err) = writeln!(self.output, "{}", text) {
                        self.throw_error(ExceptionKind::IOError, err.to_string())?;
                    }
                }
                OpCode::Assert => {
                    let message = self.pop()?;
                    let condition = self.pop()?;
                    if self.is_falsey(condition) {
                        let text = if message.is_nil() {
                            String::from("assertion failed")
                        } else {
                            self.render(message)
                        };
                        self.throw_error(ExceptionKind::AssertionError, text)?;
                    }
                }
                OpCode::Halt => {
                    let status = self.read_byte()?;
                    debug!(status, "halt");
                    self.reset();
                    return Ok(Outcome::Halted(status));
                }
            }
        }
    }

    /// Drops all execution state, keeping globals and the heap.
    pub(crate) fn reset(&mut self) {
        self.close_upvalues(0);
        self.stack.clear();
        self.frames.clear();
        self.try_stack.clear();
        self.completions.clear();
        self.pending = None;
    }

    // =========================================================================
    // Frame and operand access
    // =========================================================================

    #[inline]
    pub(crate) fn frame(&self) -> Result<&CallFrame> {
        self.frames
            .last()
            .ok_or_else(|| Error::internal("no active call frame"))
    }

    #[inline]
    pub(crate) fn frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::internal("no active call frame"))
    }

    #[inline]
    pub(crate) fn read_byte(&mut self) -> Result<u8> {
        let frame = self.frame_mut()?;
        let byte = frame
            .proto
            .blob
            .byte_at(frame.ip)
            .ok_or_else(|| Error::malformed(frame.ip, "instruction runs past the end of the blob"))?;
        frame.ip += 1;
        Ok(byte)
    }

    #[inline]
    pub(crate) fn read_short(&mut self) -> Result<u16> {
        let hi = self.read_byte()? as u16;
        let lo = self.read_byte()? as u16;
        Ok((hi << 8) | lo)
    }

    #[inline]
    pub(crate) fn read_constant(&mut self) -> Result<Value> {
        let index = self.read_short()?;
        let frame = self.frame()?;
        frame
            .proto
            .blob
            .constant(index)
            .ok_or_else(|| Error::malformed(frame.ip, format!("constant {} out of range", index)))
    }

    /// Moves the instruction pointer to an absolute offset.
    pub(crate) fn jump_to(&mut self, offset: usize) -> Result<()> {
        self.frame_mut()?.ip = offset;
        Ok(())
    }

    fn local(&self, slot: usize) -> Result<Value> {
        let base = self.frame()?.base;
        self.stack
            .get(base + slot)
            .copied()
            .ok_or_else(|| Error::internal(format!("local slot {} out of range", slot)))
    }

    fn local_mut(&mut self, slot: usize) -> Result<&mut Value> {
        let base = self.frame()?.base;
        self.stack
            .get_mut(base + slot)
            .ok_or_else(|| Error::internal(format!("local slot {} out of range", slot)))
    }

    // =========================================================================
    // Stack
    // =========================================================================

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Error::internal("stack underflow"))
    }

    #[inline]
    pub(crate) fn peek(&self, distance: usize) -> Result<Value> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or_else(|| Error::internal("stack underflow"))
    }

    pub(crate) fn pop_n(&mut self, count: usize) -> Result<()> {
        let len = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Error::internal("stack underflow"))?;
        self.stack.truncate(len);
        Ok(())
    }

    pub(crate) fn set_top(&mut self, value: Value) -> Result<()> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| Error::internal("stack underflow"))?;
        *top = value;
        Ok(())
    }

    // =========================================================================
    // Value helpers
    // =========================================================================

    /// Truthiness: nil, false, negative numbers and empty strings, arrays
    /// and dicts are falsy.
    pub(crate) fn is_falsey(&self, value: Value) -> bool {
        match value {
            Value::Nil => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n < 0.0,
            Value::Obj(r) if r.is_string() => self.heap.str(r).is_empty(),
            Value::Obj(r) => match self.heap.get(r) {
                Some(Object::Array(items)) => items.is_empty(),
                Some(Object::Dict(dict)) => dict.keys.is_empty(),
                _ => false,
            },
        }
    }

    /// The name `typeof` reports.
    pub(crate) fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Nil => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Obj(r) if r.is_string() => "string",
            Value::Obj(r) => self.heap.get(r).map_or("object", Object::type_name),
        }
    }

    /// Writes an unhandled-exception report.
    pub(crate) fn write_error_report(&mut self, report: &str) {
        // a failing error stream has nowhere left to report to
        let _ = self.error_output.write_all(report.as_bytes());
        let _ = self.error_output.flush();
    }

    fn undefined_global(&mut self, name: Value) -> Result<()> {
        let message = format!(
            "global name '{}' is not defined",
            self.heap.string_of(name).unwrap_or("?")
        );
        self.throw_error(ExceptionKind::NameError, message)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn binary_add(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;

        let result = match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            _ if a.is_string() || b.is_string() => {
                let text = format!("{}{}", self.render(a), self.render(b));
                self.heap.intern(&text)
            }
            _ => {
                let joined = match (self.heap.object_of(a), self.heap.object_of(b)) {
                    (Some(Object::Array(x)), Some(Object::Array(y))) => {
                        x.iter().chain(y.iter()).copied().collect::<Vec<_>>()
                    }
                    _ => return self.operand_error("+", a, b),
                };
                self.alloc(Object::Array(joined))
            }
        };

        self.push(result);
        Ok(())
    }

    fn binary_mul(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;

        let result = match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x * y),
            (Value::Obj(_), Value::Number(n)) => {
                let Some(count) = repeat_count(n) else {
                    return self.operand_error("*", a, b);
                };
                let unit = match (self.heap.string_of(a), self.heap.object_of(a)) {
                    (Some(text), _) => text.len(),
                    (None, Some(Object::Array(items))) => items.len(),
                    _ => return self.operand_error("*", a, b),
                };
                if unit.checked_mul(count).is_none_or(|total| total > MAX_REPEAT_LEN) {
                    let message = format!("repeat count {} is too large", self.render(b));
                    return self.throw_error(ExceptionKind::ArgumentError, message);
                }
                if let Some(text) = self.heap.string_of(a) {
                    let repeated = text.repeat(count);
                    self.heap.intern(&repeated)
                } else if let Some(Object::Array(items)) = self.heap.object_of(a) {
                    let repeated = items.repeat(count);
                    self.alloc(Object::Array(repeated))
                } else {
                    return self.operand_error("*", a, b);
                }
            }
            _ => return self.operand_error("*", a, b),
        };

        self.push(result);
        Ok(())
    }

    fn binary_num_op<F>(&mut self, symbol: &str, op: F) -> Result<()>
    where
        F: Fn(f64, f64) -> f64,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Number(op(x, y)));
                Ok(())
            }
            _ => self.operand_error(symbol, a, b),
        }
    }

    fn compare_op<F>(&mut self, symbol: &str, op: F) -> Result<()>
    where
        F: Fn(f64, f64) -> bool,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Bool(op(x, y)));
                Ok(())
            }
            _ => self.operand_error(symbol, a, b),
        }
    }

    fn bitwise_op<F>(&mut self, symbol: &str, op: F) -> Result<()>
    where
        F: Fn(i64, i64) -> i64,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Number(op(x as i64, y as i64) as f64));
                Ok(())
            }
            _ => self.operand_error(symbol, a, b),
        }
    }

    fn operand_error(&mut self, symbol: &str, a: Value, b: Value) -> Result<()> {
        let message = format!(
            "unsupported operand {} for {} and {}",
            symbol,
            self.type_name(a),
            self.type_name(b)
        );
        self.throw_error(ExceptionKind::TypeError, message)
    }

    fn unary_error(&mut self, symbol: &str, value: Value) -> Result<()> {
        let message = format!("unsupported operand {} for {}", symbol, self.type_name(value));
        self.throw_error(ExceptionKind::TypeError, message)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Modulo whose result takes the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Longest string (in bytes) or array `*` may build.
const MAX_REPEAT_LEN: usize = 1 << 28;

fn repeat_count(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}
