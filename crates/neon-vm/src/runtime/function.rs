// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Function, closure and call-frame representation.

use std::rc::Rc;

use crate::bytecode::Blob;
use crate::gc::GcRef;
use crate::vm::Vm;

use super::value::Value;

/// What a compiled function is used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionKind {
    /// Top-level script body
    Script,
    /// Plain function
    #[default]
    Function,
    /// Instance method
    Method,
    /// Class constructor; returns its receiver
    Initializer,
    /// Static method
    Static,
}

/// A compiled function.
///
/// Shared behind an [`Rc`] so call frames can hold the code they execute
/// without borrowing the heap.
#[derive(Debug, Clone)]
pub struct FunctionProto {
    /// The function name
    pub name: String,
    /// What the function is used as
    pub kind: FunctionKind,
    /// Declared parameters
    pub arity: u8,
    /// Parameters without a default value
    pub required: u8,
    /// Whether surplus arguments are collected into an array
    pub variadic: bool,
    /// Number of upvalues the closure-create instruction captures
    pub upvalue_count: usize,
    /// The function body
    pub blob: Blob,
    /// File name used in stack traces
    pub source: String,
}

impl FunctionProto {
    /// Creates a plain function with no parameters or upvalues.
    pub fn new(name: impl Into<String>, blob: Blob) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::Function,
            arity: 0,
            required: 0,
            variadic: false,
            upvalue_count: 0,
            blob,
            source: String::from("<script>"),
        }
    }

    /// Creates a top-level script function.
    pub fn script(blob: Blob) -> Self {
        Self {
            kind: FunctionKind::Script,
            ..Self::new("<script>", blob)
        }
    }

    /// Sets the kind.
    pub fn with_kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares `arity` parameters, all of them required.
    pub fn with_arity(mut self, arity: u8) -> Self {
        self.arity = arity;
        self.required = arity;
        self
    }

    /// Lowers the number of required parameters.
    pub fn with_required(mut self, required: u8) -> Self {
        self.required = required.min(self.arity);
        self
    }

    /// Marks the function as variadic.
    pub fn with_variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Sets the upvalue count.
    pub fn with_upvalues(mut self, count: usize) -> Self {
        self.upvalue_count = count;
        self
    }

    /// Sets the source file name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Number of stack slots the parameters occupy, receiver excluded.
    pub fn param_slots(&self) -> usize {
        self.arity as usize + self.variadic as usize
    }
}

/// Marker returned by a native that raised an exception through the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown;

/// Result of a native call.
pub type NativeResult = Result<Value, Thrown>;

/// Native function signature: interpreter state, receiver, arguments.
pub type NativeFn = fn(&mut Vm, Value, &[Value]) -> NativeResult;

/// A host function exposed to scripts.
#[derive(Clone)]
pub struct NativeFunction {
    /// The function name
    pub name: String,
    /// Exact argument count, or `None` to accept any
    pub arity: Option<u8>,
    /// The native function pointer
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A function paired with its captured upvalues.
#[derive(Debug, Clone)]
pub struct Closure {
    /// The function object the closure was created from
    pub function: GcRef,
    /// The compiled function
    pub proto: Rc<FunctionProto>,
    /// Upvalue cells, in capture order
    pub upvalues: Vec<GcRef>,
}

/// A captured-variable cell.
///
/// An open upvalue names an absolute slot of the value stack. Slots are
/// indices, so stack reallocation never invalidates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    /// Still refers to a live stack slot
    Open(usize),
    /// Owns the value copied out when its frame returned
    Closed(Value),
}

/// A method bound to the receiver it was read from.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    /// The receiver passed as `this`
    pub receiver: Value,
    /// The closure or native to call
    pub method: Value,
}

/// A call frame for function execution.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The executing closure
    pub closure: GcRef,
    /// The compiled function being run
    pub proto: Rc<FunctionProto>,
    /// Instruction pointer within the function's blob
    pub ip: usize,
    /// Stack index of slot 0 (the callee or receiver)
    pub base: usize,
}

impl CallFrame {
    /// Creates a frame starting at the first instruction.
    pub fn new(closure: GcRef, proto: Rc<FunctionProto>, base: usize) -> Self {
        Self {
            closure,
            proto,
            ip: 0,
            base,
        }
    }

    /// Source line of the instruction that last executed.
    pub fn current_line(&self) -> u32 {
        self.proto
            .blob
            .line_at(self.ip.saturating_sub(1))
            .unwrap_or(0)
    }
}
