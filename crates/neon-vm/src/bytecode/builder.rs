// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Programmatic blob construction.
//!
//! The front end is not part of this crate, so hosts, tests and benches
//! assemble blobs with [`BlobBuilder`]. Forward jumps and try regions are
//! emitted with placeholder operands and patched once their target is known.

use crate::runtime::value::Value;

use super::blob::Blob;
use super::decoder::Capture;
use super::opcode::OpCode;

/// A forward jump awaiting its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a forward jump must be patched"]
pub struct JumpLabel {
    operand: usize,
}

/// A try region awaiting its handler and finally addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryLabel {
    operand: usize,
}

/// Builds a [`Blob`] instruction by instruction.
#[derive(Debug, Default)]
pub struct BlobBuilder {
    blob: Blob,
    line: u32,
}

impl BlobBuilder {
    /// Creates an empty builder positioned at line 1.
    pub fn new() -> Self {
        Self {
            blob: Blob::new(),
            line: 1,
        }
    }

    /// Sets the source line attached to subsequent bytes.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Returns the offset the next instruction will start at.
    #[inline]
    pub fn offset(&self) -> usize {
        self.blob.len()
    }

    /// Adds a constant to the pool.
    pub fn constant(&mut self, value: Value) -> u16 {
        self.blob.add_constant(value)
    }

    /// Emits an operand-less instruction.
    pub fn op(&mut self, op: OpCode) -> &mut Self {
        self.blob.push_op(op, self.line);
        self
    }

    /// Emits an instruction with a byte operand.
    pub fn op_byte(&mut self, op: OpCode, operand: u8) -> &mut Self {
        self.blob.push_op(op, self.line);
        self.blob.push_byte(operand, self.line);
        self
    }

    /// Emits an instruction with a short operand.
    pub fn op_short(&mut self, op: OpCode, operand: u16) -> &mut Self {
        self.blob.push_op(op, self.line);
        self.blob.push_short(operand, self.line);
        self
    }

    /// Adds `value` to the pool and emits `op` referencing it.
    pub fn op_const(&mut self, op: OpCode, value: Value) -> &mut Self {
        let index = self.constant(value);
        self.op_short(op, index)
    }

    /// Emits `PUSH_CONST` for a new constant.
    pub fn push(&mut self, value: Value) -> &mut Self {
        self.op_const(OpCode::PushConst, value)
    }

    /// Emits a forward jump with a placeholder displacement.
    pub fn jump(&mut self, op: OpCode) -> JumpLabel {
        debug_assert!(matches!(op, OpCode::Jump | OpCode::JumpIfFalse));
        self.blob.push_op(op, self.line);
        let operand = self.blob.push_short(0xffff, self.line);
        JumpLabel { operand }
    }

    /// Points a forward jump at the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let displacement = self.offset() - (label.operand + 2);
        self.blob.patch_short(label.operand, displacement as u16);
    }

    /// Emits a backward jump to `start`.
    pub fn loop_to(&mut self, start: usize) -> &mut Self {
        let displacement = self.offset() + 3 - start;
        self.op_short(OpCode::Loop, displacement as u16)
    }

    /// Opens a try region filtering on the constant at `type_index`.
    ///
    /// Handler and finally addresses start as zero ("none").
    pub fn try_region(&mut self, type_index: u16) -> TryLabel {
        self.blob.push_op(OpCode::Try, self.line);
        let operand = self.blob.push_short(type_index, self.line);
        self.blob.push_short(0, self.line);
        self.blob.push_short(0, self.line);
        TryLabel { operand }
    }

    /// Sets the handler address of a try region to the current offset.
    pub fn patch_handler(&mut self, label: TryLabel) {
        let here = self.offset() as u16;
        self.blob.patch_short(label.operand + 2, here);
    }

    /// Sets the finally address of a try region to the current offset.
    pub fn patch_finally(&mut self, label: TryLabel) {
        let here = self.offset() as u16;
        self.blob.patch_short(label.operand + 4, here);
    }

    /// Emits a method invocation.
    pub fn invoke(&mut self, op: OpCode, name: u16, argc: u8) -> &mut Self {
        debug_assert!(matches!(
            op,
            OpCode::Invoke | OpCode::InvokeSelf | OpCode::InvokeSuper
        ));
        self.blob.push_op(op, self.line);
        self.blob.push_short(name, self.line);
        self.blob.push_byte(argc, self.line);
        self
    }

    /// Emits a closure creation with its capture list.
    pub fn closure(&mut self, function: u16, captures: &[Capture]) -> &mut Self {
        self.blob.push_op(OpCode::MakeClosure, self.line);
        self.blob.push_short(function, self.line);
        for capture in captures {
            self.blob.push_byte(capture.is_local as u8, self.line);
            self.blob.push_short(capture.index, self.line);
        }
        self
    }

    /// Emits a property definition.
    pub fn property_define(&mut self, name: u16, is_static: bool) -> &mut Self {
        self.blob.push_op(OpCode::PropertyDefine, self.line);
        self.blob.push_short(name, self.line);
        self.blob.push_byte(is_static as u8, self.line);
        self
    }

    /// Returns the finished blob.
    pub fn finish(self) -> Blob {
        self.blob
    }
}
