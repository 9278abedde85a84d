// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Blob definitions.

use crate::runtime::value::Value;

use super::opcode::OpCode;

/// One byte of the instruction stream with the source line it came from.
///
/// Multi-byte instructions repeat their line across every byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The raw byte (opcode or operand)
    pub code: u8,
    /// Source line
    pub line: u32,
}

/// A compiled instruction stream.
#[derive(Debug, Clone, Default)]
pub struct Blob {
    /// The instruction bytes
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Value>,
}

impl Blob {
    /// Creates a new empty blob.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the length of the instruction stream in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns whether the blob holds no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Appends one byte and returns its offset.
    pub fn push_byte(&mut self, code: u8, line: u32) -> usize {
        let offset = self.instructions.len();
        self.instructions.push(Instruction { code, line });
        offset
    }

    /// Appends an opcode byte and returns its offset.
    pub fn push_op(&mut self, op: OpCode, line: u32) -> usize {
        self.push_byte(op as u8, line)
    }

    /// Appends a big-endian u16 and returns the offset of its first byte.
    pub fn push_short(&mut self, value: u16, line: u32) -> usize {
        let offset = self.push_byte((value >> 8) as u8, line);
        self.push_byte((value & 0xff) as u8, line);
        offset
    }

    /// Overwrites the u16 at `offset`.
    pub fn patch_short(&mut self, offset: usize, value: u16) {
        if let Some(slot) = self.instructions.get_mut(offset) {
            slot.code = (value >> 8) as u8;
        }
        if let Some(slot) = self.instructions.get_mut(offset + 1) {
            slot.code = (value & 0xff) as u8;
        }
    }

    /// Adds a constant and returns its index.
    pub fn add_constant(&mut self, value: Value) -> u16 {
        let index = self.constants.len();
        self.constants.push(value);
        index as u16
    }

    /// Returns the byte at `offset`.
    #[inline]
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.instructions.get(offset).map(|ins| ins.code)
    }

    /// Returns the big-endian u16 starting at `offset`.
    #[inline]
    pub fn short_at(&self, offset: usize) -> Option<u16> {
        let hi = self.byte_at(offset)? as u16;
        let lo = self.byte_at(offset + 1)? as u16;
        Some((hi << 8) | lo)
    }

    /// Returns the source line of the byte at `offset`.
    #[inline]
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.instructions.get(offset).map(|ins| ins.line)
    }

    /// Returns the constant at `index`.
    #[inline]
    pub fn constant(&self, index: u16) -> Option<Value> {
        self.constants.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_new() {
        let blob = Blob::new();
        assert!(blob.is_empty());
        assert!(blob.constants.is_empty());
    }

    #[test]
    fn test_push_short_big_endian() {
        let mut blob = Blob::new();
        blob.push_op(OpCode::PushConst, 7);
        blob.push_short(0x0102, 7);
        assert_eq!(blob.len(), 3);
        assert_eq!(blob.byte_at(1), Some(0x01));
        assert_eq!(blob.byte_at(2), Some(0x02));
        assert_eq!(blob.short_at(1), Some(0x0102));
        // every byte of the instruction carries the same line
        assert!(blob.instructions.iter().all(|ins| ins.line == 7));
    }

    #[test]
    fn test_patch_short() {
        let mut blob = Blob::new();
        blob.push_op(OpCode::Jump, 1);
        let operand = blob.push_short(0xffff, 1);
        blob.patch_short(operand, 5);
        assert_eq!(blob.short_at(operand), Some(5));
    }

    #[test]
    fn test_add_constant() {
        let mut blob = Blob::new();
        assert_eq!(blob.add_constant(Value::Number(1.0)), 0);
        assert_eq!(blob.add_constant(Value::Nil), 1);
        assert_eq!(blob.constant(0), Some(Value::Number(1.0)));
        assert_eq!(blob.constant(2), None);
    }
}
