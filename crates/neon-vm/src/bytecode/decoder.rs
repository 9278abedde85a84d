// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Instruction decoder.
//!
//! Turns the byte stream back into structured instructions using the
//! widths from [`OpCode::layout`].

use thiserror::Error;

use crate::runtime::value::Value;

use super::blob::Blob;
use super::opcode::{JumpDirection, OpCode, OperandLayout};

/// Answers questions about constants that affect decoding.
pub trait ConstantInfo {
    /// Returns the upvalue count if `constant` is a function prototype.
    fn upvalue_count(&self, constant: Value) -> Option<usize>;
}

/// One captured variable of a closure-create instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Whether the capture refers to a local slot of the enclosing frame
    pub is_local: bool,
    /// Slot index (local) or upvalue index (enclosing closure)
    pub index: u16,
}

/// Decoded operands of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    /// No operand
    None,
    /// A byte operand
    Byte(u8),
    /// A short operand
    Short(u16),
    /// A constant-pool index
    Const(u16),
    /// A jump with its resolved target
    Jump {
        /// Encoded displacement
        displacement: u16,
        /// Absolute target offset
        target: isize,
    },
    /// A try-region descriptor
    Try {
        /// Exception-type constant index
        type_index: u16,
        /// Handler address (0 = none)
        handler: u16,
        /// Finally address (0 = none)
        finally: u16,
    },
    /// A method invocation
    Invoke {
        /// Method-name constant index
        name: u16,
        /// Argument count
        argc: u8,
    },
    /// A closure creation
    Closure {
        /// Function constant index
        function: u16,
        /// Capture list
        captures: Vec<Capture>,
    },
    /// A constant with a flag byte
    ConstByte {
        /// Constant index
        index: u16,
        /// Flag byte
        flag: u8,
    },
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Offset of the opcode byte
    pub offset: usize,
    /// The opcode
    pub op: OpCode,
    /// Decoded operands
    pub operands: Operands,
    /// Total width in bytes
    pub width: usize,
}

impl Decoded {
    /// Offset of the next instruction.
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + self.width
    }
}

/// Failure to decode an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The opcode byte is not a known opcode
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    /// The instruction runs past the end of the blob
    #[error("{0} operand runs past the end of the blob")]
    Truncated(OpCode),
    /// A closure-create constant is not a function
    #[error("closure constant {0} is not a function")]
    NotAFunction(u16),
}

/// Decodes the instruction starting at `offset`.
pub fn decode<I: ConstantInfo + ?Sized>(
    blob: &Blob,
    offset: usize,
    info: &I,
) -> Result<Decoded, DecodeError> {
    let byte = blob.byte_at(offset).ok_or(DecodeError::UnknownOpcode(0))?;
    let op = OpCode::try_from(byte).map_err(DecodeError::UnknownOpcode)?;
    let truncated = || DecodeError::Truncated(op);
    let short = |at: usize| blob.short_at(at).ok_or_else(truncated);
    let byte_at = |at: usize| blob.byte_at(at).ok_or_else(truncated);

    let layout = op.layout();
    let (operands, upvalues) = match layout {
        OperandLayout::None => (Operands::None, 0),
        OperandLayout::Byte => (Operands::Byte(byte_at(offset + 1)?), 0),
        OperandLayout::Short => (Operands::Short(short(offset + 1)?), 0),
        OperandLayout::Const => (Operands::Const(short(offset + 1)?), 0),
        OperandLayout::Jump(direction) => {
            let displacement = short(offset + 1)?;
            let after = (offset + 3) as isize;
            let target = match direction {
                JumpDirection::Forward => after + displacement as isize,
                JumpDirection::Backward => after - displacement as isize,
            };
            (Operands::Jump { displacement, target }, 0)
        }
        OperandLayout::Try => (
            Operands::Try {
                type_index: short(offset + 1)?,
                handler: short(offset + 3)?,
                finally: short(offset + 5)?,
            },
            0,
        ),
        OperandLayout::Invoke => (
            Operands::Invoke {
                name: short(offset + 1)?,
                argc: byte_at(offset + 3)?,
            },
            0,
        ),
        OperandLayout::ConstByte => (
            Operands::ConstByte {
                index: short(offset + 1)?,
                flag: byte_at(offset + 3)?,
            },
            0,
        ),
        OperandLayout::Closure => {
            let function = short(offset + 1)?;
            let count = blob
                .constant(function)
                .and_then(|constant| info.upvalue_count(constant))
                .ok_or(DecodeError::NotAFunction(function))?;
            let mut captures = Vec::with_capacity(count);
            for i in 0..count {
                let at = offset + 3 + i * 3;
                captures.push(Capture {
                    is_local: byte_at(at)? != 0,
                    index: short(at + 1)?,
                });
            }
            (Operands::Closure { function, captures }, count)
        }
    };

    let width = layout.width(upvalues);
    if offset + width > blob.len() {
        return Err(truncated());
    }
    Ok(Decoded {
        offset,
        op,
        operands,
        width,
    })
}

/// Iterates over every instruction of a blob from offset 0.
///
/// Stops after the first decode error.
pub fn instructions<'a, I: ConstantInfo + ?Sized>(
    blob: &'a Blob,
    info: &'a I,
) -> impl Iterator<Item = Result<Decoded, (usize, DecodeError)>> + 'a {
    let mut offset = 0;
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed || offset >= blob.len() {
            return None;
        }
        match decode(blob, offset, info) {
            Ok(decoded) => {
                offset = decoded.next_offset();
                Some(Ok(decoded))
            }
            Err(err) => {
                failed = true;
                Some(Err((offset, err)))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Treats any number constant as a function with that many upvalues.
    struct NumbersAreFunctions;

    impl ConstantInfo for NumbersAreFunctions {
        fn upvalue_count(&self, constant: Value) -> Option<usize> {
            constant.number().map(|n| n as usize)
        }
    }

    #[test]
    fn test_decode_simple_and_const() {
        let mut blob = Blob::new();
        let index = blob.add_constant(Value::Number(1.0));
        blob.push_op(OpCode::PushConst, 1);
        blob.push_short(index, 1);
        blob.push_op(OpCode::Return, 1);

        let first = decode(&blob, 0, &NumbersAreFunctions).unwrap();
        assert_eq!(first.op, OpCode::PushConst);
        assert_eq!(first.operands, Operands::Const(0));
        assert_eq!(first.next_offset(), 3);

        let second = decode(&blob, 3, &NumbersAreFunctions).unwrap();
        assert_eq!(second.op, OpCode::Return);
        assert_eq!(second.width, 1);
    }

    #[test]
    fn test_decode_jump_targets() {
        let mut blob = Blob::new();
        blob.push_op(OpCode::Jump, 1);
        blob.push_short(4, 1);
        blob.push_op(OpCode::Loop, 1);
        blob.push_short(6, 1);

        let forward = decode(&blob, 0, &NumbersAreFunctions).unwrap();
        assert!(matches!(forward.operands, Operands::Jump { target: 7, .. }));
        let backward = decode(&blob, 3, &NumbersAreFunctions).unwrap();
        assert!(matches!(backward.operands, Operands::Jump { target: 0, .. }));
    }

    #[test]
    fn test_decode_closure_captures() {
        let mut blob = Blob::new();
        let function = blob.add_constant(Value::Number(2.0));
        blob.push_op(OpCode::MakeClosure, 1);
        blob.push_short(function, 1);
        blob.push_byte(1, 1);
        blob.push_short(3, 1);
        blob.push_byte(0, 1);
        blob.push_short(0, 1);

        let decoded = decode(&blob, 0, &NumbersAreFunctions).unwrap();
        assert_eq!(decoded.width, 9);
        match decoded.operands {
            Operands::Closure { captures, .. } => {
                assert_eq!(captures[0], Capture { is_local: true, index: 3 });
                assert_eq!(captures[1], Capture { is_local: false, index: 0 });
            }
            other => panic!("Expected closure operands, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_errors() {
        let mut blob = Blob::new();
        blob.push_byte(250, 1);
        assert_eq!(
            decode(&blob, 0, &NumbersAreFunctions),
            Err(DecodeError::UnknownOpcode(250))
        );

        let mut blob = Blob::new();
        blob.push_op(OpCode::PushConst, 1);
        blob.push_byte(0, 1);
        assert_eq!(
            decode(&blob, 0, &NumbersAreFunctions),
            Err(DecodeError::Truncated(OpCode::PushConst))
        );
    }

    #[test]
    fn test_instructions_cover_blob() {
        let mut blob = Blob::new();
        blob.push_op(OpCode::PushNil, 1);
        blob.push_op(OpCode::Invoke, 2);
        blob.push_short(0, 2);
        blob.push_byte(1, 2);
        blob.push_op(OpCode::Return, 3);

        let widths: Vec<usize> = instructions(&blob, &NumbersAreFunctions)
            .map(|d| d.unwrap().width)
            .collect();
        assert_eq!(widths, vec![1, 4, 1]);
        assert_eq!(widths.iter().sum::<usize>(), blob.len());
    }
}
