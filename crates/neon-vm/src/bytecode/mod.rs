// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode encoding.
//!
//! A [`Blob`] is a flat byte stream plus a constant pool. Every instruction
//! starts with an [`OpCode`] byte whose [`OperandLayout`] fixes how many
//! operand bytes follow.

pub mod blob;
pub mod builder;
pub mod decoder;
pub mod opcode;
mod validate;

pub use blob::{Blob, Instruction};
pub use builder::{BlobBuilder, JumpLabel, TryLabel};
pub use decoder::{Capture, ConstantInfo, DecodeError, Decoded, Operands, decode, instructions};
pub use opcode::{JumpDirection, OpCode, OperandLayout};
pub use validate::validate;
