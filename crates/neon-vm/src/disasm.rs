// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Blob disassembler.
//!
//! Decoding goes through [`decode`], the same routine blob validation
//! uses, so the widths shown here are the widths the interpreter consumes.
//!
//! Line format:
//!
//! ```text
//! 00000000        1 PUSH_CONST              0 10
//! 00000003        | PUSH_CONST              1 20
//! 00000006        | ADD
//! 00000007        2 JUMP                    7 -> 13
//! ```

use std::fmt::Write;

use crate::bytecode::{Blob, DecodeError, Decoded, Operands, decode};
use crate::gc::Heap;
use crate::runtime::printer::render_quoted;

/// Renders the instruction at `offset` and returns the next offset.
///
/// An undecodable byte renders as `unknown opcode N` and advances by one
/// so a listing can continue past it.
pub fn disassemble_instruction(heap: &Heap, blob: &Blob, offset: usize) -> (String, usize) {
    let mut line = format!("{:08} ", offset);
    let current = blob.line_at(offset).unwrap_or(0);
    if offset > 0 && blob.line_at(offset - 1) == Some(current) {
        let _ = write!(line, "{:>8} ", "|");
    } else {
        let _ = write!(line, "{:>8} ", current);
    }

    let decoded = match decode(blob, offset, heap) {
        Ok(decoded) => decoded,
        Err(DecodeError::UnknownOpcode(byte)) => {
            let _ = write!(line, "unknown opcode {}", byte);
            return (line, offset + 1);
        }
        Err(err) => {
            line.push_str(&err.to_string());
            return (line, blob.len());
        }
    };

    let _ = write!(line, "{:<16}", decoded.op.name());
    write_operands(heap, blob, &decoded, &mut line);
    let trimmed = line.trim_end().len();
    line.truncate(trimmed);
    (line, decoded.next_offset())
}

fn write_operands(heap: &Heap, blob: &Blob, decoded: &Decoded, out: &mut String) {
    let constant = |index: u16| match blob.constant(index) {
        Some(value) => render_quoted(heap, value),
        None => String::from("<out of range>"),
    };

    match &decoded.operands {
        Operands::None => {}
        Operands::Byte(value) => {
            let _ = write!(out, " {:>8}", value);
        }
        Operands::Short(value) => {
            let _ = write!(out, " {:>8}", value);
        }
        Operands::Const(index) => {
            let _ = write!(out, " {:>8} {}", index, constant(*index));
        }
        Operands::Jump { target, .. } => {
            let _ = write!(out, " {:>8} -> {}", decoded.offset, target);
        }
        Operands::Try {
            type_index,
            handler,
            finally,
        } => {
            let _ = write!(out, " {:>8} -> {}, {}", type_index, handler, finally);
        }
        Operands::Invoke { name, argc } => {
            let _ = write!(out, " ({} args) {:>8} {}", argc, name, constant(*name));
        }
        Operands::ConstByte { index, flag } => {
            let _ = write!(out, " {:>8} {}", index, constant(*index));
            if *flag != 0 {
                out.push_str(" (static)");
            }
        }
        Operands::Closure { function, captures } => {
            let _ = write!(out, " {:>8} {}", function, constant(*function));
            for (i, capture) in captures.iter().enumerate() {
                let _ = write!(
                    out,
                    "\n{:04}      |                     {} {}",
                    decoded.offset + 3 + i * 3,
                    if capture.is_local { "local" } else { "upvalue" },
                    capture.index
                );
            }
        }
    }
}

/// Renders every instruction of `blob` under a `== name ==` header.
pub fn disassemble(heap: &Heap, blob: &Blob, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < blob.len() {
        let (line, next) = disassemble_instruction(heap, blob, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}
