// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Blob validation.
//!
//! Runs once before a blob executes so the dispatch loop can trust every
//! constant index, jump target and try address it decodes. Nested function
//! constants are checked too.

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::gc::Heap;
use crate::runtime::object::Object;
use crate::runtime::value::Value;

use super::blob::Blob;
use super::decoder::{Decoded, Operands, instructions};
use super::opcode::OpCode;

/// Checks that `blob` and every function it references are well formed.
pub fn validate(blob: &Blob, heap: &Heap) -> Result<()> {
    let mut seen = FxHashSet::default();
    validate_blob(blob, heap, &mut seen)
}

fn validate_blob(blob: &Blob, heap: &Heap, seen: &mut FxHashSet<*const Blob>) -> Result<()> {
    if !seen.insert(blob as *const Blob) {
        return Ok(());
    }

    let mut decoded = Vec::new();
    for item in instructions(blob, heap) {
        let instruction = item.map_err(|(offset, err)| Error::malformed(offset, err.to_string()))?;
        decoded.push(instruction);
    }
    let starts: FxHashSet<usize> = decoded.iter().map(|d| d.offset).collect();
    let lands = |target: usize| target == blob.len() || starts.contains(&target);

    for instruction in &decoded {
        check_constants(blob, heap, instruction)?;
        let offset = instruction.offset;
        match &instruction.operands {
            Operands::Jump { target, .. } => {
                if *target < 0 || !lands(*target as usize) {
                    return Err(Error::malformed(
                        offset,
                        format!("jump target {} is not an instruction boundary", target),
                    ));
                }
            }
            Operands::Try {
                handler, finally, ..
            } => {
                for address in [*handler, *finally] {
                    if address != 0 && !lands(address as usize) {
                        return Err(Error::malformed(
                            offset,
                            format!("try address {} is not an instruction boundary", address),
                        ));
                    }
                }
            }
            Operands::Const(index) if instruction.op == OpCode::Switch => {
                if let Some(Object::Switch(table)) = blob.constant(*index).and_then(|v| heap.object_of(v)) {
                    let after = instruction.next_offset();
                    let offsets = table
                        .cases
                        .iter()
                        .filter_map(|entry| entry.value.number())
                        .map(|n| n as usize)
                        .chain(table.default_jump.map(usize::from))
                        .chain(std::iter::once(table.exit_jump as usize));
                    for relative in offsets {
                        if !lands(after + relative) {
                            return Err(Error::malformed(
                                offset,
                                format!("switch target {} is not an instruction boundary", after + relative),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for constant in &blob.constants {
        if let Some(Object::Function(proto)) = heap.object_of(*constant) {
            validate_blob(&proto.blob, heap, seen)?;
        }
    }
    Ok(())
}

/// What a constant operand must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Any,
    Name,
    NameOrNil,
    Switch,
}

fn check_constants(blob: &Blob, heap: &Heap, instruction: &Decoded) -> Result<()> {
    use OpCode::*;

    let (index, expect) = match (&instruction.operands, instruction.op) {
        (Operands::Const(index), PushConst) => (*index, Expect::Any),
        (Operands::Const(index), Switch) => (*index, Expect::Switch),
        (Operands::Const(index), _) => (*index, Expect::Name),
        (Operands::Invoke { name, .. }, _) => (*name, Expect::Name),
        (Operands::ConstByte { index, .. }, _) => (*index, Expect::Name),
        (Operands::Try { type_index, .. }, _) => (*type_index, Expect::NameOrNil),
        (Operands::Closure { function, .. }, _) => (*function, Expect::Any),
        _ => return Ok(()),
    };

    let Some(constant) = blob.constant(index) else {
        return Err(Error::malformed(
            instruction.offset,
            format!(
                "{} references constant {} but the pool holds {}",
                instruction.op,
                index,
                blob.constants.len()
            ),
        ));
    };

    let ok = match expect {
        Expect::Any => true,
        Expect::Name => heap.string_of(constant).is_some(),
        Expect::NameOrNil => constant == Value::Nil || heap.string_of(constant).is_some(),
        Expect::Switch => matches!(heap.object_of(constant), Some(Object::Switch(_))),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::malformed(
            instruction.offset,
            format!("{} constant {} has the wrong type", instruction.op, index),
        ))
    }
}
