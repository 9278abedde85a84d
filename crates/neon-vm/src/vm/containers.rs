// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Arrays, dicts, ranges, indexing and switch tables.

use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::runtime::object::{Dict, Object, Range, SwitchTable};
use crate::runtime::printer;
use crate::runtime::value::Value;

use super::exceptions::ExceptionKind;
use super::interpreter::Vm;

/// Resolves a possibly negative index against `len`.
fn resolve_index(n: f64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let index = n as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Start and end of a slice. `None` bounds mean the start and the end;
/// negative bounds count from the end; everything is clamped to `0..=len`.
fn slice_bounds(lower: Option<i64>, upper: Option<i64>, len: usize) -> (usize, usize) {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: i64| {
        if bound < 0 {
            (len + bound).max(0)
        } else {
            bound.min(len)
        }
    };
    let lower = clamp(lower.unwrap_or(0));
    let upper = clamp(upper.unwrap_or(len));
    if upper <= lower {
        (0, 0)
    } else {
        (lower as usize, upper as usize)
    }
}

fn slice_bound(value: Value) -> Option<Option<i64>> {
    match value {
        Value::Nil => Some(None),
        Value::Number(n) => Some(Some(n as i64)),
        _ => None,
    }
}

impl Vm {
    /// Allocates a switch table for a `SWITCH` instruction.
    ///
    /// Offsets are relative to the end of the instruction.
    pub fn make_switch<I>(&mut self, cases: I, default_jump: Option<u16>, exit_jump: u16) -> Value
    where
        I: IntoIterator<Item = (Value, u16)>,
    {
        let mut table = SwitchTable {
            default_jump,
            exit_jump,
            ..SwitchTable::default()
        };
        for (case, offset) in cases {
            table
                .cases
                .set(self.heap.strings(), case, Value::Number(offset as f64));
        }
        self.alloc(Object::Switch(table))
    }

    pub(crate) fn make_array(&mut self, count: usize) -> Result<()> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Error::internal("stack underflow"))?;
        let items: Vec<Value> = self.stack.drain(start..).collect();
        let array = self.alloc(Object::Array(items));
        self.push(array);
        Ok(())
    }

    /// Pops `count` key/value pairs into a new dict.
    pub(crate) fn make_dict(&mut self, count: usize) -> Result<()> {
        let start = self
            .stack
            .len()
            .checked_sub(count * 2)
            .ok_or_else(|| Error::internal("stack underflow"))?;
        let items: Vec<Value> = self.stack.drain(start..).collect();
        let dict = self.heap.alloc(Object::Dict(Dict::default()));
        for pair in items.chunks_exact(2) {
            if !self.dict_insert(dict, pair[0], pair[1])? {
                return Ok(());
            }
        }
        self.push(Value::Obj(dict));
        Ok(())
    }

    /// Stores a dict entry, recording new keys in insertion order.
    ///
    /// Returns `false` if the key was rejected and an exception thrown.
    pub(crate) fn dict_insert(&mut self, dict: GcRef, key: Value, value: Value) -> Result<bool> {
        if !(key.is_string() || key.is_number() || key.is_bool()) {
            self.throw_error(
                ExceptionKind::TypeError,
                "dictionary key must be one of string, number or boolean",
            )?;
            return Ok(false);
        }
        match self.heap.get_mut_with_strings(dict) {
            Some((Object::Dict(dict), strings)) => {
                if dict.table.set(strings, key, value) {
                    dict.keys.push(key);
                }
                Ok(true)
            }
            _ => Err(Error::internal("dict insert into a non-dict")),
        }
    }

    /// Stack: `lower, upper`.
    pub(crate) fn make_range(&mut self) -> Result<()> {
        let upper = self.pop()?;
        let lower = self.pop()?;
        match (lower, upper) {
            (Value::Number(lower), Value::Number(upper)) => {
                let range = self.alloc(Object::Range(Range { lower, upper }));
                self.push(range);
                Ok(())
            }
            _ => self.throw_error(ExceptionKind::TypeError, "invalid range boundaries"),
        }
    }

    /// Stack: `receiver, index`. Keeps both when `will_assign` is set.
    pub(crate) fn index_get(&mut self, will_assign: bool) -> Result<()> {
        let index = self.peek(0)?;
        let receiver = self.peek(1)?;
        let Some(value) = self.index_value(receiver, index)? else {
            return Ok(());
        };
        if !will_assign {
            self.pop_n(2)?;
        }
        self.push(value);
        Ok(())
    }

    /// Stack: `receiver, lower, upper`. Keeps all three when `will_assign` is set.
    pub(crate) fn index_get_ranged(&mut self, will_assign: bool) -> Result<()> {
        let upper = self.peek(0)?;
        let lower = self.peek(1)?;
        let receiver = self.peek(2)?;
        let Some(value) = self.slice(receiver, lower, upper)? else {
            return Ok(());
        };
        if !will_assign {
            self.pop_n(3)?;
        }
        self.push(value);
        Ok(())
    }

    /// Reads `receiver[index]`. `None` means an exception was thrown.
    fn index_value(&mut self, receiver: Value, index: Value) -> Result<Option<Value>> {
        let sliceable = receiver.is_string() || matches!(self.heap.object_of(receiver), Some(Object::Array(_)));
        if sliceable {
            if let Some(Object::Range(range)) = self.heap.object_of(index) {
                let range = *range;
                return self.slice(receiver, Value::Number(range.lower), Value::Number(range.upper));
            }
        }

        if let Some(text) = self.heap.string_of(receiver) {
            let Value::Number(n) = index else {
                return self.index_error(ExceptionKind::TypeError, "strings are numerically indexed".to_string());
            };
            let len = text.chars().count();
            let found = resolve_index(n, len).and_then(|i| text.chars().nth(i));
            return match found {
                Some(ch) => Ok(Some(self.heap.intern(ch.encode_utf8(&mut [0; 4])))),
                None => self.index_error(
                    ExceptionKind::IndexError,
                    format!("string index {} out of range of {}", n as i64, len),
                ),
            };
        }

        let strings = self.heap.strings();
        let outcome = match self.heap.object_of(receiver) {
            Some(Object::Array(items)) => match index {
                Value::Number(n) => match resolve_index(n, items.len()) {
                    Some(i) => Ok(items[i]),
                    None => Err((
                        ExceptionKind::IndexError,
                        format!("array index {} out of range of {}", n as i64, items.len()),
                    )),
                },
                _ => Err((ExceptionKind::TypeError, "arrays are numerically indexed".to_string())),
            },
            Some(Object::Dict(dict)) => match dict.table.get(strings, index) {
                Some(value) => Ok(value),
                None => Err((
                    ExceptionKind::KeyError,
                    format!("key {} not found in dict", printer::render_quoted(&self.heap, index)),
                )),
            },
            Some(Object::Range(range)) => match index {
                Value::Number(n) => match resolve_index(n, range.len()).and_then(|i| range.get(i)) {
                    Some(element) => Ok(Value::Number(element)),
                    None => Err((
                        ExceptionKind::IndexError,
                        format!("range index {} out of range of {}", n as i64, range.len()),
                    )),
                },
                _ => Err((ExceptionKind::TypeError, "ranges are numerically indexed".to_string())),
            },
            _ => Err((
                ExceptionKind::TypeError,
                format!("cannot index object of type {}", self.type_name(receiver)),
            )),
        };
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err((kind, message)) => self.index_error(kind, message),
        }
    }

    fn index_error(&mut self, kind: ExceptionKind, message: String) -> Result<Option<Value>> {
        self.throw_error(kind, message)?;
        Ok(None)
    }

    /// Slices an array or string. `None` means an exception was thrown.
    fn slice(&mut self, receiver: Value, lower: Value, upper: Value) -> Result<Option<Value>> {
        let (Some(lo), Some(hi)) = (slice_bound(lower), slice_bound(upper)) else {
            let message = format!(
                "range index expects upper and lower to be numbers, but got '{}', '{}'",
                self.type_name(lower),
                self.type_name(upper)
            );
            return self.index_error(ExceptionKind::TypeError, message);
        };

        if let Some(text) = self.heap.string_of(receiver) {
            let (start, end) = slice_bounds(lo, hi, text.chars().count());
            let sliced: String = text.chars().skip(start).take(end - start).collect();
            return Ok(Some(self.heap.intern(&sliced)));
        }
        if let Some(Object::Array(items)) = self.heap.object_of(receiver) {
            let (start, end) = slice_bounds(lo, hi, items.len());
            let sliced = items[start..end].to_vec();
            return Ok(Some(self.alloc(Object::Array(sliced))));
        }
        let message = format!("cannot range index object of type {}", self.type_name(receiver));
        self.index_error(ExceptionKind::TypeError, message)
    }

    /// Stack: `receiver, index, value`. Leaves the value.
    pub(crate) fn index_set(&mut self) -> Result<()> {
        let value = self.peek(0)?;
        let index = self.peek(1)?;
        let receiver = self.peek(2)?;

        let target = match receiver {
            Value::Obj(r) if !r.is_string() => r,
            _ if receiver.is_string() => {
                return self.throw_error(ExceptionKind::TypeError, "strings are immutable");
            }
            _ => return self.cannot_index(receiver),
        };

        match self.heap.get(target) {
            Some(Object::Array(items)) => {
                let len = items.len();
                let Value::Number(n) = index else {
                    return self.throw_error(ExceptionKind::TypeError, "arrays are numerically indexed");
                };
                // one past the end appends
                let slot = if n as i64 == len as i64 {
                    Some(len)
                } else {
                    resolve_index(n, len)
                };
                let Some(slot) = slot else {
                    let message = format!("array index {} out of range of {}", n as i64, len);
                    return self.throw_error(ExceptionKind::IndexError, message);
                };
                if let Some(Object::Array(items)) = self.heap.get_mut(target) {
                    if slot == items.len() {
                        items.push(value);
                    } else {
                        items[slot] = value;
                    }
                }
            }
            Some(Object::Dict(_)) => {
                if !self.dict_insert(target, index, value)? {
                    return Ok(());
                }
            }
            _ => return self.cannot_index(receiver),
        }

        self.pop_n(3)?;
        self.push(value);
        Ok(())
    }

    fn cannot_index(&mut self, receiver: Value) -> Result<()> {
        let message = format!("cannot index object of type {}", self.type_name(receiver));
        self.throw_error(ExceptionKind::TypeError, message)
    }

    /// Pops the scrutinee and jumps to its case, the default or the exit.
    pub(crate) fn switch(&mut self, table: Value) -> Result<()> {
        let scrutinee = self.pop()?;
        let offset = match self.heap.object_of(table) {
            Some(Object::Switch(switch)) => match switch.cases.get(self.heap.strings(), scrutinee) {
                Some(Value::Number(offset)) => offset as usize,
                _ => switch.default_jump.unwrap_or(switch.exit_jump) as usize,
            },
            _ => return Err(Error::internal("switch operand is not a switch table")),
        };
        self.frame_mut()?.ip += offset;
        Ok(())
    }
}
