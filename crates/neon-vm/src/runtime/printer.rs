// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Value rendering.
//!
//! Used by echo, stringify, string concatenation, the disassembler and
//! exception reports.

use std::fmt::Write;

use crate::gc::Heap;

use super::object::Object;
use super::value::Value;

/// Containers nested deeper than this render as an ellipsis.
const MAX_DEPTH: usize = 8;

/// Formats a number the way scripts see it.
///
/// Integral values below 1e16 print without a fraction; everything else
/// uses the shortest representation that round-trips.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return String::from("nan");
    }
    if n.is_infinite() {
        return String::from(if n > 0.0 { "inf" } else { "-inf" });
    }
    if n.fract() == 0.0 && n.abs() < 1e16 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

/// Renders a value; top-level strings print raw.
pub fn render(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    write_value(heap, value, false, 0, &mut out);
    out
}

/// Renders a value with strings quoted.
pub fn render_quoted(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    write_value(heap, value, true, 0, &mut out);
    out
}

fn write_value(heap: &Heap, value: Value, quote: bool, depth: usize, out: &mut String) {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::Obj(r) if r.is_string() => {
            let text = heap.str(r);
            if quote {
                let _ = write!(out, "{:?}", text);
            } else {
                out.push_str(text);
            }
        }
        Value::Obj(r) => match heap.get(r) {
            Some(object) => write_object(heap, object, depth, out),
            None => out.push_str("<freed>"),
        },
    }
}

fn write_object(heap: &Heap, object: &Object, depth: usize, out: &mut String) {
    match object {
        Object::Function(proto) => {
            let _ = write!(out, "<function {}({})>", proto.name, proto.arity);
        }
        Object::Closure(closure) => {
            let _ = write!(
                out,
                "<function {}({})>",
                closure.proto.name, closure.proto.arity
            );
        }
        Object::Native(native) => {
            let _ = write!(out, "<function {}(native)>", native.name);
        }
        Object::BoundMethod(bound) => write_value(heap, bound.method, false, depth, out),
        Object::Upvalue(_) => out.push_str("<upvalue>"),
        Object::Class(class) => {
            let _ = write!(out, "<class {}>", class.name);
        }
        Object::Instance(instance) => {
            let name = match heap.get(instance.class) {
                Some(Object::Class(class)) => class.name.as_str(),
                _ => "?",
            };
            let _ = write!(out, "<instance of {}>", name);
        }
        Object::Range(range) => {
            let _ = write!(
                out,
                "<range {} .. {}>",
                format_number(range.lower),
                format_number(range.upper)
            );
        }
        Object::Switch(_) => out.push_str("<switch>"),
        Object::Array(items) => {
            if depth >= MAX_DEPTH {
                out.push_str("[...]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(heap, *item, true, depth + 1, out);
            }
            out.push(']');
        }
        Object::Dict(dict) => {
            if depth >= MAX_DEPTH {
                out.push_str("{...}");
                return;
            }
            out.push('{');
            for (i, key) in dict.keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(heap, *key, true, depth + 1, out);
                out.push_str(": ");
                let value = dict.table.get(heap.strings(), *key).unwrap_or_default();
                write_value(heap, value, true, depth + 1, out);
            }
            out.push('}');
        }
    }
}
