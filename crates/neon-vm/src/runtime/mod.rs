// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime types: values, objects, functions and the hash table.

pub mod function;
pub mod object;
pub mod printer;
pub mod table;
pub mod value;

pub use function::{
    BoundMethod, CallFrame, Closure, FunctionKind, FunctionProto, NativeFn, NativeFunction,
    NativeResult, Thrown, Upvalue,
};
pub use object::{Class, Dict, Instance, Object, Range, SwitchTable};
pub use table::{Entry, FieldKind, HashTable, KeyContext};
pub use value::Value;
