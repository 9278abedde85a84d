// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - the [`Vm`] state, the dispatch loop and the arithmetic helpers
//! - `calls` - frame push/pop, arity handling, natives, method invocation
//! - `classes` - class construction, inheritance and property access
//! - `containers` - arrays, dicts, ranges and indexing
//! - `exceptions` - try regions, completions, throw and unwinding
//! - `upvalues` - closure creation and upvalue capture/close
//! - `roots` - the garbage-collection root walker
//! - `host` - bootstrap globals installed by the hosting layer
//!
//! ## Calling convention
//!
//! A call frame's slot 0 holds the callee, or the receiver for method
//! calls and constructors. Parameters follow in slots `1..=arity`; a
//! variadic function receives its surplus arguments as an array in slot
//! `arity + 1`. A return value replaces slot 0.

mod calls;
mod classes;
mod containers;
mod exceptions;
pub mod host;
mod interpreter;
mod roots;
mod upvalues;

pub use classes::Primitive;
pub use exceptions::ExceptionKind;
pub use interpreter::{Outcome, Vm};
