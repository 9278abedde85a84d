// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # neon-vm
//!
//! A stack-based bytecode virtual machine for a dynamically typed scripting
//! language.
//!
//! ## Overview
//!
//! This crate provides the execution core a compiler front end targets:
//! - A compact instruction encoding ([`Blob`]) with a builder and a disassembler
//! - An open-addressing hash table with tombstone deletion for globals,
//!   fields, methods and dicts
//! - An interpreter with closures, classes, containers and switch tables
//! - Structured `try`/`finally` exceptions with catchable runtime errors
//! - A tri-color mark-sweep garbage collector over index arenas
//!
//! ## Quick Start
//!
//! ```rust
//! use neon_vm::{BlobBuilder, OpCode, Outcome, Value, Vm};
//!
//! let mut vm = Vm::new();
//! let mut blob = BlobBuilder::new();
//! blob.push(Value::Number(1.0))
//!     .push(Value::Number(2.0))
//!     .op(OpCode::Add)
//!     .op(OpCode::Return);
//! assert_eq!(vm.run(blob.finish())?, Outcome::Returned(Value::Number(3.0)));
//! # Ok::<(), neon_vm::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bytecode;
pub mod config;
pub mod disasm;
pub mod error;
pub mod gc;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use bytecode::{Blob, BlobBuilder, OpCode};
pub use config::VmConfig;
pub use error::{Error, Result};
pub use runtime::function::FunctionProto;
pub use runtime::value::Value;
pub use vm::{ExceptionKind, Outcome, Primitive, Vm};
