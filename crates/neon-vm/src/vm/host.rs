// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Globals a hosting program binds before running a script.
//!
//! The interpreter attaches no meaning to these; they are ordinary globals.

use tracing::debug;

use crate::runtime::object::Object;

use super::interpreter::Vm;

/// Name of the program-arguments global.
pub const ARGV: &str = "ARGV";

/// Names of the standard stream globals, bound to their own names.
pub const STREAMS: [&str; 3] = ["STDIN", "STDOUT", "STDERR"];

/// Binds `ARGV` to an array of the argument strings and each standard
/// stream name to a string handle.
pub fn install_bootstrap_globals<S: AsRef<str>>(vm: &mut Vm, args: &[S]) {
    let argv = args.iter().map(|arg| vm.intern(arg.as_ref())).collect();
    let argv = vm.alloc(Object::Array(argv));
    vm.define_global(ARGV, argv);

    for stream in STREAMS {
        let handle = vm.intern(&stream.to_ascii_lowercase());
        vm.define_global(stream, handle);
    }
    debug!(args = args.len(), "bootstrap globals installed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BlobBuilder, OpCode};
    use crate::runtime::value::Value;
    use crate::vm::Outcome;

    #[test]
    fn test_argv_is_array_of_strings() {
        let mut vm = Vm::new();
        install_bootstrap_globals(&mut vm, &["script.nn", "--fast"]);
        let argv = vm.global(ARGV).unwrap();
        assert_eq!(vm.render(argv), "[\"script.nn\", \"--fast\"]");
    }

    #[test]
    fn test_stream_handles() {
        let mut vm = Vm::new();
        install_bootstrap_globals::<String>(&mut vm, &[]);
        for stream in STREAMS {
            let handle = vm.global(stream).unwrap();
            assert_eq!(vm.string_of(handle), Some(stream.to_ascii_lowercase().as_str()));
        }
    }

    #[test]
    fn test_script_reads_argv() {
        let mut vm = Vm::new();
        install_bootstrap_globals(&mut vm, &["a", "b"]);
        let argv = vm.intern(ARGV);
        let mut b = BlobBuilder::new();
        b.op_const(OpCode::GlobalGet, argv)
            .push(Value::Number(-1.0))
            .op_byte(OpCode::IndexGet, 0)
            .op(OpCode::Return);
        let Outcome::Returned(value) = vm.run(b.finish()).unwrap() else {
            panic!("expected a return");
        };
        assert_eq!(vm.string_of(value), Some("b"));
    }

    #[test]
    fn test_bootstrap_globals_survive_collection() {
        let mut vm = Vm::new();
        install_bootstrap_globals(&mut vm, &["x"]);
        vm.collect_garbage();
        let argv = vm.global(ARGV).unwrap();
        assert_eq!(vm.render(argv), "[\"x\"]");
    }
}
