// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structured exception handling.
//!
//! `TRY type handler finally` pushes a [`TryFrame`]. Leaving the region
//! normally (`POP_TRY`) pops it and, if the region has a finally block,
//! jumps there with a `Resume` completion pointing just past `POP_TRY`.
//!
//! A throw pops regions from the top. Each popped region first unwinds the
//! frames and stack above its saved depths, then:
//!
//! - filter matches, no finally: push the exception, jump to the handler;
//! - filter matches, finally: run the finally with a `Catch` completion,
//!   which pushes the exception and jumps to the handler at `END_FINALLY`;
//! - no match, finally: run the finally with a `Rethrow` completion;
//! - no match, no finally: keep searching.
//!
//! A `RETURN` inside a region with a finally runs the finally with a
//! `Return` completion before the frame is popped. Each region is popped
//! exactly once, so each finally block runs exactly once.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::runtime::function::{NativeFunction, NativeResult, Thrown};
use crate::runtime::object::{Class, Instance, Object};
use crate::runtime::table::HashTable;
use crate::runtime::value::Value;

use super::interpreter::Vm;

/// Built-in exception classes, all rooted at `Exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Root of the exception hierarchy
    Exception,
    /// Operand of the wrong type
    TypeError,
    /// Undefined global
    NameError,
    /// Wrong number of arguments
    ArgumentError,
    /// Index out of range
    IndexError,
    /// Dict key not found
    KeyError,
    /// Failed assertion
    AssertionError,
    /// Host I/O failure
    IOError,
}

impl ExceptionKind {
    /// Every kind, root first.
    pub const ALL: [ExceptionKind; 8] = [
        ExceptionKind::Exception,
        ExceptionKind::TypeError,
        ExceptionKind::NameError,
        ExceptionKind::ArgumentError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::AssertionError,
        ExceptionKind::IOError,
    ];

    /// The class name, also its global binding.
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::ArgumentError => "ArgumentError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::AssertionError => "AssertionError",
            ExceptionKind::IOError => "IOError",
        }
    }
}

/// An active exception-handling region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TryFrame {
    pub(crate) handler: Option<usize>,
    pub(crate) finally: Option<usize>,
    /// Class the handler accepts; `None` accepts anything
    pub(crate) filter: Option<GcRef>,
    pub(crate) stack_depth: usize,
    pub(crate) frame_depth: usize,
}

/// What happens when a finally block reaches `END_FINALLY`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Completion {
    /// Continue at this offset
    Resume(usize),
    /// Push the exception and enter the handler
    Catch { handler: usize, exception: Value },
    /// Keep propagating the exception
    Rethrow(Value),
    /// Finish returning this value from the frame
    Return(Value),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingCompletion {
    /// Try-stack length when the owning region was popped
    pub(crate) try_depth: usize,
    pub(crate) frame_depth: usize,
    pub(crate) kind: Completion,
}

/// Constructor shared by every built-in exception class.
fn exception_init(vm: &mut Vm, this: Value, args: &[Value]) -> NativeResult {
    let message = match args.first() {
        Some(value) if value.is_string() => *value,
        Some(value) => {
            let text = vm.render(*value);
            vm.intern(&text)
        }
        None => vm.intern(""),
    };
    let key = vm.names.message;
    vm.set_field(this, key, message);
    Ok(this)
}

impl Vm {
    pub(crate) fn install_exception_classes(&mut self) {
        let init = self.heap.alloc(Object::Native(NativeFunction {
            name: String::from("init"),
            arity: None,
            func: exception_init,
        }));
        let mut root = None;
        for kind in ExceptionKind::ALL {
            let mut class = Class::new(kind.name());
            class.superclass = root;
            class.constructor = Some(Value::Obj(init));
            let class = self.heap.alloc(Object::Class(class));
            root.get_or_insert(class);
            self.exception_classes.push(class);
            self.define_global(kind.name(), Value::Obj(class));
        }
    }

    /// Returns the built-in class for `kind`.
    pub fn exception_class(&self, kind: ExceptionKind) -> Value {
        Value::Obj(self.exception_classes[kind as usize])
    }

    /// Creates an exception instance with the given message.
    pub fn make_exception(&mut self, kind: ExceptionKind, message: impl AsRef<str>) -> Value {
        let class = self.exception_classes[kind as usize];
        let instance = self.alloc(Object::Instance(Instance {
            class,
            fields: HashTable::new(),
        }));
        let message = self.heap.intern(message.as_ref());
        let key = self.names.message;
        self.set_field(instance, key, message);
        instance
    }

    /// Records an exception raised by a native.
    ///
    /// The native returns the marker as its `Err`; the call site then
    /// throws the recorded exception.
    pub fn raise(&mut self, kind: ExceptionKind, message: impl AsRef<str>) -> Thrown {
        let exception = self.make_exception(kind, message);
        self.throw(exception)
    }

    /// Records a host I/O failure as an `IOError`.
    pub fn raise_io(&mut self, err: std::io::Error) -> Thrown {
        self.raise(ExceptionKind::IOError, err.to_string())
    }

    /// Records an arbitrary value as the exception a native throws.
    pub fn throw(&mut self, exception: Value) -> Thrown {
        self.pending = Some(exception);
        Thrown
    }

    /// Takes the exception a native recorded before returning [`Thrown`].
    pub(crate) fn take_pending(&mut self) -> Result<Value> {
        self.pending
            .take()
            .ok_or_else(|| Error::internal("native signalled an exception without raising one"))
    }

    /// Raises a built-in exception from inside an instruction.
    ///
    /// Returns `Ok` once control has moved to a handler or finally block;
    /// the caller must stop executing the current instruction.
    pub(crate) fn throw_error(&mut self, kind: ExceptionKind, message: impl AsRef<str>) -> Result<()> {
        let exception = self.make_exception(kind, message);
        self.throw_value(exception)
    }

    /// Attaches a stack trace to `exception` and starts unwinding.
    pub(crate) fn throw_value(&mut self, exception: Value) -> Result<()> {
        if self.instance_class(exception).is_some() {
            let trace = self.stack_trace();
            let lines = trace.iter().map(|line| self.heap.intern(line)).collect();
            let trace = self.alloc(Object::Array(lines));
            let key = self.names.stacktrace;
            self.set_field(exception, key, trace);
        }
        debug!(exception = %self.render(exception), depth = self.frames.len(), "throw");
        self.propagate(exception)
    }

    /// `from <fn>() in <file>:<line>` for every active frame, innermost last.
    pub(crate) fn stack_trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| {
                format!(
                    "from {}() in {}:{}",
                    frame.proto.name,
                    frame.proto.source,
                    frame.current_line()
                )
            })
            .collect()
    }

    pub(crate) fn enter_try(&mut self) -> Result<()> {
        let type_name = self.read_constant()?;
        let handler = self.read_short()? as usize;
        let finally = self.read_short()? as usize;

        let frame_depth = self.frames.len();
        let nested = self
            .try_stack
            .iter()
            .rev()
            .take_while(|region| region.frame_depth == frame_depth)
            .count();
        if nested >= self.config.max_try_depth {
            return self.throw_error(
                ExceptionKind::Exception,
                "too many nested exception handlers in one function",
            );
        }

        let filter = if handler == 0 || type_name.is_nil() {
            None
        } else {
            Some(self.resolve_filter(type_name))
        };
        self.try_stack.push(TryFrame {
            handler: (handler != 0).then_some(handler),
            finally: (finally != 0).then_some(finally),
            filter,
            stack_depth: self.stack.len(),
            frame_depth,
        });
        debug!(depth = self.try_stack.len(), handler, finally, "enter try");
        Ok(())
    }

    /// The class a handler filters on; names that are not classes catch `Exception`.
    fn resolve_filter(&self, name: Value) -> GcRef {
        match self.globals.get(self.heap.strings(), name) {
            Some(Value::Obj(r)) if matches!(self.heap.get(r), Some(Object::Class(_))) => r,
            _ => self.exception_classes[ExceptionKind::Exception as usize],
        }
    }

    pub(crate) fn pop_try(&mut self) -> Result<()> {
        let region = self
            .try_stack
            .pop()
            .ok_or_else(|| Error::internal("POP_TRY without an active try region"))?;
        debug!(depth = self.try_stack.len(), "leave try");
        if let Some(finally) = region.finally {
            let resume = self.frame()?.ip;
            self.push_completion(Completion::Resume(resume));
            self.jump_to(finally)?;
        }
        Ok(())
    }

    /// Resumes whatever was pending when the finally block was entered.
    ///
    /// Returns `Some` when the resumed completion finished the run.
    pub(crate) fn end_finally(&mut self) -> Result<Option<Value>> {
        let completion = self
            .completions
            .pop()
            .ok_or_else(|| Error::internal("end of finally block without a pending completion"))?;
        if completion.frame_depth != self.frames.len() {
            return Err(Error::internal("finally block completed in the wrong frame"));
        }
        match completion.kind {
            Completion::Resume(offset) => self.jump_to(offset)?,
            Completion::Catch { handler, exception } => {
                self.push(exception);
                self.jump_to(handler)?;
            }
            Completion::Rethrow(exception) => self.propagate(exception)?,
            Completion::Return(value) => return self.finish_return(value),
        }
        Ok(None)
    }

    pub(crate) fn throw_op(&mut self) -> Result<()> {
        let exception = self.pop()?;
        let root = self.exception_classes[ExceptionKind::Exception as usize];
        if !self.is_instance_of(exception, root) {
            return self.throw_error(ExceptionKind::TypeError, "instance of Exception expected");
        }
        self.throw_value(exception)
    }

    pub(crate) fn push_completion(&mut self, kind: Completion) {
        self.completions.push(PendingCompletion {
            try_depth: self.try_stack.len(),
            frame_depth: self.frames.len(),
            kind,
        });
    }

    /// Unwinds to the nearest region that handles `exception`.
    fn propagate(&mut self, exception: Value) -> Result<()> {
        while let Some(region) = self.try_stack.pop() {
            let index = self.try_stack.len();
            // completions of finally blocks this throw interrupted
            while self
                .completions
                .last()
                .is_some_and(|pending| pending.try_depth > index)
            {
                self.completions.pop();
            }
            while self.frames.len() > region.frame_depth {
                if let Some(frame) = self.frames.pop() {
                    self.close_upvalues(frame.base);
                    debug!(function = %frame.proto.name, "unwind frame");
                }
            }
            self.close_upvalues(region.stack_depth);
            self.stack.truncate(region.stack_depth);

            let matches = match region.filter {
                None => true,
                Some(class) => self.is_instance_of(exception, class),
            };
            match (matches, region.handler, region.finally) {
                (true, Some(handler), None) => {
                    debug!(handler, "exception caught");
                    self.push(exception);
                    return self.jump_to(handler);
                }
                (true, Some(handler), Some(finally)) => {
                    self.push_completion(Completion::Catch { handler, exception });
                    return self.jump_to(finally);
                }
                (_, _, Some(finally)) => {
                    self.push_completion(Completion::Rethrow(exception));
                    return self.jump_to(finally);
                }
                _ => {}
            }
        }
        self.unhandled(exception)
    }

    fn unhandled(&mut self, exception: Value) -> Result<()> {
        let (class, message, trace) = match self.instance_class(exception) {
            Some(class) => {
                let name = match self.heap.get(class) {
                    Some(Object::Class(class)) => class.name.clone(),
                    _ => String::from("?"),
                };
                let message = self
                    .get_field(exception, self.names.message)
                    .map(|value| self.render(value))
                    .unwrap_or_default();
                let trace = match self
                    .get_field(exception, self.names.stacktrace)
                    .and_then(|value| self.heap.object_of(value))
                {
                    Some(Object::Array(lines)) => lines.iter().map(|line| self.render(*line)).collect(),
                    _ => Vec::new(),
                };
                (name, message, trace)
            }
            None => (
                self.type_name(exception).to_string(),
                self.render(exception),
                self.stack_trace(),
            ),
        };

        let mut report = format!("Unhandled {}: {}\n", class, message);
        for line in &trace {
            report.push_str("  ");
            report.push_str(line);
            report.push('\n');
        }
        self.write_error_report(&report);
        warn!(class = %class, message = %message, "unhandled exception terminated the run");
        self.reset();
        Err(Error::Unhandled {
            class,
            message,
            trace,
        })
    }
}
