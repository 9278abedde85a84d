// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Garbage-collection roots.

use tracing::debug;

use crate::gc::{CollectStats, GcTrace};
use crate::runtime::value::Value;

use super::exceptions::Completion;
use super::interpreter::Vm;

impl Vm {
    /// Runs a full collection cycle.
    ///
    /// Everything reachable from the stack, the frames, the globals, open
    /// upvalues, pending exceptions and pinned values survives.
    pub fn collect_garbage(&mut self) -> CollectStats {
        let before = self.heap.bytes_allocated();
        self.mark_roots();
        self.heap.trace();
        let stats = self.heap.sweep();
        debug!(
            objects_freed = stats.objects_freed,
            strings_freed = stats.strings_freed,
            bytes_before = before,
            bytes_after = self.heap.bytes_allocated(),
            next_gc = stats.next_gc,
            "gc cycle"
        );
        stats
    }

    fn mark_roots(&mut self) {
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_ref(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_ref(upvalue);
        }

        let mut refs = Vec::new();
        self.globals.trace_refs(&mut refs);
        for r in refs {
            self.heap.mark_ref(r);
        }

        for region in &self.try_stack {
            if let Some(filter) = region.filter {
                self.heap.mark_ref(filter);
            }
        }
        for pending in &self.completions {
            match pending.kind {
                Completion::Resume(_) => {}
                Completion::Catch { exception, .. } => self.heap.mark_value(exception),
                Completion::Rethrow(value) | Completion::Return(value) => {
                    self.heap.mark_value(value)
                }
            }
        }
        if let Some(exception) = self.pending {
            self.heap.mark_value(exception);
        }

        for &class in &self.exception_classes {
            self.heap.mark_ref(class);
        }
        for class in self.primitives.iter() {
            self.heap.mark_ref(class);
        }
        for &value in &self.pinned {
            self.heap.mark_value(value);
        }
        self.heap.mark_value(self.names.message);
        self.heap.mark_value(self.names.stacktrace);
    }

    /// Keeps `value` alive across collections until [`Vm::unpin`].
    pub fn pin(&mut self, value: Value) {
        self.pinned.push(value);
    }

    /// Releases one pin of `value`. Returns whether it was pinned.
    pub fn unpin(&mut self, value: Value) -> bool {
        match self.pinned.iter().rposition(|pinned| *pinned == value) {
            Some(index) => {
                self.pinned.swap_remove(index);
                true
            }
            None => false,
        }
    }
}
