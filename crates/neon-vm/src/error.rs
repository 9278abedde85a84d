// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the VM.
//!
//! Script-level failures are exceptions inside the VM and only surface here
//! once they escape every try region. Everything else is fatal.

use thiserror::Error;

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the VM.
#[derive(Error, Debug)]
pub enum Error {
    /// The blob violates the encoding contract
    #[error("malformed blob at offset {offset}: {reason}")]
    MalformedBlob {
        /// Offset of the offending instruction
        offset: usize,
        /// What is wrong with it
        reason: String,
    },

    /// A runtime exception escaped every try region
    #[error("unhandled {class}: {message}")]
    Unhandled {
        /// Class name of the exception
        class: String,
        /// The exception message
        message: String,
        /// `from <fn>() in <file>:<line>` lines, innermost last
        trace: Vec<String>,
    },

    /// Internal invariant violated (stack underflow, corrupted state)
    #[error("internal error: {0}")]
    Internal(String),

    /// Call depth passed the configured limit
    #[error("maximum call depth of {0} exceeded")]
    FrameOverflow(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing error
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Process exit status for this error.
    ///
    /// Script faults exit with 1, internal and compiler faults with 70
    /// (`EX_SOFTWARE`) and host I/O faults with 74 (`EX_IOERR`).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Unhandled { .. } => 1,
            Error::MalformedBlob { .. }
            | Error::Internal(_)
            | Error::FrameOverflow(_)
            | Error::Config(_) => 70,
            Error::Io(_) => 74,
        }
    }

    /// Returns whether the error came from script logic rather than the VM.
    pub fn is_script_error(&self) -> bool {
        matches!(self, Error::Unhandled { .. })
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedBlob {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let unhandled = Error::Unhandled {
            class: "TypeError".into(),
            message: "bad".into(),
            trace: Vec::new(),
        };
        assert_eq!(unhandled.exit_code(), 1);
        assert!(unhandled.is_script_error());
        assert_eq!(Error::internal("stack underflow").exit_code(), 70);
        assert_eq!(Error::FrameOverflow(8).exit_code(), 70);
        let io = Error::from(std::io::Error::other("closed"));
        assert_eq!(io.exit_code(), 74);
    }

    #[test]
    fn test_display() {
        let err = Error::malformed(12, "unknown opcode 250");
        assert_eq!(
            err.to_string(),
            "malformed blob at offset 12: unknown opcode 250"
        );
        assert_eq!(
            Error::FrameOverflow(64).to_string(),
            "maximum call depth of 64 exceeded"
        );
    }
}
