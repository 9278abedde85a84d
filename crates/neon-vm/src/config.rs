// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interpreter configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for one interpreter state.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// max_frames = 256
/// stress_gc = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Recursion limit
    pub max_frames: usize,

    /// Nested try regions allowed per frame
    pub max_try_depth: usize,

    /// Stack slots reserved up front
    pub initial_stack: usize,

    /// Bytes allocated before the first collection
    pub gc_initial_threshold: usize,

    /// Threshold multiplier applied after each collection
    pub gc_growth_factor: usize,

    /// Collect at every safe point
    pub stress_gc: bool,

    /// Assigning an undefined global raises instead of defining it
    pub strict_globals: bool,

    /// Log every executed instruction at trace level
    pub trace_execution: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            max_try_depth: 16,
            initial_stack: 256,
            gc_initial_threshold: 1024 * 1024,
            gc_growth_factor: 2,
            stress_gc: false,
            strict_globals: true,
            trace_execution: false,
        }
    }
}

impl VmConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
