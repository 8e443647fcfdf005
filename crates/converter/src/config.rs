// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion settings loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! fp16 = true
//! optimize = true
//! output_dir = "./converted"
//! name = "x4"
//! ```

use crate::ConvertError;
use std::path::{Path, PathBuf};

/// Settings for a conversion run. Every field is optional in TOML.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Store convolution weights in half precision.
    pub fp16: bool,
    /// Run the in-crate graph passes before translation.
    pub optimize: bool,
    /// Directory for the output files; defaults to the input file stem.
    pub output_dir: Option<PathBuf>,
    /// Base name of the output files; defaults to `x{scale}`.
    pub name: Option<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            fp16: true,
            optimize: true,
            output_dir: None,
            name: None,
        }
    }
}

impl ConvertConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConvertError> {
        toml::from_str(toml_str)
            .map_err(|e| ConvertError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConvertError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("TOML serialise error: {e}")))
    }
}
