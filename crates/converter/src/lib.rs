// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # converter
//!
//! ONNX to ncnn conversion.
//!
//! ```text
//! bytes ─parse─▶ GraphDocument<Parsed> ─optimize─▶ GraphDocument<Optimized>
//!       ─translate─▶ ModelBuilder ─finish─▶ NcnnModel ─narrow─▶ ─emit─▶ .param + .bin
//! ```
//!
//! [`translate`] holds the operator rule table and the fusions.
//! [`ModelBuilder`] inserts `Split` layers for shared blobs and assigns
//! blob indices. [`Converter`] runs the whole chain in memory, and
//! [`ConvertedModel::write_to`] writes both files or neither.

mod builder;
mod config;
mod error;
mod output;
mod pipeline;
mod translate;

pub use builder::{ModelBuilder, PendingLayer};
pub use config::ConvertConfig;
pub use error::ConvertError;
pub use output::OutputPaths;
pub use pipeline::{ConvertOptions, ConvertedModel, Converter};
pub use translate::{is_supported, translate};
