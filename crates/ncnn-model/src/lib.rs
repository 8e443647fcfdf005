// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # ncnn-model
//!
//! The ncnn runtime model and everything that operates on it directly:
//!
//! - [`NcnnModel`], [`Layer`], [`Weight`]: layers in execution order over
//!   an index-addressed blob arena, validated on construction.
//! - [`params`]: the catalog of layer kinds and their parameters, with a
//!   pass-through variant for kinds outside it.
//! - [`emit()`] / [`NcnnModel::from_param_and_bin`]: the `.param` and
//!   `.bin` formats, in both directions.
//! - [`narrow_to_half`]: half-precision storage for convolution weights.
//! - [`infer_scale`], [`infer_scale_from_param`] and [`ModelInfo`]:
//!   structural inspection.

pub mod dict;
pub mod emit;
pub mod error;
pub mod info;
pub mod layer;
pub mod load;
pub mod model;
pub mod narrow;
pub mod params;
pub mod scale;

pub use emit::{emit, EmittedModel};
pub use error::{ModelError, ScaleError};
pub use info::ModelInfo;
pub use layer::{Layer, Precision, Storage, Weight};
pub use model::{Blob, NcnnModel};
pub use narrow::{narrow_to_half, NarrowReport};
pub use params::LayerParams;
pub use scale::{infer_scale, infer_scale_from_param};
