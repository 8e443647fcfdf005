// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the ncnn model, its loader and the scale inspector.

/// Errors that can occur when building, loading or emitting an ncnn model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model violates a structural invariant (index range, producer
    /// uniqueness, topological order, weight layout).
    #[error("invalid runtime model: {0}")]
    InvalidRuntimeModel(String),

    /// The `.param` text could not be parsed.
    #[error("param line {line}: {detail}")]
    ParseError { line: usize, detail: String },

    /// The `.bin` stream ended before every weight was read.
    #[error("layer '{layer}': weight stream truncated (need {needed} bytes at offset {offset}, have {available})")]
    TruncatedWeights {
        layer: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A tagged weight starts with an unknown storage tag.
    #[error("layer '{layer}': unknown weight storage tag {tag:#010x} at offset {offset}")]
    UnknownWeightTag {
        layer: String,
        offset: usize,
        tag: u32,
    },

    /// A layer reads weights but follows a layer of unknown kind, whose
    /// share of the `.bin` stream cannot be sized.
    #[error("layer '{layer}': weights cannot be located after layer '{after}' of unknown type '{kind}'")]
    UnlocatableWeights {
        layer: String,
        after: String,
        kind: String,
    },

    /// Scale inference on a loaded model failed.
    #[error(transparent)]
    Scale(#[from] ScaleError),

    /// A model file could not be read.
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Weight data could not be converted.
    #[error("layer '{layer}': {source}")]
    Tensor {
        layer: String,
        #[source]
        source: tensor_core::TensorError,
    },
}

/// Errors from scale inference.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScaleError {
    /// An upscaling layer does not carry a usable scale parameter, or the
    /// composed factor does not fit in a `u32`.
    #[error("cannot determine scale at layer '{layer}': {detail}")]
    ScaleUndeterminable { layer: String, detail: String },
}
