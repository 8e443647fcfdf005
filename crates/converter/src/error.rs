// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for conversion.

use std::path::PathBuf;

/// Errors that can occur while converting a graph into an ncnn model.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// No translation rule exists for the operator.
    #[error("unsupported operator '{op_type}' at node '{node}'")]
    UnsupportedOperator { op_type: String, node: String },

    /// A value the target layer needs at conversion time is only known at
    /// inference time.
    #[error("tensor '{tensor}' must be constant: {detail}")]
    UnsupportedDynamicShape { tensor: String, detail: String },

    /// An attribute value has no equivalent in the target layer.
    #[error("node '{node}': attribute '{attribute}' unsupported: {detail}")]
    UnsupportedAttribute {
        node: String,
        attribute: String,
        detail: String,
    },

    /// A node reads a tensor that no earlier node produced.
    #[error("node '{node}' reads '{tensor}' before it is produced; the graph is not topologically sorted")]
    OrderingViolation { node: String, tensor: String },

    /// The input document is malformed or a graph pass failed.
    #[error(transparent)]
    Graph(#[from] onnx_graph::GraphError),

    /// The built model violates a runtime-model invariant.
    #[error(transparent)]
    Model(#[from] ncnn_model::ModelError),

    /// The output name needed the model's scale and it could not be inferred.
    #[error(transparent)]
    Scale(#[from] ncnn_model::ScaleError),

    /// A constant could not be converted.
    #[error("tensor '{name}': {source}")]
    Tensor {
        name: String,
        #[source]
        source: tensor_core::TensorError,
    },

    /// Writing the output files failed.
    #[error("cannot write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    pub(crate) fn tensor(name: &str) -> impl FnOnce(tensor_core::TensorError) -> Self + '_ {
        move |source| ConvertError::Tensor {
            name: name.to_string(),
            source,
        }
    }
}
