// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph decoding and graph passes.

/// Errors that can occur while reading or rewriting a graph document.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The byte stream is not a decodable ONNX model.
    #[error("malformed graph: cannot decode ONNX protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The document decoded but is internally inconsistent.
    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    /// An attribute is present but has a different type than required.
    #[error("node '{node}': attribute '{attribute}' is not of type {expected}")]
    AttributeType {
        node: String,
        attribute: String,
        expected: &'static str,
    },

    /// A constant tensor could not be decoded or transformed.
    #[error("tensor '{name}': {source}")]
    Tensor {
        name: String,
        #[source]
        source: tensor_core::TensorError,
    },
}

impl GraphError {
    /// Returns `true` for the error kinds that mean "this input is not a
    /// well-formed graph document".
    pub fn is_malformed(&self) -> bool {
        matches!(self, GraphError::Decode(_) | GraphError::MalformedGraph(_))
    }
}
