// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # onnx-graph
//!
//! In-memory model of an ONNX computation graph.
//!
//! - [`GraphDocument`]: nodes, initializers and shape hints, with O(1)
//!   producer and consumer lookups.
//! - [`GraphNode`] / [`Attribute`]: one operator application and its
//!   typed attributes.
//! - [`optimize`]: the passes that take a document from [`Parsed`] to
//!   [`Optimized`].
//! - [`proto`]: the protobuf messages the decoder reads.

pub mod document;
pub mod error;
pub mod node;
pub mod optimize;
pub mod proto;
pub mod value;

pub use document::{DocumentState, GraphDocument, GraphParts, Optimized, Parsed};
pub use error::GraphError;
pub use node::{Attribute, GraphNode};
pub use optimize::OptimizeReport;
pub use value::{Dim, ValueInfo};
