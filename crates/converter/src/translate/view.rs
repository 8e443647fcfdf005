// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Read-only view of one node during translation.

use super::State;
use crate::ConvertError;
use onnx_graph::{GraphDocument, GraphError, GraphNode, Optimized};
use std::collections::HashSet;
use tensor_core::{Shape, TensorData};

/// What a rule sees: the node, constant resolution, shape hints and
/// single-consumer lookahead.
pub(crate) struct NodeView<'a> {
    pub index: usize,
    pub node: &'a GraphNode,
    doc: &'a GraphDocument<Optimized>,
    state: &'a State,
    absorbed: &'a HashSet<usize>,
}

impl<'a> NodeView<'a> {
    pub(crate) fn new(
        index: usize,
        node: &'a GraphNode,
        doc: &'a GraphDocument<Optimized>,
        state: &'a State,
        absorbed: &'a HashSet<usize>,
    ) -> Self {
        Self {
            index,
            node,
            doc,
            state,
            absorbed,
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> String {
        self.node.display_name()
    }

    /// Name of the layer this node becomes.
    pub fn layer_name(&self) -> String {
        if self.node.name.is_empty() {
            format!("{}_{}", self.node.op_type, self.index)
        } else {
            self.node.name.clone()
        }
    }

    pub fn op_type(&self) -> &'a str {
        &self.node.op_type
    }

    pub fn opset(&self) -> i64 {
        self.doc.opset()
    }

    /// The `i`-th input, which must be present.
    pub fn input(&self, i: usize) -> Result<&'a str, ConvertError> {
        self.node.input(i).ok_or_else(|| {
            GraphError::MalformedGraph(format!("node '{}' is missing input {i}", self.name())).into()
        })
    }

    pub fn optional_input(&self, i: usize) -> Option<&'a str> {
        self.node.input(i)
    }

    pub fn output(&self) -> &'a str {
        self.node.output()
    }

    /// Constant value of the `i`-th input, if it has one.
    pub fn constant(&self, i: usize) -> Option<&'a TensorData> {
        self.constant_of(self.node.input(i)?)
    }

    /// Constant value of the `i`-th input, or an error naming what needed it.
    pub fn require_constant(&self, i: usize, detail: &str) -> Result<&'a TensorData, ConvertError> {
        let name = self.input(i)?;
        self.constant_of(name)
            .ok_or_else(|| self.dynamic(name, detail))
    }

    /// Constant value of any tensor, following aliases.
    pub fn constant_of(&self, name: &str) -> Option<&'a TensorData> {
        let resolved = self.state.resolve(name);
        self.doc
            .initializer(resolved)
            .or_else(|| self.state.consts.get(resolved))
    }

    /// The only reader of `tensor`, when it is safe to fuse into.
    ///
    /// The reader must come later in stored order, must not already be
    /// fused elsewhere, and `tensor` must not be a graph output.
    pub fn sole_consumer(&self, tensor: &str) -> Option<(usize, &'a GraphNode)> {
        if self.doc.is_graph_output(tensor) {
            return None;
        }
        match self.doc.consumers(tensor) {
            [only] if *only > self.index && !self.absorbed.contains(only) => {
                let node = self.doc.node(*only)?;
                node.domain.is_empty().then_some((*only, node))
            }
            _ => None,
        }
    }

    pub fn static_shape(&self, name: &str) -> Option<Shape> {
        if let Some(t) = self.constant_of(name) {
            return Some(t.shape().clone());
        }
        self.doc
            .static_shape(name)
            .or_else(|| self.doc.static_shape(self.state.resolve(name)))
    }

    pub fn rank_of(&self, name: &str) -> Option<usize> {
        if let Some(t) = self.constant_of(name) {
            return Some(t.shape().rank());
        }
        self.doc
            .shape_hint(name)
            .or_else(|| self.doc.shape_hint(self.state.resolve(name)))
            .map(<[_]>::len)
    }

    pub fn int(&self, attr: &str, default: i64) -> Result<i64, ConvertError> {
        Ok(self.node.int_or(attr, default)?)
    }

    pub fn float(&self, attr: &str, default: f32) -> Result<f32, ConvertError> {
        Ok(self.node.float_or(attr, default)?)
    }

    pub fn string(&self, attr: &str, default: &str) -> Result<String, ConvertError> {
        Ok(self.node.string_or(attr, default)?)
    }

    pub fn ints(&self, attr: &str) -> Result<Option<&'a [i64]>, ConvertError> {
        Ok(self.node.ints(attr)?)
    }

    pub fn floats(&self, attr: &str) -> Result<Option<&'a [f32]>, ConvertError> {
        Ok(self.node.floats(attr)?)
    }

    /// An integer-list attribute with a fallback.
    pub fn ints_or(&self, attr: &str, default: &[i64]) -> Result<Vec<i64>, ConvertError> {
        Ok(self.ints(attr)?.unwrap_or(default).to_vec())
    }

    pub fn unsupported(&self, attribute: &str, detail: impl Into<String>) -> ConvertError {
        ConvertError::UnsupportedAttribute {
            node: self.name(),
            attribute: attribute.to_string(),
            detail: detail.into(),
        }
    }

    pub fn dynamic(&self, tensor: &str, detail: impl Into<String>) -> ConvertError {
        ConvertError::UnsupportedDynamicShape {
            tensor: tensor.to_string(),
            detail: detail.into(),
        }
    }

    /// Clip bounds of `node`, from attributes before opset 11 and from
    /// constant inputs after. `None` when a bound is not constant.
    pub fn clip_bounds(&self, node: &GraphNode) -> Result<Option<(f32, f32)>, ConvertError> {
        if self.opset() < 11 {
            return Ok(Some((
                node.float_or("min", -f32::MAX)?,
                node.float_or("max", f32::MAX)?,
            )));
        }
        let bound = |i: usize, default: f32| -> Result<Option<f32>, ConvertError> {
            let Some(name) = node.input(i) else {
                return Ok(Some(default));
            };
            let Some(t) = self.constant_of(name) else {
                return Ok(None);
            };
            let values = t.to_f32_vec().map_err(ConvertError::tensor(name))?;
            Ok(values.first().copied())
        };
        Ok(match (bound(1, -f32::MAX)?, bound(2, f32::MAX)?) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        })
    }

    /// Maps an axis of a batched tensor to the batchless runtime layout.
    ///
    /// Negative axes stay negative when the rank is unknown; the runtime
    /// resolves them from the end.
    pub fn batchless_axis(&self, attribute: &str, axis: i64, rank: Option<usize>) -> Result<i32, ConvertError> {
        let axis = match (axis < 0, rank) {
            (true, Some(r)) => axis + r as i64,
            (true, None) => return Ok(axis as i32),
            (false, _) => axis,
        };
        if axis <= 0 {
            return Err(self.unsupported(attribute, "operating on the batch axis"));
        }
        Ok((axis - 1) as i32)
    }
}

/// Narrows an attribute integer to the runtime's 32-bit parameters.
pub(crate) fn to_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
