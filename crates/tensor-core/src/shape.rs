// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Concrete dimension lists for constant tensors.
//!
//! ONNX stores dims as signed 64-bit values with a leading batch axis;
//! ncnn blobs hold at most three axes and never a batch. The helpers
//! here cover the conversions between those two views.

use std::fmt;

/// Row-major dimensions of a [`crate::TensorData`].
///
/// Every entry is known. Symbolic sizes stay in the graph's shape hints
/// and never reach a materialized tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Wraps a dimension list.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let nchw = Shape::new(vec![1, 3, 8, 8]);
    /// assert_eq!(nchw.rank(), 4);
    /// assert_eq!(nchw.num_elements(), 192);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// The empty dimension list of a single value.
    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    /// A flat run of `len` values.
    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    /// Converts an ONNX `dims` field. `None` if any entry is negative.
    pub fn from_i64(dims: &[i64]) -> Option<Self> {
        let dims = dims
            .iter()
            .map(|&d| usize::try_from(d).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self::new(dims))
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dims; 1 for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Byte length of a buffer holding this many `dtype` elements.
    pub fn size_bytes(&self, dtype: crate::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Drops every unit axis, as ONNX `Squeeze` without `axes` does.
    pub fn squeezed(&self) -> Shape {
        Shape::new(self.dims.iter().copied().filter(|&d| d != 1).collect())
    }

    /// Drops a leading unit batch axis. A shape that would become a scalar
    /// is returned as-is.
    pub fn without_batch(&self) -> Shape {
        match self.dims.as_slice() {
            [1, rest @ ..] if !rest.is_empty() => Shape::new(rest.to_vec()),
            _ => self.clone(),
        }
    }

    /// Strips the batch axis, then further leading unit axes until at most
    /// `max_rank` remain. Non-unit leading axes stop the folding, so the
    /// result may still exceed `max_rank`.
    pub fn fold_leading_units(&self, max_rank: usize) -> Shape {
        let shape = self.without_batch();
        let extra = shape
            .dims
            .iter()
            .take(shape.rank().saturating_sub(max_rank))
            .take_while(|&&d| d == 1)
            .count();
        Shape::new(shape.dims[extra..].to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.dims).finish()
    }
}
