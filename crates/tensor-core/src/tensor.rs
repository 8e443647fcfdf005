// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned constant tensors and their layout transforms.

use crate::{DType, Shape, TensorError};
use half::f16;
use ndarray::{ArrayD, IxDyn};

/// An owned, n-dimensional constant tensor stored as little-endian bytes.
///
/// `TensorData` carries graph initializers into the converter and weight
/// payloads out of it. Bytes are always row-major (C order) and always
/// little-endian regardless of host, so emitted weight files are
/// byte-identical across platforms.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    shape: Shape,
    dtype: DType,
    bytes: Vec<u8>,
}

impl TensorData {
    /// Creates a tensor from raw little-endian bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, bytes: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if bytes.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self { shape, dtype, bytes })
    }

    /// Creates an `F32` tensor from a slice of values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{TensorData, Shape};
    /// let t = TensorData::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::F32, bytes)
    }

    /// Creates an `I64` tensor from a slice of values.
    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self, TensorError> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::I64, bytes)
    }

    /// Creates a rank-0 `F32` tensor.
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            shape: Shape::scalar(),
            dtype: DType::F32,
            bytes: value.to_le_bytes().to_vec(),
        }
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Decodes every element as `f32`, converting from the stored dtype.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        let b = &self.bytes;
        let out = match self.dtype {
            DType::F32 => b
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            DType::F16 => b
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            DType::F64 => b
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(le8(c)) as f32)
                .collect(),
            DType::I32 => b
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            DType::I64 => b
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(le8(c)) as f32)
                .collect(),
            DType::I8 => b.iter().map(|&v| v as i8 as f32).collect(),
            DType::U8 | DType::Bool => b.iter().map(|&v| v as f32).collect(),
        };
        Ok(out)
    }

    /// Decodes every element as `i64`, converting from the stored dtype.
    ///
    /// Floating-point values are truncated toward zero.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        let b = &self.bytes;
        let out = match self.dtype {
            DType::I64 => b.chunks_exact(8).map(|c| i64::from_le_bytes(le8(c))).collect(),
            DType::I32 => b
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64)
                .collect(),
            DType::I8 => b.iter().map(|&v| v as i8 as i64).collect(),
            DType::U8 | DType::Bool => b.iter().map(|&v| v as i64).collect(),
            DType::F32 | DType::F16 | DType::F64 => {
                self.to_f32_vec()?.into_iter().map(|v| v as i64).collect()
            }
        };
        Ok(out)
    }

    /// Returns the same data under a new shape with an equal element count.
    pub fn reshape(self, shape: Shape) -> Result<Self, TensorError> {
        if shape.num_elements() != self.shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape,
                rhs: shape,
            });
        }
        Ok(Self { shape, ..self })
    }

    /// Returns a copy with axes reordered so that output axis `i` is input
    /// axis `axes[i]`, materialized in row-major order.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{TensorData, Shape};
    /// let t = TensorData::from_f32(Shape::new(vec![2, 3]), &[0., 1., 2., 3., 4., 5.]).unwrap();
    /// let p = t.permute(&[1, 0]).unwrap();
    /// assert_eq!(p.shape(), &Shape::new(vec![3, 2]));
    /// assert_eq!(p.to_f32_vec().unwrap(), vec![0., 3., 1., 4., 2., 5.]);
    /// ```
    pub fn permute(&self, axes: &[usize]) -> Result<Self, TensorError> {
        let rank = self.shape.rank();
        let mut seen = vec![false; rank];
        let valid = axes.len() == rank
            && axes
                .iter()
                .all(|&a| a < rank && !std::mem::replace(&mut seen[a], true));
        if !valid {
            return Err(TensorError::InvalidPermutation {
                axes: axes.to_vec(),
                rank,
            });
        }

        // Permute element positions, then gather bytes: works for every dtype.
        let positions: Vec<usize> = (0..self.num_elements()).collect();
        let grid = ArrayD::from_shape_vec(IxDyn(self.shape.dims()), positions).map_err(|_| {
            TensorError::BufferSizeMismatch {
                expected: self.num_elements(),
                actual: self.bytes.len() / self.dtype.size_bytes(),
            }
        })?;
        let permuted = grid.permuted_axes(axes);
        let shape = Shape::new(permuted.shape().to_vec());

        let elem = self.dtype.size_bytes();
        let mut bytes = Vec::with_capacity(self.bytes.len());
        for &pos in permuted.iter() {
            bytes.extend_from_slice(&self.bytes[pos * elem..(pos + 1) * elem]);
        }
        Ok(Self {
            shape,
            dtype: self.dtype,
            bytes,
        })
    }

    /// Converts to `F16` using round-to-nearest-even.
    ///
    /// An `F16` tensor is returned unchanged; integer tensors are rejected.
    pub fn to_f16(&self) -> Result<Self, TensorError> {
        match self.dtype {
            DType::F16 => Ok(self.clone()),
            DType::F32 | DType::F64 => {
                let bytes = self
                    .to_f32_vec()?
                    .into_iter()
                    .flat_map(|v| f16::from_f32(v).to_le_bytes())
                    .collect();
                Self::from_bytes(self.shape.clone(), DType::F16, bytes)
            }
            other => Err(TensorError::UnsupportedDType {
                op: "to_f16",
                dtype: other,
            }),
        }
    }

    /// Converts the elements to another dtype.
    ///
    /// Supported targets are `F32`, `F16`, `I32` and `I64`.
    pub fn cast(&self, dtype: DType) -> Result<Self, TensorError> {
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        match dtype {
            DType::F32 => Self::from_f32(self.shape.clone(), &self.to_f32_vec()?),
            DType::F16 => self.cast(DType::F32)?.to_f16(),
            DType::I64 => Self::from_i64(self.shape.clone(), &self.to_i64_vec()?),
            DType::I32 => {
                let bytes = self
                    .to_i64_vec()?
                    .into_iter()
                    .flat_map(|v| (v as i32).to_le_bytes())
                    .collect();
                Self::from_bytes(self.shape.clone(), DType::I32, bytes)
            }
            other => Err(TensorError::UnsupportedDType {
                op: "cast",
                dtype: other,
            }),
        }
    }
}

fn le8(c: &[u8]) -> [u8; 8] {
    [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]
}
