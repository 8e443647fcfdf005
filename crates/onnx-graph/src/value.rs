// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape hints and conversions between protobuf tensors and [`TensorData`].

use crate::proto::{self, data_type, type_proto, TensorProto, ValueInfoProto};
use crate::GraphError;
use std::fmt;
use tensor_core::{DType, Shape, TensorData};

/// One dimension of a shape hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    /// A dimension known when the document was exported.
    Fixed(usize),
    /// A dimension only known at inference time (e.g. `"height"`).
    Symbolic(String),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(d) => write!(f, "{d}"),
            Dim::Symbolic(s) => write!(f, "{s}"),
        }
    }
}

/// Name, element type and (possibly partial) shape of a graph value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub dtype: Option<DType>,
    pub shape: Option<Vec<Dim>>,
}

impl ValueInfo {
    /// Creates a value with an unknown type and shape.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dtype: None,
            shape: None,
        }
    }

    /// Creates an `F32` value with the given shape hint.
    pub fn with_shape(name: &str, shape: Vec<Dim>) -> Self {
        Self {
            name: name.to_string(),
            dtype: Some(DType::F32),
            shape: Some(shape),
        }
    }

    /// Returns the shape if every dimension is fixed.
    pub fn static_shape(&self) -> Option<Shape> {
        static_shape(self.shape.as_deref()?)
    }
}

/// Returns the shape if every dimension in `dims` is fixed.
pub fn static_shape(dims: &[Dim]) -> Option<Shape> {
    dims.iter()
        .map(|d| match d {
            Dim::Fixed(v) => Some(*v),
            Dim::Symbolic(_) => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(Shape::new)
}

/// Maps an ONNX `TensorProto.DataType` code to a [`DType`].
pub fn dtype_from_onnx(code: i32) -> Option<DType> {
    match code {
        data_type::FLOAT => Some(DType::F32),
        data_type::UINT8 => Some(DType::U8),
        data_type::INT8 => Some(DType::I8),
        data_type::INT32 => Some(DType::I32),
        data_type::INT64 => Some(DType::I64),
        data_type::BOOL => Some(DType::Bool),
        data_type::FLOAT16 => Some(DType::F16),
        data_type::DOUBLE => Some(DType::F64),
        _ => None,
    }
}

/// Maps a [`DType`] to its ONNX `TensorProto.DataType` code.
pub fn dtype_to_onnx(dtype: DType) -> i32 {
    match dtype {
        DType::F32 => data_type::FLOAT,
        DType::U8 => data_type::UINT8,
        DType::I8 => data_type::INT8,
        DType::I32 => data_type::INT32,
        DType::I64 => data_type::INT64,
        DType::Bool => data_type::BOOL,
        DType::F16 => data_type::FLOAT16,
        DType::F64 => data_type::DOUBLE,
    }
}

/// Decodes a protobuf tensor into owned little-endian bytes.
pub(crate) fn tensor_from_proto(t: &TensorProto) -> Result<TensorData, GraphError> {
    if t.data_location == proto::DATA_LOCATION_EXTERNAL {
        return Err(GraphError::MalformedGraph(format!(
            "tensor '{}' uses external data, which is not supported",
            t.name
        )));
    }
    let dtype = dtype_from_onnx(t.data_type).ok_or_else(|| {
        GraphError::MalformedGraph(format!(
            "tensor '{}' has unsupported data type {}",
            t.name, t.data_type
        ))
    })?;
    let shape = Shape::from_i64(&t.dims).ok_or_else(|| {
        GraphError::MalformedGraph(format!("tensor '{}' has negative dims {:?}", t.name, t.dims))
    })?;

    let bytes: Vec<u8> = if !t.raw_data.is_empty() {
        t.raw_data.clone()
    } else {
        match dtype {
            DType::F32 => t.float_data.iter().flat_map(|v| v.to_le_bytes()).collect(),
            DType::F64 => t.double_data.iter().flat_map(|v| v.to_le_bytes()).collect(),
            DType::I64 => t.int64_data.iter().flat_map(|v| v.to_le_bytes()).collect(),
            DType::I32 => t.int32_data.iter().flat_map(|v| v.to_le_bytes()).collect(),
            // Narrow types are widened into int32_data by the ONNX schema.
            DType::F16 => t
                .int32_data
                .iter()
                .flat_map(|&v| (v as u16).to_le_bytes())
                .collect(),
            DType::I8 | DType::U8 | DType::Bool => t.int32_data.iter().map(|&v| v as u8).collect(),
        }
    };

    TensorData::from_bytes(shape, dtype, bytes).map_err(|source| GraphError::Tensor {
        name: t.name.clone(),
        source,
    })
}

impl TensorProto {
    /// Encodes a tensor as a protobuf initializer using `raw_data`.
    pub fn from_tensor(name: &str, tensor: &TensorData) -> Self {
        Self {
            dims: tensor.shape().dims().iter().map(|&d| d as i64).collect(),
            data_type: dtype_to_onnx(tensor.dtype()),
            name: name.to_string(),
            raw_data: tensor.as_bytes().to_vec(),
            ..Default::default()
        }
    }
}

impl ValueInfoProto {
    /// Encodes a value with an element type and shape hint.
    pub fn from_value_info(info: &ValueInfo) -> Self {
        let shape = info.shape.as_ref().map(|dims| proto::TensorShapeProto {
            dim: dims
                .iter()
                .map(|d| proto::tensor_shape_proto::Dimension {
                    value: Some(match d {
                        Dim::Fixed(v) => {
                            proto::tensor_shape_proto::dimension::Value::DimValue(*v as i64)
                        }
                        Dim::Symbolic(s) => {
                            proto::tensor_shape_proto::dimension::Value::DimParam(s.clone())
                        }
                    }),
                })
                .collect(),
        });
        Self {
            name: info.name.clone(),
            r#type: Some(proto::TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: info.dtype.map(dtype_to_onnx).unwrap_or(0),
                    shape,
                })),
            }),
        }
    }
}

/// Decodes a value-info record into a shape hint.
pub(crate) fn value_info_from_proto(v: &ValueInfoProto) -> ValueInfo {
    use proto::tensor_shape_proto::dimension::Value;

    let tensor_type = v.r#type.as_ref().and_then(|t| match &t.value {
        Some(type_proto::Value::TensorType(tt)) => Some(tt),
        None => None,
    });
    let dtype = tensor_type.and_then(|tt| dtype_from_onnx(tt.elem_type));
    let shape = tensor_type.and_then(|tt| tt.shape.as_ref()).map(|s| {
        s.dim
            .iter()
            .enumerate()
            .map(|(i, d)| match &d.value {
                Some(Value::DimValue(v)) if *v >= 0 => Dim::Fixed(*v as usize),
                Some(Value::DimParam(p)) if !p.is_empty() => Dim::Symbolic(p.clone()),
                _ => Dim::Symbolic(format!("?{i}")),
            })
            .collect()
    });
    ValueInfo {
        name: v.name.clone(),
        dtype,
        shape,
    }
}
