// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layers and the weights they own.
//!
//! Weights are stored flattened: the `.bin` stream carries no shapes, so
//! every weight is a 1-D tensor in the layout the layer kind expects.

use crate::params::LayerParams;
use tensor_core::{DType, TensorData};

/// Element precision of a tagged weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Precision {
    #[serde(rename = "fp32")]
    F32,
    #[serde(rename = "fp16")]
    F16,
}

impl Precision {
    /// The 4-byte tag that precedes a tagged weight in the `.bin` stream.
    pub fn tag(self) -> u32 {
        match self {
            Precision::F32 => 0x0000_0000,
            Precision::F16 => 0x0130_6B47,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x0000_0000 => Some(Precision::F32),
            0x0130_6B47 => Some(Precision::F16),
            _ => None,
        }
    }

    pub fn dtype(self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
        }
    }
}

/// How a weight is laid out in the `.bin` stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Plain little-endian `f32`, no tag.
    Raw,
    /// A storage tag followed by the payload in the given precision.
    /// Half payloads are padded to a 4-byte boundary.
    Tagged(Precision),
}

/// One weight array of a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Weight {
    pub data: TensorData,
    pub storage: Storage,
}

impl Weight {
    pub fn raw(data: TensorData) -> Self {
        Self {
            data,
            storage: Storage::Raw,
        }
    }

    pub fn tagged(data: TensorData) -> Self {
        let precision = if data.dtype() == DType::F16 {
            Precision::F16
        } else {
            Precision::F32
        };
        Self {
            data,
            storage: Storage::Tagged(precision),
        }
    }

    pub fn len(&self) -> usize {
        self.data.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dtype the storage class requires.
    pub fn expected_dtype(&self) -> DType {
        match self.storage {
            Storage::Raw => DType::F32,
            Storage::Tagged(p) => p.dtype(),
        }
    }

    /// Number of bytes this weight occupies in the `.bin` stream.
    pub fn encoded_len(&self) -> usize {
        let payload = self.data.size_bytes();
        match self.storage {
            Storage::Raw => payload,
            Storage::Tagged(_) => 4 + align4(payload),
        }
    }
}

pub(crate) fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// One node of the runtime model.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Unique layer name.
    pub name: String,
    /// Kind and kind-specific parameters.
    pub params: LayerParams,
    /// Input blob indices.
    pub inputs: Vec<usize>,
    /// Output blob indices.
    pub outputs: Vec<usize>,
    /// Weights in the order the kind reads them.
    pub weights: Vec<Weight>,
}

impl Layer {
    /// The ncnn type tag, e.g. `"Convolution"`.
    pub fn kind(&self) -> &str {
        self.params.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    #[test]
    fn test_tag_bytes() {
        assert_eq!(Precision::F16.tag().to_le_bytes(), [0x47, 0x6B, 0x30, 0x01]);
        assert_eq!(Precision::from_tag(0), Some(Precision::F32));
        assert_eq!(Precision::from_tag(7), None);
    }

    #[test]
    fn test_encoded_len_pads_half() {
        let t = TensorData::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(Weight::raw(t.clone()).encoded_len(), 12);
        assert_eq!(Weight::tagged(t.clone()).encoded_len(), 16);
        let half = Weight::tagged(t.to_f16().unwrap());
        assert_eq!(half.storage, Storage::Tagged(Precision::F16));
        assert_eq!(half.encoded_len(), 4 + 8);
    }
}
