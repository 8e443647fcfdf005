// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Half-precision narrowing of convolution and inner-product weights.
//!
//! Only the tagged main weight of the convolution kinds and of
//! `InnerProduct` is narrowed. Biases, normalization statistics, PReLU
//! slopes and constant blobs stay `f32`.

use crate::layer::{Precision, Storage, Weight};
use crate::params::LayerParams;
use crate::{ModelError, NcnnModel};

/// What a narrowing pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrowReport {
    /// Weights converted from f32 to f16.
    pub narrowed: usize,
    /// Eligible weights that were already f16.
    pub already_half: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Whether the kind's tagged weights may be stored in half precision.
pub fn is_narrowable(params: &LayerParams) -> bool {
    matches!(
        params,
        LayerParams::Convolution(_)
            | LayerParams::ConvolutionDepthWise(_)
            | LayerParams::Deconvolution(_)
            | LayerParams::DeconvolutionDepthWise(_)
            | LayerParams::InnerProduct(_)
    )
}

/// Narrows eligible weights to f16 with round-to-nearest-even.
///
/// Running the pass on an already narrowed model changes nothing.
pub fn narrow_to_half(model: &mut NcnnModel) -> Result<NarrowReport, ModelError> {
    let mut report = NarrowReport {
        bytes_before: model.weight_bytes(),
        ..Default::default()
    };

    for layer in model.layers_mut() {
        if !is_narrowable(&layer.params) {
            continue;
        }
        for weight in &mut layer.weights {
            match weight.storage {
                Storage::Tagged(Precision::F32) => {
                    let data = weight.data.to_f16().map_err(|source| ModelError::Tensor {
                        layer: layer.name.clone(),
                        source,
                    })?;
                    *weight = Weight {
                        data,
                        storage: Storage::Tagged(Precision::F16),
                    };
                    report.narrowed += 1;
                }
                Storage::Tagged(Precision::F16) => report.already_half += 1,
                Storage::Raw => {}
            }
        }
    }

    report.bytes_after = model.weight_bytes();
    tracing::debug!(
        "narrowed {} weights to f16 ({} -> {} bytes)",
        report.narrowed,
        report.bytes_before,
        report.bytes_after
    );
    Ok(report)
}
