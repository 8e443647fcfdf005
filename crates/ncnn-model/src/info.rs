// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Summary of an image-to-image model: scale, channel counts, precision.

use crate::layer::{Precision, Storage};
use crate::params::LayerParams;
use crate::scale::infer_scale;
use crate::{NcnnModel, ScaleError};
use std::fmt;

/// Facts about a model that front ends display next to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub scale: u32,
    /// Input channels of the first convolution.
    pub in_channels: Option<u32>,
    /// Output channels of the first convolution.
    pub num_features: Option<u32>,
    /// Output channels of the last convolution, divided by the square of
    /// any pixel-shuffle factor that follows it.
    pub out_channels: Option<u32>,
    /// Storage precision of the first convolution's weights.
    pub precision: Option<Precision>,
    pub layers: usize,
    pub blobs: usize,
    pub weight_bytes: usize,
}

impl ModelInfo {
    pub fn inspect(model: &NcnnModel) -> Result<Self, ScaleError> {
        let scale = infer_scale(model)?;
        let convs: Vec<usize> = model
            .layers()
            .iter()
            .enumerate()
            .filter(|(_, l)| l.params.as_conv().is_some())
            .map(|(i, _)| i)
            .collect();

        let first = convs.first().map(|&i| &model.layers()[i]);
        let in_channels = first.and_then(|l| {
            let p = l.params.as_conv()?;
            let per_output = p.num_output.checked_mul(p.kernel_w)?.checked_mul(p.kernel_h)?;
            if per_output <= 0 {
                return None;
            }
            let group = match l.params {
                LayerParams::ConvolutionDepthWise(_) | LayerParams::DeconvolutionDepthWise(_) => {
                    p.group
                }
                _ => 1,
            };
            u32::try_from((p.weight_data_size / per_output).checked_mul(group)?).ok()
        });
        let num_features = first
            .and_then(|l| l.params.as_conv())
            .and_then(|p| u32::try_from(p.num_output).ok());
        let precision = first
            .and_then(|l| l.weights.first())
            .and_then(|w| match w.storage {
                Storage::Tagged(p) => Some(p),
                Storage::Raw => None,
            });

        let out_channels = convs.last().and_then(|&last| {
            let p = model.layers()[last].params.as_conv()?;
            let shuffle = model.layers()[last + 1..]
                .iter()
                .filter_map(|l| match &l.params {
                    LayerParams::PixelShuffle(s) => Some(s.factor),
                    _ => None,
                })
                .try_fold(1i32, |acc, f| acc.checked_mul(f)?.checked_mul(f))?;
            u32::try_from(p.num_output / shuffle.max(1)).ok()
        });

        Ok(Self {
            scale,
            in_channels,
            num_features,
            out_channels,
            precision,
            layers: model.layers().len(),
            blobs: model.blobs().len(),
            weight_bytes: model.weight_bytes(),
        })
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<u32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        writeln!(f, "Scale:        {}", self.scale)?;
        writeln!(f, "In channels:  {}", opt(self.in_channels))?;
        writeln!(f, "Out channels: {}", opt(self.out_channels))?;
        writeln!(f, "Features:     {}", opt(self.num_features))?;
        writeln!(
            f,
            "Precision:    {}",
            match self.precision {
                Some(Precision::F16) => "fp16",
                Some(Precision::F32) => "fp32",
                None => "?",
            }
        )?;
        write!(
            f,
            "Layers:       {} ({} blobs, {:.2} MB weights)",
            self.layers,
            self.blobs,
            self.weight_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BlobShape, ConvParams, ShuffleParams};
    use crate::{Blob, Layer, Weight};
    use tensor_core::{Shape, TensorData};

    fn conv_layer(name: &str, cin: i32, cout: i32, i: usize) -> Layer {
        let size = (cin * cout * 9) as usize;
        Layer {
            name: name.into(),
            params: LayerParams::Convolution(ConvParams {
                num_output: cout,
                kernel_w: 3,
                kernel_h: 3,
                weight_data_size: cin * cout * 9,
                ..Default::default()
            }),
            inputs: vec![i],
            outputs: vec![i + 1],
            weights: vec![Weight::tagged(
                TensorData::from_f32(Shape::vector(size), &vec![0.0; size])
                    .unwrap()
                    .to_f16()
                    .unwrap(),
            )],
        }
    }

    #[test]
    fn test_compact_sr_model_info() {
        let layers = vec![
            Layer {
                name: "in".into(),
                params: LayerParams::Input(BlobShape::default()),
                inputs: vec![],
                outputs: vec![0],
                weights: vec![],
            },
            conv_layer("c0", 3, 16, 0),
            conv_layer("c1", 16, 48, 1),
            Layer {
                name: "ps".into(),
                params: LayerParams::PixelShuffle(ShuffleParams { factor: 4, mode: 0 }),
                inputs: vec![2],
                outputs: vec![3],
                weights: vec![],
            },
        ];
        let blobs = (0..4)
            .map(|i| Blob {
                name: format!("b{i}"),
                producer: i,
            })
            .collect();
        let info = ModelInfo::inspect(&NcnnModel::new(layers, blobs).unwrap()).unwrap();
        assert_eq!(info.scale, 4);
        assert_eq!(info.in_channels, Some(3));
        assert_eq!(info.num_features, Some(16));
        assert_eq!(info.out_channels, Some(3));
        assert_eq!(info.precision, Some(Precision::F16));
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"precision\":\"fp16\""));
    }
}
