// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Normalization layers.

use super::{flat_f32, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{BatchNormParams, InstanceNormParams};
use ncnn_model::{LayerParams, Weight};

/// Flattened constant input `i`, checked to hold `channels` values.
fn per_channel(v: &NodeView<'_>, i: usize, what: &str, channels: Option<usize>) -> Result<Weight, ConvertError> {
    let name = v.input(i)?;
    let t = v.require_constant(i, what)?;
    if let Some(c) = channels.filter(|&c| c != t.num_elements()) {
        return Err(v.unsupported(
            what,
            format!("{} values for {c} channels", t.num_elements()),
        ));
    }
    Ok(Weight::raw(flat_f32(t, name)?))
}

pub(super) fn batch_norm(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let scale = per_channel(v, 1, "scale", None)?;
    let channels = scale.len();
    let bias = per_channel(v, 2, "bias", Some(channels))?;
    let mean = per_channel(v, 3, "mean", Some(channels))?;
    let var = per_channel(v, 4, "variance", Some(channels))?;
    let p = BatchNormParams {
        channels: channels as i32,
        eps: v.float("epsilon", 1e-5)?,
    };
    let layer = PendingLayer::new(v.layer_name(), LayerParams::BatchNorm(p), [v.input(0)?], [v.output()])
        .with_weights(vec![scale, mean, var, bias]);
    Ok(Translation::layer(layer))
}

pub(super) fn instance_norm(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let gamma = per_channel(v, 1, "scale", None)?;
    let channels = gamma.len();
    let beta = per_channel(v, 2, "bias", Some(channels))?;
    let p = InstanceNormParams {
        channels: channels as i32,
        eps: v.float("epsilon", 1e-5)?,
        affine: true,
    };
    let layer = PendingLayer::new(
        v.layer_name(),
        LayerParams::InstanceNorm(p),
        [v.input(0)?],
        [v.output()],
    )
    .with_weights(vec![gamma, beta]);
    Ok(Translation::layer(layer))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run, tensor};
    use super::*;
    use onnx_graph::GraphNode;

    #[test]
    fn test_batch_norm_weight_order() {
        let node = GraphNode::new("BatchNormalization", "bn", ["x", "s", "b", "m", "v"], ["y"]);
        let m = run(
            vec![node],
            vec![
                ("s", tensor(&[3], &[1.0, 1.0, 1.0])),
                ("b", tensor(&[3], &[2.0, 2.0, 2.0])),
                ("m", tensor(&[3], &[3.0, 3.0, 3.0])),
                ("v", tensor(&[3], &[4.0, 4.0, 4.0])),
            ],
            &["y"],
        )
        .unwrap();
        let layer = &m.layers()[1];
        let firsts: Vec<f32> = layer
            .weights
            .iter()
            .map(|w| w.data.to_f32_vec().unwrap()[0])
            .collect();
        assert_eq!(firsts, [1.0, 3.0, 4.0, 2.0]);
        assert_eq!(
            layer.params,
            LayerParams::BatchNorm(BatchNormParams {
                channels: 3,
                eps: 1e-5
            })
        );
    }

    #[test]
    fn test_batch_norm_channel_mismatch() {
        let node = GraphNode::new("BatchNormalization", "bn", ["x", "s", "b", "m", "v"], ["y"]);
        let err = run(
            vec![node],
            vec![
                ("s", tensor(&[3], &[1.0; 3])),
                ("b", tensor(&[2], &[0.0; 2])),
                ("m", tensor(&[3], &[0.0; 3])),
                ("v", tensor(&[3], &[1.0; 3])),
            ],
            &["y"],
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_instance_norm() {
        let node = GraphNode::new("InstanceNormalization", "in", ["x", "g", "b"], ["y"]);
        let m = run(
            vec![node],
            vec![("g", tensor(&[3], &[1.0; 3])), ("b", tensor(&[3], &[0.0; 3]))],
            &["y"],
        )
        .unwrap();
        assert_eq!(m.layers()[1].kind(), "InstanceNorm");
        assert_eq!(m.layers()[1].weights.len(), 2);
    }
}
