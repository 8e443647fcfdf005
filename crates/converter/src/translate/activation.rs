// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Activations and elementwise unary functions.

use super::{flat_f32, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{HardSigmoidParams, UnaryOpType};
use ncnn_model::{LayerParams, Weight};
use onnx_graph::GraphNode;

fn single(v: &NodeView<'_>, params: LayerParams) -> Result<Translation, ConvertError> {
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        params,
        [v.input(0)?],
        [v.output()],
    )))
}

pub(super) fn relu(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    single(v, LayerParams::ReLU { slope: 0.0 })
}

pub(super) fn leaky_relu(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let slope = v.float("alpha", 0.01)?;
    single(v, LayerParams::ReLU { slope })
}

pub(super) fn prelu(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let slope_name = v.input(1)?;
    let slope = v.require_constant(1, "PRelu slopes")?;
    let data = flat_f32(slope, slope_name)?;
    let layer = PendingLayer::new(
        v.layer_name(),
        LayerParams::PReLU {
            num_slope: data.num_elements() as i32,
        },
        [v.input(0)?],
        [v.output()],
    )
    .with_weights(vec![Weight::raw(data)]);
    Ok(Translation::layer(layer))
}

/// Returns the `Mul` that multiplies `gate`'s output by `x`, if it is the
/// gate's only reader.
fn gating_mul<'a>(v: &NodeView<'a>, x: &str) -> Option<(usize, &'a GraphNode)> {
    let (idx, mul) = v.sole_consumer(v.output())?;
    let gate = v.output();
    let matches = mul.op_type == "Mul"
        && mul.inputs.len() == 2
        && ((mul.inputs[0] == x && mul.inputs[1] == gate)
            || (mul.inputs[0] == gate && mul.inputs[1] == x));
    matches.then_some((idx, mul))
}

pub(super) fn sigmoid(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    if let Some((idx, mul)) = gating_mul(v, x) {
        let layer = PendingLayer::new(v.layer_name(), LayerParams::Swish, [x], [mul.output()]);
        return Ok(Translation::layer(layer).absorbing([idx]));
    }
    single(v, LayerParams::Sigmoid)
}

pub(super) fn hard_sigmoid(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let p = HardSigmoidParams {
        alpha: v.float("alpha", 0.2)?,
        beta: v.float("beta", 0.5)?,
    };
    if let Some((idx, mul)) = gating_mul(v, x) {
        let layer = PendingLayer::new(v.layer_name(), LayerParams::HardSwish(p), [x], [mul.output()]);
        return Ok(Translation::layer(layer).absorbing([idx]));
    }
    single(v, LayerParams::HardSigmoid(p))
}

pub(super) fn hard_swish(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    single(
        v,
        LayerParams::HardSwish(HardSigmoidParams {
            alpha: 1.0 / 6.0,
            beta: 0.5,
        }),
    )
}

pub(super) fn tanh(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    single(v, LayerParams::TanH)
}

pub(super) fn clip(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let (min, max) = v
        .clip_bounds(v.node)?
        .ok_or_else(|| v.dynamic(v.output(), "Clip bounds must be constant"))?;
    single(v, LayerParams::Clip { min, max })
}

pub(super) fn elu(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let alpha = v.float("alpha", 1.0)?;
    single(v, LayerParams::Elu { alpha })
}

pub(super) fn softmax(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let default = if v.opset() < 13 { 1 } else { -1 };
    let axis = v.int("axis", default)?;
    let rank = v.rank_of(v.input(0)?);
    let axis = v.batchless_axis("axis", axis, rank)?;
    single(v, LayerParams::Softmax { axis })
}

pub(super) fn unary(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let op = match v.op_type() {
        "Abs" => UnaryOpType::Abs,
        "Neg" => UnaryOpType::Neg,
        "Floor" => UnaryOpType::Floor,
        "Ceil" => UnaryOpType::Ceil,
        "Sqrt" => UnaryOpType::Sqrt,
        "Exp" => UnaryOpType::Exp,
        "Log" => UnaryOpType::Log,
        "Sin" => UnaryOpType::Sin,
        "Cos" => UnaryOpType::Cos,
        "Tan" => UnaryOpType::Tan,
        "Asin" => UnaryOpType::Asin,
        "Acos" => UnaryOpType::Acos,
        "Atan" => UnaryOpType::Atan,
        "Reciprocal" => UnaryOpType::Reciprocal,
        other => {
            return Err(ConvertError::UnsupportedOperator {
                op_type: other.to_string(),
                node: v.name(),
            })
        }
    };
    single(v, LayerParams::UnaryOp(op))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{kinds, run, run_with, tensor};
    use super::*;
    use onnx_graph::Attribute;

    #[test]
    fn test_swish_fusion() {
        let nodes = vec![
            GraphNode::new("Sigmoid", "sig", ["x"], ["s"]),
            GraphNode::new("Mul", "mul", ["x", "s"], ["y"]),
        ];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "Swish"]);
        assert_eq!(m.blobs()[m.layers()[1].outputs[0]].name, "y");
    }

    #[test]
    fn test_sigmoid_gate_of_other_tensor_not_fused() {
        let nodes = vec![
            GraphNode::new("Relu", "r", ["x"], ["a"]),
            GraphNode::new("Sigmoid", "sig", ["x"], ["s"]),
            GraphNode::new("Mul", "mul", ["a", "s"], ["y"]),
        ];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "Split", "ReLU", "Sigmoid", "BinaryOp"]);
    }

    #[test]
    fn test_hard_swish_fusion_keeps_coefficients() {
        let nodes = vec![
            GraphNode::new("HardSigmoid", "hs", ["x"], ["s"])
                .with_attr("alpha", Attribute::Float(0.25)),
            GraphNode::new("Mul", "mul", ["s", "x"], ["y"]),
        ];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(
            m.layers()[1].params,
            LayerParams::HardSwish(HardSigmoidParams {
                alpha: 0.25,
                beta: 0.5
            })
        );
    }

    #[test]
    fn test_leaky_relu_default_slope() {
        let m = run(vec![GraphNode::new("LeakyRelu", "l", ["x"], ["y"])], vec![], &["y"]).unwrap();
        assert_eq!(m.layers()[1].params, LayerParams::ReLU { slope: 0.01 });
    }

    #[test]
    fn test_prelu_slopes_flattened() {
        let node = GraphNode::new("PRelu", "p", ["x", "slope"], ["y"]);
        let m = run(
            vec![node],
            vec![("slope", tensor(&[3, 1, 1], &[0.1, 0.2, 0.3]))],
            &["y"],
        )
        .unwrap();
        let layer = &m.layers()[1];
        assert_eq!(layer.params, LayerParams::PReLU { num_slope: 3 });
        assert_eq!(layer.weights[0].data.shape().dims(), &[3]);
    }

    #[test]
    fn test_clip_from_attributes_before_opset_11() {
        let node = GraphNode::new("Clip", "c", ["x"], ["y"])
            .with_attr("min", Attribute::Float(0.0))
            .with_attr("max", Attribute::Float(6.0));
        let m = run_with(
            vec![node],
            vec![],
            vec![super::super::tests::nchw("x", 3, 8, 8)],
            &["y"],
            9,
        )
        .unwrap();
        assert_eq!(m.layers()[1].params, LayerParams::Clip { min: 0.0, max: 6.0 });
    }

    #[test]
    fn test_clip_with_dynamic_bound_rejected() {
        let nodes = vec![
            GraphNode::new("Relu", "r", ["x"], ["hi"]),
            GraphNode::new("Clip", "c", ["x", "", "hi"], ["y"]),
        ];
        let err = run(nodes, vec![], &["y"]).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedDynamicShape { .. }));
    }

    #[test]
    fn test_softmax_axis_drops_batch() {
        let node = GraphNode::new("Softmax", "sm", ["x"], ["y"]).with_attr("axis", Attribute::Int(1));
        let m = run(vec![node], vec![], &["y"]).unwrap();
        assert_eq!(m.layers()[1].params, LayerParams::Softmax { axis: 0 });
    }

    #[test]
    fn test_unary_mapping() {
        let m = run(vec![GraphNode::new("Sqrt", "s", ["x"], ["y"])], vec![], &["y"]).unwrap();
        assert_eq!(m.layers()[1].params, LayerParams::UnaryOp(UnaryOpType::Sqrt));
    }
}
