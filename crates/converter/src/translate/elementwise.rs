// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Binary arithmetic and n-ary reductions.

use super::{f32_values, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{BinaryOpParams, BinaryOpType, EltwiseOp, EltwiseParams};
use ncnn_model::LayerParams;

fn op_for(op_type: &str) -> Option<BinaryOpType> {
    Some(match op_type {
        "Add" => BinaryOpType::Add,
        "Sub" => BinaryOpType::Sub,
        "Mul" => BinaryOpType::Mul,
        "Div" => BinaryOpType::Div,
        "Max" => BinaryOpType::Max,
        "Min" => BinaryOpType::Min,
        "Pow" => BinaryOpType::Pow,
        _ => return None,
    })
}

/// A constant operand with exactly one value.
fn scalar(v: &NodeView<'_>, name: &str) -> Result<Option<f32>, ConvertError> {
    match v.constant_of(name) {
        Some(t) if t.num_elements() == 1 => Ok(f32_values(t, name)?.first().copied()),
        _ => Ok(None),
    }
}

pub(super) fn binary(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let op = op_for(v.op_type()).ok_or_else(|| ConvertError::UnsupportedOperator {
        op_type: v.op_type().to_string(),
        node: v.name(),
    })?;
    let arity = v.node.inputs.iter().filter(|i| !i.is_empty()).count();
    match arity {
        1 => return Ok(Translation::alias(v.output(), v.input(0)?)),
        2 => {}
        _ if op == BinaryOpType::Max => return eltwise(v, EltwiseOp::Max),
        n => return Err(v.unsupported("inputs", format!("{n} operands"))),
    }

    let a = v.input(0)?;
    let b = v.input(1)?;
    let (inputs, params) = if let Some(value) = scalar(v, b)? {
        (vec![a], with_scalar(op, value))
    } else if let (Some(value), Some(swapped)) = (scalar(v, a)?, op.swapped()) {
        (vec![b], with_scalar(swapped, value))
    } else {
        (
            vec![a, b],
            BinaryOpParams {
                op,
                with_scalar: false,
                b: 0.0,
            },
        )
    };
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::BinaryOp(params),
        inputs,
        [v.output()],
    )))
}

fn with_scalar(op: BinaryOpType, b: f32) -> BinaryOpParams {
    BinaryOpParams {
        op,
        with_scalar: true,
        b,
    }
}

pub(super) fn sum(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    if v.node.inputs.iter().filter(|i| !i.is_empty()).count() == 1 {
        return Ok(Translation::alias(v.output(), v.input(0)?));
    }
    eltwise(v, EltwiseOp::Sum)
}

fn eltwise(v: &NodeView<'_>, op: EltwiseOp) -> Result<Translation, ConvertError> {
    let inputs: Vec<&str> = v
        .node
        .inputs
        .iter()
        .filter(|i| !i.is_empty())
        .map(String::as_str)
        .collect();
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::Eltwise(EltwiseParams {
            op,
            coeffs: Vec::new(),
        }),
        inputs,
        [v.output()],
    )))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{kinds, ramp, run, tensor};
    use super::*;
    use onnx_graph::GraphNode;

    fn params(m: &ncnn_model::NcnnModel, i: usize) -> BinaryOpParams {
        match &m.layers()[i].params {
            LayerParams::BinaryOp(p) => p.clone(),
            other => panic!("expected BinaryOp, got {}", other.kind()),
        }
    }

    #[test]
    fn test_right_scalar() {
        let node = GraphNode::new("Div", "d", ["x", "k"], ["y"]);
        let m = run(vec![node], vec![("k", tensor(&[], &[255.0]))], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "BinaryOp"]);
        assert_eq!(params(&m, 1), with_scalar(BinaryOpType::Div, 255.0));
    }

    #[test]
    fn test_left_scalar_swaps_operation() {
        let node = GraphNode::new("Sub", "s", ["k", "x"], ["y"]);
        let m = run(vec![node], vec![("k", tensor(&[1], &[1.0]))], &["y"]).unwrap();
        assert_eq!(params(&m, 1), with_scalar(BinaryOpType::RSub, 1.0));
    }

    #[test]
    fn test_left_scalar_pow_materializes() {
        let node = GraphNode::new("Pow", "p", ["k", "x"], ["y"]);
        let m = run(vec![node], vec![("k", tensor(&[1], &[2.0]))], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "MemoryData", "BinaryOp"]);
        assert!(!params(&m, 2).with_scalar);
    }

    #[test]
    fn test_two_activations() {
        let nodes = vec![
            GraphNode::new("Relu", "r", ["x"], ["a"]),
            GraphNode::new("Add", "add", ["x", "a"], ["y"]),
        ];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "Split", "ReLU", "BinaryOp"]);
        assert_eq!(m.layers()[3].inputs.len(), 2);
    }

    #[test]
    fn test_sum_becomes_eltwise() {
        let nodes = vec![
            GraphNode::new("Relu", "r", ["x"], ["a"]),
            GraphNode::new("Sum", "s", ["x", "a", "k"], ["y"]),
        ];
        let m = run(nodes, vec![("k", ramp(&[1, 3, 8, 8]))], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "Split", "ReLU", "MemoryData", "Eltwise"]);
    }
}
