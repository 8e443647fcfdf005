// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operators that produce no layer of their own.

use super::{NodeView, Translation};
use crate::ConvertError;
use onnx_graph::optimize::constant_value;
use onnx_graph::value::dtype_from_onnx;

pub(super) fn identity(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    Ok(Translation::alias(v.output(), v.input(0)?))
}

pub(super) fn constant(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let value = constant_value(v.node)?
        .ok_or_else(|| v.unsupported("value", "no supported value encoding"))?;
    Ok(Translation::constant(v.output(), value))
}

pub(super) fn cast(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let to = v.int("to", 0)?;
    let dtype = i32::try_from(to)
        .ok()
        .and_then(dtype_from_onnx)
        .ok_or_else(|| v.unsupported("to", format!("unknown data type {to}")))?;
    let x = v.input(0)?;
    if let Some(value) = v.constant(0) {
        let cast = value.cast(dtype).map_err(ConvertError::tensor(x))?;
        return Ok(Translation::constant(v.output(), cast));
    }
    if dtype.is_float() {
        // Activations are always f32 at runtime.
        return Ok(Translation::alias(v.output(), x));
    }
    Err(v.unsupported("to", format!("casting activations to {dtype}")))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{kinds, run};
    use onnx_graph::{Attribute, GraphNode};

    #[test]
    fn test_float_cast_is_alias() {
        let nodes = vec![
            GraphNode::new("Cast", "c", ["x"], ["a"]).with_attr("to", Attribute::Int(1)),
            GraphNode::new("Relu", "r", ["a"], ["y"]),
        ];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "ReLU"]);
    }

    #[test]
    fn test_integer_cast_of_activation_rejected() {
        let node = GraphNode::new("Cast", "c", ["x"], ["y"]).with_attr("to", Attribute::Int(7));
        assert!(run(vec![node], vec![], &["y"]).is_err());
    }

    #[test]
    fn test_dropout_output_keeps_name() {
        let nodes = vec![GraphNode::new("Dropout", "drop", ["x"], ["y"])];
        let m = run(nodes, vec![], &["y"]).unwrap();
        assert_eq!(kinds(&m), ["Input", "Split"]);
        assert_eq!(m.layers()[1].name, "drop");
    }
}
