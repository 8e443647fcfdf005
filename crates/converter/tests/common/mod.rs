// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Builders for small ONNX models used across the integration tests.

#![allow(dead_code)]

use onnx_graph::{Attribute, Dim, GraphDocument, GraphNode, GraphParts, ValueInfo};
use tensor_core::{Shape, TensorData};

pub fn nchw(name: &str, c: usize, h: usize, w: usize) -> ValueInfo {
    ValueInfo::with_shape(name, [1, c, h, w].into_iter().map(Dim::Fixed).collect())
}

pub fn ramp(dims: &[usize], step: f32) -> TensorData {
    let n: usize = dims.iter().product();
    let values: Vec<f32> = (0..n).map(|i| i as f32 * step).collect();
    TensorData::from_f32(Shape::new(dims.to_vec()), &values).unwrap()
}

pub fn ints(values: &[i64]) -> TensorData {
    TensorData::from_i64(Shape::vector(values.len()), values).unwrap()
}

pub fn floats(values: &[f32]) -> TensorData {
    TensorData::from_f32(Shape::vector(values.len()), values).unwrap()
}

/// A document with one `[1, 3, 8, 8]` input named `x`.
pub struct ModelFixture {
    pub nodes: Vec<GraphNode>,
    pub initializers: Vec<(String, TensorData)>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<String>,
    pub opset: i64,
}

impl ModelFixture {
    pub fn new(nodes: Vec<GraphNode>, outputs: &[&str]) -> Self {
        Self {
            nodes,
            initializers: Vec::new(),
            inputs: vec![nchw("x", 3, 8, 8)],
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            opset: 13,
        }
    }

    pub fn init(mut self, name: &str, value: TensorData) -> Self {
        self.initializers.push((name.to_string(), value));
        self
    }

    pub fn input(mut self, info: ValueInfo) -> Self {
        self.inputs = vec![info];
        self
    }

    pub fn opset(mut self, opset: i64) -> Self {
        self.opset = opset;
        self
    }

    pub fn parts(self) -> GraphParts {
        GraphParts {
            name: "test".into(),
            producer: "tests".into(),
            opset: self.opset,
            nodes: self.nodes,
            initializers: self.initializers.into_iter().collect(),
            inputs: self.inputs,
            outputs: self.outputs.iter().map(|o| ValueInfo::named(o)).collect(),
            ..GraphParts::default()
        }
    }

    /// Serialized ONNX bytes.
    pub fn bytes(self) -> Vec<u8> {
        GraphDocument::from_parts(self.parts()).unwrap().to_bytes()
    }
}

pub fn conv(name: &str, input: &str, weight: &str, bias: &str, output: &str) -> GraphNode {
    GraphNode::new("Conv", name, [input, weight, bias], [output])
        .with_attr("kernel_shape", Attribute::Ints(vec![3, 3]))
        .with_attr("pads", Attribute::Ints(vec![1, 1, 1, 1]))
}

/// `Conv(3 -> 4 * r * r) -> DepthToSpace(r) -> Resize(x2)`: scale `2r`.
pub fn upscaler(r: usize) -> ModelFixture {
    let out = 3 * r * r;
    ModelFixture::new(
        vec![
            conv("conv0", "x", "w0", "b0", "c0"),
            GraphNode::new("Relu", "relu0", ["c0"], ["r0"]),
            GraphNode::new("DepthToSpace", "d2s", ["r0"], ["s0"])
                .with_attr("blocksize", Attribute::Int(r as i64))
                .with_attr("mode", Attribute::String("CRD".into())),
            GraphNode::new("Resize", "up", ["s0", "", "scales"], ["y"])
                .with_attr("mode", Attribute::String("nearest".into())),
        ],
        &["y"],
    )
    .init("w0", ramp(&[out, 3, 3, 3], 0.01))
    .init("b0", ramp(&[out], 0.1))
    .init("scales", floats(&[1.0, 1.0, 2.0, 2.0]))
}
