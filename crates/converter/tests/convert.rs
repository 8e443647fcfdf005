// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end conversions through [`Converter`].

mod common;

use common::*;
use converter::{ConvertError, ConvertOptions, Converter};
use ncnn_model::params::Activation;
use ncnn_model::{narrow_to_half, LayerParams, NcnnModel, Precision, Storage};
use onnx_graph::{Attribute, GraphNode};

fn full_precision() -> Converter {
    Converter::new(ConvertOptions {
        fp16: false,
        optimize: true,
    })
}

#[test]
fn test_conv_add_relu_becomes_one_layer() {
    let bytes = ModelFixture::new(
        vec![
            conv("conv", "x", "w", "b", "c"),
            GraphNode::new("Add", "add", ["c", "shift"], ["a"]),
            GraphNode::new("Relu", "relu", ["a"], ["y"]),
        ],
        &["y"],
    )
    .init("w", ramp(&[4, 3, 3, 3], 0.5))
    .init("b", floats(&[0.0; 4]))
    .init("shift", ramp(&[4, 1, 1], 1.0))
    .bytes();

    let out = full_precision().convert(&bytes).unwrap();
    let layers = out.model().layers();
    assert_eq!(layers.len(), 2);
    let p = layers[1].params.as_conv().unwrap();
    assert!(p.bias_term);
    assert_eq!(p.activation, Activation::ReLU);
    assert_eq!(layers[1].weights[1].data.to_f32_vec().unwrap(), [0.0, 1.0, 2.0, 3.0]);

    let lines: Vec<&str> = out.param().lines().collect();
    assert_eq!(lines[0], "7767517");
    assert_eq!(lines[1], "2 2");
    assert!(lines[3].starts_with("Convolution"));
    assert!(lines[3].contains(" 5=1"));
    assert!(lines[3].contains(" 9=1"));
    // tag + 108 f32 weights + 4 f32 biases
    assert_eq!(out.bin().len(), 4 + 108 * 4 + 4 * 4);
}

#[test]
fn test_conversion_is_deterministic() {
    let a = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    let b = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    assert_eq!(a.param(), b.param());
    assert_eq!(a.bin(), b.bin());
}

#[test]
fn test_unused_weights_are_dropped() {
    let with_dead = upscaler(2).init("orphan", ramp(&[1024], 1.0)).bytes();
    let without = upscaler(2).bytes();
    let a = full_precision().convert(&with_dead).unwrap();
    let b = full_precision().convert(&without).unwrap();
    assert_eq!(a.bin().len(), b.bin().len());
    assert!(a.model().layers().iter().all(|l| l.kind() != "MemoryData"));
}

#[test]
fn test_dead_branch_removed_by_optimizer() {
    let bytes = ModelFixture::new(
        vec![
            GraphNode::new("Relu", "keep", ["x"], ["y"]),
            GraphNode::new("Mul", "dead", ["x", "big"], ["unused"]),
        ],
        &["y"],
    )
    .init("big", ramp(&[1, 3, 8, 8], 1.0))
    .bytes();
    let out = full_precision().convert(&bytes).unwrap();
    assert_eq!(out.model().layers().len(), 2);
    assert!(out.bin().is_empty());
}

#[test]
fn test_unsupported_operator_produces_no_files() {
    let bytes = ModelFixture::new(
        vec![
            GraphNode::new("Relu", "relu", ["x"], ["r"]),
            GraphNode::new("GridSample", "warp", ["r", "x"], ["y"]),
        ],
        &["y"],
    )
    .bytes();
    let dir = tempfile::tempdir().unwrap();
    let result = Converter::default()
        .convert(&bytes)
        .and_then(|m| m.write_to(dir.path(), "x1"));
    assert!(matches!(
        result,
        Err(ConvertError::UnsupportedOperator { ref op_type, ref node }) if op_type == "GridSample" && node == "warp"
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unsorted_graph_needs_optimizer() {
    let graph = || {
        ModelFixture::new(
            vec![
                GraphNode::new("Sigmoid", "late", ["a"], ["y"]),
                GraphNode::new("Relu", "early", ["x"], ["a"]),
            ],
            &["y"],
        )
    };
    let raw = Converter::new(ConvertOptions {
        fp16: true,
        optimize: false,
    });
    assert!(matches!(
        raw.convert(&graph().bytes()),
        Err(ConvertError::OrderingViolation { .. })
    ));

    let out = Converter::default().convert(&graph().bytes()).unwrap();
    let kinds: Vec<_> = out.model().layers().iter().map(|l| l.kind()).collect();
    assert_eq!(kinds, ["Input", "ReLU", "Sigmoid"]);
}

#[test]
fn test_malformed_bytes_rejected() {
    let err = Converter::default().convert(b"definitely not protobuf").unwrap_err();
    assert!(matches!(err, ConvertError::Graph(ref e) if e.is_malformed()));
}

#[test]
fn test_emitted_model_loads_back_identically() {
    for fp16 in [false, true] {
        let out = Converter::new(ConvertOptions { fp16, optimize: true })
            .convert(&upscaler(3).bytes())
            .unwrap();
        let loaded = NcnnModel::from_param_and_bin(out.param(), out.bin()).unwrap();
        assert_eq!(&loaded, out.model());
    }
}

#[test]
fn test_narrowing_twice_changes_nothing() {
    let out = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    let conv = &out.model().layers()[1];
    assert_eq!(conv.weights[0].storage, Storage::Tagged(Precision::F16));
    assert_eq!(conv.weights[1].storage, Storage::Raw);

    let mut again = out.model().clone();
    let report = narrow_to_half(&mut again).unwrap();
    assert_eq!(report.narrowed, 0);
    assert_eq!(report.already_half, 1);
    assert_eq!(&again, out.model());
}

#[test]
fn test_scale_composes_through_pipeline() {
    let out = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    assert_eq!(out.scale().unwrap(), 4);
    let out = Converter::default().convert(&upscaler(3).bytes()).unwrap();
    assert_eq!(out.scale().unwrap(), 6);

    let info = out.info().unwrap();
    assert_eq!(info.in_channels, Some(3));
    assert_eq!(info.num_features, Some(27));
    assert_eq!(info.precision, Some(Precision::F16));
}

#[test]
fn test_residual_branch_gets_split() {
    let bytes = ModelFixture::new(
        vec![
            conv("conv", "x", "w", "b", "c"),
            GraphNode::new("Add", "skip", ["c", "x"], ["y"]),
        ],
        &["y"],
    )
    .init("w", ramp(&[3, 3, 3, 3], 0.1))
    .init("b", floats(&[0.0; 3]))
    .bytes();
    let out = full_precision().convert(&bytes).unwrap();
    let kinds: Vec<_> = out.model().layers().iter().map(|l| l.kind()).collect();
    assert_eq!(kinds, ["Input", "Split", "Convolution", "BinaryOp"]);
    assert!(out.param().contains("x_splitncnn_0"));
    assert!(out.param().contains("x_splitncnn_1"));
}

#[test]
fn test_folded_reshape_target() {
    let bytes = ModelFixture::new(
        vec![
            GraphNode::new("Shape", "shape", ["x"], ["s"]),
            GraphNode::new("Gather", "g", ["s", "i0"], ["c"]),
            GraphNode::new("Unsqueeze", "u", ["c"], ["cu"]).with_attr("axes", Attribute::Ints(vec![0])),
            GraphNode::new("Concat", "cat", ["batch", "cu", "tail"], ["target"])
                .with_attr("axis", Attribute::Int(0)),
            GraphNode::new("Reshape", "reshape", ["x", "target"], ["y"]),
        ],
        &["y"],
    )
    .init("i0", tensor_core::TensorData::from_i64(tensor_core::Shape::scalar(), &[1]).unwrap())
    .init("batch", ints(&[1]))
    .init("tail", ints(&[-1]))
    .bytes();
    let out = full_precision().convert(&bytes).unwrap();
    let reshape = &out.model().layers()[1];
    assert_eq!(
        reshape.params,
        LayerParams::Reshape(ncnn_model::params::ReshapeParams { w: -1, h: 3, c: -233 })
    );
}

#[test]
fn test_write_default_name_uses_scale() {
    let out = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested");
    let paths = out.write_default(&target).unwrap();
    assert_eq!(paths.param, target.join("x4.param"));
    assert_eq!(std::fs::read_to_string(&paths.param).unwrap(), out.param());
    assert_eq!(std::fs::read(&paths.bin).unwrap(), out.bin());
    assert_eq!(std::fs::read_dir(&target).unwrap().count(), 2);

    let reloaded = NcnnModel::open(&paths.param, &paths.bin).unwrap();
    assert_eq!(ncnn_model::infer_scale(&reloaded).unwrap(), 4);
}

#[test]
fn test_failed_write_keeps_previous_param() {
    let out = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let param = dir.path().join("x4.param");
    std::fs::write(&param, "old").unwrap();
    // A directory in the bin slot makes the second rename fail.
    std::fs::create_dir(dir.path().join("x4.bin")).unwrap();

    let err = out.write_to(dir.path(), "x4").unwrap_err();
    assert!(matches!(err, ConvertError::Io { ref path, .. } if path.ends_with("x4.bin")));
    assert_eq!(std::fs::read_to_string(&param).unwrap(), "old");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_failed_write_removes_new_param() {
    let out = Converter::default().convert(&upscaler(2).bytes()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("x4.bin")).unwrap();

    assert!(out.write_to(dir.path(), "x4").is_err());
    assert!(!dir.path().join("x4.param").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
