// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the conversion pipeline.

use converter::{ConvertOptions, Converter};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ncnn_model::NcnnModel;
use onnx_graph::{Attribute, Dim, GraphDocument, GraphNode, GraphParts, ValueInfo};
use tensor_core::{Shape, TensorData};

/// A plain residual super-resolution trunk: `blocks` conv-relu-conv-add
/// blocks at 64 features, then a x4 pixel shuffle head.
fn trunk(blocks: usize) -> Vec<u8> {
    let feat = 64;
    let weight = |o: usize, i: usize| {
        let n = o * i * 9;
        let v: Vec<f32> = (0..n).map(|k| (k % 17) as f32 * 1e-3).collect();
        TensorData::from_f32(Shape::new(vec![o, i, 3, 3]), &v).unwrap()
    };
    let bias = |o: usize| TensorData::from_f32(Shape::vector(o), &vec![0.0; o]).unwrap();
    let conv = |name: &str, x: &str, w: &str, b: &str, y: &str| {
        GraphNode::new("Conv", name, [x, w, b], [y])
            .with_attr("pads", Attribute::Ints(vec![1, 1, 1, 1]))
    };

    let mut parts = GraphParts {
        name: "trunk".into(),
        opset: 13,
        inputs: vec![ValueInfo::with_shape(
            "x",
            vec![Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(64), Dim::Fixed(64)],
        )],
        outputs: vec![ValueInfo::named("y")],
        ..GraphParts::default()
    };
    parts.nodes.push(conv("head", "x", "wh", "bh", "f0"));
    parts.initializers.insert("wh".into(), weight(feat, 3));
    parts.initializers.insert("bh".into(), bias(feat));
    for i in 0..blocks {
        let (x, a, r, c, y) = (
            format!("f{i}"),
            format!("a{i}"),
            format!("r{i}"),
            format!("c{i}"),
            format!("f{}", i + 1),
        );
        for (k, (input, output)) in [(&x, &a), (&r, &c)].into_iter().enumerate() {
            let (w, b) = (format!("w{i}_{k}"), format!("b{i}_{k}"));
            parts.nodes.push(conv(&format!("conv{i}_{k}"), input, &w, &b, output));
            parts.initializers.insert(w, weight(feat, feat));
            parts.initializers.insert(b, bias(feat));
            if k == 0 {
                parts.nodes.push(GraphNode::new("Relu", &format!("relu{i}"), [&a], [&r]));
            }
        }
        parts.nodes.push(GraphNode::new("Add", &format!("add{i}"), [&c, &x], [&y]));
    }
    let last = format!("f{blocks}");
    parts.nodes.push(conv("tail", &last, "wt", "bt", "t"));
    parts.initializers.insert("wt".into(), weight(48, feat));
    parts.initializers.insert("bt".into(), bias(48));
    parts.nodes.push(
        GraphNode::new("DepthToSpace", "shuffle", ["t"], ["y"])
            .with_attr("blocksize", Attribute::Int(4))
            .with_attr("mode", Attribute::String("CRD".into())),
    );

    GraphDocument::from_parts(parts).unwrap().to_bytes()
}

fn bench_convert(c: &mut Criterion) {
    let bytes = trunk(16);
    let fp16 = Converter::default();
    let full = Converter::new(ConvertOptions {
        fp16: false,
        optimize: true,
    });
    c.bench_function("convert_16_blocks_fp16", |b| {
        b.iter(|| fp16.convert(black_box(&bytes)).unwrap())
    });
    c.bench_function("convert_16_blocks_fp32", |b| {
        b.iter(|| full.convert(black_box(&bytes)).unwrap())
    });
}

fn bench_load(c: &mut Criterion) {
    let out = Converter::default().convert(&trunk(16)).unwrap();
    c.bench_function("load_16_blocks", |b| {
        b.iter(|| NcnnModel::from_param_and_bin(black_box(out.param()), black_box(out.bin())).unwrap())
    });
    c.bench_function("infer_scale_16_blocks", |b| {
        b.iter(|| out.scale().unwrap())
    });
}

criterion_group!(benches, bench_convert, bench_load);
criterion_main!(benches);
