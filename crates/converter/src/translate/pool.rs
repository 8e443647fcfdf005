// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pooling.

use super::view::to_i32;
use super::{NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{PoolingParams, PoolingType};
use ncnn_model::LayerParams;

fn pooling_type(v: &NodeView<'_>) -> PoolingType {
    if v.op_type().contains("Max") {
        PoolingType::Max
    } else {
        PoolingType::Avg
    }
}

fn layer(v: &NodeView<'_>, p: PoolingParams) -> Result<Translation, ConvertError> {
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::Pooling(p),
        [v.input(0)?],
        [v.output()],
    )))
}

pub(super) fn pool(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    if v.node.outputs.iter().skip(1).any(|o| !o.is_empty()) {
        return Err(v.unsupported("outputs", "pooling indices are not supported"));
    }
    let kernel = v.ints_or("kernel_shape", &[])?;
    let [kh, kw] = match kernel[..] {
        [h, w] => [to_i32(h), to_i32(w)],
        _ => return Err(v.unsupported("kernel_shape", format!("{kernel:?} is not 2-d"))),
    };
    let strides = v.ints_or("strides", &[1, 1])?;
    let [sh, sw] = match strides[..] {
        [h, w] => [to_i32(h), to_i32(w)],
        _ => return Err(v.unsupported("strides", format!("{strides:?} is not 2-d"))),
    };
    if v.ints_or("dilations", &[1, 1])?.iter().any(|&d| d != 1) {
        return Err(v.unsupported("dilations", "dilated pooling is not supported"));
    }

    let mut p = PoolingParams {
        pooling_type: pooling_type(v),
        kernel_h: kh,
        kernel_w: kw,
        stride_h: sh,
        stride_w: sw,
        count_include_pad: v.int("count_include_pad", 0)? != 0,
        ..PoolingParams::default()
    };
    p.pad_mode = if v.int("ceil_mode", 0)? != 0 { 0 } else { 1 };

    match v.string("auto_pad", "NOTSET")?.as_str() {
        "SAME_UPPER" => p.pad_mode = 2,
        "SAME_LOWER" => p.pad_mode = 3,
        "VALID" => p.pad_mode = 1,
        "NOTSET" | "" => {
            let pads = v.ints_or("pads", &[0, 0, 0, 0])?;
            match pads[..] {
                [t, l, b, r] => {
                    p.pad_top = to_i32(t);
                    p.pad_left = to_i32(l);
                    p.pad_bottom = to_i32(b);
                    p.pad_right = to_i32(r);
                }
                _ => return Err(v.unsupported("pads", format!("{pads:?} is not 2-d"))),
            }
        }
        other => return Err(v.unsupported("auto_pad", other.to_string())),
    }
    layer(v, p)
}

pub(super) fn global_pool(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    layer(
        v,
        PoolingParams {
            pooling_type: pooling_type(v),
            global: true,
            ..PoolingParams::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::super::tests::run;
    use super::*;
    use onnx_graph::{Attribute, GraphNode};

    fn params(node: GraphNode) -> PoolingParams {
        let m = run(vec![node], vec![], &["y"]).unwrap();
        match &m.layers()[1].params {
            LayerParams::Pooling(p) => p.clone(),
            other => panic!("expected Pooling, got {}", other.kind()),
        }
    }

    #[test]
    fn test_max_pool_floor_mode() {
        let p = params(
            GraphNode::new("MaxPool", "mp", ["x"], ["y"])
                .with_attr("kernel_shape", Attribute::Ints(vec![2, 2]))
                .with_attr("strides", Attribute::Ints(vec![2, 2])),
        );
        assert_eq!(p.pooling_type, PoolingType::Max);
        assert_eq!((p.kernel_w, p.stride_h, p.pad_mode), (2, 2, 1));
    }

    #[test]
    fn test_avg_pool_ceil_and_pads() {
        let p = params(
            GraphNode::new("AveragePool", "ap", ["x"], ["y"])
                .with_attr("kernel_shape", Attribute::Ints(vec![3, 3]))
                .with_attr("ceil_mode", Attribute::Int(1))
                .with_attr("count_include_pad", Attribute::Int(1))
                .with_attr("pads", Attribute::Ints(vec![1, 1, 1, 1])),
        );
        assert_eq!(p.pooling_type, PoolingType::Avg);
        assert_eq!(p.pad_mode, 0);
        assert!(p.count_include_pad);
        assert_eq!(p.pad_bottom, 1);
    }

    #[test]
    fn test_global_average() {
        let p = params(GraphNode::new("GlobalAveragePool", "gap", ["x"], ["y"]));
        assert!(p.global);
        assert_eq!(p.pooling_type, PoolingType::Avg);
    }
}
