// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution, transposed convolution and fully connected layers, with
//! bias-add and activation fusion.

use super::view::to_i32;
use super::{f32_values, flat_f32, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{Activation, ConvParams, InnerProductParams};
use ncnn_model::{LayerParams, Weight};
use tensor_core::{Shape, TensorData};

/// Padding values the runtime resolves from the input size.
const PAD_SAME_UPPER: i32 = -233;
const PAD_SAME_LOWER: i32 = -234;

pub(super) fn conv(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let w_name = v.input(1)?;
    let w = v.require_constant(1, "convolution weights")?;
    let dims = w.shape().dims();
    if dims.len() != 4 {
        return Err(v.unsupported(
            "kernel_shape",
            format!("only 2-d convolution is supported, weights are {}", w.shape()),
        ));
    }
    let (out_ch, kh, kw) = (dims[0], dims[2], dims[3]);
    let group = v.int("group", 1)?;

    let mut p = ConvParams {
        num_output: out_ch as i32,
        kernel_h: kh as i32,
        kernel_w: kw as i32,
        weight_data_size: w.num_elements() as i32,
        group: to_i32(group),
        ..ConvParams::default()
    };
    spatial_attrs(v, &mut p)?;

    let bias = optional_bias(v, 2, out_ch)?;
    let epi = epilogue(v, out_ch, BiasLayout::Channels)?;
    let params: fn(ConvParams) -> LayerParams = if group > 1 {
        LayerParams::ConvolutionDepthWise
    } else {
        LayerParams::Convolution
    };
    finish_conv(v, x, params, p, flat_f32(w, w_name)?, bias, epi)
}

pub(super) fn conv_transpose(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let w_name = v.input(1)?;
    let w = v.require_constant(1, "transposed convolution weights")?;
    if v.node.attr("output_shape").is_some() {
        return Err(v.unsupported("output_shape", "explicit output shapes are not supported"));
    }
    let dims = w.shape().dims();
    if dims.len() != 4 {
        return Err(v.unsupported(
            "kernel_shape",
            format!("only 2-d transposed convolution is supported, weights are {}", w.shape()),
        ));
    }
    let group = v.int("group", 1)?.max(1) as usize;
    let (in_ch, out_per_group, kh, kw) = (dims[0], dims[1], dims[2], dims[3]);
    if in_ch % group != 0 {
        return Err(v.unsupported(
            "group",
            format!("{in_ch} input channels do not divide into {group} groups"),
        ));
    }
    let out_ch = out_per_group * group;

    let mut p = ConvParams {
        num_output: out_ch as i32,
        kernel_h: kh as i32,
        kernel_w: kw as i32,
        weight_data_size: w.num_elements() as i32,
        group: group as i32,
        ..ConvParams::default()
    };
    spatial_attrs(v, &mut p)?;
    let output_padding = v.ints_or("output_padding", &[0, 0])?;
    if let [bottom, right] = output_padding[..] {
        p.output_pad_bottom = to_i32(bottom);
        p.output_pad_right = to_i32(right);
    }

    let weights = deconv_weights(w, group).map_err(ConvertError::tensor(w_name))?;
    let bias = optional_bias(v, 2, out_ch)?;
    let epi = epilogue(v, out_ch, BiasLayout::Channels)?;
    let params: fn(ConvParams) -> LayerParams = if group > 1 {
        LayerParams::DeconvolutionDepthWise
    } else {
        LayerParams::Deconvolution
    };
    finish_conv(v, x, params, p, flat_f32(&weights, w_name)?, bias, epi)
}

/// `[I, O/g, kh, kw]` to `[g, O/g, I/g, kh, kw]`.
fn deconv_weights(w: &TensorData, group: usize) -> Result<TensorData, tensor_core::TensorError> {
    let d = w.shape().dims();
    let grouped = Shape::new(vec![group, d[0] / group, d[1], d[2], d[3]]);
    w.clone().reshape(grouped)?.permute(&[0, 2, 1, 3, 4])
}

pub(super) fn gemm(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let a = v.input(0)?;
    let alpha = v.float("alpha", 1.0)?;
    let beta = v.float("beta", 1.0)?;
    if alpha != 1.0 {
        return Err(v.unsupported("alpha", format!("{alpha} (only 1 is supported)")));
    }
    if v.int("transA", 0)? != 0 {
        return Err(v.unsupported("transA", "transposed activations are not supported"));
    }
    let trans_b = v.int("transB", 0)? != 0;
    let b_name = v.input(1)?;
    let b = v.require_constant(1, "fully connected weights")?;
    let weights = dense_weights(v, b, b_name, trans_b)?;
    let out = weights.shape().dims()[0];

    let bias = match v.optional_input(2) {
        Some(_) if beta != 1.0 => {
            return Err(v.unsupported("beta", format!("{beta} (only 1 is supported)")))
        }
        Some(_) => optional_bias(v, 2, out)?,
        None => None,
    };
    let epi = epilogue(v, out, BiasLayout::Features)?;
    finish_dense(v, a, weights, b_name, bias, epi)
}

pub(super) fn matmul(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let a = v.input(0)?;
    if let Some(rank) = v.rank_of(a).filter(|&r| r != 2) {
        return Err(v.unsupported(
            "A",
            format!("rank-{rank} activations cannot be a fully connected layer"),
        ));
    }
    let b_name = v.input(1)?;
    let b = v.require_constant(1, "matrix multiplication by a non-constant operand")?;
    let weights = dense_weights(v, b, b_name, false)?;
    let out = weights.shape().dims()[0];
    let epi = epilogue(v, out, BiasLayout::Features)?;
    finish_dense(v, a, weights, b_name, None, epi)
}

/// Returns the weight matrix as `[N, K]`.
fn dense_weights(
    v: &NodeView<'_>,
    b: &TensorData,
    name: &str,
    trans_b: bool,
) -> Result<TensorData, ConvertError> {
    if b.shape().rank() != 2 {
        return Err(v.unsupported("B", format!("weights must be 2-d, got {}", b.shape())));
    }
    if trans_b {
        Ok(b.clone())
    } else {
        b.permute(&[1, 0]).map_err(ConvertError::tensor(name))
    }
}

fn finish_dense(
    v: &NodeView<'_>,
    a: &str,
    weights: TensorData,
    w_name: &str,
    bias: Option<Vec<f32>>,
    epi: Epilogue,
) -> Result<Translation, ConvertError> {
    let out = weights.shape().dims()[0];
    let bias = merge_bias(bias, epi.bias, out);
    let p = InnerProductParams {
        num_output: out as i32,
        bias_term: bias.is_some(),
        weight_data_size: weights.num_elements() as i32,
        activation: epi.activation,
    };
    let mut ws = vec![Weight::tagged(flat_f32(&weights, w_name)?)];
    if let Some(b) = bias {
        ws.push(bias_weight(&b, &v.layer_name())?);
    }
    let layer = PendingLayer::new(
        v.layer_name(),
        LayerParams::InnerProduct(p),
        [a],
        [epi.output],
    )
    .with_weights(ws);
    Ok(Translation::layer(layer).absorbing(epi.absorbed))
}

fn finish_conv(
    v: &NodeView<'_>,
    x: &str,
    kind: fn(ConvParams) -> LayerParams,
    mut p: ConvParams,
    weights: TensorData,
    bias: Option<Vec<f32>>,
    epi: Epilogue,
) -> Result<Translation, ConvertError> {
    let bias = merge_bias(bias, epi.bias, p.num_output as usize);
    p.bias_term = bias.is_some();
    p.activation = epi.activation;
    let mut ws = vec![Weight::tagged(weights)];
    if let Some(b) = bias {
        ws.push(bias_weight(&b, &v.layer_name())?);
    }
    let layer = PendingLayer::new(v.layer_name(), kind(p), [x], [epi.output]).with_weights(ws);
    Ok(Translation::layer(layer).absorbing(epi.absorbed))
}

fn bias_weight(values: &[f32], layer: &str) -> Result<Weight, ConvertError> {
    TensorData::from_f32(Shape::vector(values.len()), values)
        .map(Weight::raw)
        .map_err(ConvertError::tensor(layer))
}

fn merge_bias(own: Option<Vec<f32>>, fused: Option<Vec<f32>>, n: usize) -> Option<Vec<f32>> {
    match (own, fused) {
        (None, None) => None,
        (a, b) => {
            let a = a.unwrap_or_else(|| vec![0.0; n]);
            let b = b.unwrap_or_else(|| vec![0.0; n]);
            Some(a.iter().zip(&b).map(|(x, y)| x + y).collect())
        }
    }
}

/// Strides, dilations and padding of a 2-d convolution.
fn spatial_attrs(v: &NodeView<'_>, p: &mut ConvParams) -> Result<(), ConvertError> {
    if let Some(kernel) = v.ints("kernel_shape")? {
        if kernel != [p.kernel_h as i64, p.kernel_w as i64] {
            return Err(v.unsupported(
                "kernel_shape",
                format!("{kernel:?} disagrees with the weight shape"),
            ));
        }
    }
    let strides = v.ints_or("strides", &[1, 1])?;
    let dilations = v.ints_or("dilations", &[1, 1])?;
    let [sh, sw] = pair(v, "strides", &strides)?;
    let [dh, dw] = pair(v, "dilations", &dilations)?;
    p.stride_h = sh;
    p.stride_w = sw;
    p.dilation_h = dh;
    p.dilation_w = dw;

    let auto_pad = v.string("auto_pad", "NOTSET")?;
    match auto_pad.as_str() {
        "SAME_UPPER" => set_pads(p, [PAD_SAME_UPPER; 4]),
        "SAME_LOWER" => set_pads(p, [PAD_SAME_LOWER; 4]),
        "VALID" => set_pads(p, [0; 4]),
        "NOTSET" | "" => {
            let pads = v.ints_or("pads", &[0, 0, 0, 0])?;
            let [top, left, bottom, right] = match pads[..] {
                [t, l, b, r] => [t, l, b, r].map(to_i32),
                _ => return Err(v.unsupported("pads", format!("{pads:?} is not 2-d"))),
            };
            set_pads(p, [top, left, bottom, right]);
        }
        other => return Err(v.unsupported("auto_pad", other.to_string())),
    }
    Ok(())
}

fn set_pads(p: &mut ConvParams, [top, left, bottom, right]: [i32; 4]) {
    p.pad_top = top;
    p.pad_left = left;
    p.pad_bottom = bottom;
    p.pad_right = right;
}

fn pair(v: &NodeView<'_>, attr: &str, values: &[i64]) -> Result<[i32; 2], ConvertError> {
    match values {
        [h, w] => Ok([to_i32(*h), to_i32(*w)]),
        _ => Err(v.unsupported(attr, format!("{values:?} is not 2-d"))),
    }
}

fn optional_bias(v: &NodeView<'_>, i: usize, n: usize) -> Result<Option<Vec<f32>>, ConvertError> {
    let Some(name) = v.optional_input(i) else {
        return Ok(None);
    };
    let t = v.require_constant(i, "bias")?;
    if t.num_elements() != n {
        return Err(v.unsupported(
            "bias",
            format!("{} values for {n} outputs", t.num_elements()),
        ));
    }
    Ok(Some(f32_values(t, name)?))
}

// ── Epilogue fusion ────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum BiasLayout {
    /// `[C, 1, 1]` or `[1, C, 1, 1]` against an NCHW output.
    Channels,
    /// `[C]` or `[1, C]` against an NC output.
    Features,
}

impl BiasLayout {
    fn accepts(self, shape: &Shape, n: usize) -> bool {
        match (self, shape.dims()) {
            (BiasLayout::Channels, [c, 1, 1]) | (BiasLayout::Channels, [1, c, 1, 1]) => *c == n,
            (BiasLayout::Features, [c]) | (BiasLayout::Features, [1, c]) => *c == n,
            _ => false,
        }
    }
}

struct Epilogue {
    output: String,
    bias: Option<Vec<f32>>,
    activation: Activation,
    absorbed: Vec<usize>,
}

/// Looks past the node for `Add(constant bias)` then an activation, each
/// fused only when it is the sole reader of the value before it.
fn epilogue(v: &NodeView<'_>, channels: usize, layout: BiasLayout) -> Result<Epilogue, ConvertError> {
    let mut epi = Epilogue {
        output: v.output().to_string(),
        bias: None,
        activation: Activation::None,
        absorbed: Vec::new(),
    };

    if let Some((idx, next)) = v.sole_consumer(&epi.output) {
        if next.op_type == "Add" && next.inputs.len() == 2 {
            let other = if next.inputs[0] == epi.output {
                &next.inputs[1]
            } else {
                &next.inputs[0]
            };
            if let Some(c) = v.constant_of(other).filter(|c| layout.accepts(c.shape(), channels)) {
                epi.bias = Some(f32_values(c, other)?);
                epi.output = next.output().to_string();
                epi.absorbed.push(idx);
            }
        }
    }

    if let Some((idx, next)) = v.sole_consumer(&epi.output) {
        let activation = match next.op_type.as_str() {
            "Relu" => Some(Activation::ReLU),
            "LeakyRelu" => Some(Activation::LeakyReLU(next.float_or("alpha", 0.01)?)),
            "Sigmoid" => Some(Activation::Sigmoid),
            "HardSwish" => Some(Activation::HardSwish {
                alpha: 1.0 / 6.0,
                beta: 0.5,
            }),
            "Clip" => v
                .clip_bounds(next)?
                .map(|(min, max)| Activation::Clip { min, max }),
            _ => None,
        };
        if let Some(activation) = activation {
            epi.activation = activation;
            epi.output = next.output().to_string();
            epi.absorbed.push(idx);
        }
    }
    Ok(epi)
}
