// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape and layout operators: concatenation, slicing, padding, reshapes,
//! transposes and the space/depth shuffles.

use super::view::to_i32;
use super::{f32_values, i64_values, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::{CropParams, PaddingParams, ReshapeParams, ShuffleParams, SliceParams};
use ncnn_model::LayerParams;

/// Marks a runtime dimension or slice size left for the runtime to fill.
const UNSET: i32 = -233;

fn single(v: &NodeView<'_>, params: LayerParams) -> Result<Translation, ConvertError> {
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        params,
        [v.input(0)?],
        [v.output()],
    )))
}

/// Integer values of a constant input, or of an attribute before `opset`.
fn ints_from(
    v: &NodeView<'_>,
    attr: &str,
    input: usize,
    since_opset: i64,
) -> Result<Option<Vec<i64>>, ConvertError> {
    if v.opset() < since_opset {
        return Ok(v.ints(attr)?.map(<[i64]>::to_vec));
    }
    let Some(name) = v.optional_input(input) else {
        return Ok(None);
    };
    let t = v.require_constant(input, &format!("{} input '{attr}'", v.op_type()))?;
    Ok(Some(i64_values(t, name)?))
}

pub(super) fn concat(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let axis = v.int("axis", 1)?;
    let rank = v.rank_of(v.input(0)?);
    let axis = v.batchless_axis("axis", axis, rank)?;
    let inputs: Vec<&str> = v
        .node
        .inputs
        .iter()
        .filter(|i| !i.is_empty())
        .map(String::as_str)
        .collect();
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::Concat { axis },
        inputs,
        [v.output()],
    )))
}

pub(super) fn split(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let axis = v.int("axis", 0)?;
    let axis = v.batchless_axis("axis", axis, v.rank_of(x))?;
    let n = v.node.outputs.len();
    let sizes = ints_from(v, "split", 1, 13)?;
    let mut slices: Vec<i32> = match sizes {
        Some(sizes) if sizes.len() == n => sizes.into_iter().map(to_i32).collect(),
        Some(sizes) => {
            return Err(v.unsupported(
                "split",
                format!("{} sizes for {n} outputs", sizes.len()),
            ))
        }
        None => vec![UNSET; n],
    };
    if let Some(last) = slices.last_mut() {
        *last = UNSET;
    }
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::Slice(SliceParams { slices, axis }),
        [x],
        v.node.outputs.iter().map(String::as_str),
    )))
}

pub(super) fn slice(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let starts = ints_from(v, "starts", 1, 10)?
        .ok_or_else(|| v.unsupported("starts", "missing"))?;
    let ends = ints_from(v, "ends", 2, 10)?.ok_or_else(|| v.unsupported("ends", "missing"))?;
    let axes = ints_from(v, "axes", 3, 10)?.unwrap_or_else(|| (0..starts.len() as i64).collect());
    if let Some(steps) = ints_from(v, "steps", 4, 10)? {
        if steps.iter().any(|&s| s != 1) {
            return Err(v.unsupported("steps", format!("{steps:?} (only unit steps are supported)")));
        }
    }
    if starts.len() != ends.len() || starts.len() != axes.len() {
        return Err(v.unsupported("axes", "starts, ends and axes differ in length"));
    }

    let rank = v.rank_of(x);
    let mut p = CropParams {
        starts: Vec::new(),
        ends: Vec::new(),
        axes: Vec::new(),
    };
    for ((&start, &end), &axis) in starts.iter().zip(&ends).zip(&axes) {
        let on_batch = axis == 0 || rank.is_some_and(|r| axis + r as i64 == 0);
        if on_batch {
            if start == 0 && end >= i32::MAX as i64 {
                continue;
            }
            return Err(v.unsupported("axes", "slicing the batch axis"));
        }
        p.axes.push(v.batchless_axis("axes", axis, rank)?);
        p.starts.push(to_i32(start));
        p.ends.push(if end >= i32::MAX as i64 { UNSET } else { to_i32(end) });
    }
    if p.axes.is_empty() {
        return Ok(Translation::alias(v.output(), x));
    }
    single(v, LayerParams::Crop(p))
}

pub(super) fn pad(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let pads = if v.opset() < 11 {
        v.ints("pads")?.map(<[i64]>::to_vec)
    } else {
        let name = v.input(1)?;
        let t = v.require_constant(1, "Pad amounts")?;
        Some(i64_values(t, name)?)
    }
    .ok_or_else(|| v.unsupported("pads", "missing"))?;

    let value = if v.opset() < 11 {
        v.float("value", 0.0)?
    } else {
        match v.optional_input(2) {
            Some(name) => {
                let t = v.require_constant(2, "Pad value")?;
                f32_values(t, name)?.first().copied().unwrap_or(0.0)
            }
            None => 0.0,
        }
    };
    let pad_type = match v.string("mode", "constant")?.as_str() {
        "constant" => 0,
        "edge" => 1,
        "reflect" => 2,
        other => return Err(v.unsupported("mode", other.to_string())),
    };

    let pads: Vec<i32> = pads.into_iter().map(to_i32).collect();
    let mut p = PaddingParams {
        pad_type,
        value,
        ..PaddingParams::default()
    };
    match pads[..] {
        [0, c0, h0, w0, 0, c1, h1, w1] => {
            p.front = c0;
            p.behind = c1;
            p.top = h0;
            p.bottom = h1;
            p.left = w0;
            p.right = w1;
        }
        [0, h0, w0, 0, h1, w1] => {
            p.top = h0;
            p.bottom = h1;
            p.left = w0;
            p.right = w1;
        }
        [0, w0, 0, w1] => {
            p.left = w0;
            p.right = w1;
        }
        _ => return Err(v.unsupported("pads", format!("{pads:?}"))),
    }
    single(v, LayerParams::Padding(p))
}

// ── Reshape family ─────────────────────────────────────────────────

pub(super) fn reshape(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let target = ints_from(v, "shape", 1, 5)?.ok_or_else(|| v.unsupported("shape", "missing"))?;

    if let Some(t) = shuffle_pattern(v, &target)? {
        return Ok(t);
    }

    if let Some(shape) = v.static_shape(x) {
        if resolve_target(shape.dims(), &target).as_deref() == Some(shape.dims()) {
            return Ok(Translation::alias(v.output(), x));
        }
    }

    let dim = |i: usize| to_i32(target[i]);
    let p = match target.len() {
        1 => ReshapeParams {
            w: dim(0),
            h: UNSET,
            c: UNSET,
        },
        2 => ReshapeParams {
            w: dim(1),
            h: UNSET,
            c: UNSET,
        },
        3 => ReshapeParams {
            w: dim(2),
            h: dim(1),
            c: UNSET,
        },
        4 => ReshapeParams {
            w: dim(3),
            h: dim(2),
            c: dim(1),
        },
        5 if target[1] > 0 && target[2] > 0 => ReshapeParams {
            w: dim(4),
            h: dim(3),
            c: to_i32(target[1] * target[2]),
        },
        n => {
            return Err(v.unsupported(
                "shape",
                format!("rank-{n} target {target:?} has no runtime layout"),
            ))
        }
    };
    single(v, LayerParams::Reshape(p))
}

/// Applies ONNX reshape rules (0 copies, -1 infers) against a known shape.
fn resolve_target(input: &[usize], target: &[i64]) -> Option<Vec<usize>> {
    let total: usize = input.iter().product();
    let mut out = Vec::with_capacity(target.len());
    let mut infer = None;
    for (i, &d) in target.iter().enumerate() {
        match d {
            0 => out.push(*input.get(i)?),
            -1 if infer.is_none() => {
                infer = Some(i);
                out.push(1);
            }
            d if d > 0 => out.push(d as usize),
            _ => return None,
        }
    }
    if let Some(i) = infer {
        let known: usize = out.iter().product();
        if known == 0 || total % known != 0 {
            return None;
        }
        out[i] = total / known;
    }
    (out.iter().product::<usize>() == total).then_some(out)
}

/// `Reshape -> Transpose -> Reshape` chains that are pixel (un)shuffles.
fn shuffle_pattern(v: &NodeView<'_>, target: &[i64]) -> Result<Option<Translation>, ConvertError> {
    if target.len() != 6 {
        return Ok(None);
    }
    let Some((t_idx, transpose)) = v
        .sole_consumer(v.output())
        .filter(|(_, n)| n.op_type == "Transpose")
    else {
        return Ok(None);
    };
    let Some((r_idx, reshape)) = v
        .sole_consumer(transpose.output())
        .filter(|(_, n)| n.op_type == "Reshape")
    else {
        return Ok(None);
    };
    if reshape
        .input(1)
        .is_some_and(|shape| v.constant_of(shape).is_none())
    {
        return Ok(None);
    }
    let perm = transpose.ints("perm")?.unwrap_or(&[]);

    let square = |a: usize, b: usize| (target[a] > 0 && target[a] == target[b]).then(|| target[a] as i32);
    let params = match perm {
        [0, 1, 4, 2, 5, 3] => square(2, 3).map(|r| LayerParams::PixelShuffle(ShuffleParams { factor: r, mode: 0 })),
        [0, 3, 4, 1, 5, 2] => square(1, 2).map(|r| LayerParams::PixelShuffle(ShuffleParams { factor: r, mode: 1 })),
        [0, 1, 3, 5, 2, 4] => square(3, 5).map(|r| LayerParams::Reorg(ShuffleParams { factor: r, mode: 1 })),
        _ => None,
    };
    let Some(params) = params else {
        return Ok(None);
    };
    let layer = PendingLayer::new(v.layer_name(), params, [v.input(0)?], [reshape.output()]);
    Ok(Some(Translation::layer(layer).absorbing([t_idx, r_idx])))
}

pub(super) fn flatten(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let axis = v.int("axis", 1)?;
    if axis != 1 {
        return Err(v.unsupported("axis", format!("{axis} (only 1 is supported)")));
    }
    single(v, LayerParams::Flatten)
}

pub(super) fn transpose(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let x = v.input(0)?;
    let perm: Vec<i64> = match v.ints("perm")? {
        Some(p) => p.to_vec(),
        None => match v.rank_of(x) {
            Some(r) => (0..r as i64).rev().collect(),
            None => return Err(v.unsupported("perm", "missing and the input rank is unknown")),
        },
    };
    if perm.iter().enumerate().all(|(i, &p)| p == i as i64) {
        return Ok(Translation::alias(v.output(), x));
    }
    let order_type = match perm[..] {
        [0, 2, 1] => 1,
        [0, 1, 3, 2] => 1,
        [0, 2, 1, 3] => 2,
        [0, 2, 3, 1] => 3,
        [0, 3, 1, 2] => 4,
        [0, 3, 2, 1] => 5,
        _ => {
            return Err(v.unsupported(
                "perm",
                format!("{perm:?} has no runtime permute order"),
            ))
        }
    };
    single(v, LayerParams::Permute { order_type })
}

pub(super) fn depth_to_space(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let factor = to_i32(v.int("blocksize", 0)?);
    if factor < 1 {
        return Err(v.unsupported("blocksize", "missing or not positive"));
    }
    let mode = match v.string("mode", "DCR")?.as_str() {
        "DCR" => 1,
        "CRD" => 0,
        other => return Err(v.unsupported("mode", other.to_string())),
    };
    single(v, LayerParams::PixelShuffle(ShuffleParams { factor, mode }))
}

pub(super) fn space_to_depth(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let factor = to_i32(v.int("blocksize", 0)?);
    if factor < 1 {
        return Err(v.unsupported("blocksize", "missing or not positive"));
    }
    single(v, LayerParams::Reorg(ShuffleParams { factor, mode: 0 }))
}
