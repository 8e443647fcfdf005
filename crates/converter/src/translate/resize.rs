// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `Upsample` and `Resize` to `Interp`.

use super::view::to_i32;
use super::{f32_values, i64_values, NodeView, Translation};
use crate::builder::PendingLayer;
use crate::ConvertError;
use ncnn_model::params::InterpParams;
use ncnn_model::LayerParams;

fn resize_type(v: &NodeView<'_>) -> Result<i32, ConvertError> {
    match v.string("mode", "nearest")?.as_str() {
        "nearest" => Ok(1),
        "linear" | "bilinear" => Ok(2),
        "cubic" => Ok(3),
        other => Err(v.unsupported("mode", other.to_string())),
    }
}

/// Spatial factors from NCHW scales; batch and channel must stay 1.
fn spatial_scales(v: &NodeView<'_>, scales: &[f32]) -> Result<(f32, f32), ConvertError> {
    match scales {
        [n, c, h, w] if *n == 1.0 && *c == 1.0 => Ok((*h, *w)),
        _ => Err(v.unsupported(
            "scales",
            format!("{scales:?} (only spatial scaling of NCHW tensors is supported)"),
        )),
    }
}

fn interp(v: &NodeView<'_>, p: InterpParams) -> Result<Translation, ConvertError> {
    Ok(Translation::layer(PendingLayer::new(
        v.layer_name(),
        LayerParams::Interp(p),
        [v.input(0)?],
        [v.output()],
    )))
}

pub(super) fn upsample(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let scales = if v.opset() < 9 {
        v.floats("scales")?
            .map(<[f32]>::to_vec)
            .ok_or_else(|| v.unsupported("scales", "missing"))?
    } else {
        let name = v.input(1)?;
        f32_values(v.require_constant(1, "Upsample scales")?, name)?
    };
    let (height_scale, width_scale) = spatial_scales(v, &scales)?;
    interp(
        v,
        InterpParams {
            resize_type: resize_type(v)?,
            height_scale,
            width_scale,
            ..InterpParams::default()
        },
    )
}

pub(super) fn resize(v: &NodeView<'_>) -> Result<Translation, ConvertError> {
    let mut p = InterpParams {
        resize_type: resize_type(v)?,
        ..InterpParams::default()
    };
    if v.opset() >= 11 {
        p.align_corner = v.string("coordinate_transformation_mode", "half_pixel")? == "align_corners";
    }

    // Opset 10 takes scales at input 1; later opsets put roi there.
    let (scales_at, sizes_at) = if v.opset() < 11 { (1, None) } else { (2, Some(3)) };
    let scales = match v.optional_input(scales_at) {
        Some(name) => {
            let t = v.require_constant(scales_at, "Resize scales")?;
            f32_values(t, name)?
        }
        None => Vec::new(),
    };

    if !scales.is_empty() {
        let (h, w) = spatial_scales(v, &scales)?;
        p.height_scale = h;
        p.width_scale = w;
        return interp(v, p);
    }

    let sizes_name = sizes_at
        .and_then(|i| v.optional_input(i))
        .ok_or_else(|| v.unsupported("scales", "neither scales nor sizes given"))?;
    let sizes = v
        .constant_of(sizes_name)
        .ok_or_else(|| v.dynamic(sizes_name, "Resize output size"))?;
    let sizes = i64_values(sizes, sizes_name)?;
    match sizes[..] {
        [_, _, h, w] => {
            p.output_height = to_i32(h);
            p.output_width = to_i32(w);
        }
        _ => return Err(v.unsupported("sizes", format!("{sizes:?} is not NCHW"))),
    }
    interp(v, p)
}
