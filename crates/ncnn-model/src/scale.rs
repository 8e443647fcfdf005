// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Structural inference of a model's spatial upscaling factor.
//!
//! An integer factor is propagated along every blob in layer order:
//!
//! | layer                         | output factor                         |
//! |-------------------------------|---------------------------------------|
//! | Input, MemoryData             | 1                                     |
//! | PixelShuffle                  | input × upscale_factor                |
//! | Interp, scale > 1             | input × height_scale (must equal width_scale) |
//! | Interp, dynamic target size   | factor of the reference blob          |
//! | Deconvolution*                | input × stride                        |
//! | anything else                 | factor of the first input             |
//!
//! Only upscaling layers contribute. Strided convolutions, `Reorg` and
//! interpolations that shrink the image pass their input's factor through,
//! so a model without an upscaling layer has scale 1.
//!
//! The model's scale is the factor of the last layer's first output.
//! Parallel branches that meet in an `Eltwise` or `BinaryOp` do not
//! compound: the join takes its first input's factor.

use crate::load::parse_param;
use crate::params::LayerParams;
use crate::{Layer, ModelError, NcnnModel, ScaleError};

/// Infers the integer upscaling factor of a model.
///
/// # Errors
/// [`ScaleError::ScaleUndeterminable`] when an upscaling layer carries no
/// usable scale: an `Interp` with a fixed output size, horizontal and
/// vertical factors that differ, a non-positive or non-integral factor, or
/// factors whose product does not fit in a `u32`.
pub fn infer_scale(model: &NcnnModel) -> Result<u32, ScaleError> {
    scale_of(model.layers(), model.blobs().len())
}

/// Infers the scale from `.param` text alone.
///
/// Weights are not read, so layer kinds this crate does not model are
/// accepted wherever they appear.
pub fn infer_scale_from_param(param: &str) -> Result<u32, ModelError> {
    let (layers, blobs) = parse_param(param)?;
    Ok(scale_of(&layers, blobs.len())?)
}

fn scale_of(layers: &[Layer], blob_count: usize) -> Result<u32, ScaleError> {
    let mut factors = vec![1u32; blob_count];
    let factor_of = |factors: &[u32], b: usize| factors.get(b).copied().unwrap_or(1);

    for layer in layers {
        let first = layer.inputs.first().map_or(1, |&b| factor_of(&factors, b));
        let out = layer_factor(layer, first, |b| factor_of(&factors, b))?;
        for &b in &layer.outputs {
            if let Some(f) = factors.get_mut(b) {
                *f = out;
            }
        }
    }

    Ok(layers
        .last()
        .and_then(|l| l.outputs.first())
        .map_or(1, |&b| factor_of(&factors, b)))
}

fn layer_factor(layer: &Layer, input: u32, factor_of: impl Fn(usize) -> u32) -> Result<u32, ScaleError> {
    let undeterminable = |detail: String| ScaleError::ScaleUndeterminable {
        layer: layer.name.clone(),
        detail,
    };
    let positive = |v: i32, what: &str| -> Result<u32, ScaleError> {
        u32::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .ok_or_else(|| undeterminable(format!("{what} is {v}")))
    };
    let square = |w: i32, h: i32, what: &str| -> Result<u32, ScaleError> {
        if w != h {
            return Err(undeterminable(format!("{what} differs: {w} horizontal, {h} vertical")));
        }
        positive(w, what)
    };
    let scaled = |k: u32| {
        input
            .checked_mul(k)
            .ok_or_else(|| undeterminable(format!("factor {input} x {k} overflows")))
    };

    match &layer.params {
        LayerParams::Input(_) | LayerParams::MemoryData(_) => Ok(1),
        LayerParams::PixelShuffle(p) => scaled(positive(p.factor, "upscale factor")?),
        LayerParams::Interp(p) if p.dynamic_target_size => match layer.inputs.get(1) {
            Some(&reference) => Ok(factor_of(reference)),
            None => Err(undeterminable("dynamic target size without reference blob".into())),
        },
        LayerParams::Interp(p) => {
            if p.output_height != 0 || p.output_width != 0 {
                return Err(undeterminable(format!(
                    "fixed output size {}x{}",
                    p.output_width, p.output_height
                )));
            }
            if p.height_scale != p.width_scale {
                return Err(undeterminable(format!(
                    "scale differs: {} horizontal, {} vertical",
                    p.width_scale, p.height_scale
                )));
            }
            let s = p.height_scale;
            if !s.is_finite() || s <= 0.0 {
                return Err(undeterminable(format!("scale {s} is not usable")));
            }
            if s <= 1.0 {
                return Ok(input);
            }
            if s.fract() != 0.0 || s > u32::MAX as f32 {
                return Err(undeterminable(format!("scale {s} is not a whole factor")));
            }
            scaled(s as u32)
        }
        params if params.is_deconv() => {
            let p = params
                .as_conv()
                .ok_or_else(|| undeterminable("missing parameters".into()))?;
            scaled(square(p.stride_w, p.stride_h, "stride")?)
        }
        _ => Ok(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BlobShape, ConvParams, InterpParams, ShuffleParams};
    use crate::{Blob, Weight};
    use tensor_core::{Shape, TensorData};

    /// Builds a linear chain; each entry is (params, extra input blob).
    fn chain(steps: Vec<(LayerParams, Option<usize>)>) -> NcnnModel {
        let mut layers = vec![Layer {
            name: "in".into(),
            params: LayerParams::Input(BlobShape::default()),
            inputs: vec![],
            outputs: vec![0],
            weights: vec![],
        }];
        let mut blobs = vec![Blob {
            name: "b0".into(),
            producer: 0,
        }];
        for (i, (params, extra)) in steps.into_iter().enumerate() {
            let mut inputs = vec![i];
            inputs.extend(extra);
            let weights = params
                .weight_specs()
                .iter()
                .map(|s| {
                    let t = TensorData::from_f32(Shape::vector(s.len), &vec![0.0; s.len]).unwrap();
                    if s.tagged {
                        Weight::tagged(t)
                    } else {
                        Weight::raw(t)
                    }
                })
                .collect();
            layers.push(Layer {
                name: format!("l{i}"),
                params,
                inputs,
                outputs: vec![i + 1],
                weights,
            });
            blobs.push(Blob {
                name: format!("b{}", i + 1),
                producer: i + 1,
            });
        }
        NcnnModel::new(layers, blobs).unwrap()
    }

    fn interp(scale: f32) -> LayerParams {
        LayerParams::Interp(InterpParams {
            height_scale: scale,
            width_scale: scale,
            ..Default::default()
        })
    }

    fn conv(stride: i32) -> LayerParams {
        LayerParams::Convolution(ConvParams {
            num_output: 1,
            kernel_w: 1,
            kernel_h: 1,
            stride_w: stride,
            stride_h: stride,
            weight_data_size: 1,
            ..Default::default()
        })
    }

    #[test]
    fn test_no_upscaler_is_one() {
        let m = chain(vec![(conv(1), None), (LayerParams::ReLU { slope: 0.0 }, None)]);
        assert_eq!(infer_scale(&m), Ok(1));
    }

    #[test]
    fn test_two_interps_compose() {
        let m = chain(vec![(interp(2.0), None), (conv(1), None), (interp(2.0), None)]);
        assert_eq!(infer_scale(&m), Ok(4));
    }

    #[test]
    fn test_pixel_shuffle_three() {
        let m = chain(vec![
            (conv(1), None),
            (LayerParams::PixelShuffle(ShuffleParams { factor: 3, mode: 0 }), None),
        ]);
        assert_eq!(infer_scale(&m), Ok(3));
    }

    #[test]
    fn test_unshuffle_front_end_ignored() {
        let m = chain(vec![
            (LayerParams::Reorg(ShuffleParams { factor: 2, mode: 1 }), None),
            (LayerParams::PixelShuffle(ShuffleParams { factor: 4, mode: 0 }), None),
        ]);
        assert_eq!(infer_scale(&m), Ok(4));
    }

    #[test]
    fn test_parallel_branch_not_double_counted() {
        // b0 -> conv -> shuffle x4 = b2; b0 -> interp x4 = b3; add(b2, b3)
        let mut m = chain(vec![
            (conv(1), None),
            (LayerParams::PixelShuffle(ShuffleParams { factor: 4, mode: 0 }), None),
        ]);
        let (mut layers, mut blobs) = m.into_parts();
        layers.push(Layer {
            name: "up".into(),
            params: interp(4.0),
            inputs: vec![0],
            outputs: vec![3],
            weights: vec![],
        });
        blobs.push(Blob {
            name: "b3".into(),
            producer: 3,
        });
        layers.push(Layer {
            name: "add".into(),
            params: LayerParams::BinaryOp(crate::params::BinaryOpParams {
                op: crate::params::BinaryOpType::Add,
                with_scalar: false,
                b: 0.0,
            }),
            inputs: vec![2, 3],
            outputs: vec![4],
            weights: vec![],
        });
        blobs.push(Blob {
            name: "b4".into(),
            producer: 4,
        });
        m = NcnnModel::new(layers, blobs).unwrap();
        assert_eq!(infer_scale(&m), Ok(4));
    }

    #[test]
    fn test_fixed_output_size_undeterminable() {
        let m = chain(vec![(
            LayerParams::Interp(InterpParams {
                output_height: 128,
                output_width: 128,
                ..Default::default()
            }),
            None,
        )]);
        assert!(matches!(
            infer_scale(&m),
            Err(ScaleError::ScaleUndeterminable { .. })
        ));
    }

    #[test]
    fn test_mismatched_axes_undeterminable() {
        let m = chain(vec![(
            LayerParams::Interp(InterpParams {
                height_scale: 2.0,
                width_scale: 3.0,
                ..Default::default()
            }),
            None,
        )]);
        assert!(matches!(
            infer_scale(&m),
            Err(ScaleError::ScaleUndeterminable { .. })
        ));
    }

    #[test]
    fn test_downscaling_layers_do_not_count() {
        let m = chain(vec![(conv(2), None), (LayerParams::ReLU { slope: 0.0 }, None)]);
        assert_eq!(infer_scale(&m), Ok(1));
        let m = chain(vec![
            (LayerParams::Reorg(ShuffleParams { factor: 2, mode: 1 }), None),
            (interp(0.5), None),
        ]);
        assert_eq!(infer_scale(&m), Ok(1));
    }

    #[test]
    fn test_non_integral_interp_undeterminable() {
        let m = chain(vec![(interp(1.5), None)]);
        assert!(matches!(
            infer_scale(&m),
            Err(ScaleError::ScaleUndeterminable { ref layer, .. }) if layer == "l0"
        ));
    }

    #[test]
    fn test_factor_overflow_undeterminable() {
        let huge = || (LayerParams::PixelShuffle(ShuffleParams { factor: i32::MAX, mode: 0 }), None);
        let m = chain(vec![huge(), huge(), huge()]);
        assert!(matches!(
            infer_scale(&m),
            Err(ScaleError::ScaleUndeterminable { ref layer, .. }) if layer == "l1"
        ));
    }

    #[test]
    fn test_scale_from_param_accepts_unknown_kinds() {
        let param = "7767517\n4 4\n\
            Input in 0 1 x 0=8 1=8 2=3\n\
            MyCustomAct act 1 1 x a 0=1 1=2.5e-1\n\
            PixelShuffle ps 1 1 a b 0=2\n\
            Interp up 1 1 b y 0=1 1=2e0 2=2e0\n";
        assert_eq!(infer_scale_from_param(param).unwrap(), 4);
    }

    #[test]
    fn test_dynamic_target_copies_reference() {
        let m = chain(vec![
            (interp(2.0), None),
            (
                LayerParams::Interp(InterpParams {
                    dynamic_target_size: true,
                    ..Default::default()
                }),
                Some(1),
            ),
        ]);
        // The second interp resizes b1 to the size of b1.
        assert_eq!(infer_scale(&m), Ok(2));
    }

    #[test]
    fn test_deconv_stride() {
        let m = chain(vec![(
            LayerParams::Deconvolution(ConvParams {
                num_output: 1,
                kernel_w: 2,
                kernel_h: 2,
                stride_w: 2,
                stride_h: 2,
                weight_data_size: 4,
                ..Default::default()
            }),
            None,
        )]);
        assert_eq!(infer_scale(&m), Ok(2));
    }
}
