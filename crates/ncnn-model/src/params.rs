// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer kinds and their parameters.
//!
//! [`LayerParams`] is a tagged union: one variant per supported ncnn
//! layer type, plus [`LayerParams::Other`] for kinds read from third-party
//! files. Parameter ids and defaults follow each layer's
//! `load_param`. Every kind has a fixed write order; parameters marked
//! "optional" below are omitted when they equal the value ncnn assumes.
//!
//! | kind                       | always written                     | optional            |
//! |----------------------------|------------------------------------|---------------------|
//! | Input, MemoryData, Reshape | 0 1 2                              |                     |
//! | Convolution*               | 0 1 11 2 12 3 13 4 15 14 16 5 6 (7)| 18 19 9 10          |
//! | InnerProduct               | 0 1 2                              | 9 10                |
//! | Pooling                    | 0 1 11 2 12 3 14 13 15 4 5         | 6 7 8 18            |
//! | BinaryOp                   | 0                                  | 1 2                 |
//! | Interp                     | 0 1 2 3 4                          | 5 6                 |

use crate::dict::{ParamDict, ParamValue, ParamWriter};
use crate::ModelError;
use std::collections::BTreeMap;

// ── Small enums ────────────────────────────────────────────────────

/// Activation fused into a convolution or inner product (ids 9 and 10).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    #[default]
    None,
    ReLU,
    LeakyReLU(f32),
    Clip { min: f32, max: f32 },
    Sigmoid,
    HardSwish { alpha: f32, beta: f32 },
}

impl Activation {
    fn write(&self, w: &mut ParamWriter) {
        match *self {
            Activation::None => {}
            Activation::ReLU => {
                w.int(9, 1);
            }
            Activation::LeakyReLU(slope) => {
                w.int(9, 2).floats(10, &[slope]);
            }
            Activation::Clip { min, max } => {
                w.int(9, 3).floats(10, &[min, max]);
            }
            Activation::Sigmoid => {
                w.int(9, 4);
            }
            Activation::HardSwish { alpha, beta } => {
                w.int(9, 6).floats(10, &[alpha, beta]);
            }
        }
    }

    fn read(d: &ParamDict) -> Result<Self, ModelError> {
        let p = d.floats(10)?;
        let arg = |i: usize, default: f32| p.get(i).copied().unwrap_or(default);
        Ok(match d.int(9, 0)? {
            0 => Activation::None,
            1 => Activation::ReLU,
            2 => Activation::LeakyReLU(arg(0, 0.0)),
            3 => Activation::Clip {
                min: arg(0, -f32::MAX),
                max: arg(1, f32::MAX),
            },
            4 => Activation::Sigmoid,
            6 => Activation::HardSwish {
                alpha: arg(0, 1.0 / 6.0),
                beta: arg(1, 0.5),
            },
            other => return Err(d.invalid(9, format!("unsupported activation type {other}"))),
        })
    }
}

/// Operation of a `UnaryOp` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpType {
    Abs = 0,
    Neg = 1,
    Floor = 2,
    Ceil = 3,
    Square = 4,
    Sqrt = 5,
    Rsqrt = 6,
    Exp = 7,
    Log = 8,
    Sin = 9,
    Cos = 10,
    Tan = 11,
    Asin = 12,
    Acos = 13,
    Atan = 14,
    Reciprocal = 15,
    Tanh = 16,
}

impl UnaryOpType {
    pub fn from_i32(v: i32) -> Option<Self> {
        use UnaryOpType::*;
        const ALL: [UnaryOpType; 17] = [
            Abs, Neg, Floor, Ceil, Square, Sqrt, Rsqrt, Exp, Log, Sin, Cos, Tan, Asin, Acos,
            Atan, Reciprocal, Tanh,
        ];
        usize::try_from(v).ok().and_then(|i| ALL.get(i).copied())
    }
}

/// Operation of a `BinaryOp` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Max = 4,
    Min = 5,
    Pow = 6,
    RSub = 7,
    RDiv = 8,
}

impl BinaryOpType {
    pub fn from_i32(v: i32) -> Option<Self> {
        use BinaryOpType::*;
        const ALL: [BinaryOpType; 9] = [Add, Sub, Mul, Div, Max, Min, Pow, RSub, RDiv];
        usize::try_from(v).ok().and_then(|i| ALL.get(i).copied())
    }

    /// The operation with its operands swapped, if one exists.
    pub fn swapped(self) -> Option<Self> {
        use BinaryOpType::*;
        match self {
            Add | Mul | Max | Min => Some(self),
            Sub => Some(RSub),
            Div => Some(RDiv),
            RSub => Some(Sub),
            RDiv => Some(Div),
            Pow => None,
        }
    }
}

/// Operation of an `Eltwise` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseOp {
    Prod = 0,
    Sum = 1,
    Max = 2,
}

/// Pooling reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingType {
    #[default]
    Max = 0,
    Avg = 1,
}

// ── Parameter structs ──────────────────────────────────────────────

/// Shape of an `Input` or `MemoryData` blob; 0 means "not fixed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobShape {
    pub w: i32,
    pub h: i32,
    pub c: i32,
}

impl BlobShape {
    /// Builds from dims in `[c, h, w]` order (batch already dropped).
    pub fn from_chw(dims: &[usize]) -> Self {
        let d = |i: usize| dims.get(i).map(|&v| v as i32).unwrap_or(0);
        match dims.len() {
            0 => Self { w: 1, h: 0, c: 0 },
            1 => Self { w: d(0), h: 0, c: 0 },
            2 => Self { w: d(1), h: d(0), c: 0 },
            _ => Self { w: d(2), h: d(1), c: d(0) },
        }
    }

    pub fn num_elements(&self) -> usize {
        [self.w, self.h, self.c]
            .iter()
            .filter(|&&d| d > 0)
            .map(|&d| d as usize)
            .product()
    }
}

/// Parameters shared by the four convolution kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvParams {
    pub num_output: i32,
    pub kernel_w: i32,
    pub kernel_h: i32,
    pub dilation_w: i32,
    pub dilation_h: i32,
    pub stride_w: i32,
    pub stride_h: i32,
    /// Negative values select automatic padding (-233 same-upper,
    /// -234 same-lower).
    pub pad_left: i32,
    pub pad_right: i32,
    pub pad_top: i32,
    pub pad_bottom: i32,
    pub bias_term: bool,
    pub weight_data_size: i32,
    /// Written only by the depthwise kinds.
    pub group: i32,
    /// Written only by the deconvolution kinds.
    pub output_pad_right: i32,
    pub output_pad_bottom: i32,
    pub activation: Activation,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            num_output: 0,
            kernel_w: 0,
            kernel_h: 0,
            dilation_w: 1,
            dilation_h: 1,
            stride_w: 1,
            stride_h: 1,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
            bias_term: false,
            weight_data_size: 0,
            group: 1,
            output_pad_right: 0,
            output_pad_bottom: 0,
            activation: Activation::None,
        }
    }
}

impl ConvParams {
    fn write(&self, w: &mut ParamWriter, depthwise: bool, deconv: bool) {
        w.int(0, self.num_output)
            .int(1, self.kernel_w)
            .int(11, self.kernel_h)
            .int(2, self.dilation_w)
            .int(12, self.dilation_h)
            .int(3, self.stride_w)
            .int(13, self.stride_h)
            .int(4, self.pad_left)
            .int(15, self.pad_right)
            .int(14, self.pad_top)
            .int(16, self.pad_bottom)
            .int(5, self.bias_term as i32)
            .int(6, self.weight_data_size);
        if depthwise {
            w.int(7, self.group);
        }
        if deconv {
            w.int_if(18, self.output_pad_right, 0)
                .int_if(19, self.output_pad_bottom, self.output_pad_right);
        }
        self.activation.write(w);
    }

    fn read(d: &ParamDict) -> Result<Self, ModelError> {
        let kernel_w = d.int(1, 0)?;
        let dilation_w = d.int(2, 1)?;
        let stride_w = d.int(3, 1)?;
        let pad_left = d.int(4, 0)?;
        let pad_top = d.int(14, pad_left)?;
        let output_pad_right = d.int(18, 0)?;
        Ok(Self {
            num_output: d.int(0, 0)?,
            kernel_w,
            kernel_h: d.int(11, kernel_w)?,
            dilation_w,
            dilation_h: d.int(12, dilation_w)?,
            stride_w,
            stride_h: d.int(13, stride_w)?,
            pad_left,
            pad_right: d.int(15, pad_left)?,
            pad_top,
            pad_bottom: d.int(16, pad_top)?,
            bias_term: d.int(5, 0)? != 0,
            weight_data_size: d.int(6, 0)?,
            group: d.int(7, 1)?,
            output_pad_right,
            output_pad_bottom: d.int(19, output_pad_right)?,
            activation: Activation::read(d)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InnerProductParams {
    pub num_output: i32,
    pub bias_term: bool,
    pub weight_data_size: i32,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolingParams {
    pub pooling_type: PoolingType,
    pub kernel_w: i32,
    pub kernel_h: i32,
    pub stride_w: i32,
    pub stride_h: i32,
    pub pad_left: i32,
    pub pad_right: i32,
    pub pad_top: i32,
    pub pad_bottom: i32,
    pub global: bool,
    /// 0 full (ceil), 1 valid, 2 same-upper, 3 same-lower.
    pub pad_mode: i32,
    pub count_include_pad: bool,
    pub adaptive: bool,
    pub out_w: i32,
    pub out_h: i32,
}

impl Default for PoolingParams {
    fn default() -> Self {
        Self {
            pooling_type: PoolingType::Max,
            kernel_w: 0,
            kernel_h: 0,
            stride_w: 1,
            stride_h: 1,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
            global: false,
            pad_mode: 0,
            count_include_pad: false,
            adaptive: false,
            out_w: 0,
            out_h: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardSigmoidParams {
    pub alpha: f32,
    pub beta: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpParams {
    pub op: BinaryOpType,
    pub with_scalar: bool,
    /// The scalar operand; 0 unless `with_scalar`.
    pub b: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EltwiseParams {
    pub op: EltwiseOp,
    pub coeffs: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceParams {
    /// Output sizes along `axis`; -233 takes the remainder.
    pub slices: Vec<i32>,
    pub axis: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub starts: Vec<i32>,
    pub ends: Vec<i32>,
    pub axes: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaddingParams {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
    /// 0 constant, 1 replicate, 2 reflect.
    pub pad_type: i32,
    pub value: f32,
    pub front: i32,
    pub behind: i32,
}

/// Target shape of a `Reshape`; -233 leaves a dimension unset, -1 infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReshapeParams {
    pub w: i32,
    pub h: i32,
    pub c: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpParams {
    /// 1 nearest, 2 bilinear, 3 bicubic.
    pub resize_type: i32,
    pub height_scale: f32,
    pub width_scale: f32,
    pub output_height: i32,
    pub output_width: i32,
    /// Output size taken from the second input blob.
    pub dynamic_target_size: bool,
    pub align_corner: bool,
}

impl Default for InterpParams {
    fn default() -> Self {
        Self {
            resize_type: 1,
            height_scale: 1.0,
            width_scale: 1.0,
            output_height: 0,
            output_width: 0,
            dynamic_target_size: false,
            align_corner: false,
        }
    }
}

/// `PixelShuffle` (mode 0 channel-row-column, 1 depth-row-column) and
/// `Reorg` (mode 1 is the inverse of pixel shuffle mode 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleParams {
    pub factor: i32,
    pub mode: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormParams {
    pub channels: i32,
    pub eps: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceNormParams {
    pub channels: i32,
    pub eps: f32,
    pub affine: bool,
}

// ── LayerParams ────────────────────────────────────────────────────

/// Kind and parameters of one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerParams {
    Input(BlobShape),
    MemoryData(BlobShape),
    Split,
    Convolution(ConvParams),
    ConvolutionDepthWise(ConvParams),
    Deconvolution(ConvParams),
    DeconvolutionDepthWise(ConvParams),
    InnerProduct(InnerProductParams),
    Pooling(PoolingParams),
    ReLU { slope: f32 },
    PReLU { num_slope: i32 },
    Sigmoid,
    TanH,
    Clip { min: f32, max: f32 },
    Elu { alpha: f32 },
    HardSigmoid(HardSigmoidParams),
    HardSwish(HardSigmoidParams),
    Swish,
    Softmax { axis: i32 },
    UnaryOp(UnaryOpType),
    BinaryOp(BinaryOpParams),
    Eltwise(EltwiseParams),
    Concat { axis: i32 },
    Slice(SliceParams),
    Crop(CropParams),
    Padding(PaddingParams),
    Reshape(ReshapeParams),
    Flatten,
    Permute { order_type: i32 },
    Interp(InterpParams),
    PixelShuffle(ShuffleParams),
    Reorg(ShuffleParams),
    BatchNorm(BatchNormParams),
    InstanceNorm(InstanceNormParams),
    /// A kind outside this catalog, kept with its raw parameters. Such
    /// layers are never produced by conversion and declare no weights.
    Other {
        kind: String,
        params: BTreeMap<i32, ParamValue>,
    },
}

/// Size and storage class of one weight a kind reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightSpec {
    pub len: usize,
    pub tagged: bool,
}

impl WeightSpec {
    fn raw(len: i32) -> Self {
        Self {
            len: len.max(0) as usize,
            tagged: false,
        }
    }

    fn tagged(len: i32) -> Self {
        Self {
            len: len.max(0) as usize,
            tagged: true,
        }
    }
}

impl LayerParams {
    /// The ncnn type tag.
    pub fn kind(&self) -> &str {
        match self {
            LayerParams::Input(_) => "Input",
            LayerParams::MemoryData(_) => "MemoryData",
            LayerParams::Split => "Split",
            LayerParams::Convolution(_) => "Convolution",
            LayerParams::ConvolutionDepthWise(_) => "ConvolutionDepthWise",
            LayerParams::Deconvolution(_) => "Deconvolution",
            LayerParams::DeconvolutionDepthWise(_) => "DeconvolutionDepthWise",
            LayerParams::InnerProduct(_) => "InnerProduct",
            LayerParams::Pooling(_) => "Pooling",
            LayerParams::ReLU { .. } => "ReLU",
            LayerParams::PReLU { .. } => "PReLU",
            LayerParams::Sigmoid => "Sigmoid",
            LayerParams::TanH => "TanH",
            LayerParams::Clip { .. } => "Clip",
            LayerParams::Elu { .. } => "ELU",
            LayerParams::HardSigmoid(_) => "HardSigmoid",
            LayerParams::HardSwish(_) => "HardSwish",
            LayerParams::Swish => "Swish",
            LayerParams::Softmax { .. } => "Softmax",
            LayerParams::UnaryOp(_) => "UnaryOp",
            LayerParams::BinaryOp(_) => "BinaryOp",
            LayerParams::Eltwise(_) => "Eltwise",
            LayerParams::Concat { .. } => "Concat",
            LayerParams::Slice(_) => "Slice",
            LayerParams::Crop(_) => "Crop",
            LayerParams::Padding(_) => "Padding",
            LayerParams::Reshape(_) => "Reshape",
            LayerParams::Flatten => "Flatten",
            LayerParams::Permute { .. } => "Permute",
            LayerParams::Interp(_) => "Interp",
            LayerParams::PixelShuffle(_) => "PixelShuffle",
            LayerParams::Reorg(_) => "Reorg",
            LayerParams::BatchNorm(_) => "BatchNorm",
            LayerParams::InstanceNorm(_) => "InstanceNorm",
            LayerParams::Other { kind, .. } => kind,
        }
    }

    /// Returns the convolution parameters of any of the four conv kinds.
    pub fn as_conv(&self) -> Option<&ConvParams> {
        match self {
            LayerParams::Convolution(p)
            | LayerParams::ConvolutionDepthWise(p)
            | LayerParams::Deconvolution(p)
            | LayerParams::DeconvolutionDepthWise(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this is one of the two deconvolution kinds.
    pub fn is_deconv(&self) -> bool {
        matches!(
            self,
            LayerParams::Deconvolution(_) | LayerParams::DeconvolutionDepthWise(_)
        )
    }

    /// Weights this kind reads from the `.bin` stream, in order.
    pub fn weight_specs(&self) -> Vec<WeightSpec> {
        match self {
            LayerParams::MemoryData(s) => vec![WeightSpec {
                len: s.num_elements(),
                tagged: false,
            }],
            LayerParams::Convolution(p)
            | LayerParams::ConvolutionDepthWise(p)
            | LayerParams::Deconvolution(p)
            | LayerParams::DeconvolutionDepthWise(p) => {
                let mut specs = vec![WeightSpec::tagged(p.weight_data_size)];
                if p.bias_term {
                    specs.push(WeightSpec::raw(p.num_output));
                }
                specs
            }
            LayerParams::InnerProduct(p) => {
                let mut specs = vec![WeightSpec::tagged(p.weight_data_size)];
                if p.bias_term {
                    specs.push(WeightSpec::raw(p.num_output));
                }
                specs
            }
            LayerParams::PReLU { num_slope } => vec![WeightSpec::raw(*num_slope)],
            LayerParams::BatchNorm(p) => vec![WeightSpec::raw(p.channels); 4],
            LayerParams::InstanceNorm(p) if p.affine => vec![WeightSpec::raw(p.channels); 2],
            _ => Vec::new(),
        }
    }

    /// Renders the ` id=value` list of a layer line.
    pub fn write(&self) -> String {
        let mut w = ParamWriter::new();
        match self {
            LayerParams::Input(s) | LayerParams::MemoryData(s) => {
                w.int(0, s.w).int(1, s.h).int(2, s.c);
            }
            LayerParams::Split
            | LayerParams::Sigmoid
            | LayerParams::TanH
            | LayerParams::Swish
            | LayerParams::Flatten => {}
            LayerParams::Convolution(p) => p.write(&mut w, false, false),
            LayerParams::ConvolutionDepthWise(p) => p.write(&mut w, true, false),
            LayerParams::Deconvolution(p) => p.write(&mut w, false, true),
            LayerParams::DeconvolutionDepthWise(p) => p.write(&mut w, true, true),
            LayerParams::InnerProduct(p) => {
                w.int(0, p.num_output)
                    .int(1, p.bias_term as i32)
                    .int(2, p.weight_data_size);
                p.activation.write(&mut w);
            }
            LayerParams::Pooling(p) => {
                w.int(0, p.pooling_type as i32)
                    .int(1, p.kernel_w)
                    .int(11, p.kernel_h)
                    .int(2, p.stride_w)
                    .int(12, p.stride_h)
                    .int(3, p.pad_left)
                    .int(14, p.pad_right)
                    .int(13, p.pad_top)
                    .int(15, p.pad_bottom)
                    .int(4, p.global as i32)
                    .int(5, p.pad_mode)
                    .int_if(6, p.count_include_pad as i32, 0)
                    .int_if(7, p.adaptive as i32, 0);
                if p.adaptive {
                    w.int(8, p.out_w).int(18, p.out_h);
                }
            }
            LayerParams::ReLU { slope } => {
                w.float_if(0, *slope, 0.0);
            }
            LayerParams::PReLU { num_slope } => {
                w.int(0, *num_slope);
            }
            LayerParams::Clip { min, max } => {
                w.float(0, *min).float(1, *max);
            }
            LayerParams::Elu { alpha } => {
                w.float(0, *alpha);
            }
            LayerParams::HardSigmoid(p) | LayerParams::HardSwish(p) => {
                w.float(0, p.alpha).float(1, p.beta);
            }
            LayerParams::Softmax { axis } => {
                w.int(0, *axis).int(1, 1);
            }
            LayerParams::UnaryOp(op) => {
                w.int(0, *op as i32);
            }
            LayerParams::BinaryOp(p) => {
                w.int(0, p.op as i32);
                if p.with_scalar {
                    w.int(1, 1).float(2, p.b);
                }
            }
            LayerParams::Eltwise(p) => {
                w.int(0, p.op as i32);
                if !p.coeffs.is_empty() {
                    w.floats(1, &p.coeffs);
                }
            }
            LayerParams::Concat { axis } => {
                w.int(0, *axis);
            }
            LayerParams::Slice(p) => {
                w.ints(0, &p.slices).int(1, p.axis);
            }
            LayerParams::Crop(p) => {
                w.ints(9, &p.starts).ints(10, &p.ends).ints(11, &p.axes);
            }
            LayerParams::Padding(p) => {
                w.int(0, p.top)
                    .int(1, p.bottom)
                    .int(2, p.left)
                    .int(3, p.right)
                    .int_if(4, p.pad_type, 0)
                    .float_if(5, p.value, 0.0)
                    .int_if(7, p.front, 0)
                    .int_if(8, p.behind, 0);
            }
            LayerParams::Reshape(p) => {
                w.int(0, p.w).int(1, p.h).int(2, p.c);
            }
            LayerParams::Permute { order_type } => {
                w.int(0, *order_type);
            }
            LayerParams::Interp(p) => {
                w.int(0, p.resize_type)
                    .float(1, p.height_scale)
                    .float(2, p.width_scale)
                    .int(3, p.output_height)
                    .int(4, p.output_width)
                    .int_if(5, p.dynamic_target_size as i32, 0)
                    .int_if(6, p.align_corner as i32, 0);
            }
            LayerParams::PixelShuffle(p) | LayerParams::Reorg(p) => {
                w.int(0, p.factor).int_if(1, p.mode, 0);
            }
            LayerParams::BatchNorm(p) => {
                w.int(0, p.channels).float(1, p.eps);
            }
            LayerParams::InstanceNorm(p) => {
                w.int(0, p.channels)
                    .float(1, p.eps)
                    .int(2, p.affine as i32);
            }
            LayerParams::Other { params, .. } => {
                for (&id, value) in params {
                    w.value(id, value);
                }
            }
        }
        w.finish()
    }

    /// Decodes the parameters of a layer of type `kind`.
    pub fn read(kind: &str, d: &ParamDict) -> Result<Self, ModelError> {
        let shape = |d: &ParamDict| -> Result<BlobShape, ModelError> {
            Ok(BlobShape {
                w: d.int(0, 0)?,
                h: d.int(1, 0)?,
                c: d.int(2, 0)?,
            })
        };
        let shuffle = |d: &ParamDict| -> Result<ShuffleParams, ModelError> {
            Ok(ShuffleParams {
                factor: d.int(0, 1)?,
                mode: d.int(1, 0)?,
            })
        };
        let params = match kind {
            "Input" => LayerParams::Input(shape(d)?),
            "MemoryData" => LayerParams::MemoryData(shape(d)?),
            "Split" => LayerParams::Split,
            "Convolution" => LayerParams::Convolution(ConvParams::read(d)?),
            "ConvolutionDepthWise" => LayerParams::ConvolutionDepthWise(ConvParams::read(d)?),
            "Deconvolution" => LayerParams::Deconvolution(ConvParams::read(d)?),
            "DeconvolutionDepthWise" => LayerParams::DeconvolutionDepthWise(ConvParams::read(d)?),
            "InnerProduct" => LayerParams::InnerProduct(InnerProductParams {
                num_output: d.int(0, 0)?,
                bias_term: d.int(1, 0)? != 0,
                weight_data_size: d.int(2, 0)?,
                activation: Activation::read(d)?,
            }),
            "Pooling" => {
                let kernel_w = d.int(1, 0)?;
                let stride_w = d.int(2, 1)?;
                let pad_left = d.int(3, 0)?;
                let pad_top = d.int(13, pad_left)?;
                let out_w = d.int(8, 0)?;
                let pooling_type = match d.int(0, 0)? {
                    0 => PoolingType::Max,
                    1 => PoolingType::Avg,
                    other => return Err(d.invalid(0, format!("unknown pooling type {other}"))),
                };
                LayerParams::Pooling(PoolingParams {
                    pooling_type,
                    kernel_w,
                    kernel_h: d.int(11, kernel_w)?,
                    stride_w,
                    stride_h: d.int(12, stride_w)?,
                    pad_left,
                    pad_right: d.int(14, pad_left)?,
                    pad_top,
                    pad_bottom: d.int(15, pad_top)?,
                    global: d.int(4, 0)? != 0,
                    pad_mode: d.int(5, 0)?,
                    count_include_pad: d.int(6, 0)? != 0,
                    adaptive: d.int(7, 0)? != 0,
                    out_w,
                    out_h: d.int(18, out_w)?,
                })
            }
            "ReLU" => LayerParams::ReLU {
                slope: d.float(0, 0.0)?,
            },
            "PReLU" => LayerParams::PReLU {
                num_slope: d.int(0, 0)?,
            },
            "Sigmoid" => LayerParams::Sigmoid,
            "TanH" => LayerParams::TanH,
            "Clip" => LayerParams::Clip {
                min: d.float(0, -f32::MAX)?,
                max: d.float(1, f32::MAX)?,
            },
            "ELU" => LayerParams::Elu {
                alpha: d.float(0, 0.1)?,
            },
            "HardSigmoid" => LayerParams::HardSigmoid(HardSigmoidParams {
                alpha: d.float(0, 0.2)?,
                beta: d.float(1, 0.5)?,
            }),
            "HardSwish" => LayerParams::HardSwish(HardSigmoidParams {
                alpha: d.float(0, 0.2)?,
                beta: d.float(1, 0.5)?,
            }),
            "Swish" => LayerParams::Swish,
            "Softmax" => LayerParams::Softmax {
                axis: d.int(0, 0)?,
            },
            "UnaryOp" => {
                let v = d.int(0, 0)?;
                LayerParams::UnaryOp(
                    UnaryOpType::from_i32(v)
                        .ok_or_else(|| d.invalid(0, format!("unknown unary op {v}")))?,
                )
            }
            "BinaryOp" => {
                let v = d.int(0, 0)?;
                LayerParams::BinaryOp(BinaryOpParams {
                    op: BinaryOpType::from_i32(v)
                        .ok_or_else(|| d.invalid(0, format!("unknown binary op {v}")))?,
                    with_scalar: d.int(1, 0)? != 0,
                    b: d.float(2, 0.0)?,
                })
            }
            "Eltwise" => {
                let op = match d.int(0, 1)? {
                    0 => EltwiseOp::Prod,
                    1 => EltwiseOp::Sum,
                    2 => EltwiseOp::Max,
                    other => return Err(d.invalid(0, format!("unknown eltwise op {other}"))),
                };
                LayerParams::Eltwise(EltwiseParams {
                    op,
                    coeffs: d.floats(1)?,
                })
            }
            "Concat" => LayerParams::Concat {
                axis: d.int(0, 0)?,
            },
            "Slice" => LayerParams::Slice(SliceParams {
                slices: d.ints(0)?,
                axis: d.int(1, 0)?,
            }),
            "Crop" => LayerParams::Crop(CropParams {
                starts: d.ints(9)?,
                ends: d.ints(10)?,
                axes: d.ints(11)?,
            }),
            "Padding" => LayerParams::Padding(PaddingParams {
                top: d.int(0, 0)?,
                bottom: d.int(1, 0)?,
                left: d.int(2, 0)?,
                right: d.int(3, 0)?,
                pad_type: d.int(4, 0)?,
                value: d.float(5, 0.0)?,
                front: d.int(7, 0)?,
                behind: d.int(8, 0)?,
            }),
            "Reshape" => LayerParams::Reshape(ReshapeParams {
                w: d.int(0, -233)?,
                h: d.int(1, -233)?,
                c: d.int(2, -233)?,
            }),
            "Flatten" => LayerParams::Flatten,
            "Permute" => LayerParams::Permute {
                order_type: d.int(0, 0)?,
            },
            "Interp" => LayerParams::Interp(InterpParams {
                resize_type: d.int(0, 0)?,
                height_scale: d.float(1, 1.0)?,
                width_scale: d.float(2, 1.0)?,
                output_height: d.int(3, 0)?,
                output_width: d.int(4, 0)?,
                dynamic_target_size: d.int(5, 0)? != 0,
                align_corner: d.int(6, 0)? != 0,
            }),
            "PixelShuffle" => LayerParams::PixelShuffle(shuffle(d)?),
            "Reorg" => LayerParams::Reorg(shuffle(d)?),
            "BatchNorm" => LayerParams::BatchNorm(BatchNormParams {
                channels: d.int(0, 0)?,
                eps: d.float(1, 0.0)?,
            }),
            "InstanceNorm" => LayerParams::InstanceNorm(InstanceNormParams {
                channels: d.int(0, 0)?,
                eps: d.float(1, 0.001)?,
                affine: d.int(2, 1)? != 0,
            }),
            other => {
                tracing::debug!("line {}: keeping unknown layer type '{other}' as is", d.line());
                LayerParams::Other {
                    kind: other.to_string(),
                    params: d.values().clone(),
                }
            }
        };
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reread(p: &LayerParams) -> LayerParams {
        let text = p.write();
        let d = ParamDict::parse(text.split_whitespace(), 1).unwrap();
        LayerParams::read(p.kind(), &d).unwrap()
    }

    #[test]
    fn test_convolution_param_line() {
        let p = LayerParams::Convolution(ConvParams {
            num_output: 64,
            kernel_w: 3,
            kernel_h: 3,
            pad_left: 1,
            pad_right: 1,
            pad_top: 1,
            pad_bottom: 1,
            bias_term: true,
            weight_data_size: 1728,
            activation: Activation::ReLU,
            ..Default::default()
        });
        assert_eq!(
            p.write(),
            " 0=64 1=3 11=3 2=1 12=1 3=1 13=1 4=1 15=1 14=1 16=1 5=1 6=1728 9=1"
        );
        assert_eq!(reread(&p), p);
    }

    #[test]
    fn test_depthwise_and_deconv_extras() {
        let p = LayerParams::DeconvolutionDepthWise(ConvParams {
            num_output: 8,
            kernel_w: 4,
            kernel_h: 4,
            stride_w: 2,
            stride_h: 2,
            group: 8,
            weight_data_size: 128,
            output_pad_right: 1,
            output_pad_bottom: 0,
            activation: Activation::LeakyReLU(0.2),
            ..Default::default()
        });
        let text = p.write();
        assert!(text.contains(" 7=8"));
        assert!(text.contains(" 18=1 19=0"));
        assert!(text.contains(" 9=2 -23310=1,2e-1"));
        assert_eq!(reread(&p), p);
    }

    #[test]
    fn test_optional_params_omitted() {
        let p = LayerParams::BinaryOp(BinaryOpParams {
            op: BinaryOpType::Add,
            with_scalar: false,
            b: 0.0,
        });
        assert_eq!(p.write(), " 0=0");
        let p = LayerParams::ReLU { slope: 0.0 };
        assert_eq!(p.write(), "");
        let p = LayerParams::PixelShuffle(ShuffleParams { factor: 4, mode: 0 });
        assert_eq!(p.write(), " 0=4");
    }

    #[test]
    fn test_every_kind_rereads() {
        let all = vec![
            LayerParams::Input(BlobShape { w: 64, h: 64, c: 3 }),
            LayerParams::MemoryData(BlobShape { w: 8, h: 0, c: 0 }),
            LayerParams::Split,
            LayerParams::InnerProduct(InnerProductParams {
                num_output: 10,
                bias_term: true,
                weight_data_size: 100,
                activation: Activation::Clip { min: 0.0, max: 6.0 },
            }),
            LayerParams::Pooling(PoolingParams {
                pooling_type: PoolingType::Avg,
                kernel_w: 2,
                kernel_h: 2,
                stride_w: 2,
                stride_h: 2,
                pad_mode: 1,
                count_include_pad: true,
                ..Default::default()
            }),
            LayerParams::Pooling(PoolingParams {
                global: true,
                adaptive: true,
                out_w: 7,
                out_h: 5,
                ..Default::default()
            }),
            LayerParams::ReLU { slope: 0.1 },
            LayerParams::PReLU { num_slope: 16 },
            LayerParams::Sigmoid,
            LayerParams::TanH,
            LayerParams::Clip { min: -f32::MAX, max: 6.0 },
            LayerParams::Elu { alpha: 1.0 },
            LayerParams::HardSigmoid(HardSigmoidParams { alpha: 0.2, beta: 0.5 }),
            LayerParams::HardSwish(HardSigmoidParams { alpha: 1.0 / 6.0, beta: 0.5 }),
            LayerParams::Swish,
            LayerParams::Softmax { axis: 0 },
            LayerParams::UnaryOp(UnaryOpType::Tanh),
            LayerParams::BinaryOp(BinaryOpParams {
                op: BinaryOpType::RDiv,
                with_scalar: true,
                b: 255.0,
            }),
            LayerParams::Eltwise(EltwiseParams {
                op: EltwiseOp::Sum,
                coeffs: vec![],
            }),
            LayerParams::Concat { axis: 0 },
            LayerParams::Slice(SliceParams {
                slices: vec![16, -233],
                axis: 0,
            }),
            LayerParams::Crop(CropParams {
                starts: vec![1],
                ends: vec![-1],
                axes: vec![2],
            }),
            LayerParams::Padding(PaddingParams {
                top: 1,
                bottom: 1,
                left: 2,
                right: 2,
                pad_type: 2,
                ..Default::default()
            }),
            LayerParams::Reshape(ReshapeParams { w: -1, h: -233, c: -233 }),
            LayerParams::Flatten,
            LayerParams::Permute { order_type: 3 },
            LayerParams::Interp(InterpParams {
                resize_type: 2,
                height_scale: 2.0,
                width_scale: 2.0,
                align_corner: true,
                ..Default::default()
            }),
            LayerParams::Reorg(ShuffleParams { factor: 2, mode: 1 }),
            LayerParams::BatchNorm(BatchNormParams { channels: 32, eps: 1e-5 }),
            LayerParams::InstanceNorm(InstanceNormParams {
                channels: 32,
                eps: 1e-5,
                affine: false,
            }),
        ];
        for p in all {
            assert_eq!(reread(&p), p, "kind {}", p.kind());
        }
    }

    #[test]
    fn test_weight_specs() {
        let conv = LayerParams::Convolution(ConvParams {
            num_output: 4,
            bias_term: true,
            weight_data_size: 36,
            ..Default::default()
        });
        assert_eq!(
            conv.weight_specs(),
            vec![WeightSpec::tagged(36), WeightSpec::raw(4)]
        );
        let bn = LayerParams::BatchNorm(BatchNormParams { channels: 3, eps: 0.0 });
        assert_eq!(bn.weight_specs().len(), 4);
        let md = LayerParams::MemoryData(BlobShape { w: 4, h: 2, c: 3 });
        assert_eq!(md.weight_specs()[0].len, 24);
        assert!(LayerParams::Swish.weight_specs().is_empty());
    }

    #[test]
    fn test_unknown_kind_kept_verbatim() {
        let d = ParamDict::parse(["0=16", "1=5e-1", "-23302=2,1,2"], 9).unwrap();
        let p = LayerParams::read("LSTM", &d).unwrap();
        assert_eq!(p.kind(), "LSTM");
        assert!(p.weight_specs().is_empty());
        assert_eq!(p.write(), " 0=16 1=5e-1 -23302=2,1,2");
        assert_eq!(reread(&p), p);
    }

    #[test]
    fn test_binary_op_swap() {
        assert_eq!(BinaryOpType::Sub.swapped(), Some(BinaryOpType::RSub));
        assert_eq!(BinaryOpType::Mul.swapped(), Some(BinaryOpType::Mul));
        assert_eq!(BinaryOpType::Pow.swapped(), None);
        assert_eq!(UnaryOpType::from_i32(16), Some(UnaryOpType::Tanh));
        assert_eq!(UnaryOpType::from_i32(17), None);
    }
}
