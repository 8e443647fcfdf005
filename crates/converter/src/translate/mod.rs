// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator translation: graph nodes to runtime layers.
//!
//! Nodes are visited in stored order and dispatched through [`RULES`], a
//! static table keyed by operator type. A rule is a pure function from a
//! [`NodeView`] to a [`Translation`]; applying the translation is the only
//! place the translation state changes.
//!
//! Constants never become blobs on their own. An initializer (or a value
//! produced by a `Constant` node) that some layer reads as an activation is
//! materialized as a `MemoryData` layer on its first such reference, so
//! weights nobody reads never reach the output.

mod activation;
mod conv;
mod elementwise;
mod layout;
mod norm;
mod passthrough;
mod pool;
mod resize;
mod view;

use crate::builder::{ModelBuilder, PendingLayer};
use crate::ConvertError;
use ncnn_model::params::BlobShape;
use ncnn_model::{LayerParams, NcnnModel, Weight};
use onnx_graph::{Dim, GraphDocument, Optimized};
use std::collections::{HashMap, HashSet};
use tensor_core::{DType, Shape, TensorData};
use tracing::{debug, info, warn};

pub(crate) use view::NodeView;

type RuleFn = fn(&NodeView<'_>) -> Result<Translation, ConvertError>;

/// Operator type to rule. Lookup is linear; the table is small.
static RULES: &[(&str, RuleFn)] = &[
    ("Conv", conv::conv),
    ("ConvTranspose", conv::conv_transpose),
    ("Gemm", conv::gemm),
    ("MatMul", conv::matmul),
    ("Add", elementwise::binary),
    ("Sub", elementwise::binary),
    ("Mul", elementwise::binary),
    ("Div", elementwise::binary),
    ("Max", elementwise::binary),
    ("Min", elementwise::binary),
    ("Pow", elementwise::binary),
    ("Sum", elementwise::sum),
    ("Relu", activation::relu),
    ("LeakyRelu", activation::leaky_relu),
    ("PRelu", activation::prelu),
    ("Sigmoid", activation::sigmoid),
    ("HardSigmoid", activation::hard_sigmoid),
    ("HardSwish", activation::hard_swish),
    ("Tanh", activation::tanh),
    ("Clip", activation::clip),
    ("Elu", activation::elu),
    ("Softmax", activation::softmax),
    ("Abs", activation::unary),
    ("Neg", activation::unary),
    ("Floor", activation::unary),
    ("Ceil", activation::unary),
    ("Sqrt", activation::unary),
    ("Exp", activation::unary),
    ("Log", activation::unary),
    ("Sin", activation::unary),
    ("Cos", activation::unary),
    ("Tan", activation::unary),
    ("Asin", activation::unary),
    ("Acos", activation::unary),
    ("Atan", activation::unary),
    ("Reciprocal", activation::unary),
    ("MaxPool", pool::pool),
    ("AveragePool", pool::pool),
    ("GlobalMaxPool", pool::global_pool),
    ("GlobalAveragePool", pool::global_pool),
    ("BatchNormalization", norm::batch_norm),
    ("InstanceNormalization", norm::instance_norm),
    ("Concat", layout::concat),
    ("Split", layout::split),
    ("Slice", layout::slice),
    ("Pad", layout::pad),
    ("Reshape", layout::reshape),
    ("Flatten", layout::flatten),
    ("Transpose", layout::transpose),
    ("DepthToSpace", layout::depth_to_space),
    ("SpaceToDepth", layout::space_to_depth),
    ("Upsample", resize::upsample),
    ("Resize", resize::resize),
    ("Identity", passthrough::identity),
    ("Dropout", passthrough::identity),
    ("Constant", passthrough::constant),
    ("Cast", passthrough::cast),
];

fn rule_for(op_type: &str) -> Option<RuleFn> {
    RULES
        .iter()
        .find(|(op, _)| *op == op_type)
        .map(|&(_, rule)| rule)
}

/// Whether an operator type has a translation rule.
pub fn is_supported(op_type: &str) -> bool {
    rule_for(op_type).is_some()
}

/// The outcome of one rule.
#[derive(Debug, Default)]
pub(crate) struct Translation {
    pub layers: Vec<PendingLayer>,
    /// `(tensor, target)`: `tensor` is another name for `target`.
    pub aliases: Vec<(String, String)>,
    /// Values known at conversion time.
    pub constants: Vec<(String, TensorData)>,
    /// Later nodes fused into this translation.
    pub absorbed: Vec<usize>,
}

impl Translation {
    pub fn layer(layer: PendingLayer) -> Self {
        Self {
            layers: vec![layer],
            ..Self::default()
        }
    }

    pub fn alias(tensor: &str, target: &str) -> Self {
        Self {
            aliases: vec![(tensor.to_string(), target.to_string())],
            ..Self::default()
        }
    }

    pub fn constant(tensor: &str, value: TensorData) -> Self {
        Self {
            constants: vec![(tensor.to_string(), value)],
            ..Self::default()
        }
    }

    pub fn absorbing(mut self, nodes: impl IntoIterator<Item = usize>) -> Self {
        self.absorbed.extend(nodes);
        self
    }
}

/// Name resolution shared by every view.
#[derive(Debug, Default)]
pub(crate) struct State {
    consts: HashMap<String, TensorData>,
    aliases: HashMap<String, String>,
}

impl State {
    pub(crate) fn resolve<'s>(&'s self, mut name: &'s str) -> &'s str {
        while let Some(target) = self.aliases.get(name) {
            name = target;
        }
        name
    }
}

struct Context<'d> {
    doc: &'d GraphDocument<Optimized>,
    state: State,
    produced: HashSet<String>,
    absorbed: HashSet<usize>,
    builder: ModelBuilder,
}

/// Translates an optimized document into a runtime model.
pub fn translate(doc: &GraphDocument<Optimized>) -> Result<NcnnModel, ConvertError> {
    let mut cx = Context {
        doc,
        state: State::default(),
        produced: HashSet::new(),
        absorbed: HashSet::new(),
        builder: ModelBuilder::new(),
    };

    for input in doc.inputs() {
        let shape = input_shape(input.shape.as_deref());
        cx.builder.push(PendingLayer::new(
            input.name.clone(),
            LayerParams::Input(shape),
            Vec::<String>::new(),
            [input.name.clone()],
        ));
        cx.produced.insert(input.name.clone());
    }

    for (index, node) in doc.nodes().iter().enumerate() {
        if cx.absorbed.contains(&index) {
            debug!("node '{}' fused into an earlier layer", node.display_name());
            continue;
        }
        if !node.domain.is_empty() && node.domain != "ai.onnx" {
            return Err(ConvertError::UnsupportedOperator {
                op_type: format!("{}.{}", node.domain, node.op_type),
                node: node.display_name(),
            });
        }
        let rule = rule_for(&node.op_type).ok_or_else(|| ConvertError::UnsupportedOperator {
            op_type: node.op_type.clone(),
            node: node.display_name(),
        })?;
        cx.check_available(index)?;

        let view = NodeView::new(index, node, doc, &cx.state, &cx.absorbed);
        let layer_name = view.layer_name();
        let translation = rule(&view)?;
        debug!(
            "{} '{}': {} layer(s), {} fused",
            node.op_type,
            node.display_name(),
            translation.layers.len(),
            translation.absorbed.len()
        );
        cx.apply(&layer_name, translation)?;
    }

    for output in doc.outputs() {
        let name = output.name.as_str();
        if cx.produced.contains(name) {
            continue;
        }
        if cx.constant(name).is_some() {
            cx.materialize(name)?;
        } else {
            warn!("graph output '{name}' is not produced by any layer");
        }
    }

    let layers = cx.builder.len();
    let model = cx.builder.finish()?;
    info!(
        "translated {} nodes into {} layers ({} after split insertion)",
        doc.nodes().len(),
        layers,
        model.layers().len()
    );
    Ok(model)
}

impl Context<'_> {
    fn constant(&self, name: &str) -> Option<&TensorData> {
        let resolved = self.state.resolve(name);
        self.doc
            .initializer(resolved)
            .or_else(|| self.state.consts.get(resolved))
    }

    fn check_available(&self, index: usize) -> Result<(), ConvertError> {
        let node = &self.doc.nodes()[index];
        for input in node.inputs.iter().filter(|s| !s.is_empty()) {
            let resolved = self.state.resolve(input);
            if !self.produced.contains(resolved) && self.constant(input).is_none() {
                return Err(ConvertError::OrderingViolation {
                    node: node.display_name(),
                    tensor: input.clone(),
                });
            }
        }
        Ok(())
    }

    fn apply(&mut self, layer_name: &str, t: Translation) -> Result<(), ConvertError> {
        self.absorbed.extend(t.absorbed);
        for (name, value) in t.constants {
            self.state.consts.insert(name, value);
        }
        for (tensor, target) in t.aliases {
            if self.doc.is_graph_output(&tensor) {
                // Outputs keep their names, so copy instead of renaming.
                let target = self.state.resolve(&target).to_string();
                self.commit(PendingLayer::new(
                    layer_name,
                    LayerParams::Split,
                    [target],
                    [tensor],
                ))?;
            } else {
                self.state.aliases.insert(tensor, target);
            }
        }
        for layer in t.layers {
            self.commit(layer)?;
        }
        Ok(())
    }

    fn commit(&mut self, mut layer: PendingLayer) -> Result<(), ConvertError> {
        for input in &mut layer.inputs {
            let resolved = self.state.resolve(input).to_string();
            if !self.produced.contains(&resolved) {
                if self.constant(&resolved).is_some() {
                    self.materialize(&resolved)?;
                } else {
                    return Err(ConvertError::OrderingViolation {
                        node: layer.name.clone(),
                        tensor: input.clone(),
                    });
                }
            }
            *input = resolved;
        }
        self.produced.extend(layer.outputs.iter().cloned());
        self.builder.push(layer);
        Ok(())
    }

    /// Emits a `MemoryData` layer holding the constant `name`.
    fn materialize(&mut self, name: &str) -> Result<(), ConvertError> {
        let Some(value) = self.constant(name) else {
            return Ok(());
        };
        let shape = value.shape().fold_leading_units(3);
        if shape.rank() > 3 {
            return Err(ConvertError::UnsupportedAttribute {
                node: name.to_string(),
                attribute: "shape".into(),
                detail: format!("a {}-d constant cannot be a MemoryData blob", shape.rank()),
            });
        }
        let blob_shape = BlobShape::from_chw(shape.dims());
        let data = flat_f32(value, name)?;
        debug!("materializing constant '{name}' as MemoryData {shape}");
        self.builder.push(
            PendingLayer::new(
                name,
                LayerParams::MemoryData(blob_shape),
                Vec::<String>::new(),
                [name],
            )
            .with_weights(vec![Weight::raw(data)]),
        );
        self.produced.insert(name.to_string());
        Ok(())
    }
}

/// `Input` parameters from a graph input's shape hint, batch dropped.
fn input_shape(hint: Option<&[Dim]>) -> BlobShape {
    let Some(dims) = hint else {
        return BlobShape::default();
    };
    let dims: Vec<usize> = dims
        .iter()
        .map(|d| match d {
            Dim::Fixed(n) => *n,
            Dim::Symbolic(_) => 0,
        })
        .collect();
    let dims = if dims.len() >= 2 { &dims[1..] } else { &dims[..] };
    if dims.len() > 3 {
        return BlobShape::default();
    }
    BlobShape::from_chw(dims)
}

/// Casts a constant to `f32` and flattens it, the layout of every weight.
pub(crate) fn flat_f32(value: &TensorData, name: &str) -> Result<TensorData, ConvertError> {
    let n = value.num_elements();
    value
        .cast(DType::F32)
        .and_then(|t| t.reshape(Shape::vector(n)))
        .map_err(ConvertError::tensor(name))
}

/// `f32` values of a constant.
pub(crate) fn f32_values(value: &TensorData, name: &str) -> Result<Vec<f32>, ConvertError> {
    value.to_f32_vec().map_err(ConvertError::tensor(name))
}

/// Integer values of a constant.
pub(crate) fn i64_values(value: &TensorData, name: &str) -> Result<Vec<i64>, ConvertError> {
    value.to_i64_vec().map_err(ConvertError::tensor(name))
}
