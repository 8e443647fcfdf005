// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The runtime model: layers in execution order plus the blob arena.

use crate::layer::{Layer, Storage};
use crate::params::LayerParams;
use crate::ModelError;
use std::collections::{HashMap, HashSet};

/// A named activation tensor, produced by exactly one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub name: String,
    /// Index of the producing layer.
    pub producer: usize,
}

/// An ncnn model held in memory.
///
/// Construct with [`NcnnModel::new`], which validates every invariant;
/// a value of this type is always structurally sound.
#[derive(Debug, Clone, PartialEq)]
pub struct NcnnModel {
    layers: Vec<Layer>,
    blobs: Vec<Blob>,
    blob_index: HashMap<String, usize>,
}

impl NcnnModel {
    /// Builds and validates a model.
    ///
    /// # Checks
    /// - Every blob index is in range and every blob has one producer,
    ///   recorded in [`Blob::producer`].
    /// - Every layer input is produced by an earlier layer.
    /// - Blob indices follow first reference in layer order, inputs before
    ///   outputs.
    /// - Layer and blob names are unique and free of whitespace.
    /// - Weights match the count, size and storage class their kind reads.
    pub fn new(layers: Vec<Layer>, blobs: Vec<Blob>) -> Result<Self, ModelError> {
        let blob_index = blobs
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
        let model = Self {
            layers,
            blobs,
            blob_index,
        };
        model.validate()?;
        Ok(model)
    }

    /// Checks every structural invariant. See [`NcnnModel::new`].
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |detail: String| Err(ModelError::InvalidRuntimeModel(detail));

        if self.blob_index.len() != self.blobs.len() {
            return invalid("duplicate blob names".into());
        }
        for b in &self.blobs {
            if !is_token(&b.name) {
                return invalid(format!("blob name '{}' is empty or has whitespace", b.name));
            }
        }

        let mut layer_names = HashSet::new();
        let mut produced = vec![false; self.blobs.len()];
        let mut next_fresh = 0usize;

        for (li, layer) in self.layers.iter().enumerate() {
            if !is_token(&layer.name) {
                return invalid(format!("layer name '{}' is empty or has whitespace", layer.name));
            }
            if !layer_names.insert(layer.name.as_str()) {
                return invalid(format!("duplicate layer name '{}'", layer.name));
            }

            for &b in layer.inputs.iter().chain(&layer.outputs) {
                if b >= self.blobs.len() {
                    return invalid(format!(
                        "layer '{}' references blob {b}, only {} exist",
                        layer.name,
                        self.blobs.len()
                    ));
                }
                if b == next_fresh {
                    next_fresh += 1;
                } else if b > next_fresh {
                    return invalid(format!(
                        "layer '{}' references blob {b} before blob {next_fresh}",
                        layer.name
                    ));
                }
            }
            for &b in &layer.inputs {
                if !produced[b] {
                    return invalid(format!(
                        "layer '{}' reads blob '{}' before it is produced",
                        layer.name, self.blobs[b].name
                    ));
                }
            }
            for &b in &layer.outputs {
                if std::mem::replace(&mut produced[b], true) {
                    return invalid(format!("blob '{}' has more than one producer", self.blobs[b].name));
                }
                if self.blobs[b].producer != li {
                    return invalid(format!(
                        "blob '{}' records producer {} but is written by layer {li}",
                        self.blobs[b].name, self.blobs[b].producer
                    ));
                }
            }

            self.check_arity(layer)?;
            self.check_weights(layer)?;
        }

        if let Some(b) = produced.iter().position(|p| !p) {
            return invalid(format!("blob '{}' is never produced", self.blobs[b].name));
        }
        Ok(())
    }

    fn check_arity(&self, layer: &Layer) -> Result<(), ModelError> {
        let (nin, nout) = (layer.inputs.len(), layer.outputs.len());
        let ok = match &layer.params {
            LayerParams::Input(_) | LayerParams::MemoryData(_) => nin == 0 && nout == 1,
            LayerParams::Other { .. } => true,
            LayerParams::Split => nin == 1 && nout >= 1,
            LayerParams::Slice(p) => nin == 1 && nout == p.slices.len(),
            LayerParams::Concat { .. } | LayerParams::Eltwise(_) => nin >= 1 && nout == 1,
            LayerParams::BinaryOp(p) => nout == 1 && nin == if p.with_scalar { 1 } else { 2 },
            LayerParams::Interp(p) => nout == 1 && nin == if p.dynamic_target_size { 2 } else { 1 },
            LayerParams::Convolution(p) | LayerParams::Deconvolution(p) if p.group != 1 => {
                return Err(ModelError::InvalidRuntimeModel(format!(
                    "layer '{}': grouped {} must use the depthwise kind",
                    layer.name,
                    layer.kind()
                )))
            }
            _ => nin == 1 && nout == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::InvalidRuntimeModel(format!(
                "layer '{}' ({}) has {nin} inputs and {nout} outputs",
                layer.name,
                layer.kind()
            )))
        }
    }

    fn check_weights(&self, layer: &Layer) -> Result<(), ModelError> {
        let specs = layer.params.weight_specs();
        if specs.len() != layer.weights.len() {
            return Err(ModelError::InvalidRuntimeModel(format!(
                "layer '{}' ({}) expects {} weights, has {}",
                layer.name,
                layer.kind(),
                specs.len(),
                layer.weights.len()
            )));
        }
        for (i, (spec, w)) in specs.iter().zip(&layer.weights).enumerate() {
            let tagged = matches!(w.storage, Storage::Tagged(_));
            if spec.len != w.len() || spec.tagged != tagged || w.data.dtype() != w.expected_dtype() {
                return Err(ModelError::InvalidRuntimeModel(format!(
                    "layer '{}' weight {i}: expected {} {} values, found {} {:?} values as {:?}",
                    layer.name,
                    spec.len,
                    if spec.tagged { "tagged" } else { "raw" },
                    w.len(),
                    w.data.dtype(),
                    w.storage,
                )));
            }
        }
        Ok(())
    }

    /// Layers in execution order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn blob_by_name(&self, name: &str) -> Option<usize> {
        self.blob_index.get(name).copied()
    }

    /// Mutable layers for passes that rewrite weights in place. Callers
    /// must keep weights consistent with [`LayerParams::weight_specs`].
    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Total size of the `.bin` stream in bytes.
    pub fn weight_bytes(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| &l.weights)
            .map(|w| w.encoded_len())
            .sum()
    }

    pub fn into_parts(self) -> (Vec<Layer>, Vec<Blob>) {
        (self.layers, self.blobs)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}
