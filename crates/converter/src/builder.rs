// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Assembly of translated layers into a validated [`NcnnModel`].
//!
//! Layers arrive in execution order with blobs referenced by tensor name.
//! [`ModelBuilder::finish`] then:
//!
//! 1. replaces whitespace in names with `_`,
//! 2. inserts a `Split` after the producer of every blob that is read
//!    more than once and gives each reader its own split output,
//! 3. makes layer names unique,
//! 4. assigns blob indices by first reference,
//! 5. validates the result.

use crate::ConvertError;
use ncnn_model::{Blob, Layer, LayerParams, NcnnModel, Weight};
use std::collections::{HashMap, HashSet};

/// A translated layer whose blobs are still addressed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLayer {
    pub name: String,
    pub params: LayerParams,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub weights: Vec<Weight>,
}

impl PendingLayer {
    pub fn new<I, O>(name: impl Into<String>, params: LayerParams, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            name: name.into(),
            params,
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            weights: Vec::new(),
        }
    }

    pub fn with_weights(mut self, weights: Vec<Weight>) -> Self {
        self.weights = weights;
        self
    }
}

/// Collects layers in execution order.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    layers: Vec<PendingLayer>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: PendingLayer) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Finishes the model. See the module docs for the steps.
    pub fn finish(self) -> Result<NcnnModel, ConvertError> {
        let layers: Vec<PendingLayer> = self
            .layers
            .into_iter()
            .map(|l| PendingLayer {
                name: sanitize(&l.name),
                inputs: l.inputs.iter().map(|s| sanitize(s)).collect(),
                outputs: l.outputs.iter().map(|s| sanitize(s)).collect(),
                ..l
            })
            .collect();
        let layers = insert_splits(layers);
        let layers = dedupe_names(layers);
        let model = assign_indices(layers)?;
        tracing::debug!(
            "built model: {} layers, {} blobs",
            model.layers().len(),
            model.blobs().len()
        );
        Ok(model)
    }
}

fn sanitize(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if s.is_empty() {
        "unnamed".to_string()
    } else {
        s
    }
}

fn insert_splits(layers: Vec<PendingLayer>) -> Vec<PendingLayer> {
    let mut readers: HashMap<String, usize> = HashMap::new();
    for l in &layers {
        for i in &l.inputs {
            *readers.entry(i.clone()).or_default() += 1;
        }
    }

    let mut next_reader: HashMap<String, usize> = HashMap::new();
    let mut splits = 0usize;
    let mut out = Vec::with_capacity(layers.len());
    for mut layer in layers {
        for input in &mut layer.inputs {
            if readers.get(input.as_str()).copied().unwrap_or(0) > 1 {
                let j = next_reader.entry(input.clone()).or_default();
                *input = split_blob_name(input, *j);
                *j += 1;
            }
        }
        let fanned: Vec<(String, usize)> = layer
            .outputs
            .iter()
            .filter_map(|o| {
                let n = readers.get(o.as_str()).copied().unwrap_or(0);
                (n > 1).then(|| (o.clone(), n))
            })
            .collect();
        out.push(layer);
        for (blob, n) in fanned {
            out.push(PendingLayer::new(
                format!("splitncnn_{splits}"),
                LayerParams::Split,
                [blob.clone()],
                (0..n).map(|j| split_blob_name(&blob, j)),
            ));
            splits += 1;
        }
    }
    if splits > 0 {
        tracing::debug!("inserted {splits} split layers");
    }
    out
}

fn split_blob_name(blob: &str, j: usize) -> String {
    format!("{blob}_splitncnn_{j}")
}

fn dedupe_names(mut layers: Vec<PendingLayer>) -> Vec<PendingLayer> {
    let original: HashSet<String> = layers.iter().map(|l| l.name.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    for layer in &mut layers {
        if seen.insert(layer.name.clone()) {
            continue;
        }
        let base = layer.name.clone();
        let counter = counters.entry(base.clone()).or_insert(0);
        let unique = loop {
            *counter += 1;
            let candidate = format!("{base}_{counter}");
            if !original.contains(&candidate) && !seen.contains(&candidate) {
                break candidate;
            }
        };
        seen.insert(unique.clone());
        layer.name = unique;
    }
    layers
}

fn assign_indices(layers: Vec<PendingLayer>) -> Result<NcnnModel, ConvertError> {
    const UNPRODUCED: usize = usize::MAX;
    let mut blobs: Vec<Blob> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut built = Vec::with_capacity(layers.len());

    for (li, pending) in layers.into_iter().enumerate() {
        let mut lookup = |name: &str| -> usize {
            *index.entry(name.to_string()).or_insert_with(|| {
                blobs.push(Blob {
                    name: name.to_string(),
                    producer: UNPRODUCED,
                });
                blobs.len() - 1
            })
        };
        let inputs: Vec<usize> = pending.inputs.iter().map(|n| lookup(n)).collect();
        let outputs: Vec<usize> = pending.outputs.iter().map(|n| lookup(n)).collect();
        for &b in &outputs {
            if blobs[b].producer != UNPRODUCED {
                return Err(ncnn_model::ModelError::InvalidRuntimeModel(format!(
                    "blob '{}' is produced by both layer {} and layer {li}",
                    blobs[b].name, blobs[b].producer
                ))
                .into());
            }
            blobs[b].producer = li;
        }
        built.push(Layer {
            name: pending.name,
            params: pending.params,
            inputs,
            outputs,
            weights: pending.weights,
        });
    }
    Ok(NcnnModel::new(built, blobs)?)
}
