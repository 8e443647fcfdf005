// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reading a model back from its `.param` and `.bin` streams.

use crate::dict::ParamDict;
use crate::emit::PARAM_MAGIC;
use crate::layer::{align4, Precision, Weight};
use crate::params::{LayerParams, WeightSpec};
use crate::{Blob, Layer, ModelError, NcnnModel};
use std::collections::HashMap;
use std::path::Path;
use tensor_core::{DType, Shape, TensorData};

impl NcnnModel {
    /// Parses a `.param` text and reads each layer's weights from `bin`.
    ///
    /// Weight sizes are derived from each kind's parameters, so the two
    /// streams must come from the same model. Layers of unknown kinds are
    /// kept as [`LayerParams::Other`]; since their weight sizes are unknown,
    /// no layer after one of them may read weights.
    pub fn from_param_and_bin(param: &str, bin: &[u8]) -> Result<Self, ModelError> {
        let (mut layers, blobs) = parse_param(param)?;

        let mut offset = 0;
        let mut opaque: Option<(String, String)> = None;
        for layer in &mut layers {
            if let LayerParams::Other { kind, .. } = &layer.params {
                opaque.get_or_insert_with(|| (layer.name.clone(), kind.clone()));
                continue;
            }
            let specs = layer.params.weight_specs();
            if let (Some((after, kind)), false) = (&opaque, specs.is_empty()) {
                return Err(ModelError::UnlocatableWeights {
                    layer: layer.name.clone(),
                    after: after.clone(),
                    kind: kind.clone(),
                });
            }
            for spec in specs {
                let weight = read_weight(bin, &mut offset, spec, &layer.name)?;
                layer.weights.push(weight);
            }
        }
        if offset != bin.len() {
            tracing::warn!(
                "weight stream has {} trailing bytes after the last layer",
                bin.len() - offset
            );
        }

        tracing::debug!(
            "loaded model: {} layers, {} blobs, {} weight bytes",
            layers.len(),
            blobs.len(),
            offset
        );
        NcnnModel::new(layers, blobs)
    }

    /// Reads a model from a `.param` file and a memory-mapped `.bin` file.
    pub fn open(param_path: &Path, bin_path: &Path) -> Result<Self, ModelError> {
        let io_err = |path: &Path, source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        let param = std::fs::read_to_string(param_path).map_err(|e| io_err(param_path, e))?;
        let file = std::fs::File::open(bin_path).map_err(|e| io_err(bin_path, e))?;
        let len = file.metadata().map_err(|e| io_err(bin_path, e))?.len();
        if len == 0 {
            return Self::from_param_and_bin(&param, &[]);
        }
        // SAFETY: the map is read-only and dropped before this function
        // returns; the file is not modified while mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| io_err(bin_path, e))?;
        Self::from_param_and_bin(&param, &mmap)
    }
}

/// Parses the layer graph of a `.param` text. Layers carry no weights.
pub(crate) fn parse_param(param: &str) -> Result<(Vec<Layer>, Vec<Blob>), ModelError> {
    let mut lines = param
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (line, magic) = lines.next().ok_or(ModelError::ParseError {
        line: 1,
        detail: "empty param file".into(),
    })?;
    if magic.parse::<u32>().ok() != Some(PARAM_MAGIC) {
        return Err(ModelError::ParseError {
            line,
            detail: format!("bad magic '{magic}', expected {PARAM_MAGIC}"),
        });
    }

    let (count_line, counts) = lines.next().ok_or(ModelError::ParseError {
        line: line + 1,
        detail: "missing layer and blob counts".into(),
    })?;
    let counts: Vec<usize> = counts
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ModelError::ParseError {
            line: count_line,
            detail: format!("bad counts line '{counts}'"),
        })?;
    let [layer_count, blob_count] = counts[..] else {
        return Err(ModelError::ParseError {
            line: count_line,
            detail: "expected '<layer count> <blob count>'".into(),
        });
    };

    // Counts come from the file; cap the preallocation.
    let mut layers = Vec::with_capacity(layer_count.min(4096));
    let mut blobs: Vec<Blob> = Vec::with_capacity(blob_count.min(4096));
    let mut blob_index: HashMap<String, usize> = HashMap::new();

    for (line, text) in lines {
        let layer = parse_layer_line(line, text, layers.len(), &mut blobs, &mut blob_index)?;
        layers.push(layer);
    }

    if layers.len() != layer_count || blobs.len() != blob_count {
        return Err(ModelError::ParseError {
            line: count_line,
            detail: format!(
                "header declares {layer_count} layers and {blob_count} blobs, found {} and {}",
                layers.len(),
                blobs.len()
            ),
        });
    }
    Ok((layers, blobs))
}

fn parse_layer_line(
    line: usize,
    text: &str,
    layer_index: usize,
    blobs: &mut Vec<Blob>,
    blob_index: &mut HashMap<String, usize>,
) -> Result<Layer, ModelError> {
    let err = |detail: String| ModelError::ParseError { line, detail };
    let mut tokens = text.split_whitespace();
    let mut next = |what: &str| tokens.next().ok_or_else(|| err(format!("missing {what}")));

    let kind = next("layer type")?;
    let name = next("layer name")?.to_string();
    let nin: usize = next("input count")?
        .parse()
        .map_err(|_| err("bad input count".into()))?;
    let nout: usize = next("output count")?
        .parse()
        .map_err(|_| err("bad output count".into()))?;

    let mut inputs = Vec::with_capacity(nin);
    for _ in 0..nin {
        let blob = next("input blob")?;
        let index = *blob_index
            .get(blob)
            .ok_or_else(|| err(format!("blob '{blob}' is read before it is produced")))?;
        inputs.push(index);
    }
    let mut outputs = Vec::with_capacity(nout);
    for _ in 0..nout {
        let blob = next("output blob")?;
        if blob_index.contains_key(blob) {
            return Err(err(format!("blob '{blob}' is produced twice")));
        }
        blob_index.insert(blob.to_string(), blobs.len());
        outputs.push(blobs.len());
        blobs.push(Blob {
            name: blob.to_string(),
            producer: layer_index,
        });
    }

    let dict = ParamDict::parse(tokens, line)?;
    let params = LayerParams::read(kind, &dict)?;
    Ok(Layer {
        name,
        params,
        inputs,
        outputs,
        weights: Vec::new(),
    })
}

fn take<'a>(
    bin: &'a [u8],
    offset: &mut usize,
    needed: usize,
    layer: &str,
) -> Result<&'a [u8], ModelError> {
    let slice = bin
        .get(*offset..*offset + needed)
        .ok_or_else(|| ModelError::TruncatedWeights {
            layer: layer.to_string(),
            offset: *offset,
            needed,
            available: bin.len().saturating_sub(*offset),
        })?;
    *offset += needed;
    Ok(slice)
}

fn read_weight(
    bin: &[u8],
    offset: &mut usize,
    spec: WeightSpec,
    layer: &str,
) -> Result<Weight, ModelError> {
    let tensor = |dtype: DType, bytes: &[u8]| {
        TensorData::from_bytes(Shape::vector(spec.len), dtype, bytes.to_vec()).map_err(|source| {
            ModelError::Tensor {
                layer: layer.to_string(),
                source,
            }
        })
    };

    if !spec.tagged {
        let bytes = take(bin, offset, spec.len * 4, layer)?;
        return Ok(Weight::raw(tensor(DType::F32, bytes)?));
    }

    let tag_at = *offset;
    let tag_bytes = take(bin, offset, 4, layer)?;
    let tag = u32::from_le_bytes([tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]]);
    let precision = Precision::from_tag(tag).ok_or_else(|| ModelError::UnknownWeightTag {
        layer: layer.to_string(),
        offset: tag_at,
        tag,
    })?;
    let payload = spec.len * precision.dtype().size_bytes();
    let bytes = take(bin, offset, payload, layer)?;
    let weight = Weight::tagged(tensor(precision.dtype(), bytes)?);
    // Padding may be missing at the very end of the stream.
    *offset = (*offset + align4(payload) - payload).min(bin.len());
    Ok(weight)
}
