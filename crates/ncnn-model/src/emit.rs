// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Serialization of an [`NcnnModel`] into its `.param` and `.bin` streams.
//!
//! ```text
//! 7767517
//! 3 3
//! Input            data                     0 1 data 0=0 1=0 2=3
//! Convolution      conv0                    1 1 data c0 0=64 1=3 ...
//! ReLU             relu0                    1 1 c0 out
//! ```
//!
//! The `.bin` stream is every layer's weights in layer order. Tagged
//! weights start with a 4-byte storage tag; half payloads are padded to
//! the next 4-byte boundary.

use crate::layer::{align4, Storage};
use crate::NcnnModel;

/// First line of every `.param` file.
pub const PARAM_MAGIC: u32 = 7_767_517;

/// The two output streams of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedModel {
    pub param: String,
    pub bin: Vec<u8>,
}

/// Renders both streams. Output depends only on the model, so emitting
/// the same model twice yields identical bytes.
pub fn emit(model: &NcnnModel) -> EmittedModel {
    EmittedModel {
        param: emit_param(model),
        bin: emit_bin(model),
    }
}

pub fn emit_param(model: &NcnnModel) -> String {
    let mut out = format!("{PARAM_MAGIC}\n{} {}\n", model.layers().len(), model.blobs().len());
    for layer in model.layers() {
        out.push_str(&format!(
            "{:<16} {:<24} {} {}",
            layer.kind(),
            layer.name,
            layer.inputs.len(),
            layer.outputs.len()
        ));
        for &b in layer.inputs.iter().chain(&layer.outputs) {
            out.push(' ');
            out.push_str(&model.blobs()[b].name);
        }
        out.push_str(&layer.params.write());
        out.push('\n');
    }
    out
}

pub fn emit_bin(model: &NcnnModel) -> Vec<u8> {
    let mut out = Vec::with_capacity(model.weight_bytes());
    for w in model.layers().iter().flat_map(|l| &l.weights) {
        let payload = w.data.as_bytes();
        match w.storage {
            Storage::Raw => out.extend_from_slice(payload),
            Storage::Tagged(p) => {
                out.extend_from_slice(&p.tag().to_le_bytes());
                out.extend_from_slice(payload);
                out.resize(out.len() + align4(payload.len()) - payload.len(), 0);
            }
        }
    }
    out
}
