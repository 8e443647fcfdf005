// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The end-to-end conversion: parse, optimize, translate, narrow, emit.
//!
//! Everything happens in memory. Files are only touched by
//! [`ConvertedModel::write_to`].

use crate::{translate, ConvertConfig, ConvertError};
use ncnn_model::{
    emit, infer_scale, narrow_to_half, EmittedModel, ModelInfo, NarrowReport, NcnnModel, ScaleError,
};
use onnx_graph::GraphDocument;

/// Pipeline switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Narrow convolution weights to f16.
    pub fp16: bool,
    /// Run the graph passes; when off, the document must already be
    /// topologically sorted with constants folded.
    pub optimize: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            fp16: true,
            optimize: true,
        }
    }
}

impl From<&ConvertConfig> for ConvertOptions {
    fn from(config: &ConvertConfig) -> Self {
        Self {
            fp16: config.fp16,
            optimize: config.optimize,
        }
    }
}

/// Runs conversions with fixed options.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ConvertOptions {
        self.options
    }

    /// Converts a serialized ONNX model.
    pub fn convert(&self, bytes: &[u8]) -> Result<ConvertedModel, ConvertError> {
        let doc = GraphDocument::parse(bytes)?;
        tracing::info!(
            "parsed graph '{}' from '{}': {} nodes, {} initializers, opset {}",
            doc.name(),
            doc.producer_name(),
            doc.nodes().len(),
            doc.initializers().len(),
            doc.opset()
        );
        self.convert_document(doc)
    }

    /// Converts an already parsed document.
    pub fn convert_document(&self, doc: GraphDocument) -> Result<ConvertedModel, ConvertError> {
        let doc = if self.options.optimize {
            let optimized = doc.optimize()?;
            tracing::info!("optimized graph: {} nodes remain", optimized.nodes().len());
            optimized
        } else {
            doc.assume_optimized()
        };

        let mut model = translate(&doc)?;

        let narrow = if self.options.fp16 {
            let report = narrow_to_half(&mut model)?;
            tracing::info!(
                "narrowed {} weights to fp16 ({} -> {} bytes)",
                report.narrowed,
                report.bytes_before,
                report.bytes_after
            );
            Some(report)
        } else {
            None
        };

        let emitted = emit(&model);
        tracing::info!(
            "emitted {} layers, {} blobs, {} weight bytes",
            model.layers().len(),
            model.blobs().len(),
            emitted.bin.len()
        );
        Ok(ConvertedModel {
            model,
            emitted,
            narrow,
        })
    }
}

/// The result of a conversion, held in memory until written.
#[derive(Debug, Clone)]
pub struct ConvertedModel {
    model: NcnnModel,
    emitted: EmittedModel,
    narrow: Option<NarrowReport>,
}

impl ConvertedModel {
    pub fn model(&self) -> &NcnnModel {
        &self.model
    }

    /// The `.param` text.
    pub fn param(&self) -> &str {
        &self.emitted.param
    }

    /// The `.bin` bytes.
    pub fn bin(&self) -> &[u8] {
        &self.emitted.bin
    }

    pub fn emitted(&self) -> &EmittedModel {
        &self.emitted
    }

    /// Present when the weights were narrowed.
    pub fn narrow_report(&self) -> Option<&NarrowReport> {
        self.narrow.as_ref()
    }

    pub fn scale(&self) -> Result<u32, ScaleError> {
        infer_scale(&self.model)
    }

    pub fn info(&self) -> Result<ModelInfo, ScaleError> {
        ModelInfo::inspect(&self.model)
    }
}
