// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `onnx2ncnn scale`: the model's upscaling factor.

use anyhow::Context;
use std::path::PathBuf;

pub fn execute(param: PathBuf, bin: Option<PathBuf>) -> anyhow::Result<()> {
    let scale = match bin {
        Some(bin) => {
            let model = super::load_model(&param, &bin)?;
            ncnn_model::infer_scale(&model)?
        }
        None => {
            let text = std::fs::read_to_string(&param)
                .with_context(|| format!("cannot read '{}'", param.display()))?;
            ncnn_model::infer_scale_from_param(&text)
                .with_context(|| format!("failed to read '{}'", param.display()))?
        }
    };
    println!("Scale: {scale}");
    Ok(())
}
