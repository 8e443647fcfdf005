// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `onnx2ncnn inspect`: structural summary and per-layer table.

use ncnn_model::ModelInfo;
use std::path::PathBuf;

pub fn execute(param: PathBuf, bin: PathBuf, json: bool) -> anyhow::Result<()> {
    let model = super::load_model(&param, &bin)?;
    let info = ModelInfo::inspect(&model)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             onnx2ncnn · Model Inspector              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("{info}");
    println!();

    println!(
        "  {:<4} {:<22} {:<30} {:>4} {:>4} {:>10}",
        "Idx", "Type", "Name", "In", "Out", "Weights",
    );
    println!("  {}", "-".repeat(80));
    for (i, layer) in model.layers().iter().enumerate() {
        let bytes: usize = layer.weights.iter().map(|w| w.encoded_len()).sum();
        println!(
            "  {:<4} {:<22} {:<30} {:>4} {:>4} {:>7.1} KB",
            i,
            layer.kind(),
            truncate(&layer.name, 30),
            layer.inputs.len(),
            layer.outputs.len(),
            bytes as f64 / 1024.0,
        );
    }
    println!();
    Ok(())
}

/// Truncates a string to `max_len` characters with an ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
