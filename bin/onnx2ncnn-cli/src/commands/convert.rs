// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `onnx2ncnn convert`: ONNX file in, `.param` and `.bin` out.

use anyhow::Context;
use converter::{ConvertConfig, ConvertOptions, Converter};
use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

pub struct Args {
    pub model: PathBuf,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub name: Option<String>,
    pub full: bool,
    pub no_optimize: bool,
}

pub fn execute(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ConvertConfig::from_file(path)?,
        None => ConvertConfig::default(),
    };
    if args.full {
        config.fp16 = false;
    }
    if args.no_optimize {
        config.optimize = false;
    }
    if args.output.is_some() {
        config.output_dir = args.output;
    }
    if args.name.is_some() {
        config.name = args.name;
    }

    let file = File::open(&args.model)
        .with_context(|| format!("cannot open '{}'", args.model.display()))?;
    // SAFETY: the mapping is read-only and lives only for this conversion.
    let bytes = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("cannot map '{}'", args.model.display()))?;

    let start = Instant::now();
    let converted = Converter::new(ConvertOptions::from(&config))
        .convert(&bytes)
        .with_context(|| format!("failed to convert '{}'", args.model.display()))?;
    let elapsed = start.elapsed();
    tracing::info!("conversion finished in {elapsed:?}");

    let dir = match config.output_dir {
        Some(dir) => dir,
        None => args
            .model
            .file_stem()
            .map(PathBuf::from)
            .context("model path has no file name")?,
    };
    let paths = match &config.name {
        Some(name) => converted.write_to(&dir, name)?,
        None => converted.write_default(&dir)?,
    };

    let model = converted.model();
    println!(
        "  Converted {} in {:.1} ms",
        args.model.display(),
        elapsed.as_secs_f64() * 1e3
    );
    println!(
        "  Layers: {}  Blobs: {}  Weights: {:.2} MB{}",
        model.layers().len(),
        model.blobs().len(),
        converted.bin().len() as f64 / (1024.0 * 1024.0),
        if config.fp16 { " (fp16)" } else { "" }
    );
    println!("  Param:  {}", paths.param.display());
    println!("  Bin:    {}", paths.bin.display());
    Ok(())
}
