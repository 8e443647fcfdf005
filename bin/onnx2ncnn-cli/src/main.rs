// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # onnx2ncnn
//!
//! Command-line interface for the ONNX to ncnn converter.
//!
//! ## Usage
//! ```bash
//! # Convert, writing ./model/x4.param and ./model/x4.bin
//! onnx2ncnn convert model.onnx
//!
//! # Keep full precision weights and pick the output location
//! onnx2ncnn convert model.onnx --full -o ./out --name realesrgan
//!
//! # Scale of an existing model (the .bin is optional)
//! onnx2ncnn scale x4.param x4.bin
//!
//! # Structural summary as JSON
//! onnx2ncnn inspect x4.param x4.bin --json
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "onnx2ncnn",
    about = "Convert ONNX models to ncnn and inspect converted models",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file; command-line flags override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an ONNX model into .param and .bin files.
    Convert {
        /// Path to the ONNX model.
        model: PathBuf,

        /// Output directory (default: the model file's stem).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base name of the output files (default: x{scale}).
        #[arg(short, long)]
        name: Option<String>,

        /// Keep convolution weights in full precision.
        #[arg(long)]
        full: bool,

        /// Skip the graph passes; the model must already be sorted and folded.
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print the upscaling factor of a converted model.
    Scale {
        /// Path to the .param file.
        param: PathBuf,
        /// Path to the .bin file; without it only the .param is read.
        bin: Option<PathBuf>,
    },

    /// Print a structural summary of a converted model.
    Inspect {
        /// Path to the .param file.
        param: PathBuf,
        /// Path to the .bin file.
        bin: PathBuf,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            model,
            output,
            name,
            full,
            no_optimize,
        } => commands::convert::execute(commands::convert::Args {
            model,
            config: cli.config,
            output,
            name,
            full,
            no_optimize,
        }),
        Commands::Scale { param, bin } => commands::scale::execute(param, bin),
        Commands::Inspect { param, bin, json } => commands::inspect::execute(param, bin, json),
    }
}
