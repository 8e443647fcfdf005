// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

pub mod convert;
pub mod inspect;
pub mod scale;

use anyhow::Context;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads a converted model from its two files.
pub fn load_model(param: &Path, bin: &Path) -> anyhow::Result<ncnn_model::NcnnModel> {
    ncnn_model::NcnnModel::open(param, bin).with_context(|| {
        format!(
            "failed to load model from '{}' and '{}'",
            param.display(),
            bin.display()
        )
    })
}
