// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Writing both output files so that either both appear or neither does.

use crate::{ConvertError, ConvertedModel};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};

/// Paths of a written model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub param: PathBuf,
    pub bin: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            param: dir.join(format!("{name}.param")),
            bin: dir.join(format!("{name}.bin")),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConvertError + '_ {
    move |source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `contents` to a temporary file in `dir` and returns it unpersisted.
fn stage(dir: &Path, contents: &[u8]) -> Result<NamedTempFile, ConvertError> {
    let mut file = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    file.write_all(contents).map_err(io_error(file.path()))?;
    file.as_file().sync_all().map_err(io_error(file.path()))?;
    Ok(file)
}

/// Moves a file already at `path` to a temporary name in `dir`.
fn set_aside(path: &Path, dir: &Path) -> Result<Option<TempPath>, ConvertError> {
    if !path.exists() {
        return Ok(None);
    }
    let slot = NamedTempFile::new_in(dir)
        .map_err(io_error(dir))?
        .into_temp_path();
    std::fs::rename(path, &slot).map_err(io_error(path))?;
    Ok(Some(slot))
}

/// Restores what [`set_aside`] moved away, or removes the new file when
/// nothing was there before.
fn roll_back(path: &Path, previous: Option<TempPath>) {
    let outcome = match previous {
        Some(old) => old.persist(path).map_err(|e| e.error),
        None => std::fs::remove_file(path),
    };
    if let Err(e) = outcome {
        tracing::warn!("could not roll back {}: {e}", path.display());
    }
}

impl ConvertedModel {
    /// Writes `{name}.param` and `{name}.bin` into `dir`, creating it.
    ///
    /// Both streams are staged in `dir` before either is renamed into
    /// place. If the bin rename fails, the param path is put back the way
    /// it was, including any file it held before.
    pub fn write_to(&self, dir: &Path, name: &str) -> Result<OutputPaths, ConvertError> {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        let paths = OutputPaths::new(dir, name);

        let param = stage(dir, self.param().as_bytes())?;
        let bin = stage(dir, self.bin())?;

        let previous = set_aside(&paths.param, dir)?;
        if let Err(e) = param.persist(&paths.param) {
            if let Some(old) = previous {
                roll_back(&paths.param, Some(old));
            }
            return Err(io_error(&paths.param)(e.error));
        }
        if let Err(e) = bin.persist(&paths.bin) {
            roll_back(&paths.param, previous);
            return Err(io_error(&paths.bin)(e.error));
        }
        tracing::info!(
            "wrote {} and {}",
            paths.param.display(),
            paths.bin.display()
        );
        Ok(paths)
    }

    /// Writes with the default name `x{scale}`.
    pub fn write_default(&self, dir: &Path) -> Result<OutputPaths, ConvertError> {
        let scale = self.scale()?;
        self.write_to(dir, &format!("x{scale}"))
    }
}
