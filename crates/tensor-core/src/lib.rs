// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Constant tensor types shared by the graph reader and the ncnn writer.
//!
//! This crate provides:
//! - [`TensorData`]: an owned, byte-backed constant tensor (initializers, weights).
//! - [`Shape`]: static shape descriptors.
//! - [`DType`]: supported element data types.
//! - Layout transforms used when moving weights between formats: axis
//!   permutation (via `ndarray`) and f32 → f16 narrowing (via `half`).
//!
//! All byte buffers are little-endian so that output is identical on every host.

mod dtype;
mod error;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::TensorData;
