// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `id=value` parameter lists as they appear on a `.param` layer line.
//!
//! Scalars are written as ` id=value`. Arrays use the id `-23300 - id` and
//! a value list that starts with the element count:
//! ` -23301=2,1.000000e0,1.000000e0`. A value containing `.` or `e` is a
//! float, anything else is an integer.

use crate::ModelError;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const ARRAY_BASE: i32 = -23300;

/// One decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
}

/// Appends parameters to a layer line in the order they are pushed.
#[derive(Debug, Default)]
pub struct ParamWriter {
    out: String,
}

impl ParamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int(&mut self, id: i32, v: i32) -> &mut Self {
        let _ = write!(self.out, " {id}={v}");
        self
    }

    /// Writes `v` only if it differs from the default.
    pub fn int_if(&mut self, id: i32, v: i32, default: i32) -> &mut Self {
        if v != default {
            self.int(id, v);
        }
        self
    }

    pub fn float(&mut self, id: i32, v: f32) -> &mut Self {
        let _ = write!(self.out, " {id}={}", format_float(v));
        self
    }

    pub fn float_if(&mut self, id: i32, v: f32, default: f32) -> &mut Self {
        if v != default {
            self.float(id, v);
        }
        self
    }

    pub fn ints(&mut self, id: i32, v: &[i32]) -> &mut Self {
        let _ = write!(self.out, " {}={}", ARRAY_BASE - id, v.len());
        for x in v {
            let _ = write!(self.out, ",{x}");
        }
        self
    }

    pub fn floats(&mut self, id: i32, v: &[f32]) -> &mut Self {
        let _ = write!(self.out, " {}={}", ARRAY_BASE - id, v.len());
        for x in v {
            let _ = write!(self.out, ",{}", format_float(*x));
        }
        self
    }

    /// Writes an already decoded value under its scalar id.
    pub fn value(&mut self, id: i32, v: &ParamValue) -> &mut Self {
        match v {
            ParamValue::Int(x) => self.int(id, *x),
            ParamValue::Float(x) => self.float(id, *x),
            ParamValue::Ints(x) => self.ints(id, x),
            ParamValue::Floats(x) => self.floats(id, x),
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Shortest exponent form that parses back to the same `f32`.
///
/// The exponent marker makes the value read as a float even when it is
/// integral (`1e0`).
pub fn format_float(v: f32) -> String {
    format!("{v:e}")
}

/// Parameters of one layer line, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ParamDict {
    line: usize,
    values: BTreeMap<i32, ParamValue>,
}

impl ParamDict {
    /// Parses `id=value` tokens. `line` is used in error messages.
    pub fn parse<'a, I>(tokens: I, line: usize) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = BTreeMap::new();
        for token in tokens {
            let (id, value) = token.split_once('=').ok_or_else(|| ModelError::ParseError {
                line,
                detail: format!("expected id=value, found '{token}'"),
            })?;
            let id: i32 = id.parse().map_err(|_| ModelError::ParseError {
                line,
                detail: format!("bad parameter id '{id}'"),
            })?;
            let parsed = if id <= ARRAY_BASE {
                parse_array(value, line)?
            } else {
                parse_scalar(value, line)?
            };
            let key = if id <= ARRAY_BASE { ARRAY_BASE - id } else { id };
            if values.insert(key, parsed).is_some() {
                return Err(ModelError::ParseError {
                    line,
                    detail: format!("parameter {key} given twice"),
                });
            }
        }
        Ok(Self { line, values })
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// All values keyed by scalar id; array ids are already folded.
    pub fn values(&self) -> &BTreeMap<i32, ParamValue> {
        &self.values
    }

    pub fn int(&self, id: i32, default: i32) -> Result<i32, ModelError> {
        match self.values.get(&id) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(self.mismatch(id, "int", other)),
        }
    }

    /// Reads a float; integer literals are accepted and widened.
    pub fn float(&self, id: i32, default: f32) -> Result<f32, ModelError> {
        match self.values.get(&id) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f32),
            Some(other) => Err(self.mismatch(id, "float", other)),
        }
    }

    pub fn ints(&self, id: i32) -> Result<Vec<i32>, ModelError> {
        match self.values.get(&id) {
            None => Ok(Vec::new()),
            Some(ParamValue::Ints(v)) => Ok(v.clone()),
            Some(other) => Err(self.mismatch(id, "int array", other)),
        }
    }

    pub fn floats(&self, id: i32) -> Result<Vec<f32>, ModelError> {
        match self.values.get(&id) {
            None => Ok(Vec::new()),
            Some(ParamValue::Floats(v)) => Ok(v.clone()),
            Some(ParamValue::Ints(v)) => Ok(v.iter().map(|&x| x as f32).collect()),
            Some(other) => Err(self.mismatch(id, "float array", other)),
        }
    }

    /// Builds an error for a value outside the range a kind accepts.
    pub fn invalid(&self, id: i32, detail: impl Into<String>) -> ModelError {
        ModelError::ParseError {
            line: self.line,
            detail: format!("parameter {id}: {}", detail.into()),
        }
    }

    fn mismatch(&self, id: i32, expected: &str, found: &ParamValue) -> ModelError {
        self.invalid(id, format!("expected {expected}, found {found:?}"))
    }
}

fn is_float_literal(s: &str) -> bool {
    s.contains(['.', 'e', 'E']) || s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("nan")
}

fn parse_scalar(s: &str, line: usize) -> Result<ParamValue, ModelError> {
    let err = || ModelError::ParseError {
        line,
        detail: format!("bad parameter value '{s}'"),
    };
    if is_float_literal(s) {
        s.parse().map(ParamValue::Float).map_err(|_| err())
    } else {
        s.parse().map(ParamValue::Int).map_err(|_| err())
    }
}

fn parse_array(s: &str, line: usize) -> Result<ParamValue, ModelError> {
    let mut parts = s.split(',');
    let count: usize = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| ModelError::ParseError {
            line,
            detail: format!("bad array length in '{s}'"),
        })?;
    let items: Vec<&str> = parts.collect();
    if items.len() != count {
        return Err(ModelError::ParseError {
            line,
            detail: format!("array declares {count} values, found {}", items.len()),
        });
    }
    if items.iter().any(|i| is_float_literal(i)) {
        items
            .iter()
            .map(|i| {
                i.parse().map_err(|_| ModelError::ParseError {
                    line,
                    detail: format!("bad array value '{i}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ParamValue::Floats)
    } else {
        items
            .iter()
            .map(|i| {
                i.parse().map_err(|_| ModelError::ParseError {
                    line,
                    detail: format!("bad array value '{i}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ParamValue::Ints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_formats() {
        let mut w = ParamWriter::new();
        w.int(0, 64)
            .int_if(5, 0, 0)
            .float(1, 0.5)
            .floats(1, &[1.0, -2.5])
            .ints(0, &[16, -233]);
        assert_eq!(w.finish(), " 0=64 1=5e-1 -23301=2,1e0,-2.5e0 -23300=2,16,-233");
    }

    #[test]
    fn test_float_format_roundtrips() {
        for v in [0.1f32, 1.0 / 6.0, f32::MAX, -f32::MAX, 1e-12, 3.0] {
            let s = format_float(v);
            assert!(is_float_literal(&s));
            assert_eq!(s.parse::<f32>().unwrap(), v);
        }
    }

    #[test]
    fn test_parse_scalars_and_arrays() {
        let d = ParamDict::parse(
            ["0=3", "1=1e0", "-23302=3,4,5,6", "-23303=2,1e0,2.5", "4=-233"],
            7,
        )
        .unwrap();
        assert_eq!(d.int(0, 0).unwrap(), 3);
        assert_eq!(d.float(1, 0.0).unwrap(), 1.0);
        assert_eq!(d.ints(2).unwrap(), vec![4, 5, 6]);
        assert!(d.ints(0).unwrap_err().to_string().contains("line 7"));
        assert_eq!(d.float(4, 0.0).unwrap(), -233.0);
        assert_eq!(d.int(9, 42).unwrap(), 42);
        assert_eq!(d.floats(3).unwrap(), vec![1.0, 2.5]);
    }

    #[test]
    fn test_array_and_scalar_share_id_space() {
        let d = ParamDict::parse(["-23300=2,1,1", "1=1"], 1).unwrap();
        assert_eq!(d.ints(0).unwrap(), vec![1, 1]);
        assert_eq!(d.int(1, 0).unwrap(), 1);
        assert!(ParamDict::parse(["-23300=1,1", "0=1"], 1).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_tokens() {
        assert!(ParamDict::parse(["0"], 2).is_err());
        assert!(ParamDict::parse(["x=1"], 2).is_err());
        assert!(ParamDict::parse(["-23300=3,1,2"], 2).is_err());
        assert!(ParamDict::parse(["0=1", "0=2"], 2).is_err());
    }
}
