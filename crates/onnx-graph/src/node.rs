// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph nodes and their typed attributes.

use crate::GraphError;
use std::collections::BTreeMap;
use tensor_core::TensorData;

/// A typed attribute value attached to a [`GraphNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(TensorData),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl Attribute {
    fn type_name(&self) -> &'static str {
        match self {
            Attribute::Float(_) => "float",
            Attribute::Int(_) => "int",
            Attribute::String(_) => "string",
            Attribute::Tensor(_) => "tensor",
            Attribute::Floats(_) => "floats",
            Attribute::Ints(_) => "ints",
            Attribute::Strings(_) => "strings",
        }
    }
}

/// One operator application in a graph document.
///
/// Nodes are immutable once parsed. Graph passes build replacement nodes
/// rather than editing existing ones in place.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Node name; may be empty in the source document.
    pub name: String,
    /// Operator type tag, e.g. `"Conv"`.
    pub op_type: String,
    /// Operator domain; empty for the default ONNX domain.
    pub domain: String,
    /// Input tensor names in positional order. An empty name marks an
    /// omitted optional input.
    pub inputs: Vec<String>,
    /// Output tensor names in positional order.
    pub outputs: Vec<String>,
    /// Attributes by name.
    pub attributes: BTreeMap<String, Attribute>,
}

impl GraphNode {
    /// Creates a node in the default domain with no attributes.
    pub fn new<I, O>(op_type: &str, name: &str, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            name: name.to_string(),
            op_type: op_type.to_string(),
            domain: String::new(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the node with an attribute added.
    pub fn with_attr(mut self, name: &str, value: Attribute) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Returns the `index`-th input name if present and non-empty.
    pub fn input(&self, index: usize) -> Option<&str> {
        self.inputs
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Returns the first output name.
    pub fn output(&self) -> &str {
        self.outputs.first().map(String::as_str).unwrap_or("")
    }

    /// Returns a name usable in diagnostics: the node name, or the op type
    /// and first output when the node is unnamed.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("{}({})", self.op_type, self.output())
        } else {
            self.name.clone()
        }
    }

    /// Returns the raw attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, GraphError> {
        match self.attr(name) {
            None => Ok(default),
            Some(Attribute::Int(v)) => Ok(*v),
            Some(_) => Err(self.type_error(name, "int")),
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> Result<f32, GraphError> {
        match self.attr(name) {
            None => Ok(default),
            Some(Attribute::Float(v)) => Ok(*v),
            Some(_) => Err(self.type_error(name, "float")),
        }
    }

    pub fn string_or(&self, name: &str, default: &str) -> Result<String, GraphError> {
        match self.attr(name) {
            None => Ok(default.to_string()),
            Some(Attribute::String(v)) => Ok(v.clone()),
            Some(_) => Err(self.type_error(name, "string")),
        }
    }

    pub fn ints(&self, name: &str) -> Result<Option<&[i64]>, GraphError> {
        match self.attr(name) {
            None => Ok(None),
            Some(Attribute::Ints(v)) => Ok(Some(v)),
            Some(_) => Err(self.type_error(name, "ints")),
        }
    }

    pub fn floats(&self, name: &str) -> Result<Option<&[f32]>, GraphError> {
        match self.attr(name) {
            None => Ok(None),
            Some(Attribute::Floats(v)) => Ok(Some(v)),
            Some(_) => Err(self.type_error(name, "floats")),
        }
    }

    pub fn tensor(&self, name: &str) -> Result<Option<&TensorData>, GraphError> {
        match self.attr(name) {
            None => Ok(None),
            Some(Attribute::Tensor(v)) => Ok(Some(v)),
            Some(_) => Err(self.type_error(name, "tensor")),
        }
    }

    fn type_error(&self, attribute: &str, expected: &'static str) -> GraphError {
        tracing::debug!(
            "attribute '{attribute}' of '{}' is {}",
            self.display_name(),
            self.attr(attribute).map(Attribute::type_name).unwrap_or("missing"),
        );
        GraphError::AttributeType {
            node: self.display_name(),
            attribute: attribute.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> GraphNode {
        GraphNode::new("Conv", "conv0", ["x", "w", ""], ["y"])
            .with_attr("group", Attribute::Int(1))
            .with_attr("strides", Attribute::Ints(vec![2, 2]))
            .with_attr("auto_pad", Attribute::String("NOTSET".into()))
    }

    #[test]
    fn test_optional_input_is_none() {
        let n = conv();
        assert_eq!(n.input(0), Some("x"));
        assert_eq!(n.input(2), None);
        assert_eq!(n.input(3), None);
    }

    #[test]
    fn test_typed_getters() {
        let n = conv();
        assert_eq!(n.int_or("group", 7).unwrap(), 1);
        assert_eq!(n.int_or("missing", 7).unwrap(), 7);
        assert_eq!(n.ints("strides").unwrap(), Some(&[2i64, 2][..]));
        assert_eq!(n.string_or("auto_pad", "").unwrap(), "NOTSET");
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let n = conv();
        assert!(matches!(
            n.float_or("group", 0.0),
            Err(GraphError::AttributeType { expected: "float", .. })
        ));
    }

    #[test]
    fn test_display_name_unnamed() {
        let n = GraphNode::new("Relu", "", ["a"], ["b"]);
        assert_eq!(n.display_name(), "Relu(b)");
    }
}
