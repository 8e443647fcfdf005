// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The graph document: nodes, initializers and shape hints of one ONNX model.
//!
//! # Type-State Pattern
//!
//! ```text
//! GraphDocument<Parsed>:    decoded and indexed, node order as stored.
//!       │  .optimize()  or  .assume_optimized()
//!       ▼
//! GraphDocument<Optimized>: constants lifted, dead nodes removed,
//!                            nodes in topological order.
//! ```
//!
//! The translator only accepts `GraphDocument<Optimized>`. A document that
//! was optimized by an external tool can skip the in-crate passes with
//! [`GraphDocument::assume_optimized`]; ordering is then checked again
//! during translation.

use crate::node::{Attribute, GraphNode};
use crate::proto::{self, attribute_type, ModelProto};
use crate::value::{self, Dim, ValueInfo};
use crate::GraphError;
use prost::Message;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use tensor_core::{Shape, TensorData};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: document decoded and indexed, passes not yet applied.
#[derive(Debug, Clone)]
pub struct Parsed;

/// Marker: document is in topological order with constants lifted.
#[derive(Debug, Clone)]
pub struct Optimized;

/// Marker trait for document states.
pub trait DocumentState: fmt::Debug + Clone {}
impl DocumentState for Parsed {}
impl DocumentState for Optimized {}

/// The owned contents of a document, used to build or rebuild one.
#[derive(Debug, Clone, Default)]
pub struct GraphParts {
    pub name: String,
    pub producer: String,
    pub opset: i64,
    pub nodes: Vec<GraphNode>,
    pub initializers: BTreeMap<String, TensorData>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub value_info: Vec<ValueInfo>,
}

// ── GraphDocument ──────────────────────────────────────────────────

/// An ONNX computation graph with an O(1) producer/consumer index.
#[derive(Debug, Clone)]
pub struct GraphDocument<S: DocumentState = Parsed> {
    parts: GraphParts,
    producers: HashMap<String, usize>,
    consumers: HashMap<String, Vec<usize>>,
    hints: HashMap<String, HintSource>,
    _state: PhantomData<S>,
}

impl GraphDocument<Parsed> {
    /// Decodes a serialized ONNX `ModelProto`.
    ///
    /// # Errors
    /// Returns a malformed-graph error if the bytes do not decode, the
    /// model carries no graph, an initializer uses an unsupported encoding,
    /// or a node references a tensor nothing defines.
    pub fn parse(bytes: &[u8]) -> Result<Self, GraphError> {
        let model = ModelProto::decode(bytes)?;
        let opset = model
            .opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
            .unwrap_or(0);
        let graph = model
            .graph
            .ok_or_else(|| GraphError::MalformedGraph("model contains no graph".into()))?;

        let mut initializers = BTreeMap::new();
        for t in &graph.initializer {
            if t.name.is_empty() {
                return Err(GraphError::MalformedGraph("unnamed initializer".into()));
            }
            initializers.insert(t.name.clone(), value::tensor_from_proto(t)?);
        }

        let nodes = graph
            .node
            .iter()
            .map(node_from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        // Older exporters list initializers among the graph inputs.
        let inputs = graph
            .input
            .iter()
            .filter(|v| !initializers.contains_key(&v.name))
            .map(value::value_info_from_proto)
            .collect();
        let outputs = graph.output.iter().map(value::value_info_from_proto).collect();
        let value_info = graph
            .value_info
            .iter()
            .map(value::value_info_from_proto)
            .collect();

        let doc = Self::from_parts(GraphParts {
            name: graph.name,
            producer: model.producer_name,
            opset,
            nodes,
            initializers,
            inputs,
            outputs,
            value_info,
        })?;
        tracing::debug!(
            "parsed graph '{}': {} nodes, {} initializers, opset {}",
            doc.name(),
            doc.nodes().len(),
            doc.initializers().len(),
            doc.opset(),
        );
        Ok(doc)
    }

    /// Builds a document from owned parts, validating references.
    pub fn from_parts(parts: GraphParts) -> Result<Self, GraphError> {
        let doc = Self::index(parts);
        doc.check_references()?;
        Ok(doc)
    }

    /// Runs the in-crate optimizer passes. See [`crate::optimize`].
    pub fn optimize(self) -> Result<GraphDocument<Optimized>, GraphError> {
        let (parts, report) = crate::optimize::run(self.parts)?;
        tracing::debug!("optimizer: {report}");
        Ok(GraphDocument::<Optimized>::index(parts))
    }

    /// Accepts the document as already optimized, without running passes.
    pub fn assume_optimized(self) -> GraphDocument<Optimized> {
        GraphDocument {
            parts: self.parts,
            producers: self.producers,
            consumers: self.consumers,
            hints: self.hints,
            _state: PhantomData,
        }
    }
}

impl<S: DocumentState> GraphDocument<S> {
    fn index(parts: GraphParts) -> Self {
        let mut producers = HashMap::new();
        let mut consumers: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, node) in parts.nodes.iter().enumerate() {
            for out in node.outputs.iter().filter(|o| !o.is_empty()) {
                producers.entry(out.clone()).or_insert(i);
            }
            for inp in node.inputs.iter().filter(|o| !o.is_empty()) {
                let list = consumers.entry(inp.clone()).or_default();
                if list.last() != Some(&i) {
                    list.push(i);
                }
            }
        }

        // Graph inputs and outputs take precedence over intermediate hints.
        let mut hints = HashMap::new();
        for (i, v) in parts.value_info.iter().enumerate() {
            hints.insert(v.name.clone(), HintSource::Intermediate(i));
        }
        for (i, v) in parts.outputs.iter().enumerate() {
            hints.insert(v.name.clone(), HintSource::Output(i));
        }
        for (i, v) in parts.inputs.iter().enumerate() {
            hints.insert(v.name.clone(), HintSource::Input(i));
        }

        Self {
            parts,
            producers,
            consumers,
            hints,
            _state: PhantomData,
        }
    }

    fn check_references(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.parts.nodes {
            for out in node.outputs.iter().filter(|o| !o.is_empty()) {
                if !seen.insert(out.as_str()) {
                    return Err(GraphError::MalformedGraph(format!(
                        "tensor '{out}' is produced more than once"
                    )));
                }
                if self.is_graph_input(out) || self.parts.initializers.contains_key(out) {
                    return Err(GraphError::MalformedGraph(format!(
                        "node '{}' overwrites graph input or initializer '{out}'",
                        node.display_name()
                    )));
                }
            }
        }
        for node in &self.parts.nodes {
            for inp in node.inputs.iter().filter(|i| !i.is_empty()) {
                if !self.is_defined(inp) {
                    return Err(GraphError::MalformedGraph(format!(
                        "node '{}' reads undefined tensor '{inp}'",
                        node.display_name()
                    )));
                }
            }
        }
        for out in &self.parts.outputs {
            if !self.is_defined(&out.name) {
                return Err(GraphError::MalformedGraph(format!(
                    "graph output '{}' is never produced",
                    out.name
                )));
            }
        }
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.producers.contains_key(name)
            || self.parts.initializers.contains_key(name)
            || self.is_graph_input(name)
    }

    pub fn name(&self) -> &str {
        &self.parts.name
    }

    /// Name of the tool that exported the document.
    pub fn producer_name(&self) -> &str {
        &self.parts.producer
    }

    /// Default-domain opset version, or 0 if the document declares none.
    pub fn opset(&self) -> i64 {
        self.parts.opset
    }

    /// Nodes in stored order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.parts.nodes
    }

    pub fn node(&self, index: usize) -> Option<&GraphNode> {
        self.parts.nodes.get(index)
    }

    pub fn initializers(&self) -> &BTreeMap<String, TensorData> {
        &self.parts.initializers
    }

    pub fn initializer(&self, name: &str) -> Option<&TensorData> {
        self.parts.initializers.get(name)
    }

    /// Graph inputs, excluding initializers.
    pub fn inputs(&self) -> &[ValueInfo] {
        &self.parts.inputs
    }

    pub fn outputs(&self) -> &[ValueInfo] {
        &self.parts.outputs
    }

    pub fn is_graph_input(&self, name: &str) -> bool {
        matches!(self.hints.get(name), Some(HintSource::Input(_)))
    }

    pub fn is_graph_output(&self, name: &str) -> bool {
        self.parts.outputs.iter().any(|o| o.name == name)
    }

    /// Index of the node that produces `name`.
    pub fn producer(&self, name: &str) -> Option<usize> {
        self.producers.get(name).copied()
    }

    /// Indices of the nodes that read `name`, in stored order.
    pub fn consumers(&self, name: &str) -> &[usize] {
        self.consumers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Shape hint for any named value, if the exporter recorded one.
    pub fn shape_hint(&self, name: &str) -> Option<&[Dim]> {
        self.value_info(name)?.shape.as_deref()
    }

    /// Shape for `name` if it is an initializer or fully static in the hints.
    pub fn static_shape(&self, name: &str) -> Option<Shape> {
        if let Some(t) = self.initializer(name) {
            return Some(t.shape().clone());
        }
        value::static_shape(self.shape_hint(name)?)
    }

    fn value_info(&self, name: &str) -> Option<&ValueInfo> {
        match *self.hints.get(name)? {
            HintSource::Input(i) => self.parts.inputs.get(i),
            HintSource::Output(i) => self.parts.outputs.get(i),
            HintSource::Intermediate(i) => self.parts.value_info.get(i),
        }
    }

    /// Consumes the document, returning its parts.
    pub fn into_parts(self) -> GraphParts {
        self.parts
    }

    /// Encodes the document back into an ONNX `ModelProto`.
    pub fn to_proto(&self) -> ModelProto {
        let p = &self.parts;
        ModelProto {
            ir_version: 8,
            producer_name: p.producer.clone(),
            producer_version: String::new(),
            opset_import: vec![proto::OperatorSetIdProto {
                domain: String::new(),
                version: p.opset,
            }],
            graph: Some(proto::GraphProto {
                node: p.nodes.iter().map(node_to_proto).collect(),
                name: p.name.clone(),
                initializer: p
                    .initializers
                    .iter()
                    .map(|(name, t)| proto::TensorProto::from_tensor(name, t))
                    .collect(),
                input: p.inputs.iter().map(proto::ValueInfoProto::from_value_info).collect(),
                output: p.outputs.iter().map(proto::ValueInfoProto::from_value_info).collect(),
                value_info: p
                    .value_info
                    .iter()
                    .map(proto::ValueInfoProto::from_value_info)
                    .collect(),
            }),
        }
    }

    /// Serializes the document as ONNX protobuf bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }
}

/// Where the shape hint for a name is stored.
#[derive(Debug, Clone, Copy)]
enum HintSource {
    Input(usize),
    Output(usize),
    Intermediate(usize),
}

fn node_from_proto(n: &proto::NodeProto) -> Result<GraphNode, GraphError> {
    let mut attributes = BTreeMap::new();
    for a in &n.attribute {
        let value = match a.r#type {
            attribute_type::FLOAT => Attribute::Float(a.f),
            attribute_type::INT => Attribute::Int(a.i),
            attribute_type::STRING => Attribute::String(String::from_utf8_lossy(&a.s).into_owned()),
            attribute_type::TENSOR => match &a.t {
                Some(t) => Attribute::Tensor(value::tensor_from_proto(t)?),
                None => {
                    return Err(GraphError::MalformedGraph(format!(
                        "attribute '{}' of node '{}' has no tensor",
                        a.name, n.name
                    )))
                }
            },
            attribute_type::FLOATS => Attribute::Floats(a.floats.clone()),
            attribute_type::INTS => Attribute::Ints(a.ints.clone()),
            attribute_type::STRINGS => Attribute::Strings(
                a.strings
                    .iter()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect(),
            ),
            other => {
                tracing::warn!(
                    "ignoring attribute '{}' of node '{}' with type {other}",
                    a.name,
                    n.name
                );
                continue;
            }
        };
        attributes.insert(a.name.clone(), value);
    }
    Ok(GraphNode {
        name: n.name.clone(),
        op_type: n.op_type.clone(),
        domain: n.domain.clone(),
        inputs: n.input.clone(),
        outputs: n.output.clone(),
        attributes,
    })
}

fn node_to_proto(n: &GraphNode) -> proto::NodeProto {
    let attribute = n
        .attributes
        .iter()
        .map(|(name, value)| {
            let mut a = proto::AttributeProto {
                name: name.clone(),
                ..Default::default()
            };
            match value {
                Attribute::Float(v) => {
                    a.r#type = attribute_type::FLOAT;
                    a.f = *v;
                }
                Attribute::Int(v) => {
                    a.r#type = attribute_type::INT;
                    a.i = *v;
                }
                Attribute::String(v) => {
                    a.r#type = attribute_type::STRING;
                    a.s = v.as_bytes().to_vec();
                }
                Attribute::Tensor(t) => {
                    a.r#type = attribute_type::TENSOR;
                    a.t = Some(proto::TensorProto::from_tensor("", t));
                }
                Attribute::Floats(v) => {
                    a.r#type = attribute_type::FLOATS;
                    a.floats = v.clone();
                }
                Attribute::Ints(v) => {
                    a.r#type = attribute_type::INTS;
                    a.ints = v.clone();
                }
                Attribute::Strings(v) => {
                    a.r#type = attribute_type::STRINGS;
                    a.strings = v.iter().map(|s| s.as_bytes().to_vec()).collect();
                }
            }
            a
        })
        .collect();
    proto::NodeProto {
        input: n.inputs.clone(),
        output: n.outputs.clone(),
        name: n.name.clone(),
        op_type: n.op_type.clone(),
        attribute,
        domain: n.domain.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> ValueInfo {
        ValueInfo::with_shape(
            name,
            vec![Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(8), Dim::Fixed(8)],
        )
    }

    fn simple_parts() -> GraphParts {
        let mut initializers = BTreeMap::new();
        initializers.insert(
            "w".to_string(),
            TensorData::from_f32(Shape::new(vec![4, 3, 1, 1]), &[0.5; 12]).unwrap(),
        );
        GraphParts {
            name: "g".into(),
            opset: 13,
            nodes: vec![
                GraphNode::new("Conv", "conv", ["data", "w"], ["c"]),
                GraphNode::new("Relu", "relu", ["c"], ["r"]),
                GraphNode::new("Sigmoid", "sig", ["c"], ["s"]),
            ],
            initializers,
            inputs: vec![input("data")],
            outputs: vec![ValueInfo::named("r"), ValueInfo::named("s")],
            ..Default::default()
        }
    }

    #[test]
    fn test_index_lookups() {
        let doc = GraphDocument::from_parts(simple_parts()).unwrap();
        assert_eq!(doc.producer("c"), Some(0));
        assert_eq!(doc.consumers("c"), &[1, 2]);
        assert_eq!(doc.consumers("r"), &[] as &[usize]);
        assert!(doc.is_graph_input("data"));
        assert!(!doc.is_graph_input("w"));
        assert!(doc.is_graph_output("s"));
        assert_eq!(doc.static_shape("data"), Some(Shape::new(vec![1, 3, 8, 8])));
        assert_eq!(doc.static_shape("w"), Some(Shape::new(vec![4, 3, 1, 1])));
        assert_eq!(doc.static_shape("c"), None);
    }

    #[test]
    fn test_dangling_input_is_malformed() {
        let mut parts = simple_parts();
        parts.nodes.push(GraphNode::new("Relu", "bad", ["nowhere"], ["z"]));
        let err = GraphDocument::from_parts(parts).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_duplicate_producer_is_malformed() {
        let mut parts = simple_parts();
        parts.nodes.push(GraphNode::new("Relu", "dup", ["data"], ["c"]));
        assert!(GraphDocument::from_parts(parts).unwrap_err().is_malformed());
    }

    #[test]
    fn test_parse_roundtrip_through_bytes() {
        let doc = GraphDocument::from_parts(simple_parts()).unwrap();
        let bytes = doc.to_bytes();
        let back = GraphDocument::parse(&bytes).unwrap();
        assert_eq!(back.nodes(), doc.nodes());
        assert_eq!(back.initializers(), doc.initializers());
        assert_eq!(back.inputs(), doc.inputs());
        assert_eq!(back.opset(), 13);
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = GraphDocument::parse(&[0xff, 0xff, 0xff, 0x07]).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_parse_missing_graph() {
        let bytes = ModelProto::default().encode_to_vec();
        assert!(matches!(
            GraphDocument::parse(&bytes),
            Err(GraphError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_initializers_filtered_from_inputs() {
        let doc = GraphDocument::from_parts(simple_parts()).unwrap();
        let mut proto = doc.to_proto();
        if let Some(g) = proto.graph.as_mut() {
            g.input.push(proto::ValueInfoProto {
                name: "w".into(),
                r#type: None,
            });
        }
        let back = GraphDocument::parse(&proto.encode_to_vec()).unwrap();
        assert_eq!(back.inputs().len(), 1);
    }
}
