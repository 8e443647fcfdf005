// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph optimizer passes.
//!
//! The passes run to a fixpoint in this order:
//!
//! 1. constant lifting (`Constant` nodes become initializers),
//! 2. identity elimination (`Identity`, inference-mode `Dropout`),
//! 3. constant folding of shape plumbing,
//! 4. dead-node elimination,
//!
//! followed by a stable topological sort. None of the passes touch nodes
//! whose outputs are graph outputs, so output names survive unchanged.

use crate::document::GraphParts;
use crate::node::{Attribute, GraphNode};
use crate::value::{self, Dim};
use crate::GraphError;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use tensor_core::{DType, Shape, TensorData};

/// Counts of what each pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub constants_lifted: usize,
    pub identities_removed: usize,
    pub nodes_folded: usize,
    pub dead_nodes_removed: usize,
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} constants lifted, {} identities removed, {} nodes folded, {} dead nodes removed",
            self.constants_lifted, self.identities_removed, self.nodes_folded, self.dead_nodes_removed
        )
    }
}

/// Runs every pass and sorts the result topologically.
pub(crate) fn run(mut parts: GraphParts) -> Result<(GraphParts, OptimizeReport), GraphError> {
    let mut report = OptimizeReport::default();
    loop {
        let lifted = lift_constants(&mut parts)?;
        let removed = eliminate_identities(&mut parts);
        let folded = fold_constants(&mut parts)?;
        let dead = eliminate_dead_nodes(&mut parts);
        report.constants_lifted += lifted;
        report.identities_removed += removed;
        report.nodes_folded += folded;
        report.dead_nodes_removed += dead;
        if lifted + removed + folded + dead == 0 {
            break;
        }
    }
    parts.nodes = topological_sort(std::mem::take(&mut parts.nodes), &parts)?;
    Ok((parts, report))
}

fn graph_outputs(parts: &GraphParts) -> HashSet<String> {
    parts.outputs.iter().map(|o| o.name.clone()).collect()
}

// ── Constant lifting ───────────────────────────────────────────────

fn lift_constants(parts: &mut GraphParts) -> Result<usize, GraphError> {
    let outputs = graph_outputs(parts);
    let mut lifted = 0;
    let mut kept = Vec::with_capacity(parts.nodes.len());
    for node in std::mem::take(&mut parts.nodes) {
        if node.op_type != "Constant" || outputs.contains(node.output()) {
            kept.push(node);
            continue;
        }
        match constant_value(&node)? {
            Some(t) => {
                tracing::debug!("lifted constant '{}'", node.output());
                parts.initializers.insert(node.output().to_string(), t);
                lifted += 1;
            }
            None => kept.push(node),
        }
    }
    parts.nodes = kept;
    Ok(lifted)
}

/// Returns the tensor a `Constant` node carries, if its encoding is known.
pub fn constant_value(node: &GraphNode) -> Result<Option<TensorData>, GraphError> {
    let tensor_err = |source| GraphError::Tensor {
        name: node.output().to_string(),
        source,
    };
    let t = match node.attributes.iter().next() {
        Some((_, Attribute::Tensor(t))) => t.clone(),
        Some((name, Attribute::Float(v))) if name == "value_float" => TensorData::scalar_f32(*v),
        Some((name, Attribute::Floats(v))) if name == "value_floats" => {
            TensorData::from_f32(Shape::vector(v.len()), v).map_err(tensor_err)?
        }
        Some((name, Attribute::Int(v))) if name == "value_int" => {
            TensorData::from_i64(Shape::scalar(), &[*v]).map_err(tensor_err)?
        }
        Some((name, Attribute::Ints(v))) if name == "value_ints" => {
            TensorData::from_i64(Shape::vector(v.len()), v).map_err(tensor_err)?
        }
        _ => return Ok(None),
    };
    Ok(Some(t))
}

// ── Identity elimination ───────────────────────────────────────────

fn eliminate_identities(parts: &mut GraphParts) -> usize {
    let outputs = graph_outputs(parts);
    let mut renames: HashMap<String, String> = HashMap::new();
    let mut kept = Vec::with_capacity(parts.nodes.len());

    for node in std::mem::take(&mut parts.nodes) {
        let passthrough = matches!(node.op_type.as_str(), "Identity" | "Dropout")
            && node.outputs.iter().skip(1).all(|o| o.is_empty());
        match node.input(0) {
            Some(src) if passthrough && !outputs.contains(node.output()) => {
                tracing::debug!("removed {} '{}'", node.op_type, node.display_name());
                renames.insert(node.output().to_string(), src.to_string());
            }
            _ => kept.push(node),
        }
    }

    let removed = renames.len();
    if removed > 0 {
        let resolve = |name: &str| -> String {
            let mut cur = name;
            while let Some(next) = renames.get(cur) {
                cur = next;
            }
            cur.to_string()
        };
        kept = kept
            .into_iter()
            .map(|node| GraphNode {
                inputs: node.inputs.iter().map(|i| resolve(i)).collect(),
                ..node
            })
            .collect();
    }
    parts.nodes = kept;
    removed
}

// ── Constant folding ───────────────────────────────────────────────

fn fold_constants(parts: &mut GraphParts) -> Result<usize, GraphError> {
    let outputs = graph_outputs(parts);
    let hints: HashMap<String, Vec<Dim>> = parts
        .inputs
        .iter()
        .chain(parts.value_info.iter())
        .filter_map(|v| Some((v.name.clone(), v.shape.clone()?)))
        .collect();

    let mut folded = 0;
    let mut kept = Vec::with_capacity(parts.nodes.len());
    for node in std::mem::take(&mut parts.nodes) {
        if node.outputs.len() != 1 || outputs.contains(node.output()) {
            kept.push(node);
            continue;
        }
        match fold_node(&node, &parts.initializers, &hints)? {
            Some(t) => {
                tracing::debug!("folded {} '{}' into a constant", node.op_type, node.display_name());
                parts.initializers.insert(node.output().to_string(), t);
                folded += 1;
            }
            None => kept.push(node),
        }
    }
    parts.nodes = kept;
    Ok(folded)
}

fn fold_node(
    node: &GraphNode,
    consts: &BTreeMap<String, TensorData>,
    hints: &HashMap<String, Vec<Dim>>,
) -> Result<Option<TensorData>, GraphError> {
    if node.op_type == "Shape" {
        return fold_shape(node, hints);
    }
    let inputs: Option<Vec<&TensorData>> = node
        .inputs
        .iter()
        .filter(|i| !i.is_empty())
        .map(|i| consts.get(i))
        .collect();
    let Some(inputs) = inputs else {
        return Ok(None);
    };
    let Some(&first) = inputs.first() else {
        return Ok(None);
    };

    let result = match node.op_type.as_str() {
        "Cast" => match value::dtype_from_onnx(node.int_or("to", 0)? as i32) {
            Some(to) => first.cast(to).ok(),
            None => None,
        },
        "Unsqueeze" => {
            let axes = axes_of(node, &inputs)?;
            unsqueeze(first, &axes)
        }
        "Squeeze" => {
            let axes = axes_of(node, &inputs)?;
            squeeze(first, &axes)
        }
        "Concat" => concat_1d(&inputs),
        "Gather" if node.int_or("axis", 0)? == 0 && inputs.len() == 2 => gather_1d(first, inputs[1]),
        _ => None,
    };
    Ok(result)
}

/// Axes from the attribute (opset < 13) or the second input.
fn axes_of(node: &GraphNode, inputs: &[&TensorData]) -> Result<Vec<i64>, GraphError> {
    if let Some(axes) = node.ints("axes")? {
        return Ok(axes.to_vec());
    }
    match inputs.get(1) {
        Some(t) => t.to_i64_vec().map_err(|source| GraphError::Tensor {
            name: node.inputs[1].clone(),
            source,
        }),
        None => Ok(Vec::new()),
    }
}

fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let a = if axis < 0 { axis + rank as i64 } else { axis };
    (0..rank as i64).contains(&a).then_some(a as usize)
}

fn unsqueeze(t: &TensorData, axes: &[i64]) -> Option<TensorData> {
    let out_rank = t.shape().rank() + axes.len();
    let mut ones = axes
        .iter()
        .map(|&a| normalize_axis(a, out_rank))
        .collect::<Option<Vec<_>>>()?;
    ones.sort_unstable();
    let mut src = t.shape().dims().iter();
    let dims = (0..out_rank)
        .map(|i| {
            if ones.binary_search(&i).is_ok() {
                Some(1)
            } else {
                src.next().copied()
            }
        })
        .collect::<Option<Vec<_>>>()?;
    t.clone().reshape(Shape::new(dims)).ok()
}

fn squeeze(t: &TensorData, axes: &[i64]) -> Option<TensorData> {
    let rank = t.shape().rank();
    let shape = if axes.is_empty() {
        t.shape().squeezed()
    } else {
        let drop = axes
            .iter()
            .map(|&a| normalize_axis(a, rank))
            .collect::<Option<HashSet<_>>>()?;
        let dims = t
            .shape()
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, &d)| d)
            .collect();
        Shape::new(dims)
    };
    t.clone().reshape(shape).ok()
}

fn concat_1d(inputs: &[&TensorData]) -> Option<TensorData> {
    let dtype = inputs.first()?.dtype();
    if inputs.iter().any(|t| t.dtype() != dtype || t.shape().rank() > 1) {
        return None;
    }
    let bytes: Vec<u8> = inputs.iter().flat_map(|t| t.as_bytes().iter().copied()).collect();
    let len = inputs.iter().map(|t| t.num_elements()).sum();
    TensorData::from_bytes(Shape::vector(len), dtype, bytes).ok()
}

fn gather_1d(data: &TensorData, indices: &TensorData) -> Option<TensorData> {
    if data.shape().rank() != 1 || indices.shape().rank() > 1 {
        return None;
    }
    let n = data.num_elements() as i64;
    let width = data.dtype().size_bytes();
    let mut bytes = Vec::with_capacity(indices.num_elements() * width);
    for idx in indices.to_i64_vec().ok()? {
        let i = if idx < 0 { idx + n } else { idx };
        if !(0..n).contains(&i) {
            return None;
        }
        let start = i as usize * width;
        bytes.extend_from_slice(data.as_bytes().get(start..start + width)?);
    }
    TensorData::from_bytes(indices.shape().clone(), data.dtype(), bytes).ok()
}

fn fold_shape(
    node: &GraphNode,
    hints: &HashMap<String, Vec<Dim>>,
) -> Result<Option<TensorData>, GraphError> {
    let Some(dims) = node.input(0).and_then(|i| hints.get(i)) else {
        return Ok(None);
    };
    let Some(shape) = value::static_shape(dims) else {
        return Ok(None);
    };
    let rank = shape.rank() as i64;
    let clamp = |v: i64| (if v < 0 { v + rank } else { v }).clamp(0, rank) as usize;
    let start = clamp(node.int_or("start", 0)?);
    let end = clamp(node.int_or("end", rank)?);
    let values: Vec<i64> = shape
        .dims()
        .get(start..end.max(start))
        .unwrap_or(&[])
        .iter()
        .map(|&d| d as i64)
        .collect();
    Ok(TensorData::from_i64(Shape::vector(values.len()), &values).ok())
}

// ── Dead-node elimination ──────────────────────────────────────────

fn eliminate_dead_nodes(parts: &mut GraphParts) -> usize {
    let producers: HashMap<&str, usize> = parts
        .nodes
        .iter()
        .enumerate()
        .flat_map(|(i, n)| n.outputs.iter().map(move |o| (o.as_str(), i)))
        .collect();

    let mut live = vec![false; parts.nodes.len()];
    let mut stack: Vec<usize> = parts
        .outputs
        .iter()
        .filter_map(|o| producers.get(o.name.as_str()).copied())
        .collect();
    while let Some(i) = stack.pop() {
        if std::mem::replace(&mut live[i], true) {
            continue;
        }
        for inp in parts.nodes[i].inputs.iter().filter(|s| !s.is_empty()) {
            if let Some(&p) = producers.get(inp.as_str()) {
                stack.push(p);
            }
        }
    }

    let before = parts.nodes.len();
    let nodes = std::mem::take(&mut parts.nodes);
    parts.nodes = nodes
        .into_iter()
        .zip(live)
        .filter_map(|(node, alive)| {
            if !alive {
                tracing::debug!("removed dead {} '{}'", node.op_type, node.display_name());
            }
            alive.then_some(node)
        })
        .collect();
    before - parts.nodes.len()
}

// ── Topological sort ───────────────────────────────────────────────

/// Kahn's algorithm; among ready nodes the one stored first goes first.
fn topological_sort(nodes: Vec<GraphNode>, parts: &GraphParts) -> Result<Vec<GraphNode>, GraphError> {
    let producers: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .flat_map(|(i, n)| n.outputs.iter().filter(|o| !o.is_empty()).map(move |o| (o.as_str(), i)))
        .collect();

    let mut pending = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let deps: HashSet<usize> = node
            .inputs
            .iter()
            .filter(|s| !s.is_empty() && !parts.initializers.contains_key(*s))
            .filter_map(|s| producers.get(s.as_str()).copied())
            .collect();
        pending[i] = deps.len();
        for d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, &p)| p == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = pending
            .iter()
            .position(|&p| p > 0)
            .map(|i| nodes[i].display_name())
            .unwrap_or_default();
        return Err(GraphError::MalformedGraph(format!(
            "graph contains a cycle through '{stuck}'"
        )));
    }

    let mut slots: Vec<Option<GraphNode>> = nodes.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueInfo;
    use crate::GraphDocument;

    fn image(name: &str) -> ValueInfo {
        ValueInfo::with_shape(
            name,
            vec![Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(4), Dim::Fixed(6)],
        )
    }

    fn parts(nodes: Vec<GraphNode>, outputs: &[&str]) -> GraphParts {
        GraphParts {
            name: "t".into(),
            opset: 13,
            nodes,
            inputs: vec![image("x")],
            outputs: outputs.iter().map(|o| ValueInfo::named(o)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_constant_lifted_to_initializer() {
        let p = parts(
            vec![
                GraphNode::new("Constant", "k", Vec::<String>::new(), ["two"])
                    .with_attr("value", Attribute::Tensor(TensorData::scalar_f32(2.0))),
                GraphNode::new("Mul", "m", ["x", "two"], ["y"]),
            ],
            &["y"],
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(
            doc.initializer("two").unwrap().to_f32_vec().unwrap(),
            vec![2.0]
        );
    }

    #[test]
    fn test_identity_removed_and_consumers_renamed() {
        let p = parts(
            vec![
                GraphNode::new("Relu", "r", ["x"], ["a"]),
                GraphNode::new("Identity", "id", ["a"], ["b"]),
                GraphNode::new("Dropout", "drop", ["b"], ["c"]),
                GraphNode::new("Sigmoid", "s", ["c"], ["y"]),
            ],
            &["y"],
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        let ops: Vec<_> = doc.nodes().iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, ["Relu", "Sigmoid"]);
        assert_eq!(doc.nodes()[1].inputs, ["a"]);
    }

    #[test]
    fn test_identity_feeding_graph_output_kept() {
        let p = parts(
            vec![
                GraphNode::new("Relu", "r", ["x"], ["a"]),
                GraphNode::new("Identity", "id", ["a"], ["y"]),
            ],
            &["y"],
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        assert_eq!(doc.nodes().len(), 2);
    }

    #[test]
    fn test_shape_gather_unsqueeze_concat_folded() {
        let mut p = parts(
            vec![
                GraphNode::new("Shape", "shape", ["x"], ["s"]),
                GraphNode::new("Gather", "g", ["s", "i0"], ["c"]),
                GraphNode::new("Unsqueeze", "u", ["c"], ["cu"])
                    .with_attr("axes", Attribute::Ints(vec![0])),
                GraphNode::new("Concat", "cat", ["cu", "tail"], ["target"])
                    .with_attr("axis", Attribute::Int(0)),
                GraphNode::new("Reshape", "reshape", ["x", "target"], ["y"]),
            ],
            &["y"],
        );
        p.initializers.insert(
            "i0".into(),
            TensorData::from_i64(Shape::scalar(), &[1]).unwrap(),
        );
        p.initializers.insert(
            "tail".into(),
            TensorData::from_i64(Shape::vector(1), &[-1]).unwrap(),
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(
            doc.initializer("target").unwrap().to_i64_vec().unwrap(),
            vec![3, -1]
        );
    }

    #[test]
    fn test_squeeze_and_cast_folded() {
        let mut p = parts(
            vec![
                GraphNode::new("Squeeze", "sq", ["k"], ["k2"]),
                GraphNode::new("Cast", "cast", ["k2"], ["k3"])
                    .with_attr("to", Attribute::Int(1)),
                GraphNode::new("Add", "add", ["x", "k3"], ["y"]),
            ],
            &["y"],
        );
        p.initializers.insert(
            "k".into(),
            TensorData::from_i64(Shape::new(vec![1, 3, 1]), &[1, 2, 3]).unwrap(),
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        let k3 = doc.initializer("k3").unwrap();
        assert_eq!(k3.dtype(), DType::F32);
        assert_eq!(k3.shape(), &Shape::vector(3));
        assert_eq!(k3.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dead_nodes_removed() {
        let p = parts(
            vec![
                GraphNode::new("Relu", "r", ["x"], ["a"]),
                GraphNode::new("Sigmoid", "unused", ["x"], ["b"]),
                GraphNode::new("Tanh", "unused2", ["b"], ["c"]),
            ],
            &["a"],
        );
        let (parts, report) = run(p).unwrap();
        assert_eq!(parts.nodes.len(), 1);
        assert_eq!(report.dead_nodes_removed, 2);
    }

    #[test]
    fn test_topological_sort_is_stable() {
        let p = parts(
            vec![
                GraphNode::new("Add", "add", ["a", "b"], ["y"]),
                GraphNode::new("Relu", "ra", ["x"], ["a"]),
                GraphNode::new("Relu", "rb", ["x"], ["b"]),
            ],
            &["y"],
        );
        let doc = GraphDocument::from_parts(p).unwrap().optimize().unwrap();
        let names: Vec<_> = doc.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["ra", "rb", "add"]);
    }

    #[test]
    fn test_cycle_is_malformed() {
        let p = parts(
            vec![
                GraphNode::new("Add", "a1", ["x", "q"], ["p"]),
                GraphNode::new("Relu", "a2", ["p"], ["q"]),
            ],
            &["q"],
        );
        let err = GraphDocument::from_parts(p).unwrap().optimize().unwrap_err();
        assert!(err.is_malformed());
    }
}
