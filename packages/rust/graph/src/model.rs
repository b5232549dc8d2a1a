//! Concept graph data model.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use learnpath_shared::{
    GraphId, IngestWarning, LearnPathError, Result, WeightVector, normalize_label,
};
use petgraph::graph::{EdgeReference, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// The relation an edge expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// The source should typically be learned before the target.
    Prerequisite,
    /// The two concepts appear together.
    Related,
}

/// Four independent, non-negative cost dimensions of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostVector {
    pub time: f64,
    pub cognitive: f64,
    pub prereq_strength: f64,
    pub interest_penalty: f64,
}

impl CostVector {
    pub const fn new(time: f64, cognitive: f64, prereq_strength: f64, interest_penalty: f64) -> Self {
        Self {
            time,
            cognitive,
            prereq_strength,
            interest_penalty,
        }
    }

    /// Same value in every dimension.
    pub const fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value)
    }

    /// Per-dimension minimum of two vectors.
    pub fn min_merge(&self, other: &Self) -> Self {
        Self::new(
            self.time.min(other.time),
            self.cognitive.min(other.cognitive),
            self.prereq_strength.min(other.prereq_strength),
            self.interest_penalty.min(other.interest_penalty),
        )
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.time * factor,
            self.cognitive * factor,
            self.prereq_strength * factor,
            self.interest_penalty * factor,
        )
    }

    /// Raise every dimension to at least `min`.
    pub fn floored(&self, min: f64) -> Self {
        Self::new(
            self.time.max(min),
            self.cognitive.max(min),
            self.prereq_strength.max(min),
            self.interest_penalty.max(min),
        )
    }

    /// Scalar cost under a weighting.
    pub fn weighted(&self, weights: &WeightVector) -> f64 {
        weights.time * self.time
            + weights.cognitive * self.cognitive
            + weights.prereq * self.prereq_strength
            + weights.interest * self.interest_penalty
    }

    fn is_valid(&self) -> bool {
        [
            self.time,
            self.cognitive,
            self.prereq_strength,
            self.interest_penalty,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptEdge {
    pub kind: EdgeKind,
    pub costs: CostVector,
    /// Number of signals merged into this edge.
    pub support: u32,
}

impl ConceptEdge {
    /// Fold a duplicate edge between the same ordered pair into this one.
    fn merge(&mut self, other: &ConceptEdge) {
        if other.kind == EdgeKind::Prerequisite {
            self.kind = EdgeKind::Prerequisite;
        }
        self.costs = self.costs.min_merge(&other.costs);
        self.support += other.support;
    }
}

/// Owned view of one edge, by canonical labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSnapshot {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub costs: CostVector,
    pub support: u32,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptNode {
    /// Canonical label: first-seen casing.
    pub label: String,
    /// Normalized identity key.
    pub key: String,
    /// Originating URLs, first-seen order.
    pub sources: Vec<String>,
    /// Estimated minutes to learn.
    pub time_to_learn: f64,
    /// Label complexity in `[0, 1]`.
    pub cognitive_load: f64,
    pub interest_affinity: f64,
}

impl ConceptNode {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.split_whitespace().collect::<Vec<_>>().join(" "),
            key: normalize_label(label),
            sources: Vec::new(),
            time_to_learn: 0.0,
            cognitive_load: 0.0,
            interest_affinity: 0.5,
        }
    }

    pub fn add_source(&mut self, url: &str) {
        if !self.sources.iter().any(|s| s == url) {
            self.sources.push(url.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// ConceptGraph
// ---------------------------------------------------------------------------

/// One build session's concepts and relations. Immutable once built.
#[derive(Debug)]
pub struct ConceptGraph {
    id: GraphId,
    built_at: DateTime<Utc>,
    graph: Graph<ConceptNode, ConceptEdge>,
    index: HashMap<String, NodeIndex>,
    sources: Vec<String>,
    warnings: Vec<IngestWarning>,
}

impl ConceptGraph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Input URLs that produced at least one document.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn warnings(&self) -> &[IngestWarning] {
        &self.warnings
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Look up a node by label in any casing or spacing.
    pub fn node(&self, label: &str) -> Option<NodeIndex> {
        self.index.get(&normalize_label(label)).copied()
    }

    pub fn concept(&self, idx: NodeIndex) -> &ConceptNode {
        &self.graph[idx]
    }

    /// Canonical labels, sorted.
    pub fn nodes(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].label.as_str())
            .collect()
    }

    pub fn edges(&self) -> Vec<EdgeSnapshot> {
        self.graph
            .edge_references()
            .map(|edge| EdgeSnapshot {
                from: self.graph[edge.source()].label.clone(),
                to: self.graph[edge.target()].label.clone(),
                kind: edge.weight().kind,
                costs: edge.weight().costs,
                support: edge.weight().support,
            })
            .collect()
    }

    pub fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = EdgeReference<'_, ConceptEdge>> {
        self.graph.edges(idx)
    }
}

// ---------------------------------------------------------------------------
// ConceptGraphBuilder
// ---------------------------------------------------------------------------

/// Mutable staging area for a [`ConceptGraph`].
///
/// Nodes are deduplicated by normalized label and edges between the same
/// ordered pair are merged. [`finish`](Self::finish) lays nodes out sorted by
/// canonical label, so node index order equals label order.
#[derive(Debug, Default)]
pub struct ConceptGraphBuilder {
    nodes: HashMap<String, ConceptNode>,
    edges: BTreeMap<(String, String), ConceptEdge>,
    sources: Vec<String>,
    warnings: Vec<IngestWarning>,
}

impl ConceptGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph directly from labels and cost vectors.
    pub fn from_parts<'a>(
        labels: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str, EdgeKind, CostVector)>,
    ) -> Result<ConceptGraph> {
        let mut builder = Self::new();
        for label in labels {
            builder.add_node(label);
        }
        for (from, to, kind, costs) in edges {
            builder.add_edge(from, to, kind, costs, 1)?;
        }
        Ok(builder.finish())
    }

    /// Add a node unless one with the same normalized label exists.
    /// Returns the node's key.
    pub fn add_node(&mut self, label: &str) -> String {
        let key = normalize_label(label);
        self.nodes
            .entry(key.clone())
            .or_insert_with(|| ConceptNode::new(label));
        key
    }

    pub fn node_mut(&mut self, label: &str) -> Option<&mut ConceptNode> {
        self.nodes.get_mut(&normalize_label(label))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add or merge a directed edge. Self-edges are ignored.
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        kind: EdgeKind,
        costs: CostVector,
        support: u32,
    ) -> Result<()> {
        let from_key = normalize_label(from);
        let to_key = normalize_label(to);
        if !self.nodes.contains_key(&from_key) {
            return Err(LearnPathError::unknown_concept(from));
        }
        if !self.nodes.contains_key(&to_key) {
            return Err(LearnPathError::unknown_concept(to));
        }
        if !costs.is_valid() {
            return Err(LearnPathError::validation(format!(
                "edge {from} -> {to} has a negative or non-finite cost"
            )));
        }
        if from_key == to_key {
            return Ok(());
        }

        let edge = ConceptEdge {
            kind,
            costs,
            support,
        };
        self.edges
            .entry((from_key, to_key))
            .and_modify(|existing| existing.merge(&edge))
            .or_insert(edge);
        Ok(())
    }

    pub fn add_source(&mut self, url: &str) {
        if !self.sources.iter().any(|s| s == url) {
            self.sources.push(url.to_string());
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<IngestWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Freeze into an immutable graph with a fresh id.
    pub fn finish(self) -> ConceptGraph {
        let mut nodes: Vec<ConceptNode> = self.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));

        let mut graph = Graph::with_capacity(nodes.len(), self.edges.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let key = node.key.clone();
            let idx = graph.add_node(node);
            index.insert(key, idx);
        }

        for ((from, to), edge) in self.edges {
            if let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) {
                graph.add_edge(a, b, edge);
            }
        }

        ConceptGraph {
            id: GraphId::new(),
            built_at: Utc::now(),
            graph,
            index,
            sources: self.sources,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_are_sorted_and_found_by_any_casing() {
        let graph = ConceptGraphBuilder::from_parts(["Loops", "Variables", "Data Types"], [])
            .unwrap();

        assert_eq!(graph.nodes(), vec!["Data Types", "Loops", "Variables"]);
        let idx = graph.node("  data   TYPES ").expect("node");
        assert_eq!(graph.concept(idx).label, "Data Types");
        assert!(graph.node("Functions").is_none());
    }

    #[test]
    fn first_casing_wins() {
        let mut builder = ConceptGraphBuilder::new();
        builder.add_node("Binary Search");
        builder.add_node("binary search");
        assert_eq!(builder.node_count(), 1);

        let graph = builder.finish();
        assert_eq!(graph.nodes(), vec!["Binary Search"]);
    }

    #[test]
    fn edges_require_known_endpoints() {
        let mut builder = ConceptGraphBuilder::new();
        builder.add_node("A");
        let err = builder
            .add_edge("A", "B", EdgeKind::Related, CostVector::uniform(1.0), 1)
            .unwrap_err();
        assert!(matches!(err, LearnPathError::UnknownConcept { label } if label == "B"));
    }

    #[test]
    fn negative_costs_are_rejected() {
        let mut builder = ConceptGraphBuilder::new();
        builder.add_node("A");
        builder.add_node("B");
        let err = builder
            .add_edge("A", "B", EdgeKind::Related, CostVector::new(1.0, -0.1, 1.0, 1.0), 1)
            .unwrap_err();
        assert!(matches!(err, LearnPathError::Validation { .. }));
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut builder = ConceptGraphBuilder::new();
        builder.add_node("Loops");
        builder
            .add_edge("Loops", "loops", EdgeKind::Prerequisite, CostVector::uniform(1.0), 1)
            .unwrap();
        assert_eq!(builder.finish().edge_count(), 0);
    }

    #[test]
    fn duplicate_edges_merge_by_minimum_and_prefer_prerequisite() {
        let mut builder = ConceptGraphBuilder::new();
        builder.add_node("A");
        builder.add_node("B");
        builder
            .add_edge("A", "B", EdgeKind::Related, CostVector::new(0.5, 2.0, 1.5, 1.0), 1)
            .unwrap();
        builder
            .add_edge("A", "B", EdgeKind::Prerequisite, CostVector::new(1.0, 1.0, 1.0, 0.4), 2)
            .unwrap();
        let graph = builder.finish();

        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Prerequisite);
        assert_eq!(edges[0].costs, CostVector::new(0.5, 1.0, 1.0, 0.4));
        assert_eq!(edges[0].support, 3);
    }

    #[test]
    fn cost_vector_helpers() {
        let costs = CostVector::new(1.0, 2.0, 0.5, 0.01);
        assert_eq!(costs.scaled(0.1).floored(0.05), CostVector::new(0.1, 0.2, 0.05, 0.05));

        let weighted = CostVector::uniform(2.0).weighted(&WeightVector::new(0.5, 0.0, 0.5, 0.0));
        assert!((weighted - 2.0).abs() < 1e-12);
    }

    #[test]
    fn edge_kind_serializes_lowercase() {
        let json = serde_json::to_string(&EdgeKind::Prerequisite).unwrap();
        assert_eq!(json, "\"prerequisite\"");
    }
}
