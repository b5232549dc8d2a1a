//! Multi-criteria weighted shortest path.
//!
//! Each edge's cost vector is collapsed to a scalar with the caller's
//! [`WeightVector`], optionally after discounting edges out of concepts the
//! learner has mastered. The search is Dijkstra over a binary heap whose
//! ordering folds in the tie-break: among paths whose costs agree within
//! [`COST_EPSILON`], fewer hops win, then the lexicographically smaller
//! label sequence. Node indices follow label order, so comparing index
//! sequences compares label sequences.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use learnpath_learner::LearnerSnapshot;
use learnpath_shared::{AppConfig, LearnPathError, Result, WeightVector};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::model::{ConceptEdge, ConceptGraph};

/// Costs closer than this are considered equal.
pub const COST_EPSILON: f64 = 1e-9;

/// Learner adjustment knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathOptions {
    /// Mastery at or above which a concept counts as known.
    pub mastery_threshold: f64,
    /// Multiplier applied to edges leaving a known concept.
    pub mastered_discount: f64,
    /// Floor for every adjusted dimension.
    pub min_cost: f64,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PathOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            mastery_threshold: config.pathfinding.mastery_threshold,
            mastered_discount: config.pathfinding.mastered_discount,
            min_cost: config.graph.min_cost,
        }
    }
}

/// A found path, by canonical labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPath {
    pub path: Vec<String>,
    pub cost: f64,
    pub hops: usize,
}

/// Partial path on the frontier.
#[derive(Debug, Clone)]
struct Candidate {
    cost: f64,
    path: Vec<NodeIndex>,
}

impl Candidate {
    fn head(&self) -> NodeIndex {
        self.path[self.path.len() - 1]
    }

    fn hops(&self) -> usize {
        self.path.len() - 1
    }

    /// Ascending preference: cheaper, then shorter, then lexicographically
    /// smaller.
    fn preference(&self, other: &Self) -> Ordering {
        if (self.cost - other.cost).abs() > COST_EPSILON {
            return self.cost.total_cmp(&other.cost);
        }
        self.hops()
            .cmp(&other.hops())
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.preference(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed: BinaryHeap is a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.preference(self)
    }
}

/// Find the preferred path from `start` to `goal`.
///
/// Weights are validated first, then both endpoints must exist in the
/// graph. `start == goal` yields a single-node path of cost zero. An
/// unreachable goal is [`LearnPathError::NoPath`].
#[instrument(skip_all, fields(graph_id = %graph.id(), start = %start, goal = %goal))]
pub fn find_path(
    graph: &ConceptGraph,
    start: &str,
    goal: &str,
    weights: &WeightVector,
    learner: Option<&LearnerSnapshot>,
    options: &PathOptions,
) -> Result<LearningPath> {
    weights.validate()?;

    let source = graph
        .node(start)
        .ok_or_else(|| LearnPathError::unknown_concept(start))?;
    let target = graph
        .node(goal)
        .ok_or_else(|| LearnPathError::unknown_concept(goal))?;

    if source == target {
        return Ok(LearningPath {
            path: vec![graph.concept(source).label.clone()],
            cost: 0.0,
            hops: 0,
        });
    }

    let start_time = Instant::now();
    let node_count = graph.node_count();
    let mut settled = vec![false; node_count];
    let mut best: Vec<Option<Candidate>> = vec![None; node_count];
    let mut heap = BinaryHeap::new();

    let origin = Candidate {
        cost: 0.0,
        path: vec![source],
    };
    best[source.index()] = Some(origin.clone());
    heap.push(origin);

    while let Some(candidate) = heap.pop() {
        let node = candidate.head();
        if settled[node.index()] {
            continue;
        }
        settled[node.index()] = true;

        if node == target {
            debug!(
                cost = candidate.cost,
                hops = candidate.hops(),
                duration_us = start_time.elapsed().as_micros(),
                "path found"
            );
            return Ok(LearningPath {
                path: candidate
                    .path
                    .iter()
                    .map(|idx| graph.concept(*idx).label.clone())
                    .collect(),
                cost: candidate.cost,
                hops: candidate.hops(),
            });
        }

        let discounted = learner.is_some_and(|l| {
            l.mastery_of(&graph.concept(node).label) >= options.mastery_threshold
        });

        for edge in graph.outgoing(node) {
            let next = edge.target();
            if settled[next.index()] {
                continue;
            }

            let step = edge_cost(graph, edge.weight(), next, weights, learner, discounted, options);
            let mut path = candidate.path.clone();
            path.push(next);
            let extended = Candidate {
                cost: candidate.cost + step,
                path,
            };

            let improves = best[next.index()]
                .as_ref()
                .is_none_or(|current| extended.preference(current) == Ordering::Less);
            if improves {
                best[next.index()] = Some(extended.clone());
                heap.push(extended);
            }
        }
    }

    Err(LearnPathError::NoPath {
        start: graph.concept(source).label.clone(),
        goal: graph.concept(target).label.clone(),
    })
}

/// Scalar cost of one edge after learner adjustment.
fn edge_cost(
    graph: &ConceptGraph,
    edge: &ConceptEdge,
    target: NodeIndex,
    weights: &WeightVector,
    learner: Option<&LearnerSnapshot>,
    discounted: bool,
    options: &PathOptions,
) -> f64 {
    let mut costs = edge.costs;
    if discounted {
        costs = costs
            .scaled(options.mastered_discount)
            .floored(options.min_cost);
    }
    if learner.is_some_and(|l| l.is_interested_in(&graph.concept(target).label)) {
        costs.interest_penalty = options.min_cost;
    }
    costs.weighted(weights)
}
