//! Derives a [`ConceptGraph`] from ingestion output.
//!
//! Precedes signals become `prerequisite` edges, co-occurrence signals become
//! a symmetric pair of `related` edges. Every edge gets a four-dimensional
//! cost vector from per-node heuristics; all dimensions are rounded to
//! `1e-6` and floored to `graph.min_cost`.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use learnpath_ingest::{IngestOutput, Signal};
use learnpath_shared::{GraphConfig, Result, normalize_label};
use tracing::{debug, info, instrument};

use crate::model::{ConceptGraph, ConceptGraphBuilder, ConceptNode, CostVector, EdgeKind};

/// Characters that mark a label as technical (operators, paths, calls).
const TECHNICAL_CHARS: &[char] = &['+', '#', '_', '(', ')', '/', '.', ':', '<', '>', '='];

/// Fixed precision for stable cost comparison.
const COST_PRECISION: f64 = 1e6;

/// Builds concept graphs with a fixed heuristic policy.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
    interest_words: Vec<String>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        let mut interest_words: Vec<String> = config
            .interest_keywords
            .iter()
            .flat_map(|k| normalize_label(k).split(' ').map(str::to_string).collect::<Vec<_>>())
            .filter(|w| !w.is_empty())
            .collect();
        interest_words.sort();
        interest_words.dedup();

        Self {
            config,
            interest_words,
        }
    }

    /// Build a graph from every document in `output`.
    ///
    /// Documents are processed in input order, so a concept's canonical label
    /// is the casing it first appeared with. An output with no concepts
    /// yields an empty graph.
    #[instrument(skip_all, fields(documents = output.documents.len()))]
    pub fn build(&self, output: &IngestOutput) -> Result<ConceptGraph> {
        let start_time = Instant::now();
        let mut assembly = ConceptGraphBuilder::new();
        let mut context_words: HashMap<String, usize> = HashMap::new();

        for doc in &output.documents {
            if !doc.concepts.is_empty() {
                assembly.add_source(&doc.url);
            }
            for mention in &doc.concepts {
                let key = assembly.add_node(&mention.label);
                if let Some(node) = assembly.node_mut(&key) {
                    node.add_source(&doc.url);
                }
                *context_words.entry(key).or_default() += mention.context_words;
            }
        }

        // Signal support per ordered key pair; BTreeMap keeps edge insertion
        // deterministic.
        let mut prerequisites: BTreeMap<(String, String), u32> = BTreeMap::new();
        let mut related: BTreeMap<(String, String), u32> = BTreeMap::new();
        for signal in output.documents.iter().flat_map(|doc| &doc.signals) {
            match signal {
                Signal::Precedes { before, after } => {
                    if let Some(pair) = key_pair(before, after) {
                        *prerequisites.entry(pair).or_default() += 1;
                    }
                }
                Signal::CoOccurs { a, b } => {
                    if let Some((ka, kb)) = key_pair(a, b) {
                        *related.entry((ka.clone(), kb.clone())).or_default() += 1;
                        *related.entry((kb, ka)).or_default() += 1;
                    }
                }
            }
        }

        let neutral = self.config.neutral_cost;
        let wpm = self.config.reading_wpm;
        let mut node_costs: HashMap<String, (f64, f64, f64)> = HashMap::new();
        let mut times: Vec<(String, f64)> = Vec::with_capacity(context_words.len());

        for (key, words) in &context_words {
            let Some(node) = assembly.node_mut(key) else {
                continue;
            };
            node.time_to_learn = round(*words as f64 / wpm);
            node.cognitive_load = round(label_complexity(&node.label));
            node.interest_affinity = round(self.affinity(node));
            times.push((key.clone(), node.time_to_learn));
            node_costs.insert(
                key.clone(),
                (
                    neutral,
                    neutral * (0.5 + node.cognitive_load),
                    neutral * (1.0 - node.interest_affinity),
                ),
            );
        }

        let (min_time, max_time) = times.iter().fold((f64::MAX, f64::MIN), |(lo, hi), (_, t)| {
            (lo.min(*t), hi.max(*t))
        });
        let spread = max_time - min_time;
        if spread > f64::EPSILON {
            for (key, t) in &times {
                if let Some(costs) = node_costs.get_mut(key) {
                    costs.0 = neutral * (0.5 + (t - min_time) / spread);
                }
            }
        }

        let target_costs = |key: &str, prereq_strength: f64| -> CostVector {
            let (time, cognitive, interest) =
                node_costs.get(key).copied().unwrap_or((neutral, neutral, neutral * 0.5));
            self.finalize(CostVector::new(time, cognitive, prereq_strength, interest))
        };

        for ((from, to), support) in &prerequisites {
            let costs = target_costs(to, neutral / f64::from(*support));
            assembly.add_edge(from, to, EdgeKind::Prerequisite, costs, *support)?;
        }
        for ((from, to), support) in &related {
            let costs = target_costs(to, neutral * self.config.related_penalty);
            assembly.add_edge(from, to, EdgeKind::Related, costs, *support)?;
        }

        debug!(
            prerequisite_pairs = prerequisites.len(),
            related_pairs = related.len(),
            "signals aggregated"
        );

        let graph = assembly.with_warnings(output.warnings.clone()).finish();

        info!(
            graph_id = %graph.id(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            words = output.documents.iter().map(|doc| doc.word_count).sum::<usize>(),
            duration_ms = start_time.elapsed().as_millis(),
            "graph built"
        );

        Ok(graph)
    }

    /// Share of label words matching an interest keyword, lifted from a 0.5
    /// baseline.
    fn affinity(&self, node: &ConceptNode) -> f64 {
        if self.interest_words.is_empty() {
            return 0.5;
        }
        let words: Vec<&str> = node.key.split(' ').collect();
        let matched = words
            .iter()
            .filter(|w| self.interest_words.iter().any(|k| k.as_str() == **w))
            .count();
        0.5 + 0.5 * matched as f64 / words.len() as f64
    }

    fn finalize(&self, costs: CostVector) -> CostVector {
        CostVector::new(
            round(costs.time),
            round(costs.cognitive),
            round(costs.prereq_strength),
            round(costs.interest_penalty),
        )
        .floored(self.config.min_cost)
    }
}

/// Normalized endpoints of a signal, or `None` for a self-pair.
fn key_pair(a: &str, b: &str) -> Option<(String, String)> {
    let (ka, kb) = (normalize_label(a), normalize_label(b));
    (ka != kb).then_some((ka, kb))
}

/// Label complexity in `[0, 1]` from word count, mean word length and
/// technical characters.
fn label_complexity(label: &str) -> f64 {
    let words: Vec<&str> = label.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let letters: usize = words.iter().map(|w| w.chars().count()).sum();
    let mean_len = letters as f64 / words.len() as f64;

    let word_score = ((words.len() - 1) as f64 / 3.0).min(1.0);
    let length_score = ((mean_len - 3.0) / 9.0).clamp(0.0, 1.0);
    let technical = label.contains(TECHNICAL_CHARS) || label.chars().any(|c| c.is_ascii_digit());

    0.4 * word_score + 0.4 * length_score + if technical { 0.2 } else { 0.0 }
}

fn round(value: f64) -> f64 {
    (value * COST_PRECISION).round() / COST_PRECISION
}
