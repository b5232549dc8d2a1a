//! Concept graph construction and multi-criteria pathfinding.
//!
//! - [`model`]: the immutable [`ConceptGraph`] and its assembly helper
//! - [`builder`]: turns ingestion output into a graph with cost vectors
//! - [`pathfinder`]: weighted shortest path with deterministic tie-breaks

pub mod builder;
pub mod model;
pub mod pathfinder;

pub use builder::GraphBuilder;
pub use model::{
    ConceptEdge, ConceptGraph, ConceptGraphBuilder, ConceptNode, CostVector, EdgeKind,
    EdgeSnapshot,
};
pub use pathfinder::{LearningPath, PathOptions, find_path};
