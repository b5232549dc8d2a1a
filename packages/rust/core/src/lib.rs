//! Service orchestration for the learning path backend.
//!
//! This crate ties together ingestion, graph building, pathfinding, and
//! learner tracking into the operations the HTTP surface and CLI expose.

pub mod progress;
pub mod service;

pub use progress::{ProgressReporter, SilentProgress};
pub use service::{BuildOutcome, GraphSummary, LearningPathService, PathRequest};
