//! Document ingestion: fetch URLs, extract concepts and ordering signals.
//!
//! This crate provides:
//! - [`Ingestor`]: concurrent, bounded, timeout-guarded document fetcher
//! - [`extract`]: HTML to ordered text blocks to concept mentions and signals
//! - [`ContentCache`]: in-process cache of extracted documents

mod cache;
pub mod engine;
pub mod extract;

pub use cache::ContentCache;
pub use engine::Ingestor;
pub use extract::{ExtractOptions, extract_document};

use learnpath_shared::IngestWarning;

/// A concept label as it appeared in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptMention {
    /// Label in its original casing.
    pub label: String,
    /// Words in the text blocks that mention this concept.
    pub context_words: usize,
}

/// A relation between two concepts observed in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `before` is introduced ahead of `after` in the document.
    Precedes { before: String, after: String },
    /// Both concepts are mentioned in the same text block.
    CoOccurs { a: String, b: String },
}

/// Everything extracted from one fetched URL.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    /// URL the document was served from, after redirects.
    pub url: String,
    /// SHA-256 of the raw body.
    pub content_hash: String,
    /// Words in the main content region.
    pub word_count: usize,
    /// Concepts in order of first appearance.
    pub concepts: Vec<ConceptMention>,
    pub signals: Vec<Signal>,
}

/// Result of ingesting a batch of URLs.
#[derive(Debug, Clone, Default)]
pub struct IngestOutput {
    /// Successfully extracted documents, in input order.
    pub documents: Vec<IngestedDocument>,
    /// URLs that were skipped, in input order.
    pub warnings: Vec<IngestWarning>,
}
