//! Hybrid retrieval & context assembly
//!
//! Combines exact vector search with case-insensitive keyword matching,
//! de-duplicates by chunk id, then groups the survivors per source into a
//! single context string with citations.

mod citation;
mod context;
mod deduplication;
mod hybrid;
mod keyword;

pub use citation::{
    fallback_url, SourceCitation, UrlPolicy, UrlResolver, DEFAULT_FALLBACK_URL_TEMPLATE,
    DEFAULT_URL_ATTRIBUTE,
};
pub use context::{AssembledContext, ContextAssembler, ContextMode, DEFAULT_SEPARATOR};
pub use deduplication::deduplicate_hits;
pub use hybrid::HybridRetriever;
pub use keyword::substring_matches;

use crate::storage::Chunk;
use serde::{Deserialize, Serialize};

/// Default number of vector hits per query
pub const DEFAULT_TOP_K_VECTOR: usize = 5;

/// Default number of keyword hits per query
pub const DEFAULT_TOP_K_KEYWORD: usize = 5;

/// Search query with per-path limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Maximum number of vector hits
    pub top_k_vector: usize,

    /// Maximum number of keyword hits
    pub top_k_keyword: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k_vector: DEFAULT_TOP_K_VECTOR,
            top_k_keyword: DEFAULT_TOP_K_KEYWORD,
        }
    }

    pub fn with_limits(mut self, top_k_vector: usize, top_k_keyword: usize) -> Self {
        self.top_k_vector = top_k_vector;
        self.top_k_keyword = top_k_keyword;
        self
    }
}

/// Which retrieval path produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitOrigin {
    /// Nearest-neighbour hit with its squared L2 distance
    Vector { distance: f32 },
    /// Substring match
    Keyword,
}

/// A retrieved chunk and where it came from
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub origin: HitOrigin,
}
