//! Embedding & vector indexing
//!
//! - `EmbeddingProvider` trait for abstraction over embedding backends
//! - `FastEmbedProvider` for local embedding (all-MiniLM-L6-v2, 384-dim)
//! - `VectorIndex` for exact nearest-neighbour search with a persisted format
mod provider;
mod vector_index;

pub use provider::{model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{normalize, Neighbor, VectorIndex, VectorIndexError};
