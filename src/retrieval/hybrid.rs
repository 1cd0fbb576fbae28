//! Hybrid search combining vector and keyword retrieval

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::retrieval::keyword::substring_matches;
use crate::retrieval::{deduplicate_hits, HitOrigin, RetrievalHit, SearchQuery};
use crate::service::CorpusHandle;
use crate::storage::Chunk;
use std::sync::Arc;

/// Hybrid retriever over the live corpus
///
/// Each call works on one corpus snapshot, so a concurrent swap never mixes
/// two generations inside a single result list.
pub struct HybridRetriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    corpus: Arc<CorpusHandle>,
}

impl HybridRetriever {
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>, corpus: Arc<CorpusHandle>) -> Self {
        Self {
            embedding_provider,
            corpus,
        }
    }

    /// Vector hits then keyword hits, de-duplicated, as plain chunks
    pub fn retrieve(
        &self,
        query: &str,
        top_k_vector: usize,
        top_k_keyword: usize,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_hits(query, top_k_vector, top_k_keyword)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalHit>> {
        self.retrieve_hits(&query.text, query.top_k_vector, query.top_k_keyword)
    }

    /// Like `retrieve`, keeping which path found each chunk
    pub fn retrieve_hits(
        &self,
        query: &str,
        top_k_vector: usize,
        top_k_keyword: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let corpus = self.corpus.current();
        if corpus.is_empty() {
            tracing::debug!("Corpus is empty, nothing to retrieve");
            return Ok(Vec::new());
        }

        // Step 1: Semantic search
        let mut hits = Vec::with_capacity(top_k_vector + top_k_keyword);
        if top_k_vector > 0 {
            let embedding = self.embedding_provider.embed(query)?;
            for (chunk, distance) in corpus.nearest(&embedding, top_k_vector)? {
                hits.push(RetrievalHit {
                    chunk: chunk.clone(),
                    origin: HitOrigin::Vector { distance },
                });
            }
        }
        let vector_count = hits.len();

        // Step 2: Keyword search in corpus order
        for position in substring_matches(corpus.folded_texts(), query, top_k_keyword) {
            if let Some(chunk) = corpus.chunk_at(position) {
                hits.push(RetrievalHit {
                    chunk: chunk.clone(),
                    origin: HitOrigin::Keyword,
                });
            }
        }
        let keyword_count = hits.len() - vector_count;

        // Step 3: Deduplicate, vector hits first
        let hits = deduplicate_hits(hits);

        tracing::debug!(
            "Retrieved {} chunks ({} vector, {} keyword before dedup)",
            hits.len(),
            vector_count,
            keyword_count
        );

        Ok(hits)
    }
}
