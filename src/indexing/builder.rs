//! Batch index builder
//!
//! Single writer: reads documents from a source, chunks them, embeds the
//! chunks in batches and writes each document's vectors and metadata as one
//! paired unit into a fresh generation. The generation is activated only
//! after the vector file and manifest are on disk.

use crate::chunking::Chunker;
use crate::embedding::{EmbeddingError, EmbeddingProvider, VectorIndex};
use crate::error::{LectorError, Result};
use crate::indexing::source::{DocumentSource, RecordError, SourceDocument};
use crate::storage::{Generation, GenerationManifest, MetadataStore, NewChunk, StorageManager};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of chunks embedded per provider call
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Document left out of the build and why
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub source_id: String,
    pub reason: String,
}

/// Result of one build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation_id: Uuid,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub skipped: Vec<SkippedDocument>,
    pub duration_ms: u64,
}

impl BuildReport {
    pub fn documents_skipped(&self) -> usize {
        self.skipped.len()
    }
}

/// What happened to one document
enum DocumentOutcome {
    Indexed(usize),
    Skipped(String),
}

/// Builds a new index generation from a document source
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    normalized: bool,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, chunker: Chunker, normalized: bool) -> Self {
        Self {
            provider,
            chunker,
            normalized,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build and activate a new generation.
    ///
    /// Unreadable documents and embedding failures are logged, skipped and
    /// listed in the report. Dimension disagreements and storage failures
    /// abort the build; the half-written generation is removed and never
    /// activated.
    pub fn build(
        &self,
        source: &dyn DocumentSource,
        storage: &StorageManager,
    ) -> Result<(Generation, BuildReport)> {
        let generation = storage.create_generation()?;

        match self.build_into(&generation, source, storage) {
            Ok(report) => Ok((generation, report)),
            Err(e) => {
                warn!("Build of generation {} failed: {}", generation.id, e);
                if let Err(cleanup) = storage.discard(&generation) {
                    warn!("Could not remove generation {}: {}", generation.id, cleanup);
                }
                Err(e)
            }
        }
    }

    fn build_into(
        &self,
        generation: &Generation,
        source: &dyn DocumentSource,
        storage: &StorageManager,
    ) -> Result<BuildReport> {
        let start = Instant::now();

        info!(
            "Building generation {} from {} (chunk size {}, overlap {})",
            generation.id,
            source.describe(),
            self.chunker.size(),
            self.chunker.overlap()
        );

        let store = MetadataStore::open(&generation.db_path())?;
        let mut index = VectorIndex::new(self.provider.dimension(), self.normalized);

        let mut documents_indexed = 0;
        let mut skipped = Vec::new();

        for record in source.documents()? {
            let document = match record {
                Ok(document) => document,
                Err(RecordError { source_id, reason }) => {
                    warn!("Skipping document {}: {}", source_id, reason);
                    skipped.push(SkippedDocument { source_id, reason });
                    continue;
                }
            };

            match self.index_document(&document, &store, &mut index)? {
                DocumentOutcome::Indexed(count) => {
                    debug!("Indexed {}: {} chunks", document.source_id, count);
                    documents_indexed += 1;
                }
                DocumentOutcome::Skipped(reason) => {
                    warn!("Skipping document {}: {}", document.source_id, reason);
                    skipped.push(SkippedDocument {
                        source_id: document.source_id,
                        reason,
                    });
                }
            }
        }

        index.persist(&generation.index_path())?;
        store.check_alignment(index.len())?;

        let manifest = GenerationManifest {
            id: generation.id,
            created_at: Utc::now(),
            model: self.provider.model_name().to_string(),
            dimension: index.dimension(),
            normalized: index.is_normalized(),
            chunk_size: self.chunker.size(),
            chunk_overlap: self.chunker.overlap(),
            document_count: documents_indexed,
            chunk_count: index.len(),
        };
        generation.write_manifest(&manifest)?;
        storage.activate(generation)?;

        let report = BuildReport {
            generation_id: generation.id,
            documents_indexed,
            chunks_indexed: index.len(),
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Build complete: {} documents, {} chunks, {} skipped, {}ms",
            report.documents_indexed,
            report.chunks_indexed,
            report.documents_skipped(),
            report.duration_ms
        );

        Ok(report)
    }

    /// Chunk, embed and write one document; `Err` aborts the build
    fn index_document(
        &self,
        document: &SourceDocument,
        store: &MetadataStore,
        index: &mut VectorIndex,
    ) -> Result<DocumentOutcome> {
        let texts = self.chunker.split(&document.text);
        if texts.is_empty() {
            return Ok(DocumentOutcome::Skipped("no text".to_string()));
        }

        let embeddings = match self.embed_all(&texts) {
            Ok(embeddings) => embeddings,
            // The model disagrees with the index; every document would fail
            Err(LectorError::Embedding(EmbeddingError::DimensionMismatch { expected, actual })) => {
                return Err(LectorError::DimensionMismatch { expected, actual });
            }
            Err(e) => {
                return Ok(DocumentOutcome::Skipped(format!("embedding failed: {}", e)));
            }
        };

        if let Some(bad) = embeddings.iter().find(|e| e.len() != index.dimension()) {
            return Err(LectorError::DimensionMismatch {
                expected: index.dimension(),
                actual: bad.len(),
            });
        }

        let attributes = if document.attributes.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&document.attributes).map_err(|e| LectorError::Json {
                    source: e,
                    context: format!("Failed to serialize attributes of {}", document.source_id),
                })?,
            )
        };

        let chunks: Vec<NewChunk> = texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| NewChunk {
                source_id: document.source_id.clone(),
                chunk_index,
                text,
                attributes: attributes.clone(),
            })
            .collect();

        let first_position = index.len();
        let written = store.put_document(&chunks, first_position, || {
            index.insert(&embeddings)?;
            Ok(())
        });

        if let Err(e) = written {
            // Metadata rolled back; drop any vectors that made it in
            index.truncate(first_position);
            return Err(e);
        }

        Ok(DocumentOutcome::Indexed(chunks.len()))
    }

    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings = self.provider.embed_batch(batch)?;
            if batch_embeddings.len() != batch.len() {
                return Err(LectorError::Config(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    batch_embeddings.len()
                )));
            }
            embeddings.extend(batch_embeddings);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::DirectorySource;
    use crate::service::Corpus;
    use tempfile::TempDir;

    /// Fails on any text containing "poison"
    struct PickyEmbedder {
        dimension: usize,
    }

    impl EmbeddingProvider for PickyEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            if text.contains("poison") {
                return Err(EmbeddingError::GenerationError("poisoned".to_string()));
            }
            let mut v = vec![0.0; self.dimension];
            v[0] = text.len() as f32;
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "picky"
        }
    }

    /// Claims one dimension, produces another
    struct LyingEmbedder;

    impl EmbeddingProvider for LyingEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 2.0, 3.0])
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "lying"
        }
    }

    /// Reports its own dimension check failing, as `FastEmbedProvider` does
    struct MismatchedModel;

    impl EmbeddingProvider for MismatchedModel {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 8,
            })
        }

        fn embed_batch(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 8,
            })
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "mismatched"
        }
    }

    fn generation_dirs(storage: &StorageManager) -> usize {
        std::fs::read_dir(storage.generations_dir()).unwrap().count()
    }

    fn write_docs(dir: &std::path::Path) {
        std::fs::write(dir.join("a.txt"), "x".repeat(2500)).unwrap();
        std::fs::write(dir.join("b.txt"), "poison pill").unwrap();
        std::fs::write(dir.join("c.txt"), "short").unwrap();
        std::fs::write(dir.join("d.txt"), "").unwrap();
        std::fs::write(dir.join("c.json"), r#"{"title": "C"}"#).unwrap();
    }

    #[test]
    fn test_build_skips_failed_documents() {
        let docs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_docs(docs.path());

        let storage = StorageManager::new(data.path().to_path_buf()).unwrap();
        let builder = IndexBuilder::new(
            Arc::new(PickyEmbedder { dimension: 4 }),
            Chunker::new(1000, 200).unwrap(),
            false,
        )
        .with_batch_size(2);

        let source = DirectorySource::new(docs.path());
        let (generation, report) = builder.build(&source, &storage).unwrap();

        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.chunks_indexed, 4);
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(skipped, vec!["b", "d"]);
        assert!(report.skipped[0].reason.contains("poisoned"));
        assert_eq!(report.skipped[1].reason, "no text");

        assert_eq!(storage.require_current().unwrap(), generation);
        let manifest = generation.manifest().unwrap();
        assert_eq!(manifest.chunk_count, 4);
        assert_eq!(manifest.model, "picky");

        let corpus = Corpus::open(&generation, 4, false).unwrap();
        assert_eq!(corpus.len(), 4);
        let last = corpus.chunk_at(3).unwrap();
        assert_eq!(last.source_id, "c");
        assert_eq!(last.attribute_str("title"), Some("C"));
        let a_indices: Vec<usize> = corpus
            .chunks()
            .iter()
            .filter(|c| c.source_id == "a")
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(a_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let docs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        std::fs::write(docs.path().join("a.txt"), "text").unwrap();

        let storage = StorageManager::new(data.path().to_path_buf()).unwrap();
        let builder = IndexBuilder::new(Arc::new(LyingEmbedder), Chunker::default(), false);

        let result = builder.build(&DirectorySource::new(docs.path()), &storage);
        assert!(matches!(
            result,
            Err(LectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(storage.current_generation().unwrap().is_none());
    }

    #[test]
    fn test_provider_dimension_error_is_fatal() {
        let docs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        std::fs::write(docs.path().join("a.txt"), "text").unwrap();

        let storage = StorageManager::new(data.path().to_path_buf()).unwrap();
        let builder = IndexBuilder::new(Arc::new(MismatchedModel), Chunker::default(), false);

        let result = builder.build(&DirectorySource::new(docs.path()), &storage);
        assert!(matches!(
            result,
            Err(LectorError::DimensionMismatch {
                expected: 4,
                actual: 8
            })
        ));
        assert!(storage.current_generation().unwrap().is_none());
    }

    #[test]
    fn test_failed_builds_leave_no_directories() {
        let docs = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        std::fs::write(docs.path().join("a.txt"), "text").unwrap();
        let source = DirectorySource::new(docs.path());

        let storage = StorageManager::new(data.path().to_path_buf()).unwrap();
        let failing = IndexBuilder::new(Arc::new(LyingEmbedder), Chunker::default(), false);
        for _ in 0..3 {
            assert!(failing.build(&source, &storage).is_err());
        }
        assert_eq!(generation_dirs(&storage), 0);

        let working = IndexBuilder::new(
            Arc::new(PickyEmbedder { dimension: 4 }),
            Chunker::default(),
            false,
        );
        let (generation, _) = working.build(&source, &storage).unwrap();
        storage.prune(1).unwrap();

        assert_eq!(generation_dirs(&storage), 1);
        assert_eq!(storage.require_current().unwrap(), generation);
    }
}
