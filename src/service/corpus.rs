//! Loaded, read-only index generation

use crate::embedding::{Neighbor, VectorIndex, VectorIndexError};
use crate::error::{LectorError, Result};
use crate::storage::{Chunk, Generation, GenerationManifest, MetadataStore};
use std::sync::{Arc, PoisonError, RwLock};

/// A vector index and its metadata store, verified to line up 1:1.
///
/// Chunks stay resident for the life of the corpus; position `p` in the
/// vector index is `chunks()[p]`. Nothing here is mutated after load.
pub struct Corpus {
    index: VectorIndex,
    store: MetadataStore,
    chunks: Vec<Chunk>,
    folded: Vec<String>,
    manifest: Option<GenerationManifest>,
}

impl Corpus {
    /// Load a generation, refusing to serve on any dimension, normalisation
    /// or alignment disagreement
    pub fn open(generation: &Generation, expected_dimension: usize, normalized: bool) -> Result<Self> {
        let index_path = generation.index_path();
        let index = VectorIndex::load(&index_path, expected_dimension, normalized).map_err(
            |e| match e {
                VectorIndexError::IndexNotFound(path) => LectorError::IndexNotFound { path },
                VectorIndexError::InvalidDimension { expected, actual } => {
                    LectorError::DimensionMismatch { expected, actual }
                }
                VectorIndexError::NormalizationMismatch { stored, configured } => {
                    LectorError::InvalidConfigValue {
                        path: "index.normalize".to_string(),
                        message: format!(
                            "index was built with normalize={} but configuration says {}",
                            stored, configured
                        ),
                    }
                }
                VectorIndexError::Corrupt { path, reason } => {
                    LectorError::CorruptIndex { path, reason }
                }
                other => LectorError::VectorIndex(other),
            },
        )?;

        let db_path = generation.db_path();
        if !db_path.exists() {
            return Err(LectorError::IndexNotFound { path: db_path });
        }
        let store = MetadataStore::open(&db_path)?;

        let manifest = generation.manifest().ok();
        let corpus = Self::from_parts(index, store, manifest)?;

        tracing::info!(
            "Loaded index generation {}: {} chunks ({}D)",
            generation.id,
            corpus.len(),
            corpus.dimension()
        );

        Ok(corpus)
    }

    /// Assemble a corpus from an index and store already in hand
    pub fn from_parts(
        index: VectorIndex,
        store: MetadataStore,
        manifest: Option<GenerationManifest>,
    ) -> Result<Self> {
        store.check_alignment(index.len())?;

        let chunks = store.get_all()?;
        if chunks.len() != index.len() {
            return Err(LectorError::Alignment {
                index_len: index.len(),
                store_len: chunks.len(),
            });
        }
        let folded = chunks.iter().map(|c| c.text.to_lowercase()).collect();

        Ok(Self {
            index,
            store,
            chunks,
            folded,
            manifest,
        })
    }

    /// Nearest chunks to an already embedded query
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(&Chunk, f32)>> {
        let neighbors = self.index.search(query, k).map_err(|e| match e {
            VectorIndexError::InvalidDimension { expected, actual } => {
                LectorError::DimensionMismatch { expected, actual }
            }
            other => LectorError::VectorIndex(other),
        })?;

        neighbors
            .into_iter()
            .map(|Neighbor { position, distance }| {
                self.chunks
                    .get(position)
                    .map(|chunk| (chunk, distance))
                    .ok_or(LectorError::Alignment {
                        index_len: self.index.len(),
                        store_len: self.chunks.len(),
                    })
            })
            .collect()
    }

    /// Chunk at a vector index position
    pub fn chunk_at(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// All chunks in corpus (insertion) order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Lowercased chunk texts, parallel to `chunks()`
    pub fn folded_texts(&self) -> &[String] {
        &self.folded
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn manifest(&self) -> Option<&GenerationManifest> {
        self.manifest.as_ref()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Shared pointer to the corpus currently being served.
///
/// Readers clone the inner `Arc` and work on that snapshot without holding
/// the lock; a rebuild swaps in a fully loaded corpus in one step.
pub struct CorpusHandle {
    current: RwLock<Arc<Corpus>>,
}

impl CorpusHandle {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// Snapshot of the live corpus
    pub fn current(&self) -> Arc<Corpus> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the live corpus, returning the previous one
    pub fn swap(&self, corpus: Corpus) -> Arc<Corpus> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(corpus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewChunk;
    use tempfile::TempDir;

    fn build_corpus(temp: &TempDir, name: &str, texts: &[&str]) -> Corpus {
        let store = MetadataStore::open(&temp.path().join(format!("{}.sqlite", name))).unwrap();
        let mut index = VectorIndex::new(2, false);

        let chunks: Vec<NewChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| NewChunk {
                source_id: name.to_string(),
                chunk_index: i,
                text: text.to_string(),
                attributes: None,
            })
            .collect();
        let vectors: Vec<Vec<f32>> = (0..texts.len()).map(|i| vec![i as f32, 0.0]).collect();

        store
            .put_document(&chunks, 0, || {
                index.insert(&vectors)?;
                Ok(())
            })
            .unwrap();

        Corpus::from_parts(index, store, None).unwrap()
    }

    #[test]
    fn test_positions_map_to_chunks() {
        let temp = TempDir::new().unwrap();
        let corpus = build_corpus(&temp, "doc", &["zero", "one", "two"]);

        let hits = corpus.nearest(&[2.1, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|(c, _)| c.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "one", "zero"]);

        for position in 0..corpus.len() {
            let chunk = corpus.chunk_at(position).unwrap();
            let stored = corpus.store().get_by_position(position).unwrap().unwrap();
            assert_eq!(chunk.id, stored.id);
            assert_eq!(chunk.position, position);
        }
    }

    #[test]
    fn test_misaligned_parts_rejected() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::open(&temp.path().join("m.sqlite")).unwrap();
        store
            .put(
                &NewChunk {
                    source_id: "a".to_string(),
                    chunk_index: 0,
                    text: "orphan".to_string(),
                    attributes: None,
                },
                0,
            )
            .unwrap();

        let index = VectorIndex::new(2, false);
        assert!(matches!(
            Corpus::from_parts(index, store, None),
            Err(LectorError::Alignment {
                index_len: 0,
                store_len: 1
            })
        ));
    }

    #[test]
    fn test_handle_swap_keeps_old_snapshots_valid() {
        let temp = TempDir::new().unwrap();
        let handle = CorpusHandle::new(build_corpus(&temp, "old", &["old text"]));

        let snapshot = handle.current();
        let previous = handle.swap(build_corpus(&temp, "new", &["new a", "new b"]));

        assert!(Arc::ptr_eq(&snapshot, &previous));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(handle.current().len(), 2);
    }
}
