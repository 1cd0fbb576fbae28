//! Full pipeline against the real FastEmbed model
//!
//! Requires model download (~90MB) - run with: cargo test -- --ignored

mod common;

use common::{config_for, write_corpus};
use lector::chunking::Chunker;
use lector::embedding::{EmbeddingProvider, FastEmbedProvider};
use lector::indexing::{DirectorySource, IndexBuilder};
use lector::service::ServiceContext;
use lector::storage::StorageManager;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
#[ignore] // Requires model download
fn test_semantic_retrieval_with_real_model() {
    let docs = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_corpus(
        docs.path(),
        &[
            (
                "physics",
                "Quantum entanglement links the states of particles across distance.",
                None,
            ),
            (
                "cooking",
                "Simmer the tomato sauce slowly with garlic and basil.",
                None,
            ),
            (
                "biology",
                "Mitochondria produce most of the chemical energy in cells.",
                None,
            ),
        ],
    );

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::with_default_model().expect("model init"));
    assert_eq!(provider.dimension(), 384);

    let storage = StorageManager::new(data.path().to_path_buf()).unwrap();
    let (_, report) = IndexBuilder::new(provider.clone(), Chunker::default(), false)
        .build(&DirectorySource::new(docs.path()), &storage)
        .unwrap();
    assert_eq!(report.chunks_indexed, 3);

    let context = ServiceContext::open(config_for(data.path()), provider).unwrap();
    let chunks = context
        .retriever()
        .retrieve("How do particles stay correlated?", 1, 0)
        .unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source_id, "physics");
}
