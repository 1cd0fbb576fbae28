//! Shared fixtures for integration tests
#![allow(dead_code)]

use lector::config::Config;
use lector::embedding::{EmbeddingError, EmbeddingProvider};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic bag-of-words embedder: each word bumps one hashed bucket
pub struct HashingEmbedder {
    dimension: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before every embedding call
    pub fn slow(dimension: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(dimension)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bucket = u16::from_le_bytes([hash.as_bytes()[0], hash.as_bytes()[1]]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        Ok(self.vectorize(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

/// Write `<id>.txt` (and `<id>.json` when attributes are given) files
pub fn write_corpus(dir: &Path, docs: &[(&str, &str, Option<&str>)]) {
    for (id, text, attributes) in docs {
        std::fs::write(dir.join(format!("{}.txt", id)), text).unwrap();
        if let Some(attributes) = attributes {
            std::fs::write(dir.join(format!("{}.json", id)), attributes).unwrap();
        }
    }
}

/// Default configuration rooted at `data_dir`
pub fn config_for(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config
}
