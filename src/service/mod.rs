//! Long-lived serving state and the question answering flow

mod corpus;

pub use corpus::{Corpus, CorpusHandle};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{LectorError, Result};
use crate::generation::{build_prompt, AnswerGenerator, GenerationError, APOLOGY_ANSWER};
use crate::retrieval::{AssembledContext, ContextAssembler, HybridRetriever, SourceCitation};
use crate::storage::{Chunk, StorageManager};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Process-wide state, built once at startup and passed to whoever needs it
pub struct ServiceContext {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    storage: StorageManager,
    corpus: Arc<CorpusHandle>,
}

impl ServiceContext {
    /// Load the current generation; fails if nothing was built yet or the
    /// index disagrees with the provider or configuration
    pub fn open(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let storage = StorageManager::new(config.data_dir()?)?;
        let generation = storage.require_current()?;
        let corpus = Corpus::open(&generation, provider.dimension(), config.index.normalize)?;

        Ok(Self {
            config,
            provider,
            storage,
            corpus: Arc::new(CorpusHandle::new(corpus)),
        })
    }

    /// Load whatever `CURRENT` points at now and swap it in
    pub fn reload(&self) -> Result<Uuid> {
        let generation = self.storage.require_current()?;
        let corpus = Corpus::open(
            &generation,
            self.provider.dimension(),
            self.config.index.normalize,
        )?;
        self.corpus.swap(corpus);

        tracing::info!("Swapped in index generation {}", generation.id);
        Ok(generation.id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn corpus(&self) -> Arc<Corpus> {
        self.corpus.current()
    }

    pub fn retriever(&self) -> HybridRetriever {
        HybridRetriever::new(self.provider.clone(), self.corpus.clone())
    }

    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::from_config(&self.config.context)
    }
}

/// Answer plus the documents it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    /// Set when every generator failed and `answer` is the fixed apology
    pub degraded: bool,
}

/// Result of asking a question
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AskOutcome {
    Answered(AskResponse),
    NoRelevantContent,
}

/// Retrieve, assemble, generate
pub struct QaService {
    retriever: Arc<HybridRetriever>,
    assembler: ContextAssembler,
    generator: Arc<dyn AnswerGenerator>,
    retrieval: RetrievalConfig,
}

impl QaService {
    pub fn new(context: &ServiceContext, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever: Arc::new(context.retriever()),
            assembler: context.assembler(),
            generator,
            retrieval: context.config().retrieval.clone(),
        }
    }

    /// Answer `question` from the corpus.
    ///
    /// A blank question or one with no hits is `NoRelevantContent`. A failed
    /// generation still returns the sources, with the apology as the answer.
    pub async fn ask(&self, question: &str) -> Result<AskOutcome> {
        let question = question.trim();
        let Some(assembled) = self.context_for(question).await? else {
            return Ok(AskOutcome::NoRelevantContent);
        };

        let prompt = build_prompt(question, &assembled.context);
        let (answer, degraded) = match self.generate(prompt).await {
            Ok(answer) => (answer, false),
            Err(e) => {
                tracing::warn!("Answer generation failed, returning degraded answer: {}", e);
                (APOLOGY_ANSWER.to_string(), true)
            }
        };

        Ok(AskOutcome::Answered(AskResponse {
            answer,
            sources: assembled.sources,
            degraded,
        }))
    }

    /// Retrieved context for `question`, or `None` when nothing matched
    pub async fn context_for(&self, question: &str) -> Result<Option<AssembledContext>> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }

        let chunks = self.retrieve(question).await?;
        if chunks.is_empty() {
            tracing::info!("No relevant content for question");
            return Ok(None);
        }

        Ok(Some(self.assembler.assemble(&chunks)))
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        let retriever = self.retriever.clone();
        let query = question.to_string();
        let (top_k_vector, top_k_keyword) =
            (self.retrieval.top_k_vector, self.retrieval.top_k_keyword);

        let task = tokio::task::spawn_blocking(move || {
            retriever.retrieve(&query, top_k_vector, top_k_keyword)
        });

        let joined = match self.retrieval.timeout_ms {
            Some(after_ms) => tokio::time::timeout(Duration::from_millis(after_ms), task)
                .await
                .map_err(|_| LectorError::RetrievalTimeout { after_ms })?,
            None => task.await,
        };

        joined.map_err(|e| LectorError::Other(anyhow::anyhow!("Retrieval task failed: {}", e)))?
    }

    async fn generate(&self, prompt: String) -> std::result::Result<String, GenerationError> {
        let generator = self.generator.clone();
        let backend = generator.name().to_string();

        tokio::task::spawn_blocking(move || generator.generate(&prompt))
            .await
            .map_err(|e| GenerationError::Failed {
                backend,
                status: "task aborted".to_string(),
                stderr: e.to_string(),
            })?
    }
}
