//! Per-source context assembly

use crate::config::ContextConfig;
use crate::retrieval::citation::{SourceCitation, UrlResolver};
use crate::storage::Chunk;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};

/// Separator placed between source groups unless configured otherwise
pub const DEFAULT_SEPARATOR: &str = "\n\n---- SOURCE SEPARATOR ----\n\n";

/// How much of each source goes into the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Every retrieved chunk of a source, joined by newlines
    #[default]
    Merged,
    /// Only the first retrieved chunk of each source
    FirstChunk,
}

/// Context payload plus the documents it was drawn from
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub context: String,
    pub sources: Vec<SourceCitation>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Groups retrieved chunks by source and renders them into one context string
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    mode: ContextMode,
    separator: String,
    urls: UrlResolver,
    max_context_chars: Option<usize>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            mode: ContextMode::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            urls: UrlResolver::default(),
            max_context_chars: None,
        }
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            mode: config.mode,
            separator: config.separator.clone(),
            urls: UrlResolver::new(
                config.url_policy,
                &config.url_attribute,
                &config.fallback_url_template,
            ),
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn with_mode(mut self, mode: ContextMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_url_resolver(mut self, urls: UrlResolver) -> Self {
        self.urls = urls;
        self
    }

    /// Cap the context length; whole trailing groups are dropped to fit
    pub fn with_max_context_chars(mut self, max: Option<usize>) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Build the context from chunks in retrieval order.
    ///
    /// Groups appear in order of each source's first chunk, and chunks keep
    /// their retrieval order within a group. The first group is always kept,
    /// even when it alone exceeds the length cap.
    pub fn assemble(&self, chunks: &[Chunk]) -> AssembledContext {
        let groups = group_by_source(chunks);

        let separator_chars = self.separator.chars().count();
        let mut blocks: Vec<String> = Vec::with_capacity(groups.len());
        let mut sources = Vec::with_capacity(groups.len());
        let mut total_chars = 0usize;

        for group in &groups {
            let block = match self.mode {
                ContextMode::Merged => group
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                ContextMode::FirstChunk => group[0].text.clone(),
            };

            let block_chars = block.chars().count();
            let added = if blocks.is_empty() {
                block_chars
            } else {
                separator_chars + block_chars
            };

            if let Some(max) = self.max_context_chars {
                if !blocks.is_empty() && total_chars + added > max {
                    tracing::debug!(
                        "Context cap of {} chars reached, dropping {} trailing source(s)",
                        max,
                        groups.len() - blocks.len()
                    );
                    break;
                }
            }

            total_chars += added;
            sources.push(self.urls.cite(group[0]));
            blocks.push(block);
        }

        AssembledContext {
            context: blocks.join(&self.separator),
            sources,
        }
    }
}

/// Stable grouping: first-seen source order, retrieval order inside a group
fn group_by_source(chunks: &[Chunk]) -> Vec<Vec<&Chunk>> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&Chunk>> = Vec::new();

    for chunk in chunks {
        match slots.get(chunk.source_id.as_str()) {
            Some(&slot) => groups[slot].push(chunk),
            None => {
                slots.insert(chunk.source_id.as_str(), groups.len());
                groups.push(vec![chunk]);
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::citation::UrlPolicy;

    fn chunk(id: i64, source: &str, text: &str) -> Chunk {
        Chunk::new(id, id as usize, source, 0, text, None)
    }

    fn interleaved() -> Vec<Chunk> {
        vec![
            chunk(1, "A", "a1"),
            chunk(2, "B", "b1"),
            chunk(3, "A", "a2"),
            chunk(4, "C", "c1"),
        ]
    }

    #[test]
    fn test_grouping_is_stable() {
        let assembled = ContextAssembler::new().assemble(&interleaved());

        let ids: Vec<&str> = assembled
            .sources
            .iter()
            .map(|s| s.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(
            assembled.context,
            format!("a1\na2{sep}b1{sep}c1", sep = DEFAULT_SEPARATOR)
        );
    }

    #[test]
    fn test_first_chunk_mode() {
        let assembled = ContextAssembler::new()
            .with_mode(ContextMode::FirstChunk)
            .with_separator("\n\n")
            .assemble(&interleaved());

        assert_eq!(assembled.context, "a1\n\nb1\n\nc1");
        assert_eq!(assembled.sources.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        let assembled = ContextAssembler::new().assemble(&[]);
        assert!(assembled.is_empty());
        assert_eq!(assembled.context, "");
    }

    #[test]
    fn test_citations_use_url_policy() {
        let chunks = vec![Chunk::new(
            1,
            0,
            "2401.1",
            0,
            "text",
            Some(r#"{"pdf_url": "https://stored.example/x.pdf"}"#.to_string()),
        )];

        let preferred = ContextAssembler::new().assemble(&chunks);
        assert_eq!(preferred.sources[0].url, "https://stored.example/x.pdf");

        let derived = ContextAssembler::new()
            .with_url_resolver(UrlResolver::new(
                UrlPolicy::AlwaysDerive,
                "pdf_url",
                "https://arxiv.org/pdf/{source_id}.pdf",
            ))
            .assemble(&chunks);
        assert_eq!(derived.sources[0].url, "https://arxiv.org/pdf/2401.1.pdf");
    }

    #[test]
    fn test_max_context_chars_drops_trailing_groups() {
        let chunks = vec![
            chunk(1, "A", "aaaaaaaaaa"),
            chunk(2, "B", "bbbbbbbbbb"),
            chunk(3, "C", "cccccccccc"),
        ];

        let assembled = ContextAssembler::new()
            .with_separator("|")
            .with_max_context_chars(Some(21))
            .assemble(&chunks);
        assert_eq!(assembled.context, "aaaaaaaaaa|bbbbbbbbbb");
        assert_eq!(assembled.sources.len(), 2);

        let first_only = ContextAssembler::new()
            .with_max_context_chars(Some(3))
            .assemble(&chunks);
        assert_eq!(first_only.context, "aaaaaaaaaa");
        assert_eq!(first_only.sources.len(), 1);
    }
}
