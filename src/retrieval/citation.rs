//! Source citations attached to assembled context

use crate::storage::{Attributes, Chunk};
use serde::{Deserialize, Serialize};

/// Default stored attribute holding a document URL
pub const DEFAULT_URL_ATTRIBUTE: &str = "pdf_url";

/// Default template for derived URLs; `{source_id}` is substituted
pub const DEFAULT_FALLBACK_URL_TEMPLATE: &str = "https://arxiv.org/pdf/{source_id}.pdf";

/// How a citation's URL is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPolicy {
    /// Stored URL attribute when present and non-empty, otherwise derived
    #[default]
    PreferStored,
    /// Always derive from the source id
    AlwaysDerive,
}

/// One cited document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Owning document id
    pub source_id: String,

    /// Where the document can be read
    pub url: String,

    /// Document attributes as stored with its first retrieved chunk
    pub attributes: Attributes,
}

/// Resolves citation URLs from chunk attributes
#[derive(Debug, Clone)]
pub struct UrlResolver {
    policy: UrlPolicy,
    attribute: String,
    template: String,
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new(
            UrlPolicy::default(),
            DEFAULT_URL_ATTRIBUTE,
            DEFAULT_FALLBACK_URL_TEMPLATE,
        )
    }
}

impl UrlResolver {
    pub fn new(policy: UrlPolicy, attribute: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            policy,
            attribute: attribute.into(),
            template: template.into(),
        }
    }

    /// URL for the document that owns `chunk`
    pub fn resolve(&self, chunk: &Chunk) -> String {
        match self.policy {
            UrlPolicy::PreferStored => chunk
                .attribute_str(&self.attribute)
                .map(str::to_string)
                .unwrap_or_else(|| fallback_url(&self.template, &chunk.source_id)),
            UrlPolicy::AlwaysDerive => fallback_url(&self.template, &chunk.source_id),
        }
    }

    /// Citation for the document that owns `chunk`
    pub fn cite(&self, chunk: &Chunk) -> SourceCitation {
        SourceCitation {
            source_id: chunk.source_id.clone(),
            url: self.resolve(chunk),
            attributes: chunk.attributes().clone(),
        }
    }
}

/// Derive a URL from a source id
pub fn fallback_url(template: &str, source_id: &str) -> String {
    template.replace("{source_id}", source_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(attributes: Option<&str>) -> Chunk {
        Chunk::new(
            1,
            0,
            "2401.12345v1",
            0,
            "text",
            attributes.map(str::to_string),
        )
    }

    #[test]
    fn test_fallback_url() {
        assert_eq!(
            fallback_url(DEFAULT_FALLBACK_URL_TEMPLATE, "2401.12345v1"),
            "https://arxiv.org/pdf/2401.12345v1.pdf"
        );
    }

    #[test]
    fn test_prefer_stored() {
        let resolver = UrlResolver::default();

        let stored = chunk_with(Some(r#"{"pdf_url": "https://example.org/paper.pdf"}"#));
        assert_eq!(resolver.resolve(&stored), "https://example.org/paper.pdf");

        let empty = chunk_with(Some(r#"{"pdf_url": ""}"#));
        assert_eq!(
            resolver.resolve(&empty),
            "https://arxiv.org/pdf/2401.12345v1.pdf"
        );

        let missing = chunk_with(None);
        assert_eq!(
            resolver.resolve(&missing),
            "https://arxiv.org/pdf/2401.12345v1.pdf"
        );
    }

    #[test]
    fn test_always_derive_ignores_stored() {
        let resolver = UrlResolver::new(
            UrlPolicy::AlwaysDerive,
            DEFAULT_URL_ATTRIBUTE,
            "https://papers.example/{source_id}",
        );
        let stored = chunk_with(Some(r#"{"pdf_url": "https://example.org/paper.pdf"}"#));
        assert_eq!(
            resolver.resolve(&stored),
            "https://papers.example/2401.12345v1"
        );
    }

    #[test]
    fn test_citation_carries_attributes() {
        let chunk = chunk_with(Some(r#"{"title": "On Chunking", "category": "cs.IR"}"#));
        let citation = UrlResolver::default().cite(&chunk);

        assert_eq!(citation.source_id, "2401.12345v1");
        assert_eq!(citation.attributes["title"], "On Chunking");

        let json = serde_json::to_value(&citation).unwrap();
        assert_eq!(json["url"], "https://arxiv.org/pdf/2401.12345v1.pdf");
    }
}
