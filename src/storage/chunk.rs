//! Chunk records as held by the metadata store

use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Document-level key/value bag (title, authors, published, pdf_url, ...)
pub type Attributes = Map<String, Value>;

/// A chunk ready to be written; position and id are assigned on insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub source_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Serialized attribute bag shared by every chunk of the document
    pub attributes: Option<String>,
}

/// The atomic retrievable unit
///
/// Attributes are kept as the stored JSON blob and parsed on first access.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Store-assigned identity
    pub id: i64,
    /// Position of this chunk's vector in the vector index
    pub position: usize,
    /// Owning document
    pub source_id: String,
    /// Zero-based position within the owning document
    pub chunk_index: usize,
    /// Literal chunk content
    pub text: String,
    attributes_blob: Option<String>,
    attributes: OnceLock<Attributes>,
}

impl Chunk {
    pub fn new(
        id: i64,
        position: usize,
        source_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        attributes_blob: Option<String>,
    ) -> Self {
        Self {
            id,
            position,
            source_id: source_id.into(),
            chunk_index,
            text: text.into(),
            attributes_blob,
            attributes: OnceLock::new(),
        }
    }

    /// Raw attribute blob as stored
    pub fn attributes_blob(&self) -> Option<&str> {
        self.attributes_blob.as_deref()
    }

    /// Parsed attribute bag; malformed or missing data yields an empty bag
    pub fn attributes(&self) -> &Attributes {
        self.attributes.get_or_init(|| match &self.attributes_blob {
            None => Attributes::new(),
            Some(blob) if blob.trim().is_empty() => Attributes::new(),
            Some(blob) => match serde_json::from_str::<Value>(blob) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracing::warn!(
                        "Chunk {} has non-object attributes, using empty set",
                        self.id
                    );
                    Attributes::new()
                }
                Err(e) => {
                    tracing::warn!(
                        "Chunk {} has malformed attributes ({}), using empty set",
                        self.id,
                        e
                    );
                    Attributes::new()
                }
            },
        })
    }

    /// String attribute by key, ignoring empty values
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes()
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_parsed_lazily() {
        let chunk = Chunk::new(
            1,
            0,
            "2401.00001v1",
            0,
            "text",
            Some(r#"{"title": "A Paper", "pdf_url": ""}"#.to_string()),
        );
        assert_eq!(chunk.attribute_str("title"), Some("A Paper"));
        assert_eq!(chunk.attribute_str("pdf_url"), None);
        assert_eq!(chunk.attributes().len(), 2);
    }

    #[test]
    fn test_malformed_attributes_degrade_to_empty() {
        let broken = Chunk::new(1, 0, "a", 0, "text", Some("{not json".to_string()));
        assert!(broken.attributes().is_empty());

        let not_object = Chunk::new(2, 1, "a", 1, "text", Some("[1, 2]".to_string()));
        assert!(not_object.attributes().is_empty());

        let missing = Chunk::new(3, 2, "a", 2, "text", None);
        assert!(missing.attributes().is_empty());
    }

    #[test]
    fn test_preview() {
        let chunk = Chunk::new(1, 0, "a", 0, "héllo world", None);
        assert_eq!(chunk.preview(5), "héllo...");
        assert_eq!(chunk.preview(50), "héllo world");
    }
}
