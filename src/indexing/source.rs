//! Document sources feeding the index builder

use crate::error::{LectorError, Result};
use crate::storage::Attributes;
use ahash::AHashMap;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// A document ready to be chunked
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source_id: String,
    pub text: String,
    pub attributes: Attributes,
}

/// A document that could not be read; the build skips it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub source_id: String,
    pub reason: String,
}

impl RecordError {
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_id, self.reason)
    }
}

pub type Record = std::result::Result<SourceDocument, RecordError>;

/// Anything that yields `(source_id, text, attributes)` records
pub trait DocumentSource {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Records in a stable order. Failing to open the source at all is an
    /// error; a single unreadable record is yielded as `Err` and skipped.
    fn documents(&self) -> Result<Box<dyn Iterator<Item = Record> + '_>>;
}

/// Directory of `<source_id>.txt` files with optional `<source_id>.json`
/// attribute sidecars
pub struct DirectorySource {
    dir: PathBuf,
    category: Option<String>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            category: None,
        }
    }

    /// Stamp `category` on every document's attributes
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.trim().is_empty());
        self
    }

    fn text_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(LectorError::Config(format!(
                "Source directory does not exist: {}",
                self.dir.display()
            )));
        }

        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| LectorError::io(e, format!("Failed to read {}", self.dir.display())))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| LectorError::io(e, "Failed to read source entry"))?
                .path();
            let is_text = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if is_text && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    fn load(&self, path: &Path) -> Record {
        let source_id = source_id_of(path);
        if source_id.is_empty() {
            return Err(RecordError::new(path.display().to_string(), "empty file name"));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| RecordError::new(&source_id, format!("unreadable text: {}", e)))?;

        let mut attributes = read_sidecar(&path.with_extension("json"))
            .map_err(|reason| RecordError::new(&source_id, reason))?;
        if let Some(category) = &self.category {
            attributes.insert("category".to_string(), Value::String(category.clone()));
        }

        Ok(SourceDocument {
            source_id,
            text,
            attributes,
        })
    }
}

impl DocumentSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    fn documents(&self) -> Result<Box<dyn Iterator<Item = Record> + '_>> {
        let files = self.text_files()?;
        tracing::info!("Found {} documents in {}", files.len(), self.dir.display());

        // `a.TXT` and `a.txt` would both be "a"; the first in sort order wins
        let mut seen: AHashMap<String, PathBuf> = AHashMap::new();
        Ok(Box::new(files.into_iter().map(move |path| {
            let source_id = source_id_of(&path);
            if let Some(first) = seen.get(&source_id) {
                return Err(RecordError::new(
                    &source_id,
                    format!("duplicate source id, already read from {}", first.display()),
                ));
            }
            if !source_id.is_empty() {
                seen.insert(source_id, path.clone());
            }
            self.load(&path)
        })))
    }
}

fn source_id_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sidecar attributes; a missing file is an empty bag
fn read_sidecar(path: &Path) -> std::result::Result<Attributes, String> {
    if !path.exists() {
        return Ok(Attributes::new());
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| format!("unreadable attributes: {}", e))?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("attributes file is not a JSON object".to_string()),
        Err(e) => Err(format!("malformed attributes: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_source_reads_sorted_with_sidecars() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), "second").unwrap();
        std::fs::write(temp.path().join("a.txt"), "first").unwrap();
        std::fs::write(
            temp.path().join("a.json"),
            r#"{"title": "Paper A", "pdf_url": "https://example.org/a.pdf"}"#,
        )
        .unwrap();
        std::fs::write(temp.path().join("notes.md"), "ignored").unwrap();

        let source = DirectorySource::new(temp.path()).with_category(Some("cs.AI".to_string()));
        let docs: Vec<Record> = source.documents().unwrap().collect();

        assert_eq!(docs.len(), 2);
        let a = docs[0].as_ref().unwrap();
        assert_eq!(a.source_id, "a");
        assert_eq!(a.text, "first");
        assert_eq!(a.attributes["title"], "Paper A");
        assert_eq!(a.attributes["category"], "cs.AI");

        let b = docs[1].as_ref().unwrap();
        assert_eq!(b.source_id, "b");
        assert_eq!(b.attributes.len(), 1);
    }

    #[test]
    fn test_bad_sidecar_is_a_record_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "text").unwrap();
        std::fs::write(temp.path().join("a.json"), "[1, 2]").unwrap();
        std::fs::write(temp.path().join("b.txt"), "text").unwrap();

        let source = DirectorySource::new(temp.path());
        let docs: Vec<Record> = source.documents().unwrap().collect();

        assert_eq!(docs[0].as_ref().unwrap_err().source_id, "a");
        assert!(docs[1].is_ok());
    }

    #[test]
    fn test_missing_directory() {
        let source = DirectorySource::new("/nonexistent/lector/source");
        assert!(source.documents().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_duplicate_source_id_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.TXT"), "upper").unwrap();
        std::fs::write(temp.path().join("a.txt"), "lower").unwrap();
        std::fs::write(temp.path().join("b.txt"), "other").unwrap();

        let source = DirectorySource::new(temp.path());
        let docs: Vec<Record> = source.documents().unwrap().collect();

        assert_eq!(docs.len(), 3);
        let first = docs[0].as_ref().unwrap();
        assert_eq!(first.source_id, "a");
        assert_eq!(first.text, "upper");

        let duplicate = docs[1].as_ref().unwrap_err();
        assert_eq!(duplicate.source_id, "a");
        assert!(duplicate.reason.contains("duplicate source id"));

        assert_eq!(docs[2].as_ref().unwrap().source_id, "b");
    }
}
