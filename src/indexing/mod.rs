//! Offline index building
mod builder;
mod source;

pub use builder::{BuildReport, IndexBuilder, SkippedDocument, DEFAULT_BATCH_SIZE};
pub use source::{DirectorySource, DocumentSource, Record, RecordError, SourceDocument};
