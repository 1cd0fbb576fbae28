//! Fixed-window text chunking
//!
//! Documents are split into overlapping windows measured in characters
//! (Unicode scalar values), so a window never cuts a UTF-8 sequence.

use crate::error::{LectorError, Result};
use serde::{Deserialize, Serialize};

/// Default window size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Validated chunk window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting windows that would never advance
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 || overlap >= size {
            return Err(LectorError::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of two consecutive windows
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Split `text` into windows.
    ///
    /// Each window starts `size - overlap` characters after the previous
    /// one; the last window ends exactly at the end of the text and may be
    /// shorter than `size`. Empty text yields no windows.
    pub fn split(&self, text: &str) -> Vec<String> {
        // Byte offset of every character boundary, including the end.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.size).min(char_count);
            chunks.push(text[bounds[start]..bounds[end]].to_string());
            if end == char_count {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split `text` into windows of `size` characters overlapping by `overlap`
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(size, overlap)?.split(text))
}
