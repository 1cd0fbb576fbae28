/// Exact nearest-neighbour vector index with a versioned on-disk format
use ndarray::{ArrayView1, ArrayView2};
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File magic for persisted indexes
const MAGIC: &[u8; 4] = b"LVIX";

/// Current on-disk format version
const FORMAT_VERSION: u16 = 1;

/// Header flag: vectors were L2-normalised on insert
const FLAG_NORMALIZED: u16 = 0b1;

/// magic + version + flags + dimension + count + blake3 checksum
const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 8 + 32;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Normalization mismatch: index built with normalize={stored}, configured normalize={configured}")]
    NormalizationMismatch { stored: bool, configured: bool },

    #[error("Corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A search hit: index position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the vector
    pub position: usize,
    /// Squared L2 distance to the query (lower is closer)
    pub distance: f32,
}

/// Flat, exact vector index
///
/// Vectors are stored contiguously in insertion order; a vector's position is
/// its insertion ordinal. Search is a full scan with squared Euclidean
/// distance, so results are exact and reproducible. When `normalized` is set
/// every inserted vector and every query is L2-normalised first, which makes
/// the ranking equivalent to cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    normalized: bool,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index of fixed dimension
    pub fn new(dimension: usize, normalized: bool) -> Self {
        Self {
            dimension,
            normalized,
            data: Vec::new(),
        }
    }

    /// Append vectors in order, returning the positions they were assigned.
    ///
    /// The whole batch is rejected if any vector has the wrong dimension.
    pub fn insert(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>, VectorIndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let start = self.len();
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            if self.normalized {
                self.data.extend(normalize(vector));
            } else {
                self.data.extend_from_slice(vector);
            }
        }

        Ok(start..self.len())
    }

    /// Drop every vector at or after `len`
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Up to `k` nearest vectors, ascending by distance, ties by position
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = if self.normalized {
            normalize(query)
        } else {
            query.to_vec()
        };
        let query = ArrayView1::from(&query[..]);

        let matrix = ArrayView2::from_shape((self.len(), self.dimension), &self.data[..])
            .map_err(|e| VectorIndexError::Corrupt {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?;

        let mut neighbors: Vec<Neighbor> = matrix
            .outer_iter()
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                Neighbor {
                    position,
                    distance: diff.dot(&diff),
                }
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Stored (possibly normalised) vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Write the index to `path` atomically (temp file, then rename)
    pub fn persist(&self, path: &Path) -> Result<(), VectorIndexError> {
        let mut payload = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let checksum = blake3::hash(&payload);
        let compressed = zstd::encode_all(&payload[..], 3)?;

        let flags = if self.normalized { FLAG_NORMALIZED } else { 0 };
        let dimension = u32::try_from(self.dimension).map_err(|_| VectorIndexError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("dimension {} does not fit the file format", self.dimension),
        })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(checksum.as_bytes());
        bytes.extend_from_slice(&compressed);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;

        tracing::debug!(
            "Persisted vector index: {} vectors ({}D) to {}",
            self.len(),
            self.dimension,
            path.display()
        );

        Ok(())
    }

    /// Load an index, checking it against the embedding model's dimension
    /// and the configured normalisation before any search can run
    pub fn load(
        path: &Path,
        expected_dimension: usize,
        normalized: bool,
    ) -> Result<Self, VectorIndexError> {
        if !path.exists() {
            return Err(VectorIndexError::IndexNotFound(path.to_path_buf()));
        }

        let corrupt = |reason: String| VectorIndexError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN {
            return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }

        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let declared_count = u64::from_le_bytes(count_bytes);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&bytes[20..HEADER_LEN]);

        if dimension != expected_dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: expected_dimension,
                actual: dimension,
            });
        }

        let stored_normalized = flags & FLAG_NORMALIZED != 0;
        if stored_normalized != normalized {
            return Err(VectorIndexError::NormalizationMismatch {
                stored: stored_normalized,
                configured: normalized,
            });
        }

        // Header fields sit outside the checksum
        let expected_len = usize::try_from(declared_count)
            .ok()
            .and_then(|count| count.checked_mul(dimension))
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                corrupt(format!(
                    "header declares {} vectors of {}D",
                    declared_count, dimension
                ))
            })?;

        let payload = zstd::decode_all(&bytes[HEADER_LEN..])
            .map_err(|e| corrupt(format!("decompression failed: {}", e)))?;
        if blake3::hash(&payload) != blake3::Hash::from(checksum) {
            return Err(corrupt("checksum mismatch".to_string()));
        }
        if payload.len() != expected_len {
            return Err(corrupt(format!(
                "payload holds {} bytes, header declares {} vectors of {}D",
                payload.len(),
                declared_count,
                dimension
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            dimension,
            normalized: stored_normalized,
            data,
        })
    }
}

/// L2-normalise a vector; the zero vector is returned unchanged
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vector.to_vec()
    }
}
