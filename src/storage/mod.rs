//! Storage layer for Lector
//!
//! Every build writes a complete index generation (vector file, metadata
//! store and manifest) into its own directory. The `CURRENT` pointer names
//! the generation that serving processes load; it is replaced atomically, so
//! readers never observe a half-built generation.

pub mod chunk;
pub mod database;

use crate::error::{LectorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub use chunk::{Attributes, Chunk, NewChunk};
pub use database::{DbPool, MetadataStore, StoreStats};

const CURRENT_POINTER: &str = "CURRENT";
const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "vectors.idx";
const DB_FILE: &str = "metadata.sqlite";

/// Description of a finished build, written last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub dimension: usize,
    pub normalized: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub document_count: usize,
    pub chunk_count: usize,
}

/// File locations of one index generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub id: Uuid,
    pub dir: PathBuf,
}

impl Generation {
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Read this generation's manifest
    pub fn manifest(&self) -> Result<GenerationManifest> {
        let path = self.manifest_path();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| LectorError::io(e, format!("Failed to read manifest: {:?}", path)))?;
        serde_json::from_str(&content).map_err(|e| LectorError::Json {
            source: e,
            context: format!("Failed to parse manifest: {:?}", path),
        })
    }

    /// Write this generation's manifest
    pub fn write_manifest(&self, manifest: &GenerationManifest) -> Result<()> {
        let path = self.manifest_path();
        let content = serde_json::to_string_pretty(manifest).map_err(|e| LectorError::Json {
            source: e,
            context: "Failed to serialize manifest".to_string(),
        })?;
        std::fs::write(&path, content)
            .map_err(|e| LectorError::io(e, format!("Failed to write manifest: {:?}", path)))
    }
}

/// Storage manager that owns the generation directories
pub struct StorageManager {
    base_path: PathBuf,
}

impl StorageManager {
    /// Create a new storage manager rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let manager = Self { base_path };
        let generations = manager.generations_dir();
        std::fs::create_dir_all(&generations).map_err(|e| {
            LectorError::io(
                e,
                format!(
                    "Failed to create generations directory: {}",
                    generations.display()
                ),
            )
        })?;
        Ok(manager)
    }

    /// Root of all index data
    pub fn store_dir(&self) -> PathBuf {
        self.base_path.join("store")
    }

    pub fn generations_dir(&self) -> PathBuf {
        self.store_dir().join("generations")
    }

    fn pointer_path(&self) -> PathBuf {
        self.store_dir().join(CURRENT_POINTER)
    }

    fn generation(&self, id: Uuid) -> Generation {
        Generation {
            id,
            dir: self.generations_dir().join(id.to_string()),
        }
    }

    /// Allocate an empty directory for a new build
    pub fn create_generation(&self) -> Result<Generation> {
        let generation = self.generation(Uuid::new_v4());
        std::fs::create_dir_all(&generation.dir).map_err(|e| {
            LectorError::io(
                e,
                format!(
                    "Failed to create generation directory: {}",
                    generation.dir.display()
                ),
            )
        })?;
        Ok(generation)
    }

    /// Generation named by the `CURRENT` pointer, if any build was activated
    pub fn current_generation(&self) -> Result<Option<Generation>> {
        let pointer = self.pointer_path();
        if !pointer.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&pointer)
            .map_err(|e| LectorError::io(e, format!("Failed to read {:?}", pointer)))?;
        let id = Uuid::parse_str(content.trim()).map_err(|e| {
            LectorError::Config(format!("Invalid generation id in {:?}: {}", pointer, e))
        })?;

        let generation = self.generation(id);
        if !generation.dir.is_dir() {
            return Err(LectorError::IndexNotFound {
                path: generation.dir,
            });
        }
        Ok(Some(generation))
    }

    /// Like `current_generation`, but a missing build is an error
    pub fn require_current(&self) -> Result<Generation> {
        self.current_generation()?
            .ok_or_else(|| LectorError::IndexNotFound {
                path: self.pointer_path(),
            })
    }

    /// Point `CURRENT` at `generation` (write temp file, then rename)
    pub fn activate(&self, generation: &Generation) -> Result<()> {
        if !generation.manifest_path().exists() {
            return Err(LectorError::Config(format!(
                "Refusing to activate unfinished generation {}",
                generation.id
            )));
        }

        let pointer = self.pointer_path();
        let temp = self.store_dir().join(format!("{}.tmp", CURRENT_POINTER));
        std::fs::write(&temp, generation.id.to_string())
            .map_err(|e| LectorError::io(e, format!("Failed to write {:?}", temp)))?;
        std::fs::rename(&temp, &pointer)
            .map_err(|e| LectorError::io(e, format!("Failed to replace {:?}", pointer)))?;

        tracing::info!("Activated index generation {}", generation.id);
        Ok(())
    }

    /// Finished generations, newest first; unfinished directories are skipped
    pub fn list_generations(&self) -> Result<Vec<(Generation, GenerationManifest)>> {
        let dir = self.generations_dir();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| LectorError::io(e, format!("Failed to read {:?}", dir)))?;

        let mut generations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LectorError::io(e, "Failed to read generation entry"))?;
            let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            let generation = self.generation(id);
            if let Ok(manifest) = generation.manifest() {
                generations.push((generation, manifest));
            }
        }

        generations.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(generations)
    }

    /// Delete finished generations beyond the newest `keep` plus any
    /// unfinished directories left by aborted builds; never the current one.
    ///
    /// Only call this while no build is running.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let current = self.current_generation()?.map(|g| g.id);
        let finished = self.list_generations()?;
        let mut removed = 0;

        for (generation, _) in finished.iter().skip(keep) {
            if Some(generation.id) == current {
                continue;
            }
            self.remove_dir(generation)?;
            removed += 1;
        }

        for generation in self.unfinished_generations()? {
            if Some(generation.id) == current {
                continue;
            }
            tracing::info!("Removing unfinished generation {}", generation.id);
            self.remove_dir(&generation)?;
            removed += 1;
        }

        Ok(removed)
    }

    /// Remove a generation that failed to build
    pub fn discard(&self, generation: &Generation) -> Result<()> {
        if self.current_generation()?.map(|g| g.id) == Some(generation.id) {
            return Err(LectorError::Config(format!(
                "Refusing to discard active generation {}",
                generation.id
            )));
        }
        if generation.dir.exists() {
            self.remove_dir(generation)?;
        }
        Ok(())
    }

    fn unfinished_generations(&self) -> Result<Vec<Generation>> {
        let dir = self.generations_dir();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| LectorError::io(e, format!("Failed to read {:?}", dir)))?;

        let mut unfinished = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LectorError::io(e, "Failed to read generation entry"))?;
            let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            let generation = self.generation(id);
            if generation.dir.is_dir() && generation.manifest().is_err() {
                unfinished.push(generation);
            }
        }
        Ok(unfinished)
    }

    fn remove_dir(&self, generation: &Generation) -> Result<()> {
        std::fs::remove_dir_all(&generation.dir)
            .map_err(|e| LectorError::io(e, format!("Failed to remove {:?}", generation.dir)))
    }

    /// Calculate directory size recursively
    pub fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            let entries = std::fs::read_dir(path)
                .map_err(|e| LectorError::io(e, format!("Failed to read {}", path.display())))?;
            for entry in entries {
                let entry = entry.map_err(|e| LectorError::io(e, "Failed to read entry"))?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry
                        .metadata()
                        .map_err(|e| {
                            LectorError::io(e, format!("Failed to stat {}", path.display()))
                        })?
                        .len();
                }
            }
        }

        Ok(size)
    }

    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
