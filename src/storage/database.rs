//! SQLite-backed metadata store with migrations
//!
//! Holds one row per chunk, keyed by chunk id, with the chunk's position in
//! the vector index stored alongside so alignment can be verified on load.

use crate::error::{LectorError, Result};
use crate::storage::chunk::{Chunk, NewChunk};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const CHUNK_COLUMNS: &str = "id, position, source_id, chunk_index, text, attributes";

/// Durable chunk metadata
pub struct MetadataStore {
    pool: DbPool,
}

impl MetadataStore {
    /// Open (or create) the store at `db_path` and apply migrations
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LectorError::io(
                    e,
                    format!("Failed to create database directory: {:?}", parent),
                )
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying metadata store migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Store a single chunk at `position`, returning its id
    pub fn put(&self, chunk: &NewChunk, position: usize) -> Result<i64> {
        let conn = self.get_conn()?;
        insert_chunk(&conn, chunk, position)
    }

    /// Write all chunks of one document together with their vectors.
    ///
    /// Rows are inserted at `first_position..` inside one transaction, then
    /// `write_vectors` runs; the transaction only commits if it succeeds, so
    /// a failed vector write leaves no metadata behind.
    pub fn put_document<F>(
        &self,
        chunks: &[NewChunk],
        first_position: usize,
        write_vectors: F,
    ) -> Result<Vec<i64>>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let ids = insert_all(&tx, chunks, first_position)?;
        write_vectors()?;
        tx.commit()?;

        Ok(ids)
    }

    /// Every chunk ordered by index position
    pub fn get_all(&self) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks ORDER BY position",
            CHUNK_COLUMNS
        ))?;
        let chunks = stmt
            .query_map([], chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Chunk stored at a vector index position
    pub fn get_by_position(&self, position: usize) -> Result<Option<Chunk>> {
        let conn = self.get_conn()?;
        let chunk = conn
            .query_row(
                &format!("SELECT {} FROM chunks WHERE position = ?1", CHUNK_COLUMNS),
                params![position as i64],
                chunk_from_row,
            )
            .optional()?;
        Ok(chunk)
    }

    /// Number of stored chunks
    pub fn count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Verify the store lines up 1:1 with a vector index of `index_len` entries.
    ///
    /// Positions are unique, so a matching count plus a `0..len` position
    /// range means every index slot has exactly one row.
    pub fn check_alignment(&self, index_len: usize) -> Result<()> {
        let conn = self.get_conn()?;
        let (count, min_position, max_position): (i64, Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(position), MAX(position) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let store_len = count as usize;
        let contiguous = match (min_position, max_position) {
            (None, None) => true,
            (Some(min), Some(max)) => min == 0 && max == count - 1,
            _ => false,
        };

        if store_len != index_len || !contiguous {
            return Err(LectorError::Alignment {
                index_len,
                store_len,
            });
        }

        Ok(())
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let source_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT source_id) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            chunk_count: chunk_count as usize,
            source_count: source_count as usize,
        })
    }
}

fn insert_all(tx: &Transaction<'_>, chunks: &[NewChunk], first_position: usize) -> Result<Vec<i64>> {
    chunks
        .iter()
        .enumerate()
        .map(|(offset, chunk)| insert_chunk(tx, chunk, first_position + offset))
        .collect()
}

fn insert_chunk(conn: &rusqlite::Connection, chunk: &NewChunk, position: usize) -> Result<i64> {
    conn.execute(
        "INSERT INTO chunks (position, source_id, chunk_index, text, attributes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            position as i64,
            chunk.source_id,
            chunk.chunk_index as i64,
            chunk.text,
            chunk.attributes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let position: i64 = row.get(1)?;
    let chunk_index: i64 = row.get(3)?;
    Ok(Chunk::new(
        row.get(0)?,
        position as usize,
        row.get::<_, String>(2)?,
        chunk_index as usize,
        row.get::<_, String>(4)?,
        row.get(5)?,
    ))
}

/// Metadata store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub source_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: chunk table
    r#"
    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        position INTEGER NOT NULL UNIQUE,
        source_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL CHECK (length(text) > 0),
        attributes TEXT  -- JSON object
    );

    CREATE INDEX idx_chunks_source ON chunks(source_id);
    "#,
];
