//! Lector - grounded question answering over a document corpus
//!
//! Documents are split into overlapping character windows, embedded, and
//! stored as an exact vector index paired 1:1 with a SQLite metadata store.
//! Questions are answered from a hybrid of nearest-neighbour and keyword
//! matches, grouped per source into one context with citations.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod indexing;
pub mod retrieval;
pub mod service;
pub mod storage;

pub use error::{LectorError, Result};
