//! Result deduplication by chunk id

use crate::retrieval::RetrievalHit;
use ahash::AHashSet;

/// Drop repeated chunks, keeping the first occurrence of each id
///
/// Order of the surviving hits is preserved, so vector hits listed before
/// keyword hits win when both paths return the same chunk.
pub fn deduplicate_hits(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut seen: AHashSet<i64> = AHashSet::with_capacity(hits.len());

    hits.into_iter()
        .filter(|hit| seen.insert(hit.chunk.id))
        .collect()
}
