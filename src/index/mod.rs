
use tracing::{debug, info};

use crate::documents::Segment;
use crate::embeddings::EmbeddingVector;
use crate::{RagError, Result};

/// In-memory vector index using brute-force similarity search.
///
/// Built once during ingestion and read-only afterwards, so it can be shared
/// behind an `Arc` and queried from many tasks without locking.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
}

#[derive(Debug)]
struct IndexEntry {
    segment: Segment,
    vector: EmbeddingVector,
    norm: f32,
}

/// A segment matched by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub segment: Segment,
    /// Relevance in `[0, 1]`, see [`relevance_score`]
    pub score: f32,
}

impl EmbeddingIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, established by the first insert
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.entries.iter().map(|entry| &entry.segment)
    }

    /// Insert segments paired 1:1 with their vectors.
    ///
    /// The whole batch is validated before anything is stored. Re-inserting
    /// a segment stores it again; there is no dedup at this layer.
    #[inline]
    pub fn insert_all(
        &mut self,
        segments: Vec<Segment>,
        vectors: Vec<EmbeddingVector>,
    ) -> Result<()> {
        if segments.len() != vectors.len() {
            return Err(RagError::InvalidParameter(format!(
                "{} segments but {} vectors",
                segments.len(),
                vectors.len()
            )));
        }

        let Some(first) = vectors.first() else {
            debug!("No embeddings to store");
            return Ok(());
        };

        let expected = self.dimension.unwrap_or(first.len());
        if expected == 0 {
            return Err(RagError::InvalidParameter(
                "embedding vectors must not be empty".to_string(),
            ));
        }

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        self.dimension = Some(expected);
        let count = segments.len();
        self.entries.extend(
            segments
                .into_iter()
                .zip(vectors)
                .map(|(segment, vector)| IndexEntry {
                    norm: norm(&vector),
                    segment,
                    vector,
                }),
        );

        info!(
            "Stored {} embeddings ({} total, {} dimensions)",
            count,
            self.entries.len(),
            expected
        );
        Ok(())
    }

    /// Return at most `k` segments scoring at least `min_score`, best first.
    /// Equal scores keep insertion order.
    #[inline]
    pub fn query(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };

        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(vector);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let cosine = cosine_with_norms(&entry.vector, entry.norm, vector, query_norm);
                (position, relevance_score(cosine))
            })
            .filter(|(_, score)| *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        debug!(
            "Similarity query returned {} of {} entries (k={}, min_score={})",
            scored.len(),
            self.entries.len(),
            k,
            min_score
        );

        Ok(scored
            .into_iter()
            .filter_map(|(position, score)| {
                self.entries.get(position).map(|entry| SearchResult {
                    segment: entry.segment.clone(),
                    score,
                })
            })
            .collect())
    }
}

/// Map cosine similarity from `[-1, 1]` onto a `[0, 1]` relevance score
/// using `(cos + 1) / 2`. All sources backed by an index share this scale, so
/// `min_score` and routing thresholds mean the same thing everywhere.
#[inline]
pub fn relevance_score(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Cosine similarity; 0.0 if either vector has zero magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, norm(a), b, norm(b))
}

fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}
