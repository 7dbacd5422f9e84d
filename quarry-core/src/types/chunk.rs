//! Chunk types: the retrievable text units and their scored wrappers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A retrievable unit of document text produced by an external ingestion
/// stage.
///
/// Identifiers are opaque strings at this library's boundary; the ingestion
/// stage decides their shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier of the chunk.
    pub id: String,

    /// Text content of the chunk.
    pub text: String,

    /// Identifier of the source document this chunk was cut from.
    pub document_id: String,

    /// Position of the chunk within the source document (0-based).
    pub position: usize,

    /// Chunk metadata, e.g. a display title for the source document.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new<S1, S2, S3>(id: S1, text: S2, document_id: S3, position: usize) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            id: id.into(),
            text: text.into(),
            document_id: document_id.into(),
            position,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the display title from metadata, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }
}

/// The retrieval channel a result originated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Dense semantic search through the document store.
    Vector,
    /// Lexical overlap search over raw documents.
    Keyword,
    /// Weighted fusion of the vector and keyword channels.
    Hybrid,
}

impl std::fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A chunk with an associated relevance score and origin channel.
///
/// Every `retrieve()` call returns these sorted descending by score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,

    /// Relevance score (higher is more relevant).
    pub score: f32,

    /// The channel that produced this result.
    pub strategy: RetrievalStrategy,
}

impl ScoredChunk {
    /// Create a new scored chunk.
    pub fn new(chunk: Chunk, score: f32, strategy: RetrievalStrategy) -> Self {
        Self {
            chunk,
            score,
            strategy,
        }
    }
}

/// Sort scored chunks descending by score, in place.
///
/// NaN scores compare equal so a poisoned score cannot panic the sort.
pub fn sort_by_score_desc(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let chunk = Chunk::new("c1", "some text", "doc-1", 3)
            .with_metadata("title", "Intro to Rust");
        assert_eq!(chunk.id, "c1");
        assert_eq!(chunk.position, 3);
        assert_eq!(chunk.title(), Some("Intro to Rust"));
    }

    #[test]
    fn test_sort_by_score_desc() {
        let mut results = vec![
            ScoredChunk::new(Chunk::new("a", "", "d", 0), 0.2, RetrievalStrategy::Vector),
            ScoredChunk::new(Chunk::new("b", "", "d", 1), 0.9, RetrievalStrategy::Vector),
            ScoredChunk::new(Chunk::new("c", "", "d", 2), 0.5, RetrievalStrategy::Vector),
        ];
        sort_by_score_desc(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
