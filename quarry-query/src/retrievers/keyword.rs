//! Lexical retrieval over the raw chunk corpus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use quarry_core::traits::DocumentStore;
use quarry_core::types::chunk::sort_by_score_desc;
use quarry_core::{Chunk, QuarryError, Result, RetrievalStrategy, ScoredChunk, VectorQuery};

/// Configuration for [`KeywordRetriever`].
#[derive(Debug, Clone)]
pub struct KeywordRetrieverConfig {
    /// Minimum term length to index.
    pub min_term_length: usize,

    /// Overall deadline for one retrieval call.
    pub timeout: Duration,
}

impl Default for KeywordRetrieverConfig {
    fn default() -> Self {
        Self {
            min_term_length: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A retriever that scores chunks by case-insensitive token overlap with the
/// query, weighted by term frequency.
///
/// Shares the fail-loud policy of the vector channel so the fusion layer can
/// treat both symmetrically.
#[derive(Debug, Clone)]
pub struct KeywordRetriever {
    store: Arc<dyn DocumentStore>,
    config: KeywordRetrieverConfig,
}

impl KeywordRetriever {
    /// Create a new keyword retriever with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: KeywordRetrieverConfig::default(),
        }
    }

    /// Create a new keyword retriever with custom configuration.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: KeywordRetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Retrieve the `query.top_k` best lexical matches.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Retrieval`] when the store fails and
    /// [`QuarryError::Timeout`] when the deadline expires.
    #[instrument(skip(self), fields(retriever = "keyword"))]
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<Vec<ScoredChunk>> {
        let fetch = self.store.get_documents(collection);
        let chunks = tokio::time::timeout(self.config.timeout, fetch)
            .await
            .map_err(|_| QuarryError::timeout("keyword_search"))?
            .map_err(|e| QuarryError::retrieval(format!("keyword search failed: {e}")))?;

        debug!("Scoring {} chunks lexically", chunks.len());

        let query_terms = self.tokenize(&query.text);
        if query_terms.is_empty() {
            info!("Query has no scorable terms");
            return Ok(Vec::new());
        }

        let mut results: Vec<ScoredChunk> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let score = self.overlap_score(&query_terms, &chunk);
                (score > 0.0).then(|| ScoredChunk::new(chunk, score, RetrievalStrategy::Keyword))
            })
            .collect();

        sort_by_score_desc(&mut results);
        results.truncate(query.top_k);

        info!("Keyword search returned {} results", results.len());
        Ok(results)
    }

    /// Tokenize text into lowercase alphanumeric terms of the configured
    /// minimum length.
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
            })
            .filter(|word| word.len() >= self.config.min_term_length)
            .collect()
    }

    /// Fraction of query terms present in the chunk, weighted by how often
    /// each matched term occurs (term-frequency dampened to avoid one
    /// repeated word dominating).
    fn overlap_score(&self, query_terms: &[String], chunk: &Chunk) -> f32 {
        let chunk_terms = self.tokenize(&chunk.text);
        if chunk_terms.is_empty() {
            return 0.0;
        }

        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        for term in &chunk_terms {
            *frequencies.entry(term.as_str()).or_insert(0) += 1;
        }

        let mut matched = 0.0_f32;
        for term in query_terms {
            let tf = *frequencies.get(term.as_str()).unwrap_or(&0) as f32;
            if tf > 0.0 {
                matched += 1.0 + tf.ln();
            }
        }

        matched / query_terms.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubStore {
        chunks: Vec<Chunk>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentStore for StubStore {
        async fn retrieve_documents(
            &self,
            _collection: &str,
            _query: &VectorQuery,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(vec![])
        }

        async fn get_documents(&self, _collection: &str) -> Result<Vec<Chunk>> {
            if self.fail {
                return Err(QuarryError::internal("disk error"));
            }
            Ok(self.chunks.clone())
        }
    }

    fn retriever_with(chunks: Vec<Chunk>) -> KeywordRetriever {
        KeywordRetriever::new(Arc::new(StubStore {
            chunks,
            fail: false,
        }))
    }

    #[tokio::test]
    async fn test_overlap_ranking() {
        let retriever = retriever_with(vec![
            Chunk::new("c1", "rust is a systems programming language", "d1", 0),
            Chunk::new("c2", "python is a scripting language", "d2", 0),
            Chunk::new("c3", "completely unrelated text about cooking", "d3", 0),
        ]);

        let query = VectorQuery::new("rust programming").with_top_k(10);
        let results = retriever.retrieve("col", &query).await.unwrap();

        assert_eq!(results[0].chunk.id, "c1");
        assert!(results.iter().all(|r| r.chunk.id != "c3"));
        assert!(results
            .iter()
            .all(|r| r.strategy == RetrievalStrategy::Keyword));
    }

    #[tokio::test]
    async fn test_case_insensitive_matching() {
        let retriever = retriever_with(vec![Chunk::new("c1", "RUST Language", "d1", 0)]);
        let results = retriever
            .retrieve("col", &VectorQuery::new("rust language"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_truncates_to_top_k() {
        let chunks = (0..20)
            .map(|i| Chunk::new(format!("c{i}"), "rust text", "d", i))
            .collect();
        let retriever = retriever_with(chunks);

        let results = retriever
            .retrieve("col", &VectorQuery::new("rust").with_top_k(5))
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_store_failure_raises_retrieval_error() {
        let retriever = KeywordRetriever::new(Arc::new(StubStore {
            chunks: vec![],
            fail: true,
        }));
        let err = retriever
            .retrieve("col", &VectorQuery::new("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Retrieval { .. }));
    }
}
