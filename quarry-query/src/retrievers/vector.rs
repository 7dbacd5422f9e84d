//! Semantic retrieval through the document store's vector index.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use quarry_core::traits::DocumentStore;
use quarry_core::types::chunk::sort_by_score_desc;
use quarry_core::{QuarryError, Result, RetrievalStrategy, ScoredChunk, VectorQuery};

/// Configuration for [`VectorRetriever`].
#[derive(Debug, Clone)]
pub struct VectorRetrieverConfig {
    /// Overall deadline for one retrieval call.
    pub timeout: Duration,
}

impl Default for VectorRetrieverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// A retriever that delegates semantic search to the document store.
///
/// Store failures are wrapped and raised as retrieval errors rather than
/// silently returning empty: an empty result from the sole semantic channel
/// is indistinguishable from "no matches" and would corrupt fusion.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    store: Arc<dyn DocumentStore>,
    config: VectorRetrieverConfig,
}

impl VectorRetriever {
    /// Create a new vector retriever with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            config: VectorRetrieverConfig::default(),
        }
    }

    /// Create a new vector retriever with custom configuration.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: VectorRetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Retrieve the `query.top_k` most similar chunks.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Retrieval`] when the store fails and
    /// [`QuarryError::Timeout`] when the deadline expires.
    #[instrument(skip(self), fields(retriever = "vector"))]
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<Vec<ScoredChunk>> {
        debug!("Vector search with top_k {}", query.top_k);

        let search = self.store.retrieve_documents(collection, query);
        let results = tokio::time::timeout(self.config.timeout, search)
            .await
            .map_err(|_| QuarryError::timeout("vector_search"))?
            .map_err(|e| QuarryError::retrieval(format!("vector search failed: {e}")))?;

        let mut results: Vec<ScoredChunk> = results
            .into_iter()
            .map(|mut scored| {
                scored.strategy = RetrievalStrategy::Vector;
                scored
            })
            .collect();
        sort_by_score_desc(&mut results);
        results.truncate(query.top_k);

        info!("Vector search returned {} results", results.len());
        Ok(results)
    }
}
