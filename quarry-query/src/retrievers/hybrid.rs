//! Weighted fusion of the vector and keyword channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use quarry_core::traits::DocumentStore;
use quarry_core::types::chunk::sort_by_score_desc;
use quarry_core::{QuarryError, Result, RetrievalStrategy, ScoredChunk, VectorQuery};

use super::keyword::KeywordRetriever;
use super::vector::VectorRetriever;

/// Configuration for [`HybridRetriever`].
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Weight of the vector channel in [0, 1]; the keyword channel gets the
    /// complement.
    pub vector_weight: f32,

    /// Per-channel deadline, so one slow channel cannot stall fusion.
    pub channel_timeout: Duration,

    /// Whether to normalize each channel's scores by its maximum before
    /// weighting. Keeps the channels on comparable scales.
    pub normalize_scores: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            channel_timeout: Duration::from_secs(10),
            normalize_scores: true,
        }
    }
}

impl HybridConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when `vector_weight` is outside
    /// [0, 1] or the channel timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vector_weight) {
            return Err(QuarryError::configuration(format!(
                "vector_weight must be within [0, 1], got {}",
                self.vector_weight
            )));
        }
        if self.channel_timeout.is_zero() {
            return Err(QuarryError::configuration(
                "channel_timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// The outcome of a hybrid retrieval, with degradation made observable.
#[derive(Debug, Clone)]
pub struct HybridRetrieval {
    /// Fused results, sorted descending by combined score.
    pub results: Vec<ScoredChunk>,

    /// Set when one channel failed or timed out and fusion degraded to the
    /// surviving channel; names the channel that was lost.
    pub degraded: Option<RetrievalStrategy>,
}

/// A retriever that fuses the vector and keyword channels with weighted
/// scoring.
///
/// Both child retrievers are issued concurrently, each under its own
/// deadline. The combined score per distinct chunk is
/// `vector_weight * vector_score + (1 - vector_weight) * keyword_score`,
/// with a channel that did not find the chunk contributing zero — being
/// found by both channels is rewarded, never penalized.
///
/// The failure policy deliberately differs from the children: a single
/// failed channel degrades fusion to the surviving channel's results (the
/// [`HybridRetrieval::degraded`] flag records which one was lost), while
/// both channels failing is a retrieval error.
#[derive(Debug)]
pub struct HybridRetriever {
    vector: VectorRetriever,
    keyword: KeywordRetriever,
    config: HybridConfig,
}

impl HybridRetriever {
    /// Create a hybrid retriever over a store with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            vector: VectorRetriever::new(Arc::clone(&store)),
            keyword: KeywordRetriever::new(store),
            config: HybridConfig::default(),
        }
    }

    /// Create a hybrid retriever with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the configuration is
    /// invalid.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: HybridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vector: VectorRetriever::new(Arc::clone(&store)),
            keyword: KeywordRetriever::new(store),
            config,
        })
    }

    /// Create a builder for constructing hybrid retrievers.
    pub fn builder() -> HybridRetrieverBuilder {
        HybridRetrieverBuilder::default()
    }

    /// Retrieve and fuse results from both channels.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Retrieval`] only when both channels fail.
    #[instrument(skip(self), fields(retriever = "hybrid"))]
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<HybridRetrieval> {
        info!(
            "Hybrid retrieval with vector_weight {}",
            self.config.vector_weight
        );

        let deadline = self.config.channel_timeout;
        let vector_fut = tokio::time::timeout(deadline, self.vector.retrieve(collection, query));
        let keyword_fut = tokio::time::timeout(deadline, self.keyword.retrieve(collection, query));
        let (vector_out, keyword_out) = tokio::join!(vector_fut, keyword_fut);

        let vector_results = flatten_channel(vector_out, "vector");
        let keyword_results = flatten_channel(keyword_out, "keyword");

        let (vector_results, keyword_results, degraded) = match (vector_results, keyword_results) {
            (Ok(v), Ok(k)) => (v, k, None),
            (Ok(v), Err(e)) => {
                warn!("Keyword channel lost, degrading to vector only: {e}");
                (v, Vec::new(), Some(RetrievalStrategy::Keyword))
            }
            (Err(e), Ok(k)) => {
                warn!("Vector channel lost, degrading to keyword only: {e}");
                (Vec::new(), k, Some(RetrievalStrategy::Vector))
            }
            (Err(ve), Err(ke)) => {
                return Err(QuarryError::retrieval(format!(
                    "both retrieval channels failed: vector: {ve}; keyword: {ke}"
                )));
            }
        };

        debug!(
            "Fusing {} vector and {} keyword results",
            vector_results.len(),
            keyword_results.len()
        );

        let results = self.fuse(vector_results, keyword_results, query.top_k);
        info!(
            "Hybrid retrieval completed: {} results, degraded: {:?}",
            results.len(),
            degraded
        );

        Ok(HybridRetrieval { results, degraded })
    }

    /// Weighted-sum fusion with dedup by chunk id.
    fn fuse(
        &self,
        vector_results: Vec<ScoredChunk>,
        keyword_results: Vec<ScoredChunk>,
        top_k: usize,
    ) -> Vec<ScoredChunk> {
        let vector_results = self.normalize(vector_results);
        let keyword_results = self.normalize(keyword_results);

        let vector_weight = self.config.vector_weight;
        let keyword_weight = 1.0 - vector_weight;

        let mut combined_scores: HashMap<String, f32> = HashMap::new();
        let mut chunk_map: HashMap<String, ScoredChunk> = HashMap::new();

        for scored in vector_results {
            let id = scored.chunk.id.clone();
            combined_scores.insert(id.clone(), scored.score * vector_weight);
            chunk_map.insert(id, scored);
        }

        for scored in keyword_results {
            let id = scored.chunk.id.clone();
            let weighted = scored.score * keyword_weight;
            if let Some(existing) = combined_scores.get_mut(&id) {
                *existing += weighted;
            } else {
                combined_scores.insert(id.clone(), weighted);
                chunk_map.insert(id, scored);
            }
        }

        let mut results: Vec<ScoredChunk> = combined_scores
            .into_iter()
            .filter_map(|(id, score)| {
                chunk_map.remove(&id).map(|mut scored| {
                    scored.score = score;
                    scored.strategy = RetrievalStrategy::Hybrid;
                    scored
                })
            })
            .collect();

        sort_by_score_desc(&mut results);
        results.truncate(top_k);
        results
    }

    /// Divide a channel's scores by that channel's maximum, skipped when the
    /// maximum is not positive.
    fn normalize(&self, mut results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        if !self.config.normalize_scores || results.is_empty() {
            return results;
        }

        let max_score = results.iter().map(|r| r.score).fold(f32::MIN, f32::max);
        if max_score > 0.0 {
            for scored in &mut results {
                scored.score /= max_score;
            }
        }
        results
    }
}

/// Collapse the timeout wrapper and the channel result into one `Result`.
fn flatten_channel(
    outcome: std::result::Result<Result<Vec<ScoredChunk>>, tokio::time::error::Elapsed>,
    channel: &str,
) -> Result<Vec<ScoredChunk>> {
    match outcome {
        Ok(inner) => inner,
        Err(_) => Err(QuarryError::timeout(format!("{channel}_channel"))),
    }
}

/// Builder for [`HybridRetriever`].
#[derive(Debug, Default)]
pub struct HybridRetrieverBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    config: HybridConfig,
}

impl HybridRetrieverBuilder {
    /// Set the document store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the vector channel weight.
    #[must_use]
    pub fn vector_weight(mut self, weight: f32) -> Self {
        self.config.vector_weight = weight;
        self
    }

    /// Set the per-channel deadline.
    #[must_use]
    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.config.channel_timeout = timeout;
        self
    }

    /// Set whether per-channel max-score normalization is applied.
    #[must_use]
    pub fn normalize_scores(mut self, normalize: bool) -> Self {
        self.config.normalize_scores = normalize;
        self
    }

    /// Build the hybrid retriever.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the store is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<HybridRetriever> {
        let store = self
            .store
            .ok_or_else(|| QuarryError::configuration("document store is required"))?;
        HybridRetriever::with_config(store, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::Chunk;

    /// A store whose vector side can be scripted to fail independently of
    /// the raw document side.
    #[derive(Debug)]
    struct SplitStore {
        vector_results: Vec<ScoredChunk>,
        chunks: Vec<Chunk>,
        vector_fails: bool,
        keyword_fails: bool,
    }

    #[async_trait]
    impl DocumentStore for SplitStore {
        async fn retrieve_documents(
            &self,
            _collection: &str,
            _query: &VectorQuery,
        ) -> Result<Vec<ScoredChunk>> {
            if self.vector_fails {
                return Err(QuarryError::internal("vector index offline"));
            }
            Ok(self.vector_results.clone())
        }

        async fn get_documents(&self, _collection: &str) -> Result<Vec<Chunk>> {
            if self.keyword_fails {
                return Err(QuarryError::internal("corpus unreadable"));
            }
            Ok(self.chunks.clone())
        }
    }

    fn scored(id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk::new(
            Chunk::new(id, text, "doc", 0),
            score,
            RetrievalStrategy::Vector,
        )
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let store = Arc::new(SplitStore {
            vector_results: vec![],
            chunks: vec![],
            vector_fails: false,
            keyword_fails: false,
        });
        let err = HybridRetriever::with_config(
            store,
            HybridConfig {
                vector_weight: 1.5,
                ..HybridConfig::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, QuarryError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_both_channels_reward_shared_chunks() {
        // "shared" is found by both channels, "vector only" by one.
        let store = Arc::new(SplitStore {
            vector_results: vec![
                scored("shared", "rust language", 0.8),
                scored("solo", "other topic entirely", 0.8),
            ],
            chunks: vec![Chunk::new("shared", "rust language", "doc", 0)],
            vector_fails: false,
            keyword_fails: false,
        });
        let retriever = HybridRetriever::new(store);

        let retrieval = retriever
            .retrieve("col", &VectorQuery::new("rust language"))
            .await
            .unwrap();

        assert!(retrieval.degraded.is_none());
        assert_eq!(retrieval.results[0].chunk.id, "shared");
        let shared = &retrieval.results[0];
        let solo = retrieval
            .results
            .iter()
            .find(|r| r.chunk.id == "solo")
            .unwrap();
        assert!(shared.score >= solo.score);
    }

    #[tokio::test]
    async fn test_degrades_to_keyword_on_vector_failure() {
        let store = Arc::new(SplitStore {
            vector_results: vec![],
            chunks: vec![
                Chunk::new("k1", "rust systems programming", "d1", 0),
                Chunk::new("k2", "rust tooling", "d2", 0),
            ],
            vector_fails: true,
            keyword_fails: false,
        });
        let retriever = HybridRetriever::new(store);

        let retrieval = retriever
            .retrieve("col", &VectorQuery::new("rust"))
            .await
            .unwrap();

        assert_eq!(retrieval.degraded, Some(RetrievalStrategy::Vector));
        assert_eq!(retrieval.results.len(), 2);
        // Keyword ordering survives the degraded fusion.
        assert!(retrieval.results[0].score >= retrieval.results[1].score);
    }

    #[tokio::test]
    async fn test_both_channels_failing_is_an_error() {
        let store = Arc::new(SplitStore {
            vector_results: vec![],
            chunks: vec![],
            vector_fails: true,
            keyword_fails: true,
        });
        let retriever = HybridRetriever::new(store);

        let err = retriever
            .retrieve("col", &VectorQuery::new("rust"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_results_tagged_hybrid_and_truncated() {
        let store = Arc::new(SplitStore {
            vector_results: (0..8)
                .map(|i| scored(&format!("v{i}"), "rust text", 0.5))
                .collect(),
            chunks: vec![Chunk::new("k1", "rust text", "d", 0)],
            vector_fails: false,
            keyword_fails: false,
        });
        let retriever = HybridRetriever::new(store);

        let retrieval = retriever
            .retrieve("col", &VectorQuery::new("rust").with_top_k(3))
            .await
            .unwrap();

        assert_eq!(retrieval.results.len(), 3);
        assert!(retrieval
            .results
            .iter()
            .all(|r| r.strategy == RetrievalStrategy::Hybrid));
    }
}
