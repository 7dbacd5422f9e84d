//! LLM-judged reranking of a retrieved candidate set.
//!
//! A second-pass, costlier reordering: candidates are scored by an LLM in
//! batches, normalized onto a configurable scale, and re-sorted. Scoring is
//! best-effort with an observable fallback — if the provider is unavailable
//! or any batch fails, the original ordering is returned and
//! [`RerankOutcome::fallback_used`] is set so quality regressions stay
//! visible in telemetry.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use quarry_core::traits::TextGenerator;
use quarry_core::types::chunk::sort_by_score_desc;
use quarry_core::{GenerationOptions, QuarryError, Result, ScoredChunk};

/// Default prompt for scoring a batch of candidates.
const DEFAULT_RERANK_PROMPT: &str = r"Rate how relevant each document is to the query on a scale from 0 to {scale}.

Query: {query}

Documents:
{documents}

Reply with one line per document in the form 'N: score', for example '1: 7.5'.
";

/// Maximum characters of a candidate shown to the scoring prompt.
const PROMPT_EXCERPT_CHARS: usize = 500;

/// Configuration for [`LlmReranker`].
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Upper bound of the scoring scale; scores are clamped onto
    /// [0, `score_scale`].
    pub score_scale: f32,

    /// Candidates per LLM call.
    pub batch_size: usize,

    /// Maximum scoring calls in flight at once.
    pub concurrency: usize,

    /// Deadline for one scoring call.
    pub timeout: Duration,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            score_scale: 10.0,
            batch_size: 10,
            concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RerankerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] for non-positive scale, batch
    /// size, concurrency, or timeout.
    pub fn validate(&self) -> Result<()> {
        if self.score_scale <= 0.0 {
            return Err(QuarryError::configuration("score_scale must be positive"));
        }
        if self.batch_size == 0 {
            return Err(QuarryError::configuration("batch_size must be positive"));
        }
        if self.concurrency == 0 {
            return Err(QuarryError::configuration("concurrency must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(QuarryError::configuration("timeout must be positive"));
        }
        Ok(())
    }
}

/// The result of a rerank call, with cost accounting and the fallback flag.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    /// Reranked (or, under fallback, originally-ordered) results truncated
    /// to the requested count.
    pub results: Vec<ScoredChunk>,

    /// True when scoring failed and the original ordering was kept.
    pub fallback_used: bool,

    /// Number of LLM calls issued.
    pub llm_calls: usize,

    /// Rough token usage across all calls (4 chars per token heuristic).
    pub estimated_tokens: usize,
}

/// Reranks candidates by asking an LLM to score each against the query.
#[derive(Debug)]
pub struct LlmReranker {
    generator: Arc<dyn TextGenerator>,
    config: RerankerConfig,
}

impl LlmReranker {
    /// Create a reranker with default configuration.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            config: RerankerConfig::default(),
        }
    }

    /// Create a reranker with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the configuration is
    /// invalid.
    pub fn with_config(generator: Arc<dyn TextGenerator>, config: RerankerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator, config })
    }

    /// Rerank candidates and truncate to `top_k`.
    ///
    /// Batches are issued concurrently up to the configured limit, and their
    /// scores are reassembled by original candidate index before the final
    /// descending sort, so issuance-order artifacts never leak into the
    /// output ordering.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredChunk>,
        top_k: usize,
    ) -> Result<RerankOutcome> {
        if candidates.is_empty() {
            return Ok(RerankOutcome {
                results: Vec::new(),
                fallback_used: false,
                llm_calls: 0,
                estimated_tokens: 0,
            });
        }

        debug!("Reranking {} candidates", candidates.len());

        // Batches carry the global index of each candidate so concurrent
        // completion order cannot scramble reassembly.
        let batches: Vec<(usize, Vec<&ScoredChunk>)> = candidates
            .chunks(self.config.batch_size)
            .enumerate()
            .map(|(batch_idx, chunk)| (batch_idx * self.config.batch_size, chunk.iter().collect()))
            .collect();

        let batch_count = batches.len();
        let mut llm_calls = 0;
        let mut estimated_tokens = 0;
        let mut scores: Vec<Option<f32>> = vec![None; candidates.len()];
        let mut failed = false;

        let mut outcomes = stream::iter(batches.into_iter().map(|(offset, batch)| {
            let prompt = self.build_prompt(query, &batch);
            async move {
                let result = self.score_batch(&prompt, batch.len()).await;
                (offset, prompt.len(), result)
            }
        }))
        .buffer_unordered(self.config.concurrency);

        while let Some((offset, prompt_chars, result)) = outcomes.next().await {
            llm_calls += 1;
            match result {
                Ok((batch_scores, response_chars)) => {
                    estimated_tokens += (prompt_chars + response_chars) / 4;
                    for (i, score) in batch_scores.into_iter().enumerate() {
                        if let Some(slot) = scores.get_mut(offset + i) {
                            *slot = Some(score);
                        }
                    }
                }
                Err(e) => {
                    warn!("Rerank batch at offset {offset} failed: {e}");
                    estimated_tokens += prompt_chars / 4;
                    failed = true;
                }
            }
        }
        drop(outcomes);

        if failed {
            info!("Rerank fell back to original ordering after a batch failure");
            let mut results = candidates;
            results.truncate(top_k);
            return Ok(RerankOutcome {
                results,
                fallback_used: true,
                llm_calls,
                estimated_tokens,
            });
        }

        let neutral = self.config.score_scale / 2.0;
        let mut results: Vec<ScoredChunk> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut candidate, score)| {
                // Unparsed candidates keep a neutral score so the final sort
                // still covers every candidate.
                candidate.score = score.unwrap_or(neutral);
                candidate
            })
            .collect();

        sort_by_score_desc(&mut results);
        results.truncate(top_k);

        info!(
            "Reranked down to {} results across {} batches",
            results.len(),
            batch_count
        );
        Ok(RerankOutcome {
            results,
            fallback_used: false,
            llm_calls,
            estimated_tokens,
        })
    }

    fn build_prompt(&self, query: &str, batch: &[&ScoredChunk]) -> String {
        let documents = batch
            .iter()
            .enumerate()
            .map(|(i, scored)| {
                let excerpt: String = scored.chunk.text.chars().take(PROMPT_EXCERPT_CHARS).collect();
                format!("Document {}: {}", i + 1, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        DEFAULT_RERANK_PROMPT
            .replace("{scale}", &format!("{}", self.config.score_scale))
            .replace("{query}", query)
            .replace("{documents}", &documents)
    }

    /// Score one batch; returns per-candidate scores (by in-batch position)
    /// and the response length for token accounting.
    async fn score_batch(&self, prompt: &str, batch_len: usize) -> Result<(Vec<f32>, usize)> {
        let options = GenerationOptions::new().with_timeout(self.config.timeout);
        let call = self.generator.generate_text(prompt, &options);
        let response = tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| QuarryError::timeout("rerank_batch"))?
            .map_err(|e| QuarryError::llm(format!("rerank scoring failed: {e}")))?;

        let mut scores = vec![None; batch_len];
        for line in response.lines() {
            if let Some((index, score)) = parse_score_line(line) {
                if index >= 1 && index <= batch_len {
                    scores[index - 1] = Some(score.clamp(0.0, self.config.score_scale));
                }
            }
        }

        if scores.iter().all(Option::is_none) {
            return Err(QuarryError::llm("no parseable scores in rerank response"));
        }

        let neutral = self.config.score_scale / 2.0;
        let scores = scores
            .into_iter()
            .map(|s| s.unwrap_or(neutral))
            .collect();
        Ok((scores, response.len()))
    }
}

/// Parse a "N: score" line; tolerates a "Document N: score" prefix.
fn parse_score_line(line: &str) -> Option<(usize, f32)> {
    let line = line.trim();
    let (head, tail) = line.split_once(':')?;
    let index = head.split_whitespace().last()?.parse::<usize>().ok()?;
    let score = tail.trim().parse::<f32>().ok()?;
    Some((index, score))
}
