//! Suggested question generation for document collections.
//!
//! Candidates move through a fixed lifecycle: RAW (LLM output lines) →
//! VALIDATED (shape and relevance checks) → DEDUPED (normalized-key, first
//! occurrence wins) → RANKED (context overlap with a length tie-break) →
//! STORED (capacity-gated against the persisted set).

pub mod conversation;

pub use conversation::{ConversationSuggester, SuggestionConfig};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use quarry_core::traits::{QuestionRepository, TextGenerator};
use quarry_core::{Chunk, GenerationOptions, QuarryError, Result, SuggestedQuestion};

/// Leading numbering or bullet markers on an LLM output line.
static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]\s*|[-•*]\s*)+").expect("static regex"));

/// Configuration for [`QuestionService`].
#[derive(Debug, Clone)]
pub struct QuestionConfig {
    /// Hard cap on live questions per collection.
    pub max_questions_per_collection: usize,

    /// Budget of chunks fed to generation; larger collections are
    /// stratified-sampled down to this many.
    pub max_chunks_to_process: usize,

    /// Character budget of one packed context batch.
    pub available_context_length: usize,

    /// Questions requested from the LLM per batch.
    pub questions_per_batch: usize,

    /// Minimum accepted question length, in characters.
    pub min_question_length: usize,

    /// Minimum lexical-overlap relevance against the source context.
    pub relevance_threshold: f32,

    /// Fraction of the per-batch quota targeted at multi-hop questions when
    /// the source spans at least two chunks.
    pub cot_question_ratio: f32,

    /// Maximum generation batches in flight at once.
    pub concurrency: usize,

    /// Deadline for one generation call.
    pub timeout: Duration,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            max_questions_per_collection: 15,
            max_chunks_to_process: 8,
            available_context_length: 4000,
            questions_per_batch: 5,
            min_question_length: 10,
            relevance_threshold: 0.1,
            cot_question_ratio: 0.4,
            concurrency: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

impl QuestionConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] for zero caps/budgets or
    /// out-of-range ratios.
    pub fn validate(&self) -> Result<()> {
        if self.max_questions_per_collection == 0 {
            return Err(QuarryError::configuration(
                "max_questions_per_collection must be positive",
            ));
        }
        if self.max_chunks_to_process == 0 {
            return Err(QuarryError::configuration(
                "max_chunks_to_process must be positive",
            ));
        }
        if self.available_context_length == 0 {
            return Err(QuarryError::configuration(
                "available_context_length must be positive",
            ));
        }
        if self.questions_per_batch == 0 {
            return Err(QuarryError::configuration(
                "questions_per_batch must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.cot_question_ratio) {
            return Err(QuarryError::configuration(
                "cot_question_ratio must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(QuarryError::configuration(
                "relevance_threshold must be within [0, 1]",
            ));
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

/// A packed context batch and how many chunks it spans.
#[derive(Debug, Clone)]
struct PackedBatch {
    text: String,
    chunk_span: usize,
}

/// Generates, validates, deduplicates, ranks, and persists suggested
/// questions for a collection.
#[derive(Debug)]
pub struct QuestionService {
    generator: Arc<dyn TextGenerator>,
    repository: Arc<dyn QuestionRepository>,
    config: QuestionConfig,
}

impl QuestionService {
    /// Create a service with default configuration.
    pub fn new(generator: Arc<dyn TextGenerator>, repository: Arc<dyn QuestionRepository>) -> Self {
        Self {
            generator,
            repository,
            config: QuestionConfig::default(),
        }
    }

    /// Create a service with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the configuration is
    /// invalid.
    pub fn with_config(
        generator: Arc<dyn TextGenerator>,
        repository: Arc<dyn QuestionRepository>,
        config: QuestionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator,
            repository,
            config,
        })
    }

    /// Generate questions from the given chunks and persist the admitted
    /// ones, respecting the collection's capacity.
    ///
    /// Returns the newly persisted questions (possibly empty when the
    /// collection is already at capacity).
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Llm`] only when every generation batch failed
    /// and nothing was produced; single-batch failures are logged and
    /// tolerated. Repository failures propagate.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn suggest_questions(
        &self,
        collection_id: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<SuggestedQuestion>> {
        let existing = self.repository.get_by_collection(collection_id).await?;
        let capacity = self
            .config
            .max_questions_per_collection
            .saturating_sub(existing.len());
        if capacity == 0 {
            info!("Collection already at question capacity, nothing admitted");
            return Ok(Vec::new());
        }

        let ranked = self.generate_candidates(chunks, capacity).await?;

        // Dedup against the persisted set, not just this batch.
        let persisted_keys: HashSet<String> =
            existing.iter().map(|q| normalize_key(&q.question)).collect();

        let mut created = Vec::new();
        for question in ranked {
            if created.len() >= capacity {
                break;
            }
            if persisted_keys.contains(&normalize_key(&question)) {
                debug!("Skipping candidate already persisted");
                continue;
            }
            let record = self
                .repository
                .create(SuggestedQuestion::new(collection_id, question))
                .await?;
            created.push(record);
        }

        info!("Admitted {} new questions", created.len());
        Ok(created)
    }

    /// Delete every existing question for the collection, then generate a
    /// fresh set.
    #[instrument(skip(self, chunks))]
    pub async fn regenerate_questions(
        &self,
        collection_id: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<SuggestedQuestion>> {
        let removed = self.repository.delete_by_collection(collection_id).await?;
        info!("Removed {removed} existing questions before regeneration");
        self.suggest_questions(collection_id, chunks).await
    }

    /// Run the generation pipeline up to the RANKED stage.
    async fn generate_candidates(&self, chunks: &[Chunk], needed: usize) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let selected = select_chunks(chunks, self.config.max_chunks_to_process);
        let batches = self.pack_batches(&selected);
        let context: String = batches
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompts = self.build_prompts(&batches);
        let total_batches = prompts.len();
        let mut failed_batches = 0;
        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut outcomes = stream::iter(prompts.into_iter().map(|(prompt, batch_text)| {
            let generator = Arc::clone(&self.generator);
            let timeout = self.config.timeout;
            async move {
                let options = GenerationOptions::new().with_timeout(timeout);
                let call = generator.generate_text(&prompt, &options);
                let response = tokio::time::timeout(timeout, call)
                    .await
                    .map_err(|_| QuarryError::timeout("question_batch"))
                    .and_then(|r| r.map_err(|e| QuarryError::llm(e.to_string())));
                (batch_text, response)
            }
        }))
        .buffer_unordered(self.config.concurrency);

        while let Some((batch_text, response)) = outcomes.next().await {
            match response {
                Ok(text) => {
                    for raw in extract_candidates(&text) {
                        let Some(valid) = self.validate_candidate(&raw, &batch_text) else {
                            continue;
                        };
                        // First occurrence wins.
                        if seen.insert(normalize_key(&valid)) {
                            candidates.push(valid);
                        }
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!("Question batch failed: {e}");
                }
            }

            // Best-effort early exit once the capacity is covered; remaining
            // in-flight batches are dropped.
            if candidates.len() >= needed {
                debug!("Early exit with {} candidates", candidates.len());
                break;
            }
        }
        drop(outcomes);

        if candidates.is_empty() && failed_batches == total_batches && total_batches > 0 {
            return Err(QuarryError::llm(format!(
                "all {total_batches} question generation batches failed"
            )));
        }

        Ok(self.rank_candidates(candidates, &context))
    }

    /// Concatenate selected chunks into batches bounded by the context
    /// budget. An over-long single chunk is truncated to fit, never dropped.
    fn pack_batches(&self, selected: &[&Chunk]) -> Vec<PackedBatch> {
        let budget = self.config.available_context_length;
        let mut batches = Vec::new();
        let mut current = String::new();
        let mut span = 0;

        for chunk in selected {
            let text = if chunk.text.chars().count() > budget {
                chunk.text.chars().take(budget).collect::<String>()
            } else {
                chunk.text.clone()
            };

            if !current.is_empty() && current.chars().count() + text.chars().count() + 1 > budget {
                batches.push(PackedBatch {
                    text: std::mem::take(&mut current),
                    chunk_span: span,
                });
                span = 0;
            }

            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&text);
            span += 1;
        }

        if !current.is_empty() {
            batches.push(PackedBatch {
                text: current,
                chunk_span: span,
            });
        }
        batches
    }

    /// Build one standard prompt per batch, plus a multi-hop prompt for
    /// batches spanning at least two chunks when the ratio calls for it.
    fn build_prompts(&self, batches: &[PackedBatch]) -> Vec<(String, String)> {
        let per_batch = self.config.questions_per_batch;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cot_count = (self.config.cot_question_ratio * per_batch as f32).ceil() as usize;

        let mut prompts = Vec::new();
        for batch in batches {
            prompts.push((standard_prompt(&batch.text, per_batch), batch.text.clone()));
            if batch.chunk_span >= 2 && cot_count > 0 {
                prompts.push((multi_hop_prompt(&batch.text, cot_count), batch.text.clone()));
            }
        }
        prompts
    }

    /// Shape and relevance checks; returns the cleaned question on success.
    fn validate_candidate(&self, raw: &str, context: &str) -> Option<String> {
        let cleaned = NUMBERING.replace(raw.trim(), "").trim().to_string();
        if cleaned.chars().count() < self.config.min_question_length {
            return None;
        }
        if lexical_overlap(&cleaned, context) < self.config.relevance_threshold {
            return None;
        }
        Some(cleaned)
    }

    /// Score candidates by context term-overlap with a length tie-break,
    /// re-validating rather than trusting the earlier pass.
    fn rank_candidates(&self, candidates: Vec<String>, context: &str) -> Vec<String> {
        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .filter_map(|question| {
                let question = self.validate_candidate(&question, context)?;
                let overlap = lexical_overlap(&question, context);
                #[allow(clippy::cast_precision_loss)]
                let tie_break = (question.chars().count().min(100) as f32) / 1000.0;
                Some((question, overlap + tie_break))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(question, _)| question).collect()
    }
}

/// Stratified chunk selection: everything when within budget, otherwise an
/// even spread across the index range that always includes the first and
/// last chunk.
fn select_chunks(chunks: &[Chunk], budget: usize) -> Vec<&Chunk> {
    if chunks.len() <= budget {
        return chunks.iter().collect();
    }
    if budget == 1 {
        return vec![&chunks[0]];
    }

    let mut selected = Vec::with_capacity(budget);
    let last = chunks.len() - 1;
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    for i in 0..budget {
        let idx = ((i as f32) * (last as f32) / ((budget - 1) as f32)).round() as usize;
        selected.push(&chunks[idx.min(last)]);
    }
    selected.dedup_by_key(|c| c.id.clone());
    selected
}

/// One candidate per output line; a line qualifies only when it contains
/// exactly one `'?'`, guarding against run-ons and noise.
fn extract_candidates(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.matches('?').count() == 1)
        .map(ToString::to_string)
        .collect()
}

/// Normalized dedup key: lowercase with numbering and punctuation stripped.
fn normalize_key(question: &str) -> String {
    let stripped = NUMBERING.replace(question.trim(), "");
    stripped
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fraction of the question's terms that appear in the context.
fn lexical_overlap(question: &str, context: &str) -> f32 {
    let question_terms: HashSet<String> = terms_of(question).collect();
    if question_terms.is_empty() {
        return 0.0;
    }
    let context_terms: HashSet<String> = terms_of(context).collect();

    let matched = question_terms
        .iter()
        .filter(|t| context_terms.contains(*t))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        matched as f32 / question_terms.len() as f32
    }
}

fn terms_of(text: &str) -> impl Iterator<Item = String> + '_ {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|w| w.len() >= 2)
        .collect::<Vec<_>>()
        .into_iter()
}

fn standard_prompt(context: &str, count: usize) -> String {
    format!(
        "Based on the following content, write {count} questions a reader \
         might ask. Write one question per line, and make each answerable \
         from the content alone.\n\nContent:\n{context}\n\nQuestions:"
    )
}

fn multi_hop_prompt(context: &str, count: usize) -> String {
    format!(
        "The following content consists of several passages. Write {count} \
         questions that can only be answered by combining information from \
         at least two different passages. Write one question per line.\n\n\
         Content:\n{context}\n\nQuestions:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_requires_exactly_one_question_mark() {
        let response = "1. What is AI\n2. What is AI?\nIs this real?? Or not??\n\nWhy use Rust?";
        let candidates = extract_candidates(response);
        assert_eq!(candidates, vec!["2. What is AI?", "Why use Rust?"]);
    }

    #[test]
    fn test_normalize_key_strips_numbering_and_punctuation() {
        assert_eq!(normalize_key("1. What is AI?"), "what is ai");
        assert_eq!(normalize_key("What is AI?"), "what is ai");
        assert_eq!(normalize_key("  - What, is AI!?  "), "what is ai");
    }

    #[test]
    fn test_dedup_idempotence() {
        let questions = vec![
            "What is Rust?".to_string(),
            "How does ownership work?".to_string(),
        ];
        let mut seen = HashSet::new();
        let deduped: Vec<String> = questions
            .iter()
            .filter(|q| seen.insert(normalize_key(q)))
            .cloned()
            .collect();
        assert_eq!(deduped, questions);

        let mut seen = HashSet::new();
        let again: Vec<String> = deduped
            .iter()
            .filter(|q| seen.insert(normalize_key(q)))
            .cloned()
            .collect();
        assert_eq!(again, deduped);
    }

    #[test]
    fn test_select_chunks_within_budget_keeps_all() {
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk::new(format!("c{i}"), "text", "d", i))
            .collect();
        let selected = select_chunks(&chunks, 8);
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn test_select_chunks_stratified_includes_ends() {
        let chunks: Vec<Chunk> = (0..100)
            .map(|i| Chunk::new(format!("c{i}"), "text", "d", i))
            .collect();
        let selected = select_chunks(&chunks, 8);
        assert_eq!(selected.len(), 8);
        assert_eq!(selected.first().unwrap().id, "c0");
        assert_eq!(selected.last().unwrap().id, "c99");
    }

    #[test]
    fn test_lexical_overlap() {
        let context = "Rust is a systems programming language focused on safety";
        assert!(lexical_overlap("What is Rust?", context) > 0.0);
        assert_eq!(lexical_overlap("quantum blockchain pizza", context), 0.0);
    }

    #[test]
    fn test_pack_truncates_oversized_chunk() {
        let service = QuestionService::with_config(
            test_generator(),
            test_repository(),
            QuestionConfig {
                available_context_length: 50,
                ..QuestionConfig::default()
            },
        )
        .unwrap();

        let long_chunk = Chunk::new("c1", "x".repeat(500), "d", 0);
        let selected = vec![&long_chunk];
        let batches = service.pack_batches(&selected);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].text.chars().count(), 50);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let config = QuestionConfig {
            cot_question_ratio: 1.5,
            ..QuestionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn test_generator() -> Arc<dyn TextGenerator> {
        #[derive(Debug)]
        struct Silent;

        #[async_trait::async_trait]
        impl TextGenerator for Silent {
            async fn generate_text(
                &self,
                _prompt: &str,
                _options: &GenerationOptions,
            ) -> Result<String> {
                Ok(String::new())
            }
        }
        Arc::new(Silent)
    }

    fn test_repository() -> Arc<dyn QuestionRepository> {
        #[derive(Debug)]
        struct Empty;

        #[async_trait::async_trait]
        impl QuestionRepository for Empty {
            async fn create(&self, question: SuggestedQuestion) -> Result<SuggestedQuestion> {
                Ok(question)
            }

            async fn get_by_collection(
                &self,
                _collection_id: &str,
            ) -> Result<Vec<SuggestedQuestion>> {
                Ok(vec![])
            }

            async fn delete(&self, _id: uuid::Uuid) -> Result<()> {
                Ok(())
            }

            async fn delete_by_collection(&self, _collection_id: &str) -> Result<usize> {
                Ok(0)
            }
        }
        Arc::new(Empty)
    }
}
