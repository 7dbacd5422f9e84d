//! Source attribution types for multi-step reasoning provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of an attribution excerpt, in characters.
pub const MAX_EXCERPT_LEN: usize = 200;

/// Provenance record for a single source document used while answering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceAttribution {
    /// Identifier of the source document.
    pub document_id: String,

    /// Display title, when known.
    pub title: Option<String>,

    /// Relevance in [0, 1].
    pub relevance_score: f32,

    /// Short excerpt of the matched content, at most
    /// [`MAX_EXCERPT_LEN`] characters.
    pub excerpt: Option<String>,

    /// Index of the matched chunk within the document, when known.
    pub chunk_index: Option<usize>,

    /// Rank of the document in the retrieval result it came from.
    pub retrieval_rank: Option<usize>,
}

impl SourceAttribution {
    /// Create an attribution, clamping the relevance score into [0, 1] and
    /// truncating the excerpt to [`MAX_EXCERPT_LEN`] characters.
    pub fn new<S: Into<String>>(document_id: S, relevance_score: f32) -> Self {
        Self {
            document_id: document_id.into(),
            title: None,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            excerpt: None,
            chunk_index: None,
            retrieval_rank: None,
        }
    }

    /// Set the display title.
    #[must_use]
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the excerpt, truncated to [`MAX_EXCERPT_LEN`] characters.
    #[must_use]
    pub fn with_excerpt<S: Into<String>>(mut self, excerpt: S) -> Self {
        self.excerpt = Some(truncate_excerpt(&excerpt.into()));
        self
    }

    /// Set the chunk index.
    #[must_use]
    pub fn with_chunk_index(mut self, chunk_index: usize) -> Self {
        self.chunk_index = Some(chunk_index);
        self
    }

    /// Set the retrieval rank.
    #[must_use]
    pub fn with_retrieval_rank(mut self, rank: usize) -> Self {
        self.retrieval_rank = Some(rank);
        self
    }
}

/// Truncate a context excerpt to [`MAX_EXCERPT_LEN`] characters.
///
/// Operates on characters, not bytes, so multi-byte text cannot be split
/// mid-codepoint.
#[must_use]
pub fn truncate_excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_LEN).collect()
}

/// Aggregated provenance across all steps of a reasoning chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceSummary {
    /// All distinct sources, deduplicated by document id keeping the maximum
    /// relevance seen, sorted descending by relevance.
    pub all_sources: Vec<SourceAttribution>,

    /// The curated top subset chosen for end-user display: the top 3 with
    /// relevance above 0.7, or the top 3 overall when none qualify.
    pub primary_sources: Vec<SourceAttribution>,

    /// Ordered document ids used by each step, keyed by step number.
    pub source_usage_by_step: BTreeMap<usize, Vec<String>>,
}

/// One step of an externally-orchestrated reasoning chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    /// 1-based step number.
    pub step_number: usize,

    /// The question this step answered.
    pub question: String,

    /// The intermediate answer produced by this step.
    pub intermediate_answer: String,

    /// Confidence in the intermediate answer, in [0, 1].
    pub confidence_score: f32,

    /// Source provenance for this step.
    pub source_attributions: Vec<SourceAttribution>,

    /// Raw context strings used by the step, as a fallback when no
    /// structured retrieval results were recorded.
    pub context_used: Option<Vec<String>>,
}

impl ReasoningStep {
    /// Create a reasoning step with no attributions yet.
    pub fn new<S1: Into<String>, S2: Into<String>>(
        step_number: usize,
        question: S1,
        intermediate_answer: S2,
        confidence_score: f32,
    ) -> Self {
        Self {
            step_number,
            question: question.into(),
            intermediate_answer: intermediate_answer.into(),
            confidence_score,
            source_attributions: Vec::new(),
            context_used: None,
        }
    }

    /// Attach the raw context strings the step consumed.
    #[must_use]
    pub fn with_context_used(mut self, context: Vec<String>) -> Self {
        self.context_used = Some(context);
        self
    }
}
