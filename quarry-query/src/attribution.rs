//! Source provenance for multi-step reasoning.
//!
//! Builds per-step [`SourceAttribution`] records from either structured
//! search results or raw context strings, aggregates them across reasoning
//! steps into a [`SourceSummary`], and renders a display-ready read model.
//!
//! The service owns a per-instance attribution cache keyed by document id.
//! The cache is last-write-wins with no eviction, is not persisted, and is
//! not thread-safe; hosts that share a service across threads must wrap it
//! themselves.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, instrument};

use quarry_core::types::attribution::truncate_excerpt;
use quarry_core::{ReasoningStep, SourceAttribution, SourceSummary};

/// Relevance assigned when a structured hit carries no coercible score.
pub const DEFAULT_HIT_RELEVANCE: f32 = 0.5;

/// Relevance bar for primary-source selection.
const PRIMARY_RELEVANCE_BAR: f32 = 0.7;

/// How many primary sources to surface.
const PRIMARY_COUNT: usize = 3;

/// A structured search hit after normalization from its heterogeneous JSON
/// shape.
///
/// Producers disagree on field names (`score` vs `relevance_score`,
/// `content` vs `text`) and types (string vs integer ids); this adapter
/// coerces them once, at the boundary, so nothing downstream branches on key
/// presence.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Source document identifier.
    pub document_id: String,

    /// Display title, when present.
    pub title: Option<String>,

    /// Relevance score; defaults to [`DEFAULT_HIT_RELEVANCE`] when
    /// uncoercible.
    pub score: f32,

    /// Matched content, when present.
    pub content: Option<String>,

    /// Chunk index within the document, when present.
    pub chunk_index: Option<usize>,
}

impl SearchHit {
    /// Normalize a heterogeneous JSON search result.
    ///
    /// Returns the hit plus a flag that is true when the relevance score was
    /// missing or uncoercible and the default was used — observable rather
    /// than a swallowed failure.
    #[must_use]
    pub fn from_value(value: &serde_json::Value, position: usize) -> (Self, bool) {
        let document_id = ["document_id", "id", "doc_id"]
            .iter()
            .find_map(|key| coerce_id(value.get(*key)))
            .unwrap_or_else(|| format!("result_{}", position + 1));

        let title = value
            .get("title")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        let (score, score_fallback) = ["score", "relevance_score", "similarity"]
            .iter()
            .find_map(|key| coerce_score(value.get(*key)))
            .map_or((DEFAULT_HIT_RELEVANCE, true), |score| (score, false));

        let content = ["content", "text", "excerpt"]
            .iter()
            .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
            .map(ToString::to_string);

        let chunk_index = value
            .get("chunk_index")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| usize::try_from(v).ok());

        (
            Self {
                document_id,
                title,
                score,
                content,
                chunk_index,
            },
            score_fallback,
        )
    }
}

/// Coerce a JSON id field: strings pass through, integers are stringified.
fn coerce_id(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a JSON score field: numbers pass through, numeric strings parse.
fn coerce_score(value: Option<&serde_json::Value>) -> Option<f32> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64().map(|f| {
            #[allow(clippy::cast_possible_truncation)]
            {
                f as f32
            }
        }),
        serde_json::Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

/// Parse an embedded `"id: <token>"` prefix from a raw context entry.
///
/// Returns the parsed id, or the synthetic `context_doc_N` fallback with the
/// flag set when no usable token is present.
#[must_use]
pub fn parse_embedded_id(entry: &str, position: usize) -> (String, bool) {
    if let Some(rest) = entry.trim_start().strip_prefix("id:") {
        if let Some(token) = rest.split_whitespace().next() {
            return (token.to_string(), false);
        }
    }
    (format!("context_doc_{}", position + 1), true)
}

/// Builds and aggregates source attributions across reasoning steps.
#[derive(Debug, Default)]
pub struct SourceAttributionService {
    /// Attribution cache keyed by document id. Last-write-wins, no
    /// eviction, instance-local.
    cache: HashMap<String, SourceAttribution>,
}

impl SourceAttributionService {
    /// Create a service with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an attribution and cache it by document id.
    ///
    /// The relevance score is clamped into [0, 1] and the excerpt truncated
    /// to 200 characters.
    pub fn create_source_attribution(
        &mut self,
        document_id: &str,
        title: Option<&str>,
        relevance_score: f32,
        excerpt: Option<&str>,
        chunk_index: Option<usize>,
        retrieval_rank: Option<usize>,
    ) -> SourceAttribution {
        let mut attribution = SourceAttribution::new(document_id, relevance_score);
        if let Some(title) = title {
            attribution = attribution.with_title(title);
        }
        if let Some(excerpt) = excerpt {
            attribution = attribution.with_excerpt(excerpt);
        }
        if let Some(chunk_index) = chunk_index {
            attribution = attribution.with_chunk_index(chunk_index);
        }
        if let Some(rank) = retrieval_rank {
            attribution = attribution.with_retrieval_rank(rank);
        }

        self.cache
            .insert(attribution.document_id.clone(), attribution.clone());
        attribution
    }

    /// Look up a cached attribution.
    #[must_use]
    pub fn cached_attribution(&self, document_id: &str) -> Option<&SourceAttribution> {
        self.cache.get(document_id)
    }

    /// Build attributions from retrieval output.
    ///
    /// Structured `search_results`, when present, take precedence entirely
    /// over the raw `context_documents` — the two are never merged. The raw
    /// fallback assigns descending synthetic relevance (1.0, 0.9, 0.8, …,
    /// floored at 0) and uses each entry's position as the retrieval rank.
    #[instrument(skip_all, fields(context_documents = context_documents.len()))]
    pub fn extract_sources_from_context(
        &mut self,
        context_documents: &[String],
        search_results: Option<&[serde_json::Value]>,
    ) -> Vec<SourceAttribution> {
        if let Some(hits) = search_results {
            debug!("Using {} structured search results", hits.len());
            return hits
                .iter()
                .enumerate()
                .map(|(rank, value)| {
                    let (hit, used_fallback) = SearchHit::from_value(value, rank);
                    if used_fallback {
                        debug!("Hit {rank} had no coercible score, defaulted");
                    }
                    self.create_source_attribution(
                        &hit.document_id,
                        hit.title.as_deref(),
                        hit.score,
                        hit.content.as_deref(),
                        hit.chunk_index,
                        Some(rank),
                    )
                })
                .collect();
        }

        debug!("Falling back to raw context documents");
        context_documents
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .enumerate()
            .map(|(position, entry)| {
                let (document_id, _synthetic) = parse_embedded_id(entry, position);
                #[allow(clippy::cast_precision_loss)]
                let relevance = (1.0 - 0.1 * position as f32).max(0.0);
                self.create_source_attribution(
                    &document_id,
                    None,
                    relevance,
                    Some(entry),
                    None,
                    Some(position),
                )
            })
            .collect()
    }

    /// Aggregate the attributions of a reasoning chain into a summary.
    ///
    /// Sources are deduplicated by document id keeping the maximum relevance
    /// seen across steps; each step's ordered document id list is preserved.
    #[must_use]
    #[instrument(skip_all, fields(steps = steps.len()))]
    pub fn aggregate_sources_across_steps(&self, steps: &[ReasoningStep]) -> SourceSummary {
        let mut best: HashMap<String, SourceAttribution> = HashMap::new();
        let mut source_usage_by_step: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        for step in steps {
            let mut step_ids = Vec::new();
            for attribution in &step.source_attributions {
                step_ids.push(attribution.document_id.clone());
                best.entry(attribution.document_id.clone())
                    .and_modify(|existing| {
                        if attribution.relevance_score > existing.relevance_score {
                            *existing = attribution.clone();
                        }
                    })
                    .or_insert_with(|| attribution.clone());
            }
            source_usage_by_step.insert(step.step_number, step_ids);
        }

        let mut all_sources: Vec<SourceAttribution> = best.into_values().collect();
        all_sources.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let primary_sources = select_primary(&all_sources);

        SourceSummary {
            all_sources,
            primary_sources,
            source_usage_by_step,
        }
    }

    /// Fill a reasoning step's attributions.
    ///
    /// Structured `retrieved_documents` take precedence over the step's raw
    /// `context_used`; with neither present the attributions stay empty,
    /// which is not an error.
    pub fn enhance_reasoning_step_with_sources(
        &mut self,
        step: &mut ReasoningStep,
        retrieved_documents: Option<&[serde_json::Value]>,
    ) {
        let attributions = match (retrieved_documents, step.context_used.clone()) {
            (Some(hits), _) => self.extract_sources_from_context(&[], Some(hits)),
            (None, Some(context)) => self.extract_sources_from_context(&context, None),
            (None, None) => Vec::new(),
        };
        step.source_attributions = attributions;
    }

    /// Render a summary into the display read model. Pure: never fails and
    /// never mutates the summary.
    #[must_use]
    pub fn format_sources_for_display(
        summary: &SourceSummary,
        include_excerpts: bool,
    ) -> SourceDisplay {
        let render = |attribution: &SourceAttribution| DisplaySource {
            document_id: attribution.document_id.clone(),
            title: attribution.title.clone(),
            relevance: round2(attribution.relevance_score),
            excerpt: if include_excerpts {
                attribution.excerpt.as_ref().map(|e| truncate_excerpt(e))
            } else {
                None
            },
        };

        SourceDisplay {
            total_sources: summary.all_sources.len(),
            primary_sources: summary.primary_sources.iter().map(render).collect(),
            all_sources: summary.all_sources.iter().map(render).collect(),
            steps: summary
                .source_usage_by_step
                .iter()
                .map(|(step_number, document_ids)| StepUsage {
                    step_number: *step_number,
                    document_ids: document_ids.clone(),
                })
                .collect(),
        }
    }
}

/// Top sources above the relevance bar, or the overall top when none
/// qualify.
fn select_primary(all_sources: &[SourceAttribution]) -> Vec<SourceAttribution> {
    let qualified: Vec<SourceAttribution> = all_sources
        .iter()
        .filter(|s| s.relevance_score > PRIMARY_RELEVANCE_BAR)
        .take(PRIMARY_COUNT)
        .cloned()
        .collect();

    if qualified.is_empty() {
        all_sources.iter().take(PRIMARY_COUNT).cloned().collect()
    } else {
        qualified
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Display-ready view of a [`SourceSummary`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceDisplay {
    /// Number of distinct sources.
    pub total_sources: usize,

    /// The curated top subset.
    pub primary_sources: Vec<DisplaySource>,

    /// Every distinct source, descending by relevance.
    pub all_sources: Vec<DisplaySource>,

    /// Per-step document usage.
    pub steps: Vec<StepUsage>,
}

/// One source as shown to the end user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisplaySource {
    /// Source document identifier.
    pub document_id: String,

    /// Display title, when known.
    pub title: Option<String>,

    /// Relevance rounded to two decimals.
    pub relevance: f32,

    /// Excerpt, present only when requested.
    pub excerpt: Option<String>,
}

/// Document ids used by one reasoning step, in order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepUsage {
    /// The step number.
    pub step_number: usize,

    /// Ordered document ids the step drew on.
    pub document_ids: Vec<String>,
}
