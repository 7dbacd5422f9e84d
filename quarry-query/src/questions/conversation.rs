//! Lightweight follow-up suggestions for an ongoing conversation.
//!
//! A separate, cheaper path than collection question generation: entities
//! and topics are pulled from the conversation with pattern heuristics, the
//! LLM proposes follow-ups, and candidates are scored against the current
//! message with a redundancy penalty. When the LLM fails or returns nothing
//! usable, entity-substituted templates keep the suggestion list non-empty.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use quarry_core::traits::TextGenerator;
use quarry_core::{GenerationOptions, QuarryError, Result};

/// Capitalized word sequences, the entity heuristic.
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z0-9]+(?:\s+[A-Z][a-zA-Z0-9]+)*\b").expect("static regex"));

/// Leading numbering or bullet markers on an LLM output line.
static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]\s*|[-•*]\s*)+").expect("static regex"));

/// Common words excluded from topic extraction.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "what", "when", "where", "which", "your",
    "have", "has", "was", "were", "are", "can", "could", "would", "should", "about", "how", "why",
    "you", "not", "but", "they", "their", "there", "been", "being", "into", "over", "than", "then",
];

/// Configuration for [`ConversationSuggester`].
#[derive(Debug, Clone)]
pub struct SuggestionConfig {
    /// Upper bound on returned suggestions.
    pub max_suggestions: usize,

    /// Jaccard similarity above which a candidate counts as a near-duplicate
    /// of the current message.
    pub redundancy_threshold: f32,

    /// Deadline for the suggestion LLM call.
    pub timeout: Duration,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 3,
            redundancy_threshold: 0.8,
            timeout: Duration::from_secs(15),
        }
    }
}

impl SuggestionConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] for a zero suggestion bound or
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.max_suggestions == 0 {
            return Err(QuarryError::configuration(
                "max_suggestions must be positive",
            ));
        }
        if self.timeout.is_zero() {
            return Err(QuarryError::configuration("timeout must be positive"));
        }
        Ok(())
    }
}

/// Produces bounded follow-up suggestions for a conversation.
#[derive(Debug)]
pub struct ConversationSuggester {
    generator: Arc<dyn TextGenerator>,
    config: SuggestionConfig,
}

impl ConversationSuggester {
    /// Create a suggester with default configuration.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            config: SuggestionConfig::default(),
        }
    }

    /// Create a suggester with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the configuration is
    /// invalid.
    pub fn with_config(
        generator: Arc<dyn TextGenerator>,
        config: SuggestionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator, config })
    }

    /// Generate follow-up suggestions for the conversation.
    ///
    /// Never returns an empty list while entities or topics exist in the
    /// context: template fallbacks cover LLM failures and empty output.
    #[instrument(skip(self, conversation_context, current_message))]
    pub async fn generate_conversation_suggestions(
        &self,
        conversation_context: &str,
        current_message: &str,
    ) -> Result<Vec<String>> {
        let entities = extract_entities(conversation_context);
        let topics = extract_topics(conversation_context);
        debug!(
            "Extracted {} entities and {} topics",
            entities.len(),
            topics.len()
        );

        let candidates = match self
            .llm_candidates(conversation_context, current_message)
            .await
        {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                info!("LLM returned no usable suggestions, using templates");
                self.template_suggestions(&entities, &topics)
            }
            Err(e) => {
                warn!("Suggestion generation failed, using templates: {e}");
                self.template_suggestions(&entities, &topics)
            }
        };

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|candidate| {
                let score = self.score_candidate(&candidate, current_message);
                (candidate, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let suggestions: Vec<String> = scored
            .into_iter()
            .map(|(candidate, _)| candidate)
            .take(self.config.max_suggestions)
            .collect();

        info!("Produced {} suggestions", suggestions.len());
        Ok(suggestions)
    }

    /// Ask the LLM for follow-ups and parse one suggestion per line.
    async fn llm_candidates(
        &self,
        conversation_context: &str,
        current_message: &str,
    ) -> Result<Vec<String>> {
        let prompt = format!(
            "Given this conversation:\n{conversation_context}\n\n\
             The user just said: {current_message}\n\n\
             Suggest {} short follow-up questions the user might ask next. \
             Write one question per line.",
            self.config.max_suggestions
        );

        let options = GenerationOptions::new().with_timeout(self.config.timeout);
        let call = self.generator.generate_text(&prompt, &options);
        let response = tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| QuarryError::timeout("conversation_suggestions"))?
            .map_err(|e| QuarryError::llm(format!("suggestion generation failed: {e}")))?;

        Ok(response
            .lines()
            .map(|line| NUMBERING.replace(line.trim(), "").trim().to_string())
            .filter(|line| !line.is_empty() && line.contains('?'))
            .collect())
    }

    /// Relevance to the current message, with near-duplicates of the message
    /// itself pushed to the bottom.
    fn score_candidate(&self, candidate: &str, current_message: &str) -> f32 {
        let similarity = jaccard(candidate, current_message);
        if similarity > self.config.redundancy_threshold {
            similarity - 1.0
        } else {
            similarity
        }
    }

    /// Entity/topic-substituted fallback templates, bounded by the
    /// suggestion budget.
    fn template_suggestions(&self, entities: &[String], topics: &[String]) -> Vec<String> {
        let mut suggestions = Vec::new();

        if let Some(first) = entities.first() {
            suggestions.push(format!("What is {first}?"));
        }
        if entities.len() >= 2 {
            suggestions.push(format!(
                "How does {} relate to {}?",
                entities[0], entities[1]
            ));
        }
        for topic in topics {
            if suggestions.len() >= self.config.max_suggestions {
                break;
            }
            suggestions.push(format!("Can you tell me more about {topic}?"));
        }

        suggestions.truncate(self.config.max_suggestions);
        suggestions
    }
}

/// Extract capitalized word sequences as candidate entities, preserving
/// first-seen order.
fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    ENTITY
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|entity| seen.insert(entity.to_lowercase()))
        .collect()
}

/// Extract the most frequent non-stopword terms as topics.
fn extract_topics(text: &str) -> Vec<String> {
    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for word in text.to_lowercase().split_whitespace() {
        let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if word.len() >= 4 && !STOPWORDS.contains(&word.as_str()) {
            *frequencies.entry(word).or_insert(0) += 1;
        }
    }

    let mut topics: Vec<(String, usize)> = frequencies.into_iter().collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    topics.into_iter().take(5).map(|(word, _)| word).collect()
}

/// Jaccard similarity over lowercase word sets.
fn jaccard(a: &str, b: &str) -> f32 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let words_a: HashSet<&str> = a_lower.split_whitespace().collect();
    let words_b: HashSet<&str> = b_lower.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubGenerator {
        response: Result<String>,
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate_text(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(QuarryError::llm("provider unavailable")),
            }
        }
    }

    fn suggester(response: Result<String>) -> ConversationSuggester {
        ConversationSuggester::new(Arc::new(StubGenerator { response }))
    }

    #[test]
    fn test_extract_entities() {
        let entities = extract_entities("We compared Rust Belt factories with Python scripts.");
        assert!(entities.iter().any(|e| e == "Rust Belt"));
        assert!(entities.iter().any(|e| e == "Python"));
    }

    #[test]
    fn test_extract_topics_skips_stopwords() {
        let topics =
            extract_topics("the compiler and the compiler and the borrow checker checker checker");
        assert_eq!(topics[0], "checker");
        assert!(topics.contains(&"compiler".to_string()));
        assert!(!topics.contains(&"the".to_string()));
    }

    #[test]
    fn test_jaccard() {
        assert!((jaccard("a b c", "a b c") - 1.0).abs() < f32::EPSILON);
        assert_eq!(jaccard("a b", "c d"), 0.0);
    }

    #[tokio::test]
    async fn test_llm_suggestions_parsed_and_bounded() {
        let suggester = suggester(Ok(
            "1. What about lifetimes?\n2. How do traits work?\n3. Why borrow?\n4. What else?"
                .to_string(),
        ));
        let suggestions = suggester
            .generate_conversation_suggestions("We discussed Rust ownership.", "Tell me more")
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions.iter().all(|s| s.contains('?')));
        assert!(suggestions.iter().all(|s| !s.starts_with("1.")));
    }

    #[tokio::test]
    async fn test_fallback_on_llm_failure() {
        let suggester = suggester(Err(QuarryError::llm("down")));
        let suggestions = suggester
            .generate_conversation_suggestions(
                "We talked about Kubernetes deployments and scaling strategies.",
                "ok",
            )
            .await
            .unwrap();
        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= 3);
    }

    #[tokio::test]
    async fn test_fallback_on_empty_response() {
        let suggester = suggester(Ok(String::new()));
        let suggestions = suggester
            .generate_conversation_suggestions("Kubernetes scaling discussion continues.", "ok")
            .await
            .unwrap();
        assert!(!suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_near_duplicate_of_message_demoted() {
        let suggester = suggester(Ok(
            "What is ownership in Rust?\nWhat about garbage collection instead?".to_string(),
        ));
        let suggestions = suggester
            .generate_conversation_suggestions(
                "Rust ownership discussion.",
                "What is ownership in Rust?",
            )
            .await
            .unwrap();
        // The near-duplicate of the current message ranks last.
        assert_eq!(
            suggestions.last().unwrap(),
            "What is ownership in Rust?"
        );
    }
}
