//! Hypothetical-document-embedding query rewriting.
//!
//! Asks an LLM to draft a plausible answer to the query and concatenates it
//! with the original text, so the embedding of the combined query lands
//! closer to answer-shaped passages in the index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use quarry_core::traits::TextGenerator;
use quarry_core::{GenerationOptions, QuarryError, Result};

use super::RewriteStrategy;

/// Default prompt for drafting the hypothetical answer.
const DEFAULT_HDE_PROMPT: &str = r"Please write a short passage answering the question: {query}

The passage should be informative and directly address the question.
Write as if you are providing a factual answer based on reliable sources.

Passage:
";

/// Configuration for [`HdeRewriter`].
#[derive(Debug, Clone)]
pub struct HdeConfig {
    /// Token bound for the hypothetical answer.
    pub max_tokens: usize,

    /// Deadline for one LLM call.
    pub timeout: Duration,

    /// How many timed-out calls to retry before giving up.
    pub max_retries: usize,

    /// Prompt template; `{query}` and `{context}` are substituted.
    pub prompt_template: String,
}

impl Default for HdeConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            prompt_template: DEFAULT_HDE_PROMPT.to_string(),
        }
    }
}

impl HdeConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when `max_tokens`, `timeout`,
    /// or `max_retries` is non-positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(QuarryError::configuration("hde_max_tokens must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(QuarryError::configuration("hde_timeout must be positive"));
        }
        if self.max_retries == 0 {
            return Err(QuarryError::configuration(
                "hde_max_retries must be positive",
            ));
        }
        Ok(())
    }
}

/// Rewrites a query by appending an LLM-drafted hypothetical answer.
///
/// An empty LLM response falls back to the original query unchanged; any
/// other provider failure is wrapped as a rewriter error.
#[derive(Debug)]
pub struct HdeRewriter {
    generator: Arc<dyn TextGenerator>,
    config: HdeConfig,
}

impl HdeRewriter {
    /// Create a new HDE rewriter.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when the configuration is
    /// invalid.
    pub fn new(generator: Arc<dyn TextGenerator>, config: HdeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator, config })
    }

    /// Create an HDE rewriter with default configuration.
    ///
    /// # Errors
    ///
    /// Never fails in practice; kept fallible for symmetry with
    /// [`HdeRewriter::new`].
    pub fn with_defaults(generator: Arc<dyn TextGenerator>) -> Result<Self> {
        Self::new(generator, HdeConfig::default())
    }

    fn build_prompt(&self, query: &str, context: Option<&str>) -> String {
        self.config
            .prompt_template
            .replace("{query}", query)
            .replace("{context}", context.unwrap_or(""))
    }

    /// Call the generator, retrying timed-out attempts up to the configured
    /// budget.
    async fn draft_hypothetical(&self, prompt: &str) -> Result<String> {
        let options = GenerationOptions::new()
            .with_max_tokens(self.config.max_tokens)
            .with_timeout(self.config.timeout);

        let mut last_timeout = None;
        for attempt in 1..=self.config.max_retries {
            let call = self.generator.generate_text(prompt, &options);
            match tokio::time::timeout(self.config.timeout, call).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    return Err(QuarryError::rewriter(format!(
                        "hypothetical answer generation failed: {e}"
                    )));
                }
                Err(elapsed) => {
                    warn!("HDE attempt {attempt} timed out");
                    last_timeout = Some(elapsed);
                }
            }
        }

        debug_assert!(last_timeout.is_some());
        Err(QuarryError::timeout("hde_rewrite"))
    }
}

#[async_trait]
impl RewriteStrategy for HdeRewriter {
    async fn rewrite(&self, query: &str, context: Option<&str>) -> Result<String> {
        debug!("Drafting hypothetical answer for query");

        let prompt = self.build_prompt(query, context);
        let hypothetical = self.draft_hypothetical(&prompt).await?;
        let hypothetical = hypothetical.trim();

        if hypothetical.is_empty() {
            warn!("Empty hypothetical answer, falling back to original query");
            return Ok(query.to_string());
        }

        info!(
            "HDE rewrite produced {} chars of hypothetical text",
            hypothetical.len()
        );
        Ok(format!("{query}\n{hypothetical}"))
    }

    fn name(&self) -> &'static str {
        "hde"
    }
}
