//! Query rewriting strategies applied before retrieval.
//!
//! Rewriting is a chain of [`RewriteStrategy`] implementations composed by
//! [`QueryRewriter`] from an eagerly-validated [`RewriterConfig`]. The
//! identity [`SimpleRewriter`] is the default building block; the
//! hypothetical-document [`HdeRewriter`](hde::HdeRewriter) drafts an LLM
//! answer and searches with it to improve embedding recall.

pub mod hde;

pub use hde::{HdeConfig, HdeRewriter};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use quarry_core::traits::TextGenerator;
use quarry_core::{QuarryError, Result, RewrittenQuery};

/// A single query rewriting strategy.
#[async_trait]
pub trait RewriteStrategy: Send + Sync + std::fmt::Debug {
    /// Rewrite the query text, optionally informed by conversation context.
    ///
    /// Must never fail on well-formed non-empty input; emptiness is policed
    /// by the orchestrator, not the strategies.
    async fn rewrite(&self, query: &str, context: Option<&str>) -> Result<String>;

    /// A human-readable name for this strategy.
    fn name(&self) -> &'static str;
}

/// The no-op rewriting strategy: returns the query unchanged.
#[derive(Debug, Clone, Default)]
pub struct SimpleRewriter;

impl SimpleRewriter {
    /// Create a new identity rewriter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RewriteStrategy for SimpleRewriter {
    async fn rewrite(&self, query: &str, _context: Option<&str>) -> Result<String> {
        Ok(query.to_string())
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Configuration for the [`QueryRewriter`] orchestrator.
///
/// A typed, eagerly-validated replacement for a loose settings mapping:
/// invalid numerics are rejected at construction, not discovered at rewrite
/// time.
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    /// Whether the identity strategy participates in the chain.
    pub use_simple: bool,

    /// Whether hypothetical-document rewriting participates in the chain.
    pub use_hde: bool,

    /// Token bound for the hypothetical answer.
    pub hde_max_tokens: usize,

    /// Deadline for one hypothetical-answer LLM call.
    pub hde_timeout: Duration,

    /// Retry budget for timed-out hypothetical-answer calls.
    pub hde_max_retries: usize,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            use_simple: true,
            use_hde: false,
            hde_max_tokens: 256,
            hde_timeout: Duration::from_secs(10),
            hde_max_retries: 2,
        }
    }
}

/// Composes the enabled rewriting strategies and applies them in order.
#[derive(Debug)]
pub struct QueryRewriter {
    strategies: Vec<Box<dyn RewriteStrategy>>,
}

impl QueryRewriter {
    /// Build a rewriter from configuration.
    ///
    /// The generator is only required when `use_hde` is set.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] when HDE is enabled without a
    /// generator or with non-positive numeric settings.
    pub fn from_config(
        config: &RewriterConfig,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self> {
        let mut strategies: Vec<Box<dyn RewriteStrategy>> = Vec::new();

        if config.use_simple {
            strategies.push(Box::new(SimpleRewriter::new()));
        }

        if config.use_hde {
            let generator = generator.ok_or_else(|| {
                QuarryError::configuration("HDE rewriting requires a text generator")
            })?;
            let hde_config = HdeConfig {
                max_tokens: config.hde_max_tokens,
                timeout: config.hde_timeout,
                max_retries: config.hde_max_retries,
                ..HdeConfig::default()
            };
            strategies.push(Box::new(HdeRewriter::new(generator, hde_config)?));
        }

        Ok(Self { strategies })
    }

    /// Rewrite a query through the configured chain.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::InvalidQuery`] for empty or whitespace-only
    /// queries; strategy failures propagate unchanged.
    #[instrument(skip(self, context))]
    pub async fn rewrite(&self, query: &str, context: Option<&str>) -> Result<RewrittenQuery> {
        if query.trim().is_empty() {
            return Err(QuarryError::invalid_query("query text is empty"));
        }

        let mut text = query.to_string();
        for strategy in &self.strategies {
            debug!("Applying rewrite strategy {}", strategy.name());
            text = strategy.rewrite(&text, context).await?;
        }

        info!(
            "Rewriting completed, changed: {}",
            text != query
        );
        Ok(RewrittenQuery::new(query, text))
    }

    /// Names of the strategies in the chain, in application order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_rewriter_identity() {
        let rewriter = SimpleRewriter::new();
        assert_eq!(rewriter.rewrite("what is rust?", None).await.unwrap(), "what is rust?");
        // The strategy itself passes empty input through.
        assert_eq!(rewriter.rewrite("", None).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_orchestrator_rejects_empty_query() {
        let rewriter = QueryRewriter::from_config(&RewriterConfig::default(), None).unwrap();
        let err = rewriter.rewrite("", None).await.unwrap_err();
        assert!(matches!(err, QuarryError::InvalidQuery { .. }));

        let err = rewriter.rewrite("   ", None).await.unwrap_err();
        assert!(matches!(err, QuarryError::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn test_default_chain_is_identity() {
        let rewriter = QueryRewriter::from_config(&RewriterConfig::default(), None).unwrap();
        let rewritten = rewriter.rewrite("what is rust?", None).await.unwrap();
        assert_eq!(rewritten.original, rewritten.rewritten);
        assert!(!rewritten.was_rewritten());
    }

    #[test]
    fn test_hde_requires_generator() {
        let config = RewriterConfig {
            use_hde: true,
            ..RewriterConfig::default()
        };
        let err = QueryRewriter::from_config(&config, None).unwrap_err();
        assert!(matches!(err, QuarryError::Configuration { .. }));
    }
}
