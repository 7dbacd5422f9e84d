//! Query types shared by the retrievers and rewriters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A search query against a document collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorQuery {
    /// The query text to search for.
    pub text: String,

    /// Number of results to return.
    pub top_k: usize,
}

impl VectorQuery {
    /// Create a new query with the default result count.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use quarry_core::VectorQuery;
    ///
    /// let query = VectorQuery::new("What is Rust?");
    /// assert_eq!(query.top_k, 10);
    /// ```
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            top_k: 10,
        }
    }

    /// Set the number of results to return.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// A query after rewriting: the original text plus the rewritten form that
/// retrieval should run against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewrittenQuery {
    /// The query text as supplied by the caller.
    pub original: String,

    /// The text retrieval should use. Equal to `original` when no strategy
    /// changed it.
    pub rewritten: String,
}

impl RewrittenQuery {
    /// Create a rewritten query.
    pub fn new<S1: Into<String>, S2: Into<String>>(original: S1, rewritten: S2) -> Self {
        Self {
            original: original.into(),
            rewritten: rewritten.into(),
        }
    }

    /// Whether rewriting changed the query text.
    #[must_use]
    pub fn was_rewritten(&self) -> bool {
        self.original != self.rewritten
    }
}

/// Parameters for a text generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<usize>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Deadline for the call. The caller surfaces expiry as a timeout error.
    pub timeout: Option<Duration>,
}

impl GenerationOptions {
    /// Create empty options (provider defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
