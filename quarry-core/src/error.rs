//! Error types for the Quarry library.
//!
//! This module provides context-aware error types covering retrieval, query
//! rewriting, LLM calls, and repository access.

use thiserror::Error;

/// Core error type for the Quarry library.
///
/// The taxonomy separates construction-time configuration failures (fatal,
/// not retried) from caller errors (invalid queries) and runtime failures of
/// the external capabilities (store, LLM, repository).
#[derive(Error, Debug)]
pub enum QuarryError {
    /// Invalid construction-time configuration. Fatal; never retried.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
    },

    /// Empty or otherwise unusable query text. A caller error.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Detailed error message
        message: String,
    },

    /// A retrieval channel failed. Surfaced, never swallowed: an empty
    /// result from a sole channel is indistinguishable from "no matches".
    #[error("Retrieval error: {message}")]
    Retrieval {
        /// Detailed error message
        message: String,
    },

    /// LLM failure during query rewriting.
    #[error("Rewriter error: {message}")]
    Rewriter {
        /// Detailed error message
        message: String,
    },

    /// LLM/text generation errors outside the rewriting path.
    #[error("LLM error: {message}")]
    Llm {
        /// Detailed error message
        message: String,
    },

    /// Question or source repository failures.
    #[error("Repository error: {message}")]
    Repository {
        /// Detailed error message
        message: String,
    },

    /// Operation timeout. All store- and LLM-bound calls carry a deadline
    /// and surface it as this variant rather than hanging.
    #[error("Timeout: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
    },

    /// Internal library errors.
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },

    /// Generic errors from external dependencies.
    #[error("External error: {source}")]
    External {
        /// The underlying error
        #[source]
        source: anyhow::Error,
    },
}

impl QuarryError {
    /// Create a new configuration error with a message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new invalid-query error with a message.
    pub fn invalid_query<S: Into<String>>(message: S) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new retrieval error with a message.
    pub fn retrieval<S: Into<String>>(message: S) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a new rewriter error with a message.
    pub fn rewriter<S: Into<String>>(message: S) -> Self {
        Self::Rewriter {
            message: message.into(),
        }
    }

    /// Create a new LLM error with a message.
    pub fn llm<S: Into<String>>(message: S) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a new repository error with a message.
    pub fn repository<S: Into<String>>(message: S) -> Self {
        Self::Repository {
            message: message.into(),
        }
    }

    /// Create a new timeout error with an operation name.
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new internal error with a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new external error from any error that implements `Into<anyhow::Error>`.
    pub fn external<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::External {
            source: error.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Returns `true` for transient failures that might succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Llm { .. } | Self::Retrieval { .. }
        )
    }

    /// Check if this error is a caller error.
    ///
    /// Returns `true` for errors caused by invalid input or configuration
    /// that won't be fixed by retrying.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::InvalidQuery { .. })
    }
}

/// Convert from `anyhow::Error` to `QuarryError`.
impl From<anyhow::Error> for QuarryError {
    fn from(error: anyhow::Error) -> Self {
        Self::External { source: error }
    }
}

/// Result type alias used throughout the Quarry library.
pub type Result<T> = std::result::Result<T, QuarryError>;
