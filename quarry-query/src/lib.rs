//! Retrieval fusion, reranking, query rewriting, question generation, and
//! source attribution for the Quarry library.
//!
//! This crate implements the behavior side of Quarry on top of the
//! capability traits defined in `quarry-core`:
//!
//! - **Retrievers**: vector, keyword, and hybrid (weighted fusion) channels
//! - **Rewriters**: identity and hypothetical-document-embedding rewriting
//! - **Reranker**: LLM-judged rescoring with an observable fallback
//! - **Questions**: quality-filtered question generation and conversation
//!   follow-up suggestions
//! - **Attribution**: per-step and aggregate source provenance
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use quarry_query::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn quarry_core::traits::DocumentStore>) -> quarry_core::Result<()> {
//! let retriever = HybridRetriever::builder()
//!     .store(store)
//!     .vector_weight(0.7)
//!     .build()?;
//!
//! let query = VectorQuery::new("What is machine learning?").with_top_k(5);
//! let retrieval = retriever.retrieve("my-collection", &query).await?;
//! for result in &retrieval.results {
//!     println!("{} {:.3}", result.chunk.id, result.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! query → QueryRewriter → {VectorRetriever, KeywordRetriever} → fusion
//!       → LlmReranker → ranked results
//!
//! chunks → QuestionService → persisted suggested questions
//! reasoning steps → SourceAttributionService → aggregated summary
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attribution;
pub mod questions;
pub mod reranker;
pub mod retrievers;
pub mod rewriter;

/// Re-export commonly used types and traits.
pub mod prelude {
    pub use crate::attribution::{SearchHit, SourceAttributionService, SourceDisplay};
    pub use crate::questions::{
        ConversationSuggester, QuestionConfig, QuestionService, SuggestionConfig,
    };
    pub use crate::reranker::{LlmReranker, RerankOutcome, RerankerConfig};
    pub use crate::retrievers::{
        HybridConfig, HybridRetrieval, HybridRetriever, KeywordRetriever, VectorRetriever,
    };
    pub use crate::rewriter::{
        HdeConfig, HdeRewriter, QueryRewriter, RewriteStrategy, RewriterConfig, SimpleRewriter,
    };

    // Re-export core types
    pub use quarry_core::prelude::*;
}
