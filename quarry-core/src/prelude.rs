//! Convenient re-exports of the most commonly used types and traits.
//!
//! ```rust
//! use quarry_core::prelude::*;
//! ```

pub use crate::error::{QuarryError, Result};
pub use crate::traits::{DocumentStore, QuestionRepository, TextGenerator};
pub use crate::types::{
    Chunk, GenerationOptions, ReasoningStep, RetrievalStrategy, RewrittenQuery, ScoredChunk,
    SourceAttribution, SourceSummary, SuggestedQuestion, VectorQuery,
};
