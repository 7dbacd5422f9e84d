//! Core data types for the Quarry library.

pub mod attribution;
pub mod chunk;
pub mod query;
pub mod question;

pub use attribution::{ReasoningStep, SourceAttribution, SourceSummary};
pub use chunk::{Chunk, RetrievalStrategy, ScoredChunk};
pub use query::{GenerationOptions, RewrittenQuery, VectorQuery};
pub use question::SuggestedQuestion;
