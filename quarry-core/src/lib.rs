//! # Quarry Core
//!
//! Core traits, types, and errors for the Quarry retrieval library.
//!
//! This crate provides the foundational building blocks shared by the Quarry
//! components:
//!
//! - **Data structures**: [`Chunk`], [`ScoredChunk`], [`VectorQuery`],
//!   [`SuggestedQuestion`], [`SourceAttribution`] and friends
//! - **Capability traits**: [`DocumentStore`](traits::DocumentStore),
//!   [`TextGenerator`](traits::TextGenerator),
//!   [`QuestionRepository`](traits::QuestionRepository)
//! - **Error handling**: [`QuarryError`] with a library-wide [`Result`] alias
//!
//! The library boundary is in-process: embeddings, the vector index, the LLM
//! runtime, and persistence all live behind the capability traits and are
//! supplied by the host application.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry_core::prelude::*;
//!
//! let chunk = Chunk::new("chunk-1", "Rust is a systems language.", "doc-1", 0);
//! let query = VectorQuery::new("What is Rust?").with_top_k(5);
//! assert_eq!(query.top_k, 5);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod prelude;
pub mod traits;
pub mod types;

pub use error::{QuarryError, Result};
pub use types::{
    Chunk, GenerationOptions, ReasoningStep, RetrievalStrategy, RewrittenQuery, ScoredChunk,
    SourceAttribution, SourceSummary, SuggestedQuestion, VectorQuery,
};

/// Version information for the Quarry core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
