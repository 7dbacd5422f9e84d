//! Retriever implementations for finding relevant chunks.
//!
//! Three channels are provided: [`VectorRetriever`] (semantic, delegating to
//! the document store's index), [`KeywordRetriever`] (lexical overlap over
//! raw documents), and [`HybridRetriever`] (weighted fusion of both).
//!
//! The single-channel retrievers fail loud: a store failure is wrapped and
//! raised as a retrieval error, never returned as an empty result. The
//! hybrid retriever deliberately differs, degrading to the surviving channel
//! when one fails, because fusion has substitute signal a single channel
//! lacks.

pub mod hybrid;
pub mod keyword;
pub mod vector;

pub use hybrid::{HybridConfig, HybridRetrieval, HybridRetriever, HybridRetrieverBuilder};
pub use keyword::{KeywordRetriever, KeywordRetrieverConfig};
pub use vector::{VectorRetriever, VectorRetrieverConfig};
