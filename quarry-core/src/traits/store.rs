//! Document store capability.

use async_trait::async_trait;

use crate::types::{Chunk, ScoredChunk, VectorQuery};
use crate::Result;

/// Access to a host-provided document store.
///
/// The store owns both the vector index (semantic search) and the raw chunk
/// corpus (lexical search). Quarry never sees embeddings; `retrieve_documents`
/// returns already-scored chunks.
///
/// # Examples
///
/// ```rust,no_run
/// use quarry_core::traits::DocumentStore;
/// use quarry_core::{Chunk, Result, ScoredChunk, VectorQuery};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct InMemoryStore;
///
/// #[async_trait]
/// impl DocumentStore for InMemoryStore {
///     async fn retrieve_documents(
///         &self,
///         collection: &str,
///         query: &VectorQuery,
///     ) -> Result<Vec<ScoredChunk>> {
///         Ok(vec![])
///     }
///
///     async fn get_documents(&self, collection: &str) -> Result<Vec<Chunk>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Semantic search: return up to `query.top_k` chunks scored by vector
    /// similarity, sorted descending.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying index is unreachable or the
    /// search fails. Implementations must not mask failures as empty
    /// results.
    async fn retrieve_documents(
        &self,
        collection: &str,
        query: &VectorQuery,
    ) -> Result<Vec<ScoredChunk>>;

    /// Raw access: return every chunk in the collection.
    ///
    /// # Errors
    ///
    /// Returns an error when the collection cannot be read.
    async fn get_documents(&self, collection: &str) -> Result<Vec<Chunk>>;
}
