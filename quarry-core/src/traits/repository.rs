//! Question repository capability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::SuggestedQuestion;
use crate::Result;

/// Persistence for suggested questions, owned by the host application.
///
/// The repository is the source of truth for a collection's live question
/// count; the generation pipeline consults it before admitting new
/// candidates.
#[async_trait]
pub trait QuestionRepository: Send + Sync + std::fmt::Debug {
    /// Persist a question and return the stored record.
    async fn create(&self, question: SuggestedQuestion) -> Result<SuggestedQuestion>;

    /// Fetch every live question for a collection.
    async fn get_by_collection(&self, collection_id: &str) -> Result<Vec<SuggestedQuestion>>;

    /// Delete a single question by id.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Delete every question for a collection, returning how many were
    /// removed.
    async fn delete_by_collection(&self, collection_id: &str) -> Result<usize>;
}
