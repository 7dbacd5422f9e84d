//! Suggested question types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question generated for a collection and persisted by the external
/// question repository.
///
/// A collection carries a hard cap on live questions; generation stops
/// admitting candidates once the cap is reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedQuestion {
    /// Unique identifier, minted at generation time.
    pub id: Uuid,

    /// The collection this question belongs to.
    pub collection_id: String,

    /// The question text.
    pub question: String,
}

impl SuggestedQuestion {
    /// Create a new suggested question with a fresh id.
    pub fn new<S1: Into<String>, S2: Into<String>>(collection_id: S1, question: S2) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id: collection_id.into(),
            question: question.into(),
        }
    }
}
