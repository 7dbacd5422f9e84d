//! Text generation capability.

use async_trait::async_trait;

use crate::types::GenerationOptions;
use crate::Result;

/// A host-provided large language model.
///
/// Quarry uses this single entry point for hypothetical-answer drafting,
/// rerank scoring, and question generation. Provider selection, API keys,
/// and transport are the host's concern.
#[async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Generate text for a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider is unreachable or the call fails.
    /// Callers decide whether a failure is fatal or triggers a documented
    /// fallback.
    async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// A human-readable name for this generator.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
