use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// TextModel Trait
// =============================================================================

/// A free-text oracle: one prompt in, one reply out.
///
/// Callers treat the reply as opaque text. Any structure (JSON objects, lists)
/// is recovered by the caller, since models routinely wrap answers in prose or
/// markdown fences.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, used for log fields.
    fn model_name(&self) -> &str;
}
