//! Provider-agnostic text-generation capability.

use async_trait::async_trait;

use crate::error::LlmError;

/// Text-generation capability used by the service.
///
/// Two call sites: the eligibility resolver's natural-language fallback and
/// the customer-notice composer. Both send a single prompt and consume the
/// raw text reply; any structure is imposed by the caller's own parsing.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier (for logging).
    fn model_name(&self) -> &str;

    /// Send a prompt and return the model's text reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
