//! Bridge from rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::{Agent, AgentBuilder};
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::LlmProvider;

/// Adapter wrapping a rig completion model behind `LlmProvider`.
pub struct RigAdapter<M: CompletionModel> {
    agent: Agent<M>,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            agent: AgentBuilder::new(model).build(),
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })
    }
}
