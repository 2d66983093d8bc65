use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, RagResult, Service};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::Provider;

/// Produces assistant messages, either plain text or with a tool request
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Continue the history; the reply may request one of `tools`
    async fn complete_tool_aware(&self, history: &[Message], tools: &[Tool]) -> RagResult<Message>;

    /// Plain completion of a single prompt with no tools on offer
    async fn complete(&self, prompt: &str) -> RagResult<Message>;
}

/// Generation backed by a chat model provider
pub struct ProviderGenerator {
    provider: Arc<dyn Provider>,
    system: String,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            system: String::new(),
        }
    }

    /// System prompt sent with tool-aware calls
    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = system.into();
        self
    }
}

#[async_trait]
impl GenerationService for ProviderGenerator {
    async fn complete_tool_aware(&self, history: &[Message], tools: &[Tool]) -> RagResult<Message> {
        let (message, usage) = self
            .provider
            .complete(&self.system, history, tools)
            .await
            .map_err(|e| RagError::from_provider(Service::Generation, e))?;
        debug!(model = self.provider.model(), ?usage, "tool-aware completion");
        Ok(message)
    }

    async fn complete(&self, prompt: &str) -> RagResult<Message> {
        let (message, usage) = self
            .provider
            .complete("", &[Message::user().with_text(prompt)], &[])
            .await
            .map_err(|e| RagError::from_provider(Service::Generation, e))?;
        debug!(model = self.provider.model(), ?usage, "completion");
        Ok(message)
    }
}
