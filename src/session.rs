use crate::{
    backends::openrouter::OpenRouter,
    chat::{ChatProvider, ChatStream, ConversationTurn},
    config::SessionConfig,
    error::LLMError,
};

/// Read-only handle to the remote chat capability, valid for the process
/// lifetime.
pub struct Session {
    config: SessionConfig,
    provider: Box<dyn ChatProvider>,
}

impl Session {
    /// Reads the credential from the environment and binds an OpenRouter
    /// client to the fixed endpoint, model, streaming flag and output cap.
    ///
    /// Returns [`LLMError::AbsentCredential`] when the key is missing or empty.
    /// The key itself is only checked by the provider on first use.
    pub fn initialize() -> Result<Self, LLMError> {
        Self::new(SessionConfig::from_env()?)
    }

    /// Binds an OpenRouter client to an already resolved configuration.
    pub fn new(config: SessionConfig) -> Result<Self, LLMError> {
        let provider = OpenRouter::new(
            config.api_key(),
            &config.base_url,
            config.model.clone(),
            Some(config.max_tokens),
            config.stream,
        )?;
        log::debug!(
            "session bound to {} (model {}, stream {}, max_tokens {})",
            provider.base_url(),
            config.model,
            config.stream,
            config.max_tokens
        );
        Ok(Self::with_provider(config, Box::new(provider)))
    }

    /// Uses any provider in place of OpenRouter.
    pub fn with_provider(config: SessionConfig, provider: Box<dyn ChatProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Builds a fresh turn around `user_message` and the configured system instruction.
    pub fn turn(&self, user_message: impl Into<String>) -> ConversationTurn {
        ConversationTurn::new(self.config.system.clone(), user_message)
    }

    /// Submits a turn and waits for the complete reply text.
    pub async fn complete(&self, turn: &ConversationTurn) -> Result<String, LLMError> {
        let response = self.provider.chat(turn.messages()).await?;
        response.text().ok_or_else(|| LLMError::ResponseFormatError {
            message: "Reply carried no text".to_string(),
            raw_response: format!("{response:?}"),
        })
    }

    /// Submits a turn and returns the reply as a stream of text chunks.
    pub async fn stream(&self, turn: &ConversationTurn) -> Result<ChatStream, LLMError> {
        self.provider.chat_stream(turn.messages()).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
