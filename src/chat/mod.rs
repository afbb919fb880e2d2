use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, Stream, StreamExt};

use crate::error::LLMError;

/// A pinned stream of text tokens produced by a streaming chat request.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The fixed instruction that frames every turn
    System,
    /// The user/human participant in the conversation
    User,
    /// The AI assistant participant in the conversation
    Assistant,
}

impl ChatRole {
    /// Wire name used by OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// The role of who sent this message
    pub role: ChatRole,
    /// The text content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new builder for a system message
    pub fn system() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::System)
    }

    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }
}

/// Builder for ChatMessage
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    content: String,
}

impl ChatMessageBuilder {
    /// Create a new ChatMessageBuilder with specified role
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            content: String::new(),
        }
    }

    /// Set the message content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = content.into();
        self
    }

    /// Build the ChatMessage
    pub fn build(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content,
        }
    }
}

/// One request/response exchange: the fixed system instruction followed by a
/// single user message. Turns never carry earlier exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    messages: [ChatMessage; 2],
}

impl ConversationTurn {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: [
                ChatMessage::system().content(system).build(),
                ChatMessage::user().content(user).build(),
            ],
        }
    }

    /// The request payload, system instruction first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system(&self) -> &str {
        &self.messages[0].content
    }

    pub fn user(&self) -> &str {
        &self.messages[1].content
    }
}

pub trait ChatResponse: std::fmt::Debug + std::fmt::Display + Send {
    fn text(&self) -> Option<String>;
}

/// Trait for providers that support chat-style interactions.
///
/// Only [`ChatProvider::chat`] is required; a provider that cannot stream
/// still works in streaming sessions through the default `chat_stream`.
#[async_trait]
pub trait ChatProvider: Sync + Send {
    /// Sends a chat request to the provider with a sequence of messages.
    ///
    /// # Arguments
    ///
    /// * `messages` - The request messages, system instruction first
    ///
    /// # Returns
    ///
    /// The provider's response or an error
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, LLMError>;

    /// Sends a streaming chat request to the provider with a sequence of messages.
    ///
    /// The default implementation waits for [`ChatProvider::chat`] and yields
    /// its whole text as a single chunk.
    ///
    /// # Returns
    ///
    /// A stream of text tokens or an error
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, LLMError> {
        let response = self.chat(messages).await?;
        let text = response.text().unwrap_or_default();
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

/// Accumulates raw bytes from an event stream and hands out complete lines.
///
/// Network chunks split lines (and multi-byte characters) at arbitrary
/// positions, so nothing is decoded until its terminating newline arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, without line terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Returns whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Meaning of one Server-Sent Events line for the reply being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A piece of reply text
    Text(String),
    /// Nothing to show: separators, comments, empty deltas
    Skip,
    /// The provider finished the reply; nothing after it is read
    Done,
}

/// Creates a Server-Sent Events (SSE) stream from an HTTP response.
///
/// # Arguments
///
/// * `response` - The HTTP response from the streaming API
/// * `parser` - Function to classify each complete SSE line
///
/// # Returns
///
/// A pinned stream of text tokens or an error. It ends at the first
/// [`SseEvent::Done`] without polling the connection again.
pub(crate) fn create_sse_stream<F>(response: reqwest::Response, parser: F) -> ChatStream
where
    F: Fn(&str) -> Result<SseEvent, LLMError> + Send + Sync + 'static,
{
    let parser = std::sync::Arc::new(parser);
    let tail_parser = parser.clone();
    let buffer = std::sync::Arc::new(std::sync::Mutex::new(SseLineBuffer::new()));
    let tail_buffer = buffer.clone();

    let body = response.bytes_stream().flat_map(move |chunk| {
        let items: Vec<Result<SseEvent, LLMError>> = match chunk {
            Ok(bytes) => match buffer.lock() {
                Ok(mut buffer) => buffer
                    .push(&bytes)
                    .iter()
                    .map(|line| (*parser)(line.as_str()))
                    .collect(),
                Err(_) => vec![Err(LLMError::Generic("SSE buffer poisoned".to_string()))],
            },
            Err(e) => vec![Err(LLMError::HttpError(e.to_string()))],
        };
        stream::iter(items)
    });

    let tail = stream::once(async move {
        tail_buffer
            .lock()
            .ok()
            .and_then(|mut buffer| buffer.finish())
            .map(|line| (*tail_parser)(line.as_str()))
            .unwrap_or(Ok(SseEvent::Skip))
    });

    let stream = body
        .chain(tail)
        .take_while(|result| future::ready(!matches!(result, Ok(SseEvent::Done))))
        .filter_map(|result| async move {
            match result {
                Ok(SseEvent::Text(content)) => Some(Ok(content)),
                Ok(SseEvent::Skip) | Ok(SseEvent::Done) => None,
                Err(e) => Some(Err(e)),
            }
        });

    Box::pin(stream)
}
