//! OpenRouter API client implementation for chat functionality.
//!
//! OpenRouter exposes an OpenAI-compatible chat-completions endpoint in front
//! of many hosted models. This module speaks that protocol, both as a single
//! JSON response and as a Server-Sent Events stream.

use crate::{
    chat::{create_sse_stream, ChatMessage, ChatProvider, ChatResponse, ChatStream, SseEvent},
    error::LLMError,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

/// Chat completions endpoint path, relative to the base URL.
const CHAT_ENDPOINT: &str = "chat/completions";

/// Attribution header OpenRouter shows on its dashboards.
const APP_TITLE: &str = "console-chatbot";

/// Client for interacting with OpenRouter's API.
pub struct OpenRouter {
    api_key: String,
    base_url: Url,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    client: Client,
}

#[derive(Serialize, Debug)]
struct OpenRouterChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct OpenRouterChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenRouterChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OpenRouterApiError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    message: String,
}

impl OpenRouterApiError {
    fn into_llm_error(self) -> LLMError {
        match self.code {
            Some(code) => LLMError::ProviderError(format!("{} (code {code})", self.message)),
            None => LLMError::ProviderError(self.message),
        }
    }
}

/// Response from OpenRouter's chat API endpoint.
#[derive(Deserialize, Debug)]
pub struct OpenRouterChatResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChatChoice>,
    #[serde(default)]
    error: Option<OpenRouterApiError>,
}

#[derive(Deserialize, Debug)]
struct OpenRouterChatChoice {
    message: OpenRouterChatMsg,
}

#[derive(Deserialize, Debug)]
struct OpenRouterChatMsg {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenRouterStreamChunk {
    #[serde(default)]
    choices: Vec<OpenRouterStreamChoice>,
    #[serde(default)]
    error: Option<OpenRouterApiError>,
}

#[derive(Deserialize, Debug)]
struct OpenRouterStreamChoice {
    #[serde(default)]
    delta: OpenRouterStreamDelta,
}

#[derive(Deserialize, Debug, Default)]
struct OpenRouterStreamDelta {
    content: Option<String>,
}

impl std::fmt::Display for OpenRouterChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text().unwrap_or_default())
    }
}

impl ChatResponse for OpenRouterChatResponse {
    fn text(&self) -> Option<String> {
        self.choices.first().and_then(|c| c.message.content.clone())
    }
}

impl OpenRouter {
    /// Creates a new OpenRouter client with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bearer credential sent with every request
    /// * `base_url` - API root, e.g. `https://openrouter.ai/api/v1`
    /// * `model` - Model identifier such as `mistralai/mistral-7b-instruct`
    /// * `max_tokens` - Upper bound on generated tokens
    /// * `stream` - Whether [`ChatProvider::chat_stream`] asks for an SSE stream
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> Result<Self, LLMError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LLMError::HttpError(format!("Failed to build reqwest Client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: parse_base_url(base_url)?,
            model: model.into(),
            max_tokens,
            stream,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self) -> Result<Url, LLMError> {
        self.base_url
            .join(CHAT_ENDPOINT)
            .map_err(|e| LLMError::InvalidRequest(format!("Invalid endpoint URL: {e}")))
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        stream: bool,
    ) -> OpenRouterChatRequest<'a> {
        OpenRouterChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenRouterChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn send(&self, body: &OpenRouterChatRequest<'_>) -> Result<reqwest::Response, LLMError> {
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(body) {
                log::trace!("OpenRouter request payload: {}", json);
            }
        }

        let resp = self
            .client
            .post(self.endpoint()?)
            .bearer_auth(&self.api_key)
            .header("X-Title", APP_TITLE)
            .json(body)
            .send()
            .await?;

        log::debug!("OpenRouter HTTP status: {}", resp.status());

        check_status(resp).await
    }
}

/// Parses the API root and makes sure relative joins append to its path.
fn parse_base_url(base_url: &str) -> Result<Url, LLMError> {
    let mut raw = base_url.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw)
        .map_err(|e| LLMError::InvalidRequest(format!("Invalid base URL '{base_url}': {e}")))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LLMError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await?;
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> LLMError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LLMError::AuthError(format!("OpenRouter rejected the API key ({status}): {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => LLMError::TooManyRequests(body),
        _ => LLMError::ProviderError(format!(
            "API call failed with status: {status}, body: {body}"
        )),
    }
}

/// Interprets a complete (non-streaming) response body.
fn parse_chat_response(raw: &str) -> Result<OpenRouterChatResponse, LLMError> {
    let mut response: OpenRouterChatResponse =
        serde_json::from_str(raw).map_err(|e| LLMError::ResponseFormatError {
            message: format!("Failed to parse response body: {e}"),
            raw_response: raw.to_string(),
        })?;
    if let Some(error) = response.error.take() {
        return Err(error.into_llm_error());
    }
    if response.choices.is_empty() {
        return Err(LLMError::ResponseFormatError {
            message: "Response contained no choices".to_string(),
            raw_response: raw.to_string(),
        });
    }
    if response.text().is_none() {
        return Err(LLMError::ResponseFormatError {
            message: "Response carried no message content".to_string(),
            raw_response: raw.to_string(),
        });
    }
    Ok(response)
}

/// Classifies one SSE line: a text delta, the end marker, or nothing.
pub(crate) fn parse_sse_line(line: &str) -> Result<SseEvent, LLMError> {
    let line = line.trim();
    // blank separators and ": OPENROUTER PROCESSING" keep-alives
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseEvent::Skip);
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    let chunk: OpenRouterStreamChunk =
        serde_json::from_str(data).map_err(|e| LLMError::ResponseFormatError {
            message: format!("Failed to parse stream chunk: {e}"),
            raw_response: data.to_string(),
        })?;
    if let Some(error) = chunk.error {
        return Err(error.into_llm_error());
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Text))
}

#[async_trait]
impl ChatProvider for OpenRouter {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, LLMError> {
        let body = self.request_body(messages, false);
        let resp = self.send(&body).await?;
        let raw = resp.text().await?;
        Ok(Box::new(parse_chat_response(&raw)?))
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, LLMError> {
        if !self.stream {
            let response = self.chat(messages).await?;
            let text = response.text().unwrap_or_default();
            return Ok(Box::pin(futures::stream::once(async move { Ok(text) })));
        }
        let body = self.request_body(messages, true);
        let resp = self.send(&body).await?;
        Ok(create_sse_stream(resp, parse_sse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ConversationTurn;
    use futures::StreamExt;

    fn client() -> OpenRouter {
        OpenRouter::new(
            "sk-or-test",
            "https://openrouter.ai/api/v1",
            "mistralai/mistral-7b-instruct",
            Some(1000),
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let client = client();
        assert_eq!(
            client.endpoint().unwrap().as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );

        let with_slash =
            OpenRouter::new("k", "https://example.test/v1/", "m", None, false).unwrap();
        assert_eq!(
            with_slash.endpoint().unwrap().as_str(),
            "https://example.test/v1/chat/completions"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = OpenRouter::new("k", "not a url", "m", None, false).err().unwrap();
        assert!(matches!(err, LLMError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_body_serialization() {
        let client = client();
        let turn = ConversationTurn::new("You are a helpful AI assistant.", "Hello");

        let body = client.request_body(turn.messages(), true);
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "model": "mistralai/mistral-7b-instruct",
                "messages": [
                    {"role": "system", "content": "You are a helpful AI assistant."},
                    {"role": "user", "content": "Hello"}
                ],
                "max_tokens": 1000,
                "stream": true
            })
        );
    }

    #[test]
    fn test_request_body_omits_missing_max_tokens() {
        let client =
            OpenRouter::new("k", "https://openrouter.ai/api/v1", "m", None, false).unwrap();
        let turn = ConversationTurn::new("sys", "hi");
        let json = serde_json::to_value(client.request_body(turn.messages(), false)).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{
            "id": "gen-123",
            "model": "mistralai/mistral-7b-instruct",
            "choices": [
                {
                    "finish_reason": "stop",
                    "message": {"role": "assistant", "content": "Hi there!"}
                }
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;

        let response = parse_chat_response(raw).unwrap();
        assert_eq!(response.text(), Some("Hi there!".to_string()));
        assert_eq!(response.to_string(), "Hi there!");
    }

    #[test]
    fn test_chat_response_error_object() {
        let raw = r#"{"error": {"code": 402, "message": "Insufficient credits"}}"#;
        match parse_chat_response(raw) {
            Err(LLMError::ProviderError(msg)) => {
                assert!(msg.contains("Insufficient credits"));
                assert!(msg.contains("402"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_response_garbage_keeps_raw_body() {
        match parse_chat_response("<html>bad gateway</html>") {
            Err(LLMError::ResponseFormatError { raw_response, .. }) => {
                assert_eq!(raw_response, "<html>bad gateway</html>");
            }
            other => panic!("expected format error, got {other:?}"),
        }
        assert!(matches!(
            parse_chat_response(r#"{"choices": []}"#),
            Err(LLMError::ResponseFormatError { .. })
        ));
    }

    #[test]
    fn test_chat_response_without_content_keeps_raw_body() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        match parse_chat_response(raw) {
            Err(LLMError::ResponseFormatError { raw_response, .. }) => {
                assert_eq!(raw_response, raw);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "no auth".into()),
            LLMError::AuthError(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            LLMError::TooManyRequests(body) if body == "slow down"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream".into()),
            LLMError::ProviderError(_)
        ));
    }

    #[test]
    fn test_sse_line_parsing() {
        let line = concat!(
            r#"data: {"id":"gen-1","choices":[{"index":0,"#,
            r#""delta":{"role":"assistant","content":"Hi"}}]}"#
        );
        assert_eq!(parse_sse_line(line).unwrap(), SseEvent::Text("Hi".to_string()));

        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"index":0,"finish_reason":"stop"}]}"#).unwrap(),
            SseEvent::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#)
                .unwrap(),
            SseEvent::Skip
        );
    }

    #[test]
    fn test_sse_error_payload() {
        let line = r#"data: {"error":{"code":"server_error","message":"Provider returned error"}}"#;
        assert!(matches!(
            parse_sse_line(line),
            Err(LLMError::ProviderError(msg)) if msg.contains("Provider returned error")
        ));
    }

    fn streaming_response(chunks: Vec<&'static str>) -> reqwest::Response {
        let body = reqwest::Body::wrap_stream(futures::stream::iter(
            chunks.into_iter().map(Ok::<_, std::io::Error>),
        ));
        reqwest::Response::from(http::Response::builder().status(200).body(body).unwrap())
    }

    async fn collect_stream(chunks: Vec<&'static str>) -> Vec<Result<String, LLMError>> {
        create_sse_stream(streaming_response(chunks), parse_sse_line)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_sse_stream_stops_at_done() {
        let items = collect_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n: OPENROUTER PROC",
            "ESSING\n\ndata: {\"choices\":[{\"delta\":{\"con",
            "tent\":\" there\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"AFTER_DONE\"}}]}\n\n",
        ])
        .await;

        let texts: Vec<String> = items.into_iter().map(|item| item.unwrap()).collect();
        assert_eq!(texts, vec!["Hi".to_string(), " there".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_stream_flushes_unterminated_tail() {
        let items = collect_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}",
        ])
        .await;

        let texts: Vec<String> = items.into_iter().map(|item| item.unwrap()).collect();
        assert_eq!(texts, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_stream_surfaces_error_payload() {
        let items = collect_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"code\":502,\"message\":\"upstream died\"}}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(
            &items[1],
            Err(LLMError::ProviderError(msg)) if msg.contains("upstream died")
        ));
    }
}
