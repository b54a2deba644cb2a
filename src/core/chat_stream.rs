//! The completion service: blocking and streaming calls against the
//! OpenAI-compatible backend.
//!
//! Streaming failures are never raised mid-sequence; they arrive as a
//! terminal [`StreamMessage::Error`] marker followed by [`StreamMessage::End`]
//! so consumers keep whatever partial output was already delivered.

use std::error::Error as StdError;
use std::fmt;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, ChatRequest, ChatResponse, CompletionResponse};
use crate::core::config::Config;
use crate::core::persona::PersonaRegistry;
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// A backend call failed: network, auth, quota, or a malformed body.
#[derive(Debug)]
pub enum GenerationError {
    Request(reqwest::Error),
    Api { status: u16, message: String },
    MalformedResponse(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Request(source) => write!(f, "backend request failed: {source}"),
            GenerationError::Api { status, message } => {
                write!(f, "backend returned {status}: {message}")
            }
            GenerationError::MalformedResponse(detail) => {
                write!(f, "malformed backend response: {detail}")
            }
        }
    }
}

impl StdError for GenerationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            GenerationError::Request(source) => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(source: reqwest::Error) -> Self {
        GenerationError::Request(source)
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Returns true when the payload terminated the stream.
fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send((StreamMessage::End, stream_id));
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    let _ = tx.send((StreamMessage::Chunk(content.clone()), stream_id));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let _ = tx.send((
                StreamMessage::Error(summarize_api_error(payload)),
                stream_id,
            ));
            let _ = tx.send((StreamMessage::End, stream_id));
            true
        }
    }
}

fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, stream_id))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Condense a raw error body into a single displayable line.
pub fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API error: <empty response>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("API error: {summary}");
            }
        }
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("API error: {collapsed}")
}

pub struct StreamParams {
    pub expert: String,
    pub query: String,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Client for the text-generation backend. Resolves persona keys through
/// the [`PersonaRegistry`] and issues exactly one backend request per call.
#[derive(Clone)]
pub struct ChatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    registry: PersonaRegistry,
}

impl ChatBackend {
    pub fn from_config(config: &Config) -> Self {
        ChatBackend {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            registry: PersonaRegistry::new(),
        }
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// The system instruction and the user query travel as two separate
    /// message roles so the backend can weight them differently.
    pub fn backend_messages(&self, expert: &str, query: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: self.registry.instruction_for(expert).to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: query.to_string(),
            },
        ]
    }

    fn request_builder(&self, body: &ChatRequest) -> reqwest::RequestBuilder {
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        self.client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(body)
    }

    /// Blocking completion: the full assistant text in one response.
    pub async fn complete(&self, expert: &str, query: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.backend_messages(expert, query),
            stream: false,
        };

        let response = self.request_builder(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: summarize_api_error(&body),
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".into()))
    }

    /// Streaming completion: spawns the backend request and delivers chunks
    /// tagged with `stream_id` over the returned channel, ending with a
    /// terminal marker. Cancelling the token stops delivery at the next
    /// chunk boundary and drops the connection.
    pub fn spawn_stream(&self, params: StreamParams) -> mpsc::UnboundedReceiver<(StreamMessage, u64)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.clone();
        tokio::spawn(async move {
            let StreamParams {
                expert,
                query,
                cancel_token,
                stream_id,
            } = params;

            let request = ChatRequest {
                model: backend.model.clone(),
                messages: backend.backend_messages(&expert, &query),
                stream: true,
            };

            tokio::select! {
                _ = backend.run_stream(&request, &tx, &cancel_token, stream_id) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
        rx
    }

    async fn run_stream(
        &self,
        request: &ChatRequest,
        tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
        cancel_token: &CancellationToken,
        stream_id: u64,
    ) {
        let response = match self.request_builder(request).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(summarize_api_error(&e.to_string())), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            let _ = tx.send((StreamMessage::Error(summarize_api_error(&error_text)), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            if cancel_token.is_cancelled() {
                return;
            }

            if let Ok(chunk_bytes) = chunk {
                buffer.extend_from_slice(&chunk_bytes);

                while let Some(newline_pos) = memchr(b'\n', &buffer) {
                    let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                        Ok(s) => s.trim(),
                        Err(e) => {
                            tracing::warn!("invalid UTF-8 in backend stream: {e}");
                            buffer.drain(..=newline_pos);
                            continue;
                        }
                    };

                    let should_end = process_sse_line(line_str, tx, stream_id);
                    buffer.drain(..=newline_pos);
                    if should_end {
                        return;
                    }
                }
            }
        }

        let _ = tx.send((StreamMessage::End, stream_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (index, (chunk_line, expected_chunk, done_line)) in variants.iter().enumerate() {
            let stream_id = (index + 1) as u64;

            assert!(!process_sse_line(chunk_line, &tx, stream_id));
            let (message, received_id) = rx.try_recv().expect("expected chunk message");
            assert_eq!(received_id, stream_id);
            match message {
                StreamMessage::Chunk(content) => assert_eq!(content, *expected_chunk),
                other => panic!("expected chunk message, got {:?}", other),
            }

            assert!(process_sse_line(done_line, &tx, stream_id));
            let (message, received_id) = rx.try_recv().expect("expected end message");
            assert_eq!(received_id, stream_id);
            assert!(matches!(message, StreamMessage::End));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn process_sse_line_routes_stream_errors_as_terminal_markers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let error_line = r#"data: {"error":{"message":"internal server error"}}"#;
        let stream_id = 99;

        assert!(process_sse_line(error_line, &tx, stream_id));

        let (message, received_id) = rx.try_recv().expect("expected error message");
        assert_eq!(received_id, stream_id);
        match message {
            StreamMessage::Error(text) => {
                assert_eq!(text, "API error: internal server error");
            }
            other => panic!("expected error message, got {:?}", other),
        }

        let (message, _) = rx.try_recv().expect("expected end message");
        assert!(matches!(message, StreamMessage::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!process_sse_line(": keep-alive", &tx, 1));
        assert!(!process_sse_line("event: message", &tx, 1));
        assert!(!process_sse_line("", &tx, 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn summarize_api_error_extracts_json_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(summarize_api_error(raw), "API error: model overloaded");

        let string_error = r#"{"error":"quota exceeded"}"#;
        assert_eq!(summarize_api_error(string_error), "API error: quota exceeded");
    }

    #[test]
    fn summarize_api_error_collapses_plaintext() {
        assert_eq!(
            summarize_api_error("  upstream\n  timed   out "),
            "API error: upstream timed out"
        );
        assert_eq!(summarize_api_error(""), "API error: <empty response>");
    }

    #[test]
    fn backend_messages_carry_system_and_user_roles() {
        let backend = ChatBackend::from_config(&Config::default());
        let messages = backend.backend_messages("medical", "What is the flu?");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("consult a doctor"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "What is the flu?");
    }

    #[test]
    fn backend_messages_default_unknown_experts_to_general() {
        let backend = ChatBackend::from_config(&Config::default());
        let unknown = backend.backend_messages("astrology", "hi");
        let general = backend.backend_messages("general", "hi");
        assert_eq!(unknown[0].content, general[0].content);
    }
}
