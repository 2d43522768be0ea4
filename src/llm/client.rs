//! OpenAI-compatible streaming chat-completion client.
//!
//! The service speaks server-sent events: each body chunk carries zero or
//! more `data: {json}` lines, terminated by a `data: [DONE]` sentinel.
//! Lines can split across body chunks, so decoding buffers bytes and only
//! consumes complete lines.

use crate::error::{Result, VoxloopError};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

/// One message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One decoded streaming chunk; carries zero or one text fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionChunk {
    pub text: Option<String>,
}

/// Boxed stream of decoded completion chunks.
pub type ChunkStream = BoxStream<'static, Result<CompletionChunk>>;

/// Seam for the generation service, mockable in tests.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Open a streaming completion for the given messages.
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChunkStream>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Pop one complete line from the buffer, handling CRLF endings.
fn take_line(buf: &mut String) -> Option<String> {
    let pos = buf.find('\n')?;
    let mut line: String = buf.drain(..=pos).collect();
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

fn decode_data(data: &str) -> Result<CompletionChunk> {
    let payload: StreamPayload =
        serde_json::from_str(data).map_err(|e| VoxloopError::GenerationStream {
            message: format!("undecodable chunk: {e}"),
        })?;
    let text = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty());
    Ok(CompletionChunk { text })
}

/// Decode an SSE byte stream into completion chunks.
///
/// Ends on `[DONE]`, on byte-stream exhaustion, or after yielding one
/// transport error.
fn chunk_stream(bytes: BoxStream<'static, Result<Vec<u8>>>) -> ChunkStream {
    struct State {
        bytes: BoxStream<'static, Result<Vec<u8>>>,
        buf: String,
        done: bool,
    }

    stream::unfold(
        State {
            bytes,
            buf: String::new(),
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                while let Some(line) = take_line(&mut state.buf) {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        state.done = true;
                        return None;
                    }
                    return Some((decode_data(data), state));
                }
                match state.bytes.next().await {
                    Some(Ok(bytes)) => state.buf.push_str(&String::from_utf8_lossy(&bytes)),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

/// HTTP client for the streaming completion endpoint.
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChunkStream> {
        let request = CompletionRequest {
            model,
            messages,
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoxloopError::GenerationRequest {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(VoxloopError::GenerationRequest {
                message: format!("service returned {}", response.status()),
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|item| {
                item.map(|bytes| bytes.to_vec())
                    .map_err(|e| VoxloopError::GenerationStream {
                        message: e.to_string(),
                    })
            })
            .boxed();

        Ok(chunk_stream(bytes))
    }
}
