//! Anthropic native provider implementation.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System role text as a top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events

use async_trait::async_trait;
use botrelay_core::error::ProviderError;
use botrelay_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{self, SseLine, SseLines};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: Option<String>,
    /// Where the key was expected to come from, for error messages
    api_key_env: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider. A `None` key is reported when a call is made.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_key_env: DEFAULT_KEY_ENV.into(),
            client: http::client(std::time::Duration::from_secs(300)),
        }
    }

    /// Read the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(DEFAULT_KEY_ENV).ok())
    }

    /// Name the variable the key was read from.
    pub fn with_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = env.into();
        self
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: self.api_key_env.clone(),
            })
    }

    /// Convert turns to API messages.
    ///
    /// Tool outcomes travel as `tool_result` blocks in a user message;
    /// consecutive outcomes share one message.
    fn to_api_messages(turns: &[Turn]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for turn in turns {
            match turn.role {
                TurnRole::User => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(turn.content.clone()),
                }),
                TurnRole::Assistant if turn.tool_calls.is_empty() => {
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Text(turn.content.clone()),
                    })
                }
                TurnRole::Assistant => {
                    let mut blocks = Vec::with_capacity(turn.tool_calls.len() + 1);
                    if !turn.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: turn.content.clone(),
                        });
                    }
                    blocks.extend(turn.tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    }));
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                TurnRole::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: turn.tool_call_id.clone().unwrap_or_default(),
                        content: turn.content.clone(),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let key = self.api_key()?;
        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(http::network_error)?;
        if !response.status().is_success() {
            return Err(http::error_for_status("anthropic", response).await);
        }
        Ok(response)
    }

    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text_segments = Vec::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => text_segments.push(text),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(TurnToolCall {
                        id,
                        name,
                        arguments: input.to_string(),
                    })
                }
                ResponseContentBlock::Other => {}
            }
        }

        ProviderResponse {
            text_segments,
            tool_calls,
            stop_reason: resp
                .stop_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or_default(),
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::build_body(&request, false);
        debug!(provider = "anthropic", model = %request.model, turns = request.turns.len(), "Sending completion request");

        let response = self.send(&body, false).await?;
        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Anthropic response: {e}")))?;

        Ok(Self::response_to_provider_response(api_resp))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let body = Self::build_body(&request, true);
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self.send(&body, true).await?;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut state = StreamState::default();

            while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&data) {
                    let SseLine::Data(payload) = line else {
                        continue;
                    };
                    let event: serde_json::Value = match serde_json::from_str(&payload) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %payload, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };
                    for chunk in state.handle(&event) {
                        let last = chunk.as_ref().map_or(true, |c| c.done);
                        if tx.send(chunk).await.is_err() || last {
                            return;
                        }
                    }
                }
            }

            // Body ended without message_stop
            let _ = tx.send(Ok(state.finish())).await;
        });

        Ok(rx)
    }
}

/// Accumulates tool-use blocks across SSE events.
#[derive(Default)]
struct StreamState {
    current: Option<TurnToolCall>,
    tool_calls: Vec<TurnToolCall>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl StreamState {
    fn handle(&mut self, event: &serde_json::Value) -> Vec<Result<StreamChunk, ProviderError>> {
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage.prompt_tokens = input as u32;
                }
                vec![]
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    self.close_tool();
                    self.current = Some(TurnToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: String::new(),
                    });
                }
                vec![]
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"]
                        .as_str()
                        .map(|text| {
                            Ok(StreamChunk {
                                content: Some(text.to_string()),
                                ..StreamChunk::default()
                            })
                        })
                        .into_iter()
                        .collect(),
                    Some("input_json_delta") => {
                        if let (Some(call), Some(partial)) =
                            (self.current.as_mut(), delta["partial_json"].as_str())
                        {
                            call.arguments.push_str(partial);
                        }
                        vec![]
                    }
                    _ => vec![],
                }
            }
            "content_block_stop" => {
                self.close_tool();
                vec![]
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(StopReason::parse(reason));
                }
                if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                    self.usage.completion_tokens = out as u32;
                }
                vec![]
            }
            "message_stop" => vec![Ok(self.finish())],
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error");
                vec![Err(ProviderError::StreamInterrupted(message.to_string()))]
            }
            _ => vec![],
        }
    }

    fn close_tool(&mut self) {
        if let Some(mut call) = self.current.take() {
            if call.arguments.is_empty() {
                call.arguments.push_str("{}");
            }
            self.tool_calls.push(call);
        }
    }

    fn finish(&mut self) -> StreamChunk {
        self.close_tool();
        self.usage.total_tokens = self.usage.prompt_tokens + self.usage.completion_tokens;
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls),
            done: true,
            stop_reason: self.stop_reason.take(),
            usage: Some(self.usage),
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
