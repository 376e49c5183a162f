//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Groq, Ollama, vLLM, and any endpoint
//! exposing `/chat/completions`. The system role text is sent as a leading
//! `system` message and tool outcomes as `tool` messages.

use std::collections::BTreeMap;

use async_trait::async_trait;
use botrelay_core::error::ProviderError;
use botrelay_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{self, SseLine, SseLines};

pub const DEFAULT_KEY_ENV: &str = "OPENAI_API_KEY";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    /// Local servers such as Ollama accept requests without a key
    requires_key: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_key_env: DEFAULT_KEY_ENV.into(),
            requires_key: true,
            client: http::client(std::time::Duration::from_secs(120)),
        }
    }

    /// OpenAI itself, keyed from `OPENAI_API_KEY`.
    pub fn openai(api_key: Option<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// A local Ollama server. No key required.
    pub fn ollama(base_url: Option<&str>) -> Self {
        let mut provider = Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            None,
        );
        provider.requires_key = false;
        provider
    }

    pub fn with_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = env.into();
        self
    }

    fn to_api_messages(system: &str, turns: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !system.is_empty() {
            messages.push(ApiMessage {
                role: "system".into(),
                content: Some(system.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(turns.iter().map(|t| ApiMessage {
            role: match t.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
                TurnRole::Tool => "tool",
            }
            .into(),
            // An assistant turn that only calls tools carries null content
            content: (!t.content.is_empty() || t.tool_calls.is_empty())
                .then(|| t.content.clone()),
            tool_calls: (!t.tool_calls.is_empty()).then(|| {
                t.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: t.tool_call_id.clone(),
        }));

        messages
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system, &request.turns),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json");

        match (&self.api_key, self.requires_key) {
            (Some(key), _) => builder = builder.bearer_auth(key),
            (None, true) => {
                return Err(ProviderError::MissingCredential {
                    env_var: self.api_key_env.clone(),
                });
            }
            (None, false) => {}
        }
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(http::network_error)?;
        if !response.status().is_success() {
            return Err(http::error_for_status(&self.name, response).await);
        }
        Ok(response)
    }

    fn response_to_provider_response(
        resp: ApiResponse,
    ) -> Result<ProviderResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| TurnToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            text_segments: choice
                .message
                .content
                .filter(|c| !c.is_empty())
                .into_iter()
                .collect(),
            tool_calls,
            stop_reason: choice
                .finish_reason
                .as_deref()
                .map(StopReason::parse)
                .unwrap_or_default(),
            usage: resp.usage.map(ApiUsage::into_usage),
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some() || !self.requires_key
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::build_body(&request, false);
        debug!(provider = %self.name, model = %request.model, turns = request.turns.len(), "Sending completion request");

        let response = self.send(&body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {e}", self.name)))?;

        Self::response_to_provider_response(api_response)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let body = Self::build_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.send(&body, true).await?;
        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

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
                    if payload == "[DONE]" {
                        let _ = tx.send(Ok(state.finish())).await;
                        return;
                    }
                    match serde_json::from_str::<StreamResponse>(&payload) {
                        Ok(resp) => {
                            if let Some(chunk) = state.handle(resp)
                                && tx.send(Ok(chunk)).await.is_err()
                            {
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(provider = %provider_name, data = %payload, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Body ended without [DONE]
            let _ = tx.send(Ok(state.finish())).await;
        });

        Ok(rx)
    }
}

/// Accumulates tool-call deltas, keyed by their index.
#[derive(Default)]
struct StreamState {
    tool_calls: BTreeMap<u32, TurnToolCall>,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
}

impl StreamState {
    /// Fold one delta in; returns a content chunk if it carried text.
    fn handle(&mut self, resp: StreamResponse) -> Option<StreamChunk> {
        if let Some(usage) = resp.usage {
            self.usage = Some(usage.into_usage());
        }
        let choice = resp.choices.into_iter().next()?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = Some(StopReason::parse(reason));
        }
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let call = self
                .tool_calls
                .entry(delta.index)
                .or_insert_with(|| TurnToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
            if let Some(id) = delta.id {
                call.id = id;
            }
            if let Some(func) = delta.function {
                if let Some(name) = func.name {
                    call.name = name;
                }
                if let Some(args) = func.arguments {
                    call.arguments.push_str(&args);
                }
            }
        }

        choice
            .delta
            .content
            .filter(|c| !c.is_empty())
            .map(|content| StreamChunk {
                content: Some(content),
                ..StreamChunk::default()
            })
    }

    fn finish(&mut self) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls).into_values().collect(),
            done: true,
            stop_reason: self.stop_reason.take(),
            usage: self.usage.take(),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// Tool call deltas arrive incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(json: &str) -> StreamResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ollama_needs_no_key() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.has_credential());
        assert!(!OpenAiCompatProvider::openai(None).has_credential());
    }

    #[tokio::test]
    async fn missing_key_names_the_variable() {
        let provider = OpenAiCompatProvider::new("groq", "https://api.groq.com/openai/v1", None)
            .with_key_env("GROQ_API_KEY");
        let request = ProviderRequest {
            model: "llama".into(),
            system: String::new(),
            turns: vec![Turn::user("hi")],
            tools: vec![],
            temperature: 0.7,
            max_tokens: None,
        };
        let err = provider.complete(request).await.unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn system_leads_and_tool_outcomes_use_tool_role() {
        let turns = vec![
            Turn::user("post hi to #general"),
            Turn::assistant_with_tools(
                "",
                vec![TurnToolCall {
                    id: "call_1".into(),
                    name: "slack_post_message".into(),
                    arguments: r##"{"channel":"#general","text":"hi"}"##.into(),
                }],
            ),
            Turn::tool_outcome("call_1", "posted"),
        ];
        let api = OpenAiCompatProvider::to_api_messages("Be brief.", &turns);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[2].role, "assistant");
        assert!(api[2].content.is_none());
        assert_eq!(api[2].tool_calls.as_ref().unwrap()[0].function.name, "slack_post_message");
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "get_form".into(),
            description: "Fetch a form".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools[0].function.name, "get_form");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_tool_call_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o-mini",
                "choices": [{
                    "message": {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_9", "type": "function", "function": {"name": "get_form", "arguments": "{\"form_id\":\"A1\"}"}}
                    ]},
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        let pr = OpenAiCompatProvider::response_to_provider_response(resp).unwrap();
        assert!(pr.text_segments.is_empty());
        assert_eq!(pr.tool_calls[0].id, "call_9");
        assert_eq!(pr.stop_reason, StopReason::ToolUse);
        assert_eq!(pr.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_is_invalid() {
        let resp: ApiResponse = serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::response_to_provider_response(resp),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn stream_state_accumulates_parallel_tool_calls() {
        let mut state = StreamState::default();
        assert!(state
            .handle(delta(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"current_time","arguments":""}},{"index":0,"id":"call_a","function":{"name":"get_form","arguments":"{\"form_"}}]}}]}"#))
            .is_none());
        state.handle(delta(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"id\":\"F1\"}"}}]},"finish_reason":"tool_calls"}]}"#));
        state.handle(delta(r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#));

        let done = state.finish();
        assert!(done.done);
        assert_eq!(done.tool_calls.len(), 2);
        assert_eq!(done.tool_calls[0].id, "call_a");
        assert_eq!(done.tool_calls[0].arguments, r#"{"form_id":"F1"}"#);
        assert_eq!(done.tool_calls[1].name, "current_time");
        assert_eq!(done.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(done.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn stream_state_emits_text_deltas() {
        let mut state = StreamState::default();
        let chunk = state
            .handle(delta(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#))
            .unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hel"));
        assert!(state
            .handle(delta(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#))
            .is_none());
        assert_eq!(state.finish().stop_reason, Some(StopReason::EndTurn));
    }
}
