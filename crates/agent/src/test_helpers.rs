//! Shared test helpers for loop and robot tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use botrelay_core::error::{ProviderError, ToolError};
use botrelay_core::provider::{
    Provider, ProviderRequest, ProviderResponse, TurnToolCall, Usage,
};
use botrelay_core::tool::{Tool, ToolSet};

/// A provider that returns a sequence of scripted results.
///
/// Each call to `complete` pops the next result and records the request.
/// Running past the end of the script is an error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }
}

/// A text reply with usage attached.
pub fn text_reply(text: &str) -> ProviderResponse {
    ProviderResponse {
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        ..ProviderResponse::text(text)
    }
}

/// A text reply split into segments, replayed as separate stream deltas.
pub fn segments_reply(parts: &[&str]) -> ProviderResponse {
    ProviderResponse {
        text_segments: parts.iter().map(|s| s.to_string()).collect(),
        ..ProviderResponse::default()
    }
}

/// A reply requesting one tool call.
pub fn tool_reply(thought: &str, name: &str, arguments: &str) -> ProviderResponse {
    ProviderResponse {
        model: "mock-model".into(),
        ..ProviderResponse::tool_use(
            thought,
            vec![TurnToolCall {
                id: format!("call_{name}"),
                name: name.into(),
                arguments: arguments.into(),
            }],
        )
    }
}

/// Echoes its `text` argument and counts invocations.
pub struct EchoTool {
    pub calls: Arc<AtomicUsize>,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the text back"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(arguments["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Always fails.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

pub fn test_catalog() -> ToolSet {
    ToolSet::new()
        .with(Box::new(EchoTool::new()))
        .with(Box::new(BrokenTool))
}
