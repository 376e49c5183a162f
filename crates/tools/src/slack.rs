//! Slack catalog: post messages and look up users via the Slack Web API.
//!
//! The bot token comes from `SLACK_BOT_TOKEN`. Without it every call
//! fails with a tool error, which the tool-call loop renders inline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use botrelay_core::error::ToolError;
use botrelay_core::tool::{Tool, ToolSet};
use serde::Deserialize;
use tracing::debug;

pub const SLACK_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Minimal Slack Web API client.
pub struct SlackClient {
    token: Option<String>,
    api_url: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            api_url: DEFAULT_API_URL.into(),
            client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(SLACK_TOKEN_ENV).ok())
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self, tool: &str) -> Result<&str, ToolError> {
        self.token.as_deref().ok_or_else(|| ToolError::NotConfigured(format!(
            "{tool} needs {SLACK_TOKEN_ENV} to be set"
        )))
    }

    async fn call(
        &self,
        tool: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason,
        };

        let response = request
            .bearer_auth(self.token(tool)?)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("Slack returned HTTP {}", response.status())));
        }

        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unreadable Slack response: {e}")))?;
        if !body.ok {
            return Err(failed(body.error.unwrap_or_else(|| "unknown_error".into())));
        }
        Ok(serde_json::Value::Object(body.rest))
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<String, ToolError> {
        debug!(channel, "Posting Slack message");
        let request = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .json(&serde_json::json!({ "channel": channel, "text": text }));
        let body = self.call("slack_post_message", request).await?;
        let ts = body["ts"].as_str().unwrap_or("unknown");
        Ok(format!("Posted to {channel} (ts {ts})."))
    }

    pub async fn lookup_user(&self, user_id: &str) -> Result<String, ToolError> {
        let request = self
            .client
            .get(format!("{}/users.info", self.api_url))
            .query(&[("user", user_id)]);
        let body = self.call("slack_lookup_user", request).await?;
        Ok(describe_user(&body["user"]))
    }
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

fn describe_user(user: &serde_json::Value) -> String {
    let profile = &user["profile"];
    let name = profile["real_name"]
        .as_str()
        .or_else(|| user["real_name"].as_str())
        .or_else(|| user["name"].as_str())
        .unwrap_or("unknown");
    let mut out = format!("{name} ({})", user["id"].as_str().unwrap_or("?"));
    if let Some(title) = profile["title"].as_str().filter(|t| !t.is_empty()) {
        out.push_str(&format!(", {title}"));
    }
    if let Some(tz) = user["tz"].as_str() {
        out.push_str(&format!(", timezone {tz}"));
    }
    out
}

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub struct PostMessageTool {
    client: Arc<SlackClient>,
}

#[async_trait]
impl Tool for PostMessageTool {
    fn name(&self) -> &str {
        "slack_post_message"
    }

    fn description(&self) -> &str {
        "Post a message to a Slack channel (by name like #general or by id)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel": { "type": "string" },
                "text": { "type": "string" }
            },
            "required": ["channel", "text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let channel = required_str(&arguments, "channel")?;
        let text = required_str(&arguments, "text")?;
        self.client.post_message(channel, text).await
    }
}

pub struct LookupUserTool {
    client: Arc<SlackClient>,
}

#[async_trait]
impl Tool for LookupUserTool {
    fn name(&self) -> &str {
        "slack_lookup_user"
    }

    fn description(&self) -> &str {
        "Look up a Slack user's name, title and timezone from their user id (e.g. U123ABC)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let user_id = required_str(&arguments, "user_id")?;
        // Accept the mention form too
        let user_id = user_id.trim_start_matches("<@").trim_end_matches('>');
        self.client.lookup_user(user_id).await
    }
}

/// The `slack` catalog.
pub fn slack_catalog(client: Arc<SlackClient>) -> ToolSet {
    ToolSet::new()
        .with(Box::new(PostMessageTool {
            client: client.clone(),
        }))
        .with(Box::new(LookupUserTool { client }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrelay_core::tool::ToolCatalog;

    #[tokio::test]
    async fn missing_token_is_a_tool_error() {
        let catalog = slack_catalog(Arc::new(SlackClient::new(None)));
        let err = catalog
            .execute_tool_call(
                "slack_post_message",
                serde_json::json!({"channel": "#general", "text": "hi"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
        assert!(err.to_string().contains(SLACK_TOKEN_ENV));
    }

    #[tokio::test]
    async fn arguments_are_checked_before_the_network() {
        let catalog = slack_catalog(Arc::new(SlackClient::new(Some("xoxb-test".into()))));
        let err = catalog
            .execute_tool_call("slack_post_message", serde_json::json!({"channel": "#x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn describes_users() {
        let user = serde_json::json!({
            "id": "U123",
            "name": "ada",
            "tz": "Europe/London",
            "profile": {"real_name": "Ada Lovelace", "title": "Engineer"}
        });
        assert_eq!(
            describe_user(&user),
            "Ada Lovelace (U123), Engineer, timezone Europe/London"
        );
    }

    #[test]
    fn slack_error_body_parses() {
        let body: SlackResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!body.ok);
        assert_eq!(body.error.as_deref(), Some("channel_not_found"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        assert!(!SlackClient::new(Some(" ".into())).has_token());
        assert!(SlackClient::new(Some("xoxb-1".into())).has_token());
    }
}
