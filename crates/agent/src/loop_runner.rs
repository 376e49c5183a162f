//! The tool-call loop.
//!
//! Each round sends the turn list to the provider. Text is passed to the
//! caller as it arrives. Requested tools run in order through the robot's
//! catalog and their outcomes go back to the provider as tool turns. The
//! loop ends on a round that requests no tools. After `max_rounds` tool
//! rounds the provider gets one last request, and tools it asks for then
//! are not run.
//!
//! Tool failures never end the loop. They are written inline as
//! `Error executing <tool>: <message>` so both the provider and the
//! customer see them. Provider failures do end it.

use std::sync::Arc;
use std::time::Instant;

use botrelay_core::error::{ProviderError, Result};
use botrelay_core::event::{DomainEvent, EventBus};
use botrelay_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StopReason, Turn, TurnToolCall, Usage,
};
use botrelay_core::robot::NO_RESPONSE;
use botrelay_core::tool::ToolCatalog;
use chrono::Utc;
use tracing::{debug, warn};

use crate::history::{TOOL_ERROR_MARKER, TOOL_RESULT_MARKER};

/// How each provider round is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// One awaited reply per round.
    Complete,
    /// Text deltas forwarded as they arrive.
    Stream,
}

/// What a finished loop produced.
#[derive(Debug, Clone, Default)]
pub struct LoopOutcome {
    /// Everything emitted, tool lines included.
    pub text: String,
    pub rounds: u32,
    pub tool_calls: usize,
    pub usage: Usage,
    /// Stopped by `max_rounds` while the provider still wanted tools.
    pub hit_round_limit: bool,
}

/// Drives provider rounds and tool execution for one robot.
pub struct ToolLoop {
    robot: String,
    provider: Arc<dyn Provider>,
    catalog: Arc<dyn ToolCatalog>,
    model: String,
    system: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_rounds: u32,
    events: Option<Arc<EventBus>>,
}

impl ToolLoop {
    pub fn new(
        robot: impl Into<String>,
        provider: Arc<dyn Provider>,
        catalog: Arc<dyn ToolCatalog>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            robot: robot.into(),
            provider,
            catalog,
            model: model.into(),
            system: String::new(),
            temperature: 0.7,
            max_tokens: None,
            max_rounds: 25,
            events: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the maximum number of tool rounds per call. Zero is treated as one.
    ///
    /// The provider always gets the request that follows the last tool
    /// round, so `max_rounds` rounds of tools can still end in an answer.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Run the loop over `turns`, passing every piece of output to `emit`.
    ///
    /// If nothing at all was produced, `emit` receives
    /// [`NO_RESPONSE`] and that is the outcome text.
    pub async fn run(
        &self,
        mut turns: Vec<Turn>,
        delivery: Delivery,
        emit: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<LoopOutcome> {
        let mut outcome = LoopOutcome::default();
        let mut tool_rounds = 0;

        loop {
            outcome.rounds += 1;
            debug!(robot = %self.robot, round = outcome.rounds, "Tool loop round");

            let request = self.request(&turns);
            let round = match delivery {
                Delivery::Complete => self.complete(request, &mut outcome.text, emit).await?,
                Delivery::Stream => self.stream(request, &mut outcome.text, emit).await?,
            };
            self.record_round(&round, outcome.rounds, &mut outcome.usage);
            if round.stop_reason == StopReason::MaxTokens {
                warn!(robot = %self.robot, round = outcome.rounds, "Reply cut off at max_tokens");
            }

            if !round.wants_tools() {
                break;
            }
            if tool_rounds >= self.max_rounds {
                warn!(
                    robot = %self.robot,
                    tool_rounds,
                    "Max tool rounds reached"
                );
                outcome.hit_round_limit = true;
                let notice = format!(
                    "\n(Stopped after {tool_rounds} tool rounds without a final answer.)\n"
                );
                say(&mut outcome.text, emit, &notice);
                break;
            }
            tool_rounds += 1;

            turns.push(Turn::assistant_with_tools(
                round.joined_text(),
                round.tool_calls.clone(),
            ));
            for call in &round.tool_calls {
                outcome.tool_calls += 1;
                let (result, line) = match self.execute(call).await {
                    Ok(result) => {
                        let line = format!("\n{TOOL_RESULT_MARKER}{}] {result}\n", call.name);
                        (result, line)
                    }
                    Err(error) => {
                        let line = format!("\n{error}\n");
                        (error, line)
                    }
                };
                say(&mut outcome.text, emit, &line);
                turns.push(Turn::tool_outcome(&call.id, result));
            }
        }

        if outcome.text.trim().is_empty() {
            outcome.text.clear();
            say(&mut outcome.text, emit, NO_RESPONSE);
        }
        Ok(outcome)
    }

    fn request(&self, turns: &[Turn]) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            turns: turns.to_vec(),
            tools: self.catalog.tool_definitions().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        out: &mut String,
        emit: &(dyn Fn(&str) + Send + Sync),
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let response = self.provider.complete(request).await?;
        say(out, emit, &response.joined_text());
        Ok(response)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        out: &mut String,
        emit: &(dyn Fn(&str) + Send + Sync),
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut rx = self.provider.stream(request).await?;
        let mut round = ProviderResponse {
            model: self.model.clone(),
            ..ProviderResponse::default()
        };

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content {
                say(out, emit, &delta);
                round.text_segments.push(delta);
            }
            round.tool_calls.extend(chunk.tool_calls);
            if let Some(reason) = chunk.stop_reason {
                round.stop_reason = reason;
            }
            if chunk.usage.is_some() {
                round.usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }
        Ok(round)
    }

    /// Run one requested tool. The error side is the inline error line.
    async fn execute(&self, call: &TurnToolCall) -> std::result::Result<String, String> {
        let arguments = if call.arguments.trim().is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str::<serde_json::Value>(&call.arguments)
        };
        let arguments = match arguments {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Malformed tool arguments");
                return Err(format!(
                    "{TOOL_ERROR_MARKER}{}: invalid arguments: {e}",
                    call.name
                ));
            }
        };

        let start = Instant::now();
        let result = self.catalog.execute_tool_call(&call.name, arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = &result {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
        }
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                robot: self.robot.clone(),
                tool_name: call.name.clone(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        result.map_err(|e| format!("{TOOL_ERROR_MARKER}{}: {e}", call.name))
    }

    fn record_round(&self, round: &ProviderResponse, number: u32, total: &mut Usage) {
        let tokens = round.usage.map(|u| u.total_tokens).unwrap_or(0);
        if let Some(usage) = round.usage {
            total.prompt_tokens += usage.prompt_tokens;
            total.completion_tokens += usage.completion_tokens;
            total.total_tokens += usage.total_tokens;
        }
        if let Some(events) = &self.events {
            let model = if round.model.is_empty() {
                self.model.clone()
            } else {
                round.model.clone()
            };
            events.publish(DomainEvent::ResponseGenerated {
                robot: self.robot.clone(),
                model,
                round: number,
                tokens_used: tokens,
                timestamp: Utc::now(),
            });
        }
    }
}

fn say(out: &mut String, emit: &(dyn Fn(&str) + Send + Sync), text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(text);
    emit(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedProvider, segments_reply, test_catalog, text_reply, tool_reply,
    };
    use botrelay_core::provider::TurnRole;
    use botrelay_core::tool::ToolSet;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    fn tool_loop(provider: Arc<ScriptedProvider>) -> ToolLoop {
        ToolLoop::new("tester", provider, Arc::new(test_catalog()), "mock-model")
            .with_system("You are a test robot.")
    }

    /// Collects emitted pieces.
    fn sink() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync) {
        let pieces = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&pieces);
        (pieces, move |s: &str| writer.lock().unwrap().push(s.to_string()))
    }

    #[tokio::test]
    async fn plain_text_reply_is_one_round() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_reply("Hello there")]));
        let (pieces, emit) = sink();

        let outcome = tool_loop(provider.clone())
            .run(vec![Turn::user("hi")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello there");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.usage.total_tokens, 15);
        assert_eq!(*pieces.lock().unwrap(), vec!["Hello there"]);

        let request = &provider.requests()[0];
        assert_eq!(request.system, "You are a test robot.");
        assert_eq!(request.tools.len(), 2);
    }

    #[tokio::test]
    async fn runs_tool_rounds_until_the_provider_stops_asking() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("Looking.", "echo", r#"{"text":"one"}"#),
            tool_reply("", "echo", r#"{"text":"two"}"#),
            tool_reply("", "echo", r#"{"text":"three"}"#),
            text_reply("All done."),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider.clone())
            .run(vec![Turn::user("go")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 4);
        assert_eq!(outcome.rounds, 4);
        assert_eq!(outcome.tool_calls, 3);
        assert!(!outcome.hit_round_limit);
        assert!(outcome.text.starts_with("Looking.\n[tool echo] one\n"));
        assert!(outcome.text.ends_with("All done."));

        // The last request carries every assistant/tool pair
        let last = provider.requests().pop().unwrap();
        let roles: Vec<TurnRole> = last.turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                TurnRole::User,
                TurnRole::Assistant,
                TurnRole::Tool,
                TurnRole::Assistant,
                TurnRole::Tool,
                TurnRole::Assistant,
                TurnRole::Tool,
            ]
        );
        assert_eq!(last.turns[2].content, "one");
        assert_eq!(last.turns[2].tool_call_id.as_deref(), Some("call_echo"));
    }

    #[tokio::test]
    async fn tool_failure_is_inline_and_the_loop_continues() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "broken", "{}"),
            text_reply("Sorry about that."),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider.clone())
            .run(vec![Turn::user("try")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert!(outcome.text.contains(
            "\nError executing broken: Tool execution failed: broken: disk on fire\n"
        ));
        assert!(outcome.text.ends_with("Sorry about that."));

        let tool_turn = &provider.requests()[1].turns[2];
        assert!(tool_turn.content.starts_with("Error executing broken: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "teleport", "{}"),
            text_reply("ok"),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert!(
            outcome
                .text
                .contains("Error executing teleport: Unknown tool: teleport")
        );
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_the_tool() {
        let echo = crate::test_helpers::EchoTool::new();
        let calls = echo.calls.clone();
        let catalog = Arc::new(ToolSet::new().with(Box::new(echo)));
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "echo", "{not json"),
            text_reply("recovered"),
        ]));
        let (_, emit) = sink();

        let outcome = ToolLoop::new("tester", provider, catalog, "m")
            .run(vec![Turn::user("x")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert!(outcome.text.contains("Error executing echo: invalid arguments"));
        assert!(outcome.text.ends_with("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_arguments_mean_an_empty_object() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "echo", ""),
            text_reply("fine"),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert!(outcome.text.contains("[tool echo] \n"));
        assert!(!outcome.text.contains("Error executing"));
    }

    #[tokio::test]
    async fn empty_reply_becomes_no_response() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_reply("")]));
        let (pieces, emit) = sink();

        let outcome = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert_eq!(outcome.text, NO_RESPONSE);
        assert_eq!(*pieces.lock().unwrap(), vec![NO_RESPONSE]);
    }

    #[tokio::test]
    async fn stops_at_max_rounds() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "echo", r#"{"text":"a"}"#),
            tool_reply("", "echo", r#"{"text":"b"}"#),
            tool_reply("", "echo", r#"{"text":"c"}"#),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider.clone())
            .with_max_rounds(2)
            .run(vec![Turn::user("loop")], Delivery::Complete, &emit)
            .await
            .unwrap();

        // Two rounds run, the third request's tools are not
        assert_eq!(provider.call_count(), 3);
        assert_eq!(outcome.tool_calls, 2);
        assert!(outcome.hit_round_limit);
        assert!(!outcome.text.contains("[tool echo] c"));
        assert!(
            outcome
                .text
                .ends_with("\n(Stopped after 2 tool rounds without a final answer.)\n")
        );
    }

    #[tokio::test]
    async fn answer_after_exactly_max_rounds_is_delivered() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "echo", r#"{"text":"a"}"#),
            tool_reply("", "echo", r#"{"text":"b"}"#),
            text_reply("Both echoed."),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider.clone())
            .with_max_rounds(2)
            .run(vec![Turn::user("twice")], Delivery::Complete, &emit)
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 3);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.tool_calls, 2);
        assert!(!outcome.hit_round_limit);
        assert!(outcome.text.ends_with("Both echoed."));
        assert!(!outcome.text.contains("Stopped after"));
    }

    #[tokio::test]
    async fn streaming_forwards_deltas() {
        let provider = Arc::new(ScriptedProvider::replies(vec![segments_reply(&[
            "Hel", "lo ", "world",
        ])]));
        let (pieces, emit) = sink();

        let outcome = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Stream, &emit)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello world");
        assert_eq!(*pieces.lock().unwrap(), vec!["Hel", "lo ", "world"]);
    }

    #[tokio::test]
    async fn streaming_runs_tools_too() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("Checking ", "echo", r#"{"text":"pong"}"#),
            text_reply("done"),
        ]));
        let (_, emit) = sink();

        let outcome = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Stream, &emit)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Checking \n[tool echo] pong\ndone");
    }

    #[tokio::test]
    async fn provider_errors_end_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::MissingCredential {
                env_var: "ANTHROPIC_API_KEY".into(),
            },
        )]));
        let (pieces, emit) = sink();

        let err = tool_loop(provider)
            .run(vec![Turn::user("x")], Delivery::Stream, &emit)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert!(pieces.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publishes_round_and_tool_events() {
        let events = Arc::new(EventBus::new(16));
        let mut rx = events.subscribe();
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_reply("", "echo", r#"{"text":"x"}"#),
            text_reply("ok"),
        ]));
        let (_, emit) = sink();

        tool_loop(provider)
            .with_events(events.clone())
            .run(vec![Turn::user("x")], Delivery::Complete, &emit)
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::ResponseGenerated { round, .. } => format!("round{round}"),
                DomainEvent::ToolExecuted { tool_name, .. } => format!("tool:{tool_name}"),
                other => format!("{other:?}"),
            });
        }
        assert_eq!(kinds, vec!["round1", "tool:echo", "round2"]);
    }
}
