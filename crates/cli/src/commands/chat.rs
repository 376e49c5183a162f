//! `botrelay chat`: Single-message or interactive chat through the orchestrator.

use std::io::Write;
use std::sync::Arc;

use botrelay_core::event::{DomainEvent, EventBus};
use botrelay_core::message::{ConversationId, ConversationMessage, MessageContent};
use botrelay_core::robot::ResponseMode;
use botrelay_core::stream_event::RobotStreamEvent;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;

use crate::ModeArg;
use crate::runtime::Runtime;

impl ModeArg {
    fn forced(self) -> Option<ResponseMode> {
        match self {
            Self::Auto => None,
            Self::Immediate => Some(ResponseMode::Immediate),
            Self::Stream => Some(ResponseMode::Streaming),
            Self::MultiPart => Some(ResponseMode::MultiPart),
        }
    }
}

pub async fn run(
    message: Option<String>,
    robot: Option<String>,
    mode: ModeArg,
    conversation: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let conversation_id = conversation
        .as_deref()
        .map(ConversationId::from)
        .unwrap_or_else(ConversationId::new);
    watch_tools(&runtime.events);

    if let Some(text) = message {
        return send(&runtime, &conversation_id, &text, robot.as_deref(), mode).await;
    }

    println!();
    println!("  botrelay chat");
    println!("  Conversation: {conversation_id}");
    println!("  Robots:       {}", runtime.orchestrator.router().registry().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == "exit" || text == "quit" {
            break;
        }
        if !text.is_empty()
            && let Err(e) = send(&runtime, &conversation_id, text, robot.as_deref(), mode).await
        {
            eprintln!("  [Error] {e}");
        }
        prompt()?;
    }

    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

async fn send(
    runtime: &Runtime,
    conversation_id: &ConversationId,
    text: &str,
    robot: Option<&str>,
    mode: ModeArg,
) -> Result<(), Box<dyn std::error::Error>> {
    let message = ConversationMessage::customer(conversation_id.clone(), text);
    // The transport owns inbound persistence; here the CLI plays that part
    runtime.store.append(message.clone()).await;

    let decision = runtime.orchestrator.decide(&message, robot, mode.forced())?;
    eprintln!("  [{} / {}]", decision.robot_name(), decision.mode);

    if decision.mode == ResponseMode::Streaming {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_stream(rx));
        runtime.orchestrator.dispatch(message, decision, Some(tx)).await?;
        printer.await?;
        return Ok(());
    }

    let mut dispatched = runtime.orchestrator.dispatch(message, decision, None).await?;
    print_reply(&dispatched.robot, &dispatched.response.envelope_payload.content);
    if let Some(mut delayed) = dispatched.delayed.take() {
        while let Some(part) = delayed.recv().await {
            print_reply(&dispatched.robot, &part.content);
        }
    }
    Ok(())
}

async fn print_stream(rx: mpsc::UnboundedReceiver<RobotStreamEvent>) {
    let mut events = RobotStreamEvent::stream_of(rx);
    let mut out = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            RobotStreamEvent::Start => {
                print!("  ");
            }
            RobotStreamEvent::Chunk { text } => {
                print!("{}", text.replace('\n', "\n  "));
            }
            RobotStreamEvent::FullMessage { .. } => println!(),
            RobotStreamEvent::Error { message } => eprintln!("\n  [Error] {message}"),
            RobotStreamEvent::Finished => {}
        }
        let _ = out.flush();
    }
}

fn print_reply(robot: &str, content: &MessageContent) {
    let text = match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Json(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
    };
    for line in text.lines() {
        println!("  {robot} > {line}");
    }
    println!();
}

/// Print a line to stderr for every tool the robots run.
fn watch_tools(events: &Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if let DomainEvent::ToolExecuted {
                robot,
                tool_name,
                success,
                duration_ms,
                ..
            } = event.as_ref()
            {
                let status = if *success { "ok" } else { "failed" };
                eprintln!("  [{robot}: {tool_name} {status} in {duration_ms}ms]");
            }
        }
    });
}
