//! `botrelay route`: Show the routing decision for a message.

use botrelay_core::message::{ConversationId, ConversationMessage};

use crate::runtime::Runtime;

pub async fn run(text: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let message = ConversationMessage::customer(ConversationId::new(), text);
    let decision = runtime.orchestrator.router().route(&message);

    if json {
        let out = serde_json::json!({
            "robot": decision.robot_name(),
            "mode": decision.mode,
            "rule": decision.rule,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("  Robot:  {}", decision.robot_name());
        println!("  Mode:   {}", decision.mode);
        println!("  Rule:   {}", decision.rule);
    }

    Ok(())
}
