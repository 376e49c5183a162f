//! `botrelay robots`: List registered robots.

use crate::runtime::Runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let router = runtime.orchestrator.router();

    println!("  {:<12} {:<12} {:<28} credential", "robot", "provider", "model");
    for robot in router.registry().iter() {
        let name = robot.name();
        let config = runtime.config.robots.get(name);
        let model = config.map(|c| c.model_or_default()).unwrap_or_default();
        let credential = match (robot.has_credential(), config.and_then(|c| c.credential_env())) {
            (_, None) => "not needed".to_string(),
            (true, Some(_)) => "ok".to_string(),
            (false, Some(env)) => format!("missing ({env})"),
        };
        println!(
            "  {:<12} {:<12} {:<28} {credential}",
            name,
            robot.provider_name().unwrap_or("-"),
            model
        );
    }

    println!();
    println!("  Routing:");
    for rule in router.rules() {
        println!("    {:<16} -> {} ({})", rule.name, rule.robot, rule.mode);
    }
    println!("    {:<16} -> {} (immediate)", "fallback", router.fallback());

    Ok(())
}
