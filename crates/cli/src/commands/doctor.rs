//! `botrelay doctor`: Diagnose configuration and credentials.

use botrelay_config::AppConfig;
use botrelay_tools::slack::SLACK_TOKEN_ENV;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("botrelay doctor");
    println!("===============\n");

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ok    Config file: {}", config_path.display());
    } else {
        println!("  warn  No config file, using defaults (run `botrelay init`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ok    Configuration valid");
            config
        }
        Err(e) => {
            println!("  fail  Configuration invalid: {e}");
            return Ok(());
        }
    };

    let issues = check(&config, |key| std::env::var(key).ok());
    for issue in &issues {
        println!("  warn  {issue}");
    }

    println!();
    if issues.is_empty() {
        println!("  All checks passed!");
    } else {
        println!("  {} issue(s) found. See above for details.", issues.len());
    }

    Ok(())
}

/// Problems a valid configuration can still have at runtime.
fn check(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut issues = Vec::new();

    for (name, robot) in &config.robots {
        if robot.provider == "ollama" {
            continue;
        }
        if let Some(env) = robot.credential_env()
            && robot.resolve_api_key(&lookup).is_none()
        {
            issues.push(format!(
                "Robot '{name}' ({}) has no credential: set {env}",
                robot.provider
            ));
        }
    }

    let uses_slack = config
        .robots
        .values()
        .any(|r| r.catalogs.iter().any(|c| c == "slack"));
    if uses_slack && lookup(SLACK_TOKEN_ENV).is_none_or(|t| t.trim().is_empty()) {
        issues.push(format!("Slack tools will fail: set {SLACK_TOKEN_ENV}"));
    }

    issues
}
