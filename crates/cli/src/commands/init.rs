//! `botrelay init`: Write a default configuration file.

use botrelay_config::AppConfig;

pub async fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Wrote {}", config_path.display());
    println!();
    println!("  Next steps:");
    println!("    1. Export ANTHROPIC_API_KEY and OPENAI_API_KEY (and SLACK_BOT_TOKEN for Slack tools)");
    println!("    2. Run: botrelay doctor");
    println!("    3. Run: botrelay chat");

    Ok(())
}
