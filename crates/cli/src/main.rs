//! botrelay CLI: the main entry point.
//!
//! Commands:
//! - `route`   Show which robot and mode a message would get
//! - `chat`    Send messages through the full orchestration pipeline
//! - `robots`  List registered robots and their credentials
//! - `doctor`  Diagnose configuration and credentials
//! - `init`    Write a default config file

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "botrelay",
    about = "botrelay: route conversations to LLM-backed robots",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Response mode selection for `chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Whatever the router picks
    Auto,
    Immediate,
    Stream,
    MultiPart,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the routing decision for a message
    Route {
        /// Message text
        text: String,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Chat through the orchestrator
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Skip routing and talk to this robot
        #[arg(long)]
        robot: Option<String>,

        /// Response mode
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Conversation id (a new one is generated if omitted)
        #[arg(long)]
        conversation: Option<String>,
    },

    /// List registered robots
    Robots,

    /// Diagnose configuration and credentials
    Doctor,

    /// Write a default config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Route { text, json } => commands::route::run(&text, json).await?,
        Commands::Chat {
            message,
            robot,
            mode,
            conversation,
        } => commands::chat::run(message, robot, mode, conversation).await?,
        Commands::Robots => commands::robots::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Init { force } => commands::init::run(force).await?,
    }

    Ok(())
}
