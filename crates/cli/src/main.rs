//! HomeClaw CLI — the main entry point.
//!
//! Commands:
//! - (none)    — Interactive chat, or one message with `-m`
//! - `onboard` — Create config, credentials and workspace
//! - `agent`   — Same as the default command
//! - `status`  — Show configuration and workspace state
//! - `cron`    — Manage and run heartbeat tasks
//! - `gateway` — Run Telegram, Discord and Slack gateways

use clap::{Args, Parser, Subcommand};
use homeclaw_config::{AppConfig, ConfigError};
use std::process::ExitCode;

mod commands;
mod context;

use commands::gateway::Platform;
use context::AppContext;

#[derive(Parser)]
#[command(
    name = "homeclaw",
    about = "HomeClaw — a personal AI assistant for the terminal and your chat apps",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Clone, Default)]
struct ChatArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Conversation thread to continue
    #[arg(short, long)]
    thread: Option<String>,

    /// Model to use instead of the configured default (alias or provider:model)
    #[arg(long)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, credentials and workspace
    Onboard {
        /// Provider key from the built-in catalog (e.g. openai, anthropic)
        #[arg(long)]
        provider: Option<String>,
        /// Model id for that provider
        #[arg(long)]
        model: Option<String>,
        /// API key to store in the credentials file
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Chat with the assistant
    Agent(ChatArgs),

    /// Show configuration, credentials and workspace state
    Status,

    /// Manage heartbeat tasks in HEARTBEAT.md
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },

    /// Run chat platform gateways
    Gateway {
        #[arg(value_enum)]
        platform: Platform,
        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Subcommand)]
enum CronAction {
    /// List heartbeat tasks and their schedules
    List,
    /// Add a task, optionally prefixed with [every 30m] or [cron 0 9 * * *]
    Add { task: String },
    /// Remove a task
    Remove { task: String },
    /// Run the heartbeat scheduler until Ctrl+C
    Start {
        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.downcast_ref::<ConfigError>().is_some() {
                eprintln!("Run `homeclaw onboard` to fix your configuration.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let chat = match cli.command {
        Some(Commands::Onboard { provider, model, api_key }) => {
            return commands::onboard::run(commands::onboard::OnboardOptions {
                provider,
                model,
                api_key,
            });
        }
        Some(Commands::Agent(args)) => args,
        Some(Commands::Status) => return commands::status::run(&AppContext::load()?).await,
        Some(Commands::Cron { action }) => {
            let ctx = AppContext::load()?;
            return match action {
                CronAction::List => commands::cron::list(&ctx),
                CronAction::Add { task } => commands::cron::add(&ctx, &task),
                CronAction::Remove { task } => commands::cron::remove(&ctx, &task),
                CronAction::Start { model } => commands::cron::start(&ctx, model).await,
            };
        }
        Some(Commands::Gateway { platform, model }) => {
            return commands::gateway::run(&AppContext::load()?, platform, model).await;
        }
        None => cli.chat,
    };

    if !AppConfig::config_path().exists() {
        println!("No configuration found; starting setup.\n");
        commands::onboard::run(commands::onboard::OnboardOptions::default())?;
        println!();
    }
    let ctx = AppContext::load()?;
    commands::agent::run(&ctx, chat.message, chat.thread, chat.model).await
}
