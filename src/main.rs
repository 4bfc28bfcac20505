use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_relay::config::{AssistantConfig, StoreConfig};
use chat_relay::{Config, Daemon, Identity, StoreConnector, WindowPolicy, assistant};

/// Chat relay - answers Discord messages with an AI assistant that remembers recent history
#[derive(Parser)]
#[command(name = "chat-relay", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay (default)
    Run,
    /// Print stored conversation history as JSON
    History {
        /// User ID (platform-specific, e.g., Discord user ID)
        #[arg(short, long)]
        user: String,
        /// Channel ID; omit for user-scoped history
        #[arg(short, long)]
        channel: Option<String>,
        /// Only this day (YYYY-MM-DD)
        #[arg(short, long)]
        day: Option<NaiveDate>,
        /// Print the context window the assistant would see instead of the raw document
        #[arg(long)]
        window: bool,
    },
    /// Check the assistant is reachable ("Bing" should get "Bong")
    PingAssistant,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins unless verbosity was asked for explicitly
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,chat_relay=info")),
        1 => EnvFilter::new("info,chat_relay=debug"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_relay().await,
        Command::History {
            user,
            channel,
            day,
            window,
        } => show_history(user, channel, day, window).await,
        Command::PingAssistant => ping_assistant().await,
    }
}

async fn run_relay() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::debug!(?config, "loaded configuration");

    tracing::info!(store = %config.store.target, "starting chat relay");
    Daemon::new(config).run().await?;
    Ok(())
}

async fn show_history(
    user: String,
    channel: Option<String>,
    day: Option<NaiveDate>,
    window: bool,
) -> anyhow::Result<()> {
    let identity = match channel {
        Some(channel) => Identity::user_channel(user, channel),
        None => Identity::user(user),
    };

    let mut connector = StoreConnector::new(StoreConfig::from_env()?);
    connector.connect().await?;
    let fetched = connector.conversations()?.fetch(&identity, day).await;
    connector.close().await?;

    let document = fetched?;
    let output = if window {
        let context = WindowPolicy::from_env()?.select(&document, Utc::now());
        serde_json::to_string_pretty(&context)?
    } else {
        serde_json::to_string_pretty(&document)?
    };
    println!("{output}");

    Ok(())
}

async fn ping_assistant() -> anyhow::Result<()> {
    let assistant = assistant::from_config(AssistantConfig::from_env()?);
    println!("Pinging {}...", assistant.name());

    let reply = assistant.respond("Bing").await?;
    if reply.trim().trim_end_matches(['.', '!']).eq_ignore_ascii_case("bong") {
        println!("Assistant verified: {reply}");
    } else {
        println!("Assistant answered, but not with \"Bong\": {reply}");
    }

    Ok(())
}
