//! `cag` command-line client for the CAG gateway.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod interactive;
mod render;

use client::GatewayClient;

#[derive(Parser, Debug)]
#[command(name = "cag", version, about = "Talk to a running CAG gateway")]
struct Cli {
    /// Gateway base URL
    #[arg(long, global = true, env = "CAG_SERVER_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Bypass cached pages and answers (results are still written back)
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Print raw JSON replies
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a page as markdown
    Crawl { url: String },

    /// Generate text for a prompt
    Generate { prompt: String },

    /// Answer a question about a page
    Ask {
        url: String,
        query: String,

        /// Record the exchange under this user id
        #[arg(long)]
        user: Option<String>,

        /// Include the user's recent turns as context
        #[arg(long, default_value_t = false, requires = "user")]
        history: bool,
    },

    /// Manage conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Detailed gateway health
    Health,

    /// Menu-driven session
    Interactive,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Append a turn
    Add {
        user_id: String,
        message: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Show a user's turns in order
    Get { user_id: String },
    /// Delete a user's turns
    Clear { user_id: String },
}

async fn execute(cli: Cli, client: &GatewayClient) -> Result<String> {
    let use_cache = !cli.no_cache;
    let (reply, rendered) = match &cli.command {
        Command::Crawl { url } => {
            let reply = client.crawl(url, use_cache).await?;
            let text = render::crawl(&reply);
            (reply, text)
        }
        Command::Generate { prompt } => {
            let reply = client.generate(prompt, use_cache).await?;
            let text = render::generate(&reply);
            (reply, text)
        }
        Command::Ask { url, query, user, history } => {
            let reply = client.cag(url, query, user.as_deref(), *history, use_cache).await?;
            let text = render::cag(&reply);
            (reply, text)
        }
        Command::History { action } => {
            let reply = match action {
                HistoryAction::Add { user_id, message, role } => client.add_history(user_id, role, message).await?,
                HistoryAction::Get { user_id } => client.history(user_id).await?,
                HistoryAction::Clear { user_id } => client.clear_history(user_id).await?,
            };
            let text = match action {
                HistoryAction::Get { .. } => render::history(&reply),
                _ => render::message(&reply),
            };
            (reply, text)
        }
        Command::Health => {
            let reply = client.health().await?;
            let text = render::pretty(&reply);
            (reply, text)
        }
        Command::Interactive => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            interactive::run(client, stdin, &mut std::io::stdout(), use_cache).await?;
            return Ok(String::new());
        }
    };

    Ok(if cli.json { render::pretty(&reply) } else { rendered })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(server = %cli.server, "using gateway");
    let client = GatewayClient::new(&cli.server, Duration::from_secs(cli.timeout_secs))?;

    let output = execute(cli, &client).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
