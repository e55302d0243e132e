mod migrations;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use lurkhunt_core::twitch::StreamsQuery;
use lurkhunt_core::{logging, Config};

#[derive(Parser)]
#[command(name = "lurkhunt", about = "Platform-scale lurker-bot scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP admin surface (token drop-off, forced refresh, health)
    Serve,
    /// Conduct one scan over the live-stream population
    Scan {
        /// Restrict enumeration to one category id
        #[arg(long)]
        game_id: Option<String>,
        /// Restrict enumeration to specific logins (repeatable)
        #[arg(long)]
        user_login: Option<String>,
    },
    /// Run one viewer-list fetcher worker
    Worker {
        /// Stable id for this worker's logs
        #[arg(long, default_value = "worker1")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Err(e) = config.twitch.load_secrets() {
        // Tolerable for `serve` before first auth; scans will fail loudly.
        eprintln!("Could not load client secrets: {e}");
    }

    logging::init_logging(&config.logging)?;
    warn_if_unconfigured(&config);

    match cli.command {
        Command::Serve => server::serve(config).await,
        Command::Scan {
            game_id,
            user_login,
        } => {
            let filters = StreamsQuery {
                game_id,
                user_login,
                ..StreamsQuery::default()
            };
            server::run_scan(config, filters).await
        }
        Command::Worker { id } => server::run_worker(config, id).await,
    }
}

fn warn_if_unconfigured(config: &Config) {
    if config.twitch.client_id.is_empty() {
        warn!("No Twitch client id configured; API calls will be rejected");
    }
    if config.twitch.bot_login.is_empty() {
        warn!("No bot login configured; chat authentication will fail");
    }
}
