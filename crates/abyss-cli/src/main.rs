//! Abyss CLI - exercises the data layer from a terminal.
//!
//! Builds the call engine from environment configuration and exposes a raw
//! `get` and the cached roadmap feed.

mod commands;

use abyss_core::network::RateLimitWatcher;
use abyss_core::{ApiClient, ClientSettings, FileStore, InterceptorRegistry, LocalStore};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "abyss")]
#[command(about = "Resilient client for the From Abyss API")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory for the local store (defaults to the platform data dir)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// GET an endpoint and print the decoded body
    Get {
        /// Path relative to the API base URL, or an absolute URL
        endpoint: String,

        /// Retries after the first attempt on 5xx or network failure
        #[arg(long, default_value = "0")]
        retry: u32,

        /// Fixed delay between retries in milliseconds
        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the roadmap of the tracked repositories
    Roadmap {
        /// Ignore the cache and fetch every repository
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = ClientSettings::from_env()?;
    debug!(
        "Using {} ({} profile)",
        settings.base_url, settings.profile
    );

    let store: Arc<dyn LocalStore> = match args.store_dir {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => Arc::new(FileStore::default_location()?),
    };

    let registry = InterceptorRegistry::standard(&settings, store.clone());
    // The roadmap feed watches GitHub's budget itself.
    if matches!(args.command, Command::Get { .. }) {
        registry.add_response_interceptor(RateLimitWatcher::default());
    }
    let client = Arc::new(ApiClient::new(&settings, Arc::new(registry))?);

    match args.command {
        Command::Get {
            endpoint,
            retry,
            retry_delay_ms,
            timeout_ms,
        } => commands::get(&client, &endpoint, retry, retry_delay_ms, timeout_ms).await,
        Command::Roadmap { force } => commands::roadmap(client, store, force).await,
    }
}
