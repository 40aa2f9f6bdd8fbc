//! Command-line interface for maxwell-sync
//!
//! # Usage Examples
//!
//! ```bash
//! # Replay a batch into the database named by each event
//! maxwell-sync replay --input batch.jsonl \
//!   --cluster-name prod --secrets-file /etc/maxwell/secrets.yaml
//!
//! # Same, through a proxy endpoint
//! maxwell-sync replay --input batch.jsonl --secret-name /maxwell/prod \
//!   --secrets-file secrets.yaml --host-override proxy.internal
//!
//! # Kinesis trigger event on stdin, statements printed instead of executed
//! cat event.json | maxwell-sync replay --input - --format kinesis --dry-run \
//!   --mysql-host 127.0.0.1 --mysql-password secret
//!
//! # SQL only, no credentials or connection
//! maxwell-sync render --input batch.jsonl
//! ```

use clap::{Parser, Subcommand};
use maxwell_sync::{render_batch, CredentialOpts, InputOpts};
use maxwell_sync_mysql_sink::{process_batch, DryRunConnector};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maxwell-sync")]
#[command(about = "Replays Maxwell change events into MySQL")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a batch of change events against MySQL
    Replay {
        #[command(flatten)]
        input: InputOpts,

        #[command(flatten)]
        credentials: CredentialOpts,

        /// Print each statement instead of executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the SQL for a batch without connecting to anything
    Render {
        #[command(flatten)]
        input: InputOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging() {
    // RUST_LOG wins, then LOG_LEVEL, then info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            credentials,
            dry_run,
        } => {
            let secret_name = credentials.secret_name()?;
            let provider = credentials.credential_provider()?;
            let payloads = input.read_batch().await?;
            info!("Read {} records from {}", payloads.len(), input.input);

            let summary = if dry_run {
                process_batch(&provider, &DryRunConnector, &secret_name, &payloads).await?
            } else {
                let connector = credentials.connector();
                process_batch(&provider, &connector, &secret_name, &payloads).await?
            };
            info!("Replay finished: {summary}");
        }
        Commands::Render { input } => {
            let payloads = input.read_batch().await?;
            for sql in render_batch(&payloads) {
                println!("{sql};");
            }
        }
    }

    Ok(())
}
