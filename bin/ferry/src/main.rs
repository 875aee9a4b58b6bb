//! Ferry CLI - Command-line client for the ferry file transfer service.
//!
//! Provides one-shot commands for:
//! - Sending a local file to a node
//! - Fetching an object back from a node
//! - Deleting an object on a node

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use ferry_node::client::DEFAULT_OBJECT_ID;
use ferry_node::Client;

/// Ferry file transfer CLI.
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Origin ID stamped into outgoing requests
    #[arg(long, default_value = "ferry-cli")]
    origin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a local file to a node
    Send {
        /// Destination address, host:port
        addr: String,

        /// File to send
        path: PathBuf,

        /// Object ID to store under
        #[arg(long, default_value = DEFAULT_OBJECT_ID)]
        id: String,
    },

    /// Fetch an object from a node
    Fetch {
        /// Destination address, host:port
        addr: String,

        /// Path naming the object to fetch (its name and extension)
        path: PathBuf,

        /// Object ID to fetch
        #[arg(long, default_value = DEFAULT_OBJECT_ID)]
        id: String,

        /// Where to write the fetched payload (defaults to the object name
        /// in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an object on a node
    Delete {
        /// Destination address, host:port
        addr: String,

        /// Path naming the object to delete
        path: PathBuf,

        /// Object ID to delete
        #[arg(long, default_value = DEFAULT_OBJECT_ID)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let client = Client::new(cli.origin);

    match cli.command {
        Commands::Send { addr, path, id } => {
            let bytes = client
                .send_file(&addr, &path, &id)
                .await
                .with_context(|| format!("Failed to send {}", path.display()))?;
            println!("Sent {} ({} bytes) to {}", path.display(), bytes, addr);
        }

        Commands::Fetch {
            addr,
            path,
            id,
            output,
        } => {
            let (envelope, payload) = client
                .fetch_file(&addr, &path, &id)
                .await
                .with_context(|| format!("Failed to fetch {}", path.display()))?;

            let target = output.unwrap_or_else(|| PathBuf::from(envelope.object_name()));
            tokio::fs::write(&target, &payload)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!(
                "Fetched {} ({} bytes) to {}",
                envelope.object_name(),
                payload.len(),
                target.display()
            );
        }

        Commands::Delete { addr, path, id } => {
            client
                .delete_file(&addr, &path, &id)
                .await
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            println!("Deleted {} on {}", path.display(), addr);
        }
    }

    Ok(())
}
