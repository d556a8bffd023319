use clap::Parser;
use log::info;
use server::store::MemoryStore;
use server::{Server, ServerConfig};
use shared::DEFAULT_GRID_SIZE;
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Grid size for newly created rooms
    #[clap(short, long, default_value_t = DEFAULT_GRID_SIZE)]
    grid_size: usize,
    /// Persist the action log to this file
    #[clap(short, long)]
    snapshot: Option<PathBuf>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            grid_size: args.grid_size,
            snapshot: args.snapshot,
        }
    }
}

/// Parses command-line arguments, opens the store and runs the server until
/// Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::from(Args::parse());

    let store = match &config.snapshot {
        Some(path) => {
            info!("Persisting action log to {}", path.display());
            MemoryStore::open(path).await?
        }
        None => MemoryStore::new(),
    };

    let server = Server::bind(&config.address(), store, config.grid_size).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
