//! scriptkv Development Server
//!
//! Serves an in-memory store over TCP, speaking RESP, so the CLI and the
//! library can be exercised without a real store.

use std::sync::Arc;

use clap::Parser;
use scriptkv::network::Server;
use scriptkv::{Config, MemStore};
use tracing_subscriber::{fmt, EnvFilter};

/// scriptkv development server
#[derive(Parser, Debug)]
#[command(name = "scriptkv-server")]
#[command(about = "In-memory development store for scriptkv")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Idle read timeout per connection in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,scriptkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("scriptkv server v{}", scriptkv::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let server = match Server::bind(config, Arc::new(MemStore::new())) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
