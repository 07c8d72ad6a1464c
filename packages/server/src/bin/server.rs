//! Chatline development broker.
//!
//! Accepts frame-protocol sessions on `/ws`, assigns message ids per room,
//! fans messages out to room subscribers and serves the room history API.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatline-server
//! cargo run --bin chatline-server -- --port 3000 --restricted-rooms 9,10
//! ```

use std::time::Duration;

use clap::Parser;

use chatline_server::{Server, ServerConfig};
use chatline_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "chatline-server")]
#[command(about = "Development broker for Chatline rooms", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Rooms whose subscriptions are refused (comma separated)
    #[arg(long, value_delimiter = ',')]
    restricted_rooms: Vec<u64>,

    /// Heart-beat interval offered to clients in milliseconds (0 disables)
    #[arg(long, default_value = "10000")]
    heartbeat_ms: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let server = Server::in_memory(ServerConfig {
        restricted_rooms: args.restricted_rooms,
        heart_beat: Duration::from_millis(args.heartbeat_ms),
    });

    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
