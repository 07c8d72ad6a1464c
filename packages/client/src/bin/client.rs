//! Terminal chat client for a Chatline server.
//!
//! Keeps one shared streaming connection open, enters a room, prints its
//! history and live messages, and sends whatever is typed at the prompt.
//! The connection is re-established automatically with backoff.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatline-client -- --user-id alice --room 1
//! cargo run --bin chatline-client -- -u bob -r 2 --url ws://127.0.0.1:8080/ws
//! ```

use clap::Parser;

use chatline_client::{
    cli::{ClientOptions, run_client},
    config::DEFAULT_URL,
    domain::RoomId,
};
use chatline_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "chatline-client")]
#[command(about = "Terminal client for Chatline rooms with automatic reconnection", long_about = None)]
struct Args {
    /// User ID sent on CONNECT and used as the sender of messages
    #[arg(short = 'u', long)]
    user_id: String,

    /// Room to enter on start
    #[arg(short = 'r', long, default_value_t = 1)]
    room: u64,

    /// Streaming endpoint URL
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    /// Endpoints tried in order when the primary one cannot be opened
    #[arg(long = "fallback-url")]
    fallback_urls: Vec<String>,

    /// REST API root URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api_url: String,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let options = ClientOptions {
        url: args.url,
        fallback_urls: args.fallback_urls,
        api_url: args.api_url,
        user_id: args.user_id,
        room: RoomId::new(args.room),
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
