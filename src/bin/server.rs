//! Signalling relay server for WebRTC-style peer sessions.
//!
//! Accepts WebSocket connections, lets clients join capacity-bounded rooms
//! and relay signalling payloads to each other.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000 --max-room-size 4
//! ```

use std::time::Duration;

use clap::Parser;
use kakehashi::{RelayConfig, logger::setup_logger, run_server};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Room-scoped signalling relay for WebRTC-style sessions", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Maximum number of members per room
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(2..))]
    max_room_size: u32,

    /// Seconds of inbound silence before a connection is reaped (0 disables)
    #[arg(long, default_value_t = 120)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let config = RelayConfig {
        max_room_size: args.max_room_size as usize,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
    };

    if let Err(e) = run_server(args.host, args.port, config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
