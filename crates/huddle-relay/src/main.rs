//! Huddle relay binary.
//!
//! # Usage
//!
//! ```bash
//! huddle-relay --bind 0.0.0.0:7878
//! RUST_LOG=huddle_relay=debug huddle-relay --greeting "hello from the lab"
//! ```

use clap::Parser;
use huddle_relay::{Relay, RelayConfig, RelayRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle presence and chat relay
#[derive(Parser, Debug)]
#[command(name = "huddle-relay")]
#[command(about = "Huddle presence and chat relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7878")]
    bind: String,

    /// Greeting sent to every new connection
    #[arg(short, long, default_value = "Welcome to Huddle")]
    greeting: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = RelayRuntimeConfig {
        bind_address: args.bind,
        driver: RelayConfig { greeting: args.greeting, max_connections: args.max_connections },
    };

    let relay = Relay::bind(config).await?;
    tracing::info!("Relay listening on {}", relay.local_addr()?);

    relay.run().await?;

    Ok(())
}
