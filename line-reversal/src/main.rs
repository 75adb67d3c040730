//! Entry point for `line-reversal`.
//!
//! Parses CLI arguments, binds the UDP socket, and serves sessions until the
//! socket fails.  All protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use line_reversal::{config, Config, Server, Socket};

/// Line-reversal service over a reliable UDP session protocol.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to bind (e.g. 0.0.0.0:40000).
    #[arg(short, long, default_value = "0.0.0.0:40000")]
    bind: SocketAddr,

    /// Seconds of inactivity before a session is closed.
    #[arg(long, default_value_t = config::SESSION_EXPIRY.as_secs())]
    session_expiry_secs: u64,

    /// Milliseconds without an ack before unacknowledged data is resent.
    #[arg(long, default_value_t = config::RETRANSMIT_TIMEOUT.as_millis() as u64)]
    retransmit_ms: u64,

    /// Maximum payload bytes per outbound data packet, before escaping.
    #[arg(long, default_value_t = config::MAX_CHUNK)]
    max_chunk: usize,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            session_expiry: Duration::from_secs(self.session_expiry_secs),
            retransmit_timeout: Duration::from_millis(self.retransmit_ms),
            max_chunk: self.max_chunk,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.config();
    log::info!("Starting line-reversal server on {} ({config:?})", cli.bind);

    let socket = Socket::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    Server::new(config).run(socket).await?;
    Ok(())
}
