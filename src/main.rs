use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tictactoe_server::config::{DEFAULT_PORT, ServerConfig};
use tictactoe_server::session::GameServer;

/// Two-player tic-tac-toe server
#[derive(Parser, Debug)]
#[command(name = "tictactoe-server")]
#[command(about = "Authoritative two-player tic-tac-toe over WebSocket", long_about = None)]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pong_timeout_secs: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: SocketAddr::new(args.host, args.port),
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            pong_timeout: Duration::from_secs(args.pong_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tictactoe_server=info")),
        )
        .init();

    let config = ServerConfig::from(Args::parse());
    info!("Starting tictactoe-server v{}", env!("CARGO_PKG_VERSION"));

    let server = GameServer::bind(config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
