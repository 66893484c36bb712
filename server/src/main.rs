mod admin;
mod liveness;
mod network;
mod registry;

use admin::AdminState;
use clap::Parser;
use log::{error, info};
use network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the presence socket to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port for the presence protocol
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// TCP port for the admin HTTP surface
    #[arg(long, default_value = "8081")]
    admin_port: u16,

    /// Admin password; falls back to the ADMIN_PASS environment variable
    #[arg(long)]
    admin_pass: Option<String>,

    /// Liveness probe interval in milliseconds
    #[arg(long, default_value = "10000")]
    probe_interval_ms: u64,

    /// Liveness miss-check interval in milliseconds
    #[arg(long, default_value = "20000")]
    miss_check_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        probe_interval: Duration::from_millis(args.probe_interval_ms),
        miss_check_interval: Duration::from_millis(args.miss_check_interval_ms),
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    let admin_pass = args
        .admin_pass
        .or_else(|| std::env::var("ADMIN_PASS").ok())
        .unwrap_or_default();
    let admin_address = format!("{}:{}", args.host, args.admin_port);
    let admin_state = AdminState::new(admin_pass, server.admin_sender(), server.stats());

    let admin_handle = tokio::spawn(async move {
        if let Err(e) = admin::serve(&admin_address, admin_state).await {
            error!("Admin surface failed: {}", e);
        }
    });

    tokio::select! {
        result = server.run() => {
            result?;
        }
        result = admin_handle => {
            if let Err(e) = result {
                error!("Admin task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
