use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{Server, ServerMessage};
use server::state::AdmissionState;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "25565")]
    port: u16,
    /// Path of the JSON config file, created with defaults if missing
    #[clap(short, long, default_value = "server.json")]
    config: PathBuf,
    /// Housekeeping ticks per second
    #[clap(short, long, default_value = "10")]
    tick_rate: u32,
}

/// Loads config and stores, then serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig::load_or_create(&args.config)?;
    let state = AdmissionState::load(config)?;
    info!(
        "Loaded {} temp bans, {} bans, {} banned IPs, {} whitelisted, {} VIPs",
        state.temp_bans.len(),
        state.bans.len(),
        state.banned_ips.len(),
        state.whitelist.len(),
        state.vips.len()
    );

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1)));
    let mut server = Server::new(&address, tick_duration, state).await?;
    let control = server.control_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = control.send(ServerMessage::Shutdown) {
                error!("Failed to signal shutdown: {}", e);
            }
        }
    });

    server.run().await?;
    Ok(())
}
