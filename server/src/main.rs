use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;

/// Parses command-line arguments, then runs the lobby server until it stops
/// or Ctrl+C is received.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        println!("Set RUST_LOG=info (or debug) to see server logs");
    }

    let config = ServerConfig::parse();
    let mut server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
