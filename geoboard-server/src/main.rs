//! geoboard server binary.
//!
//! Configuration comes from the environment:
//! - `GEOBOARD_ADDR` — bind address (default `127.0.0.1:9090`)
//! - `GEOBOARD_DATA` — records document path (default `records.json`;
//!   set to an empty string for an ephemeral in-memory board)
//! - `RUST_LOG` — log filter (env_logger)

use std::path::PathBuf;

use geoboard_collab::server::{ServerConfig, SyncServer};

#[tokio::main]
async fn main() {
    env_logger::init();

    let bind_addr =
        std::env::var("GEOBOARD_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());
    let data_path = match std::env::var("GEOBOARD_DATA") {
        Ok(path) if path.is_empty() => None,
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => Some(PathBuf::from("records.json")),
    };

    let config = ServerConfig {
        bind_addr,
        data_path,
        ..ServerConfig::default()
    };

    log::info!(
        "starting geoboard server on {} (data: {})",
        config.bind_addr,
        config
            .data_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );

    let server = SyncServer::new(config);
    if let Err(e) = server.run().await {
        log::error!("server exited: {e}");
        std::process::exit(1);
    }
}
