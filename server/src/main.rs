use clap::Parser;
use log::info;
use server::accounts::MemoryAccountStore;
use server::config::ServerConfig;
use server::crypto::{public_key_path, LoginKey};
use server::network::Server;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();

    info!("Starting server...");
    info!("Revision {}, tick every {}ms", config.revision, config.tick_ms);
    let key = LoginKey::load_or_generate(&config.private_key)?;
    info!(
        "Login key loaded, public half at {}",
        public_key_path(&config.private_key).display()
    );

    let accounts = Arc::new(MemoryAccountStore::new());
    let mut server = Server::new(config, key, accounts).await?;
    server.run().await?;

    Ok(())
}
