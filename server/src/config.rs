//! Server configuration, parsed from the command line.

use clap::Parser;
use shared::protocol::DEFAULT_REVISION;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "43594")]
    pub port: u16,
    /// Milliseconds per simulation tick
    #[clap(short, long, default_value = "600")]
    pub tick_ms: u64,
    /// Client protocol revision accepted at login
    #[clap(long, default_value_t = DEFAULT_REVISION)]
    pub revision: i16,
    /// Maximum number of players logged in at once
    #[clap(long, default_value = "2000")]
    pub max_players: usize,
    /// System message sent to every player after login
    #[clap(long, default_value = "Welcome to the realm.")]
    pub greeting: String,
    /// PEM file holding the private login key (PKCS#1 or PKCS#8)
    #[clap(long, default_value = "login_key.pem")]
    pub private_key: PathBuf,
    /// Handshake socket receive timeout in milliseconds
    #[clap(long, default_value = "5000")]
    pub receive_timeout_ms: u64,
    /// Handshake socket send timeout in milliseconds
    #[clap(long, default_value = "5000")]
    pub send_timeout_ms: u64,
    /// Start with logins refused
    #[clap(long)]
    pub login_disabled: bool,
    /// Radius in tiles within which entities can see each other
    #[clap(long, default_value = "15")]
    pub view_range: i32,
    /// Ticks a disconnected player stays in the world awaiting a reconnect
    #[clap(long, default_value = "100")]
    pub reconnect_grace_ticks: u32,
    /// Ticks before a player-dropped item becomes visible to everyone
    #[clap(long, default_value = "200")]
    pub item_public_ticks: u32,
    /// Ticks before a ground item despawns
    #[clap(long, default_value = "600")]
    pub item_despawn_ticks: u32,
    /// Ticks between periodic saves of every logged-in player
    #[clap(long, default_value = "500")]
    pub save_interval_ticks: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["realm-server"])
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_empty_command_line() {
        let config = ServerConfig::default();
        assert_eq!(config.revision, 317);
        assert_eq!(config.tick_duration(), Duration::from_millis(600));
        assert_eq!(config.address(), "127.0.0.1:43594");
        assert!(!config.login_disabled);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = ServerConfig::parse_from([
            "realm-server",
            "--port",
            "5555",
            "--revision",
            "377",
            "--login-disabled",
        ]);
        assert_eq!(config.port, 5555);
        assert_eq!(config.revision, 377);
        assert!(config.login_disabled);
    }
}
