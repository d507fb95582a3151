//! Command line configuration for the lobby server

use clap::Parser;
use shared::{Settings, DEFAULT_ESTIMATION_SCALE, DEFAULT_TIMER_SECONDS};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Boss battle estimation lobby server")]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Maximum number of connected clients
    #[clap(long, default_value = "256")]
    pub max_clients: usize,
    /// Seconds of silence before a player is shown as disconnected
    #[clap(long, default_value = "10")]
    pub idle_timeout: u64,
    /// Seconds of silence before a player is removed
    #[clap(long, default_value = "30")]
    pub drop_timeout: u64,
    /// Commands each lobby may have queued before new ones are refused
    #[clap(long, default_value = "128")]
    pub lobby_queue: usize,
    /// Default round timer for new lobbies, in seconds
    #[clap(long, default_value_t = DEFAULT_TIMER_SECONDS)]
    pub round_timer: u32,
    /// Default issue tracker link prefix for new lobbies
    #[clap(long)]
    pub jira_base_url: Option<String>,
    /// Default estimation scale for new lobbies, comma separated
    #[clap(long, value_delimiter = ',', default_values_t = DEFAULT_ESTIMATION_SCALE.to_vec())]
    pub estimation_scale: Vec<f64>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Never shorter than the idle timeout.
    pub fn drop_after(&self) -> Duration {
        Duration::from_secs(self.drop_timeout.max(self.idle_timeout))
    }

    /// Settings every new lobby starts with.
    pub fn default_settings(&self) -> Settings {
        Settings {
            timer_seconds: self.round_timer,
            jira_base_url: self.jira_base_url.clone(),
            estimation_scale: self.estimation_scale.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["server"])
    }
}
