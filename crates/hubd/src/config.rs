//! Command-line and environment configuration.

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;

use crate::server::Settings;

/// Which hub the process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HubKind {
    Chat,
    IntegrationTest,
}

impl HubKind {
    /// The port each hub listens on unless told otherwise.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Chat => 5000,
            Self::IntegrationTest => 51001,
        }
    }
}

/// Serves a hub over TCP with record-separated JSON frames.
#[derive(Parser, Debug, Clone)]
#[command(name = "hubd", version)]
pub struct Config {
    /// Hub to serve
    #[arg(long, env = "HUBD_HUB", value_enum, default_value_t = HubKind::Chat)]
    pub hub: HubKind,

    /// Address to listen on [default: 0.0.0.0 on the hub's port]
    #[arg(long, env = "HUBD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Seconds between keep-alive pings; 0 disables them
    #[arg(long, env = "HUBD_KEEP_ALIVE_SECS", default_value_t = 15)]
    pub keep_alive_secs: u64,

    /// Largest inbound frame accepted before the connection is closed
    #[arg(long, env = "HUBD_MAX_FRAME_BYTES", default_value_t = 1024 * 1024)]
    pub max_frame_bytes: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.hub.default_port()))
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }

    pub fn settings(&self) -> Settings {
        Settings { keep_alive: self.keep_alive(), max_frame_bytes: self.max_frame_bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_hub_kind() {
        let config = Config::try_parse_from(["hubd", "--hub", "integration-test"]).unwrap();
        assert_eq!(config.hub, HubKind::IntegrationTest);
        assert_eq!(config.listen_addr().port(), 51001);
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(15)));
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
    }

    #[test]
    fn test_explicit_listen_and_disabled_keep_alive() {
        let config =
            Config::try_parse_from(["hubd", "--listen", "127.0.0.1:9000", "--keep-alive-secs", "0"]).unwrap();
        assert_eq!(config.hub, HubKind::Chat);
        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.keep_alive(), None);
    }

    #[test]
    fn test_unknown_hub_rejected() {
        assert!(Config::try_parse_from(["hubd", "--hub", "lobby"]).is_err());
    }
}
