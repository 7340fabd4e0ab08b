//! Controller configuration.
//!
//! `BrokerConfig` is the command line / environment surface of the binary.
//! `ControllerSettings` is the part the dispatch core needs, built once the
//! transport knows which addresses it actually bound.

use clap::{ArgAction, Parser};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::transport::net::BoundAddrs;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "engine-controller",
    about = "Registers compute engines and relays client requests to them"
)]
pub struct BrokerConfig {
    /// Interface every channel binds on.
    #[arg(long, env = "ENGINE_CONTROLLER_INTERFACE", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub interface: IpAddr,

    #[arg(long, env = "ENGINE_CONTROLLER_REGISTRATION_PORT", default_value_t = 10101)]
    pub registration_port: u16,

    /// UDP port for heartbeats.
    #[arg(long, env = "ENGINE_CONTROLLER_HEARTBEAT_PORT", default_value_t = 10102)]
    pub heartbeat_port: u16,

    /// Port engines connect their queue to.
    #[arg(long, env = "ENGINE_CONTROLLER_QUEUE_PORT", default_value_t = 10111)]
    pub queue_port: u16,

    #[arg(long, env = "ENGINE_CONTROLLER_CLIENT_PORT", default_value_t = 10201)]
    pub client_port: u16,

    #[arg(long, env = "ENGINE_CONTROLLER_NOTIFICATION_PORT", default_value_t = 10202)]
    pub notification_port: u16,

    /// Port a pass-through queue proxy reports traffic on.
    #[arg(long, env = "ENGINE_CONTROLLER_MONITOR_PORT", default_value_t = 10203)]
    pub monitor_port: u16,

    /// Serve `/engines` and `/queue_status` over HTTP on this port.
    #[arg(long, env = "ENGINE_CONTROLLER_HTTP_PORT")]
    pub http_port: Option<u16>,

    #[arg(long, default_value_t = 1000)]
    pub heartbeat_period_ms: u64,

    /// Consecutive missed heartbeats before an engine is declared dead.
    #[arg(long, default_value_t = 3)]
    pub heartbeat_max_misses: u32,

    /// Send an error to clients whose requests were outstanding on an engine
    /// that went away.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub notify_on_engine_failure: bool,

    #[arg(long, default_value_t = 5)]
    pub stats_interval_secs: u64,

    #[arg(long, env = "ENGINE_CONTROLLER_LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Username stamped on every message the controller sends.
    #[arg(long, default_value = "controller")]
    pub username: String,
}

impl BrokerConfig {
    pub fn addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.interface, port)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    pub fn controller_settings(&self, bound: &BoundAddrs) -> ControllerSettings {
        ControllerSettings {
            username: self.username.clone(),
            queue_addr: bound.queue.to_string(),
            heartbeat_addr: bound.heartbeat.to_string(),
            notification_addr: bound.notification.to_string(),
            heartbeat_max_misses: self.heartbeat_max_misses,
            notify_on_engine_failure: self.notify_on_engine_failure,
        }
    }
}

/// What the dispatch core needs to know about its surroundings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub username: String,
    /// Advertised to engines and clients. Tasks share the queue connection.
    pub queue_addr: String,
    pub heartbeat_addr: String,
    pub notification_addr: String,
    pub heartbeat_max_misses: u32,
    pub notify_on_engine_failure: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            username: "controller".to_string(),
            queue_addr: "127.0.0.1:10111".to_string(),
            heartbeat_addr: "127.0.0.1:10102".to_string(),
            notification_addr: "127.0.0.1:10202".to_string(),
            heartbeat_max_misses: 3,
            notify_on_engine_failure: true,
        }
    }
}
