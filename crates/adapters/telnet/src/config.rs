//! Telnet device configuration.

use std::time::Duration;

use serde::Deserialize;

/// Connection settings for one telnet device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    /// Answer to the first `login:` prompt.
    pub login: String,
    /// Answer to the second `password:` prompt.
    pub password: String,
    /// Maximum number of simultaneous connections to the device.
    pub pool_size: usize,
    /// Hold one connection open and read observed frames from it.
    pub stream: bool,
    /// Fixed delay before reconnecting after the stream drops, in seconds.
    pub retry_delay_secs: u64,
    /// Timeout for connect, authentication reads, pings and command writes.
    pub io_timeout_secs: u64,
    /// Interval between keep-alive pings of idle connections, in seconds.
    pub keep_alive_secs: u64,
    /// Unmatched bytes kept while waiting for a complete frame.
    pub max_backlog_bytes: usize,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            login: "lutron".to_string(),
            password: "integration".to_string(),
            pool_size: 2,
            stream: true,
            retry_delay_secs: 10,
            io_timeout_secs: 5,
            keep_alive_secs: 30,
            max_backlog_bytes: 4096,
        }
    }
}

impl TelnetConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}
