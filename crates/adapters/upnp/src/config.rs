//! UPnP subscription configuration.

use std::time::Duration;

use serde::Deserialize;

/// Settings shared by every UPnP device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpnpConfig {
    /// Address devices use to reach the notification server.
    pub callback_host: String,
    /// Port the notification server listens on.
    pub callback_port: u16,
    /// Requested subscription lease, in seconds.
    pub lease_secs: u64,
    /// Renew each granted lease before it expires.
    pub auto_renew: bool,
    /// Delay before renewing a granted lease, in seconds.
    pub renew_after_secs: u64,
    /// Fixed delay before retrying a failed subscription, in seconds.
    pub retry_delay_secs: u64,
    /// Timeout for SOAP polls and GENA requests, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for UpnpConfig {
    fn default() -> Self {
        Self {
            callback_host: "127.0.0.1".to_string(),
            callback_port: 8989,
            lease_secs: 120,
            auto_renew: true,
            renew_after_secs: 100,
            retry_delay_secs: 10,
            fetch_timeout_secs: 5,
        }
    }
}

impl UpnpConfig {
    #[must_use]
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    /// Delay before renewal, clamped below the lease.
    #[must_use]
    pub fn renew_after(&self) -> Duration {
        Duration::from_secs(self.renew_after_secs.min(self.lease_secs.saturating_sub(1)))
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// URL a device should `NOTIFY` for subscription `key`.
    #[must_use]
    pub fn callback_url(&self, key: &str) -> String {
        format!(
            "http://{}:{}/notify/{key}",
            self.callback_host, self.callback_port
        )
    }
}
