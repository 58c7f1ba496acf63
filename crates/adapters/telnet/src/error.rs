//! Telnet adapter error types.

use std::io;

use homewire_domain::error::HubError;

/// Errors specific to the telnet adapter.
#[derive(Debug, thiserror::Error)]
pub enum TelnetError {
    #[error("failed to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The login/password handshake failed at `stage`.
    #[error("authentication failed while {stage}")]
    Auth {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("timed out while {stage}")]
    Timeout { stage: &'static str },

    /// The keep-alive frame could not be written.
    #[error("ping failed")]
    Ping(#[source] io::Error),

    #[error("connection IO error")]
    Io(#[from] io::Error),

    /// `init_connections` has not been called yet.
    #[error("connection pool not initialised")]
    NotConnected,

    #[error("connection pool closed")]
    PoolClosed,

    #[error("connections already initialised")]
    AlreadyInitialised,

    #[error("event stream already started")]
    AlreadyStreaming,
}

impl TelnetError {
    /// Convert into a [`HubError::Transport`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> HubError {
        HubError::Transport(Box::new(self))
    }
}

impl From<TelnetError> for HubError {
    fn from(err: TelnetError) -> Self {
        err.into_domain()
    }
}
