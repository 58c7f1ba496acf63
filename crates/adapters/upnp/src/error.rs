//! UPnP adapter error types.

use homewire_domain::error::HubError;

/// Errors specific to the UPnP adapter.
#[derive(Debug, thiserror::Error)]
pub enum UpnpError {
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// The device answered with a non-success status.
    #[error("{action} rejected with HTTP {status}")]
    Status { action: &'static str, status: u16 },

    #[error("SUBSCRIBE response has no SID header")]
    MissingSid,

    /// A SOAP response did not contain the expected element.
    #[error("unexpected {action} response")]
    UnexpectedResponse { action: &'static str },

    #[error("notification server failed")]
    Server(#[source] std::io::Error),

    #[error("producer already started")]
    AlreadyProducing,
}

impl UpnpError {
    /// Convert into a [`HubError::Transport`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> HubError {
        HubError::Transport(Box::new(self))
    }
}

impl From<UpnpError> for HubError {
    fn from(err: UpnpError) -> Self {
        err.into_domain()
    }
}
