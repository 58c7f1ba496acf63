//! GENA event subscriptions (`SUBSCRIBE` / renew / `UNSUBSCRIBE`).

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Client, Method};

use crate::error::UpnpError;

static SUBSCRIBE: LazyLock<Method> =
    LazyLock::new(|| Method::from_bytes(b"SUBSCRIBE").expect("SUBSCRIBE is a valid method"));
static UNSUBSCRIBE: LazyLock<Method> =
    LazyLock::new(|| Method::from_bytes(b"UNSUBSCRIBE").expect("UNSUBSCRIBE is a valid method"));

/// One subscribe or renew call.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeRequest<'a> {
    /// Event URL of the device service.
    pub url: &'a str,
    /// `Some` renews an existing subscription, `None` opens a fresh one.
    pub sid: Option<&'a str>,
    pub lease: Duration,
    /// Whether the caller keeps renewing the lease. GENA has no header for
    /// this, so it only shapes the caller's renewal loop.
    pub auto_renew: bool,
    /// Where the device should send `NOTIFY` requests.
    pub callback: &'a str,
}

/// Subscription capability consumed by the producer.
pub trait Subscriber: Send + Sync + 'static {
    /// Subscribe or renew, returning the subscription ID granted.
    fn subscribe(
        &self,
        request: SubscribeRequest<'_>,
    ) -> impl Future<Output = Result<String, UpnpError>> + Send;

    fn unsubscribe(&self, url: &str, sid: &str) -> impl Future<Output = Result<(), UpnpError>> + Send;
}

/// [`Subscriber`] speaking GENA over HTTP.
#[derive(Debug, Clone)]
pub struct GenaClient {
    client: Client,
}

impl GenaClient {
    /// # Errors
    ///
    /// Returns [`UpnpError::Http`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, UpnpError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Subscriber for GenaClient {
    async fn subscribe(&self, request: SubscribeRequest<'_>) -> Result<String, UpnpError> {
        let mut builder = self
            .client
            .request(SUBSCRIBE.clone(), request.url)
            .header("TIMEOUT", format!("Second-{}", request.lease.as_secs()));
        // a renewal carries only the SID; CALLBACK and NT are for new subscriptions
        builder = match request.sid {
            Some(sid) => builder.header("SID", sid),
            None => builder
                .header("CALLBACK", format!("<{}>", request.callback))
                .header("NT", "upnp:event"),
        };

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(UpnpError::Status {
                action: "SUBSCRIBE",
                status: response.status().as_u16(),
            });
        }
        response
            .headers()
            .get("SID")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(UpnpError::MissingSid)
    }

    async fn unsubscribe(&self, url: &str, sid: &str) -> Result<(), UpnpError> {
        let response = self
            .client
            .request(UNSUBSCRIBE.clone(), url)
            .header("SID", sid)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UpnpError::Status {
                action: "UNSUBSCRIBE",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
