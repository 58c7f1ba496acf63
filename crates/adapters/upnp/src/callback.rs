//! HTTP endpoint devices `NOTIFY` with subscription events.
//!
//! Each producer registers a key and receives the raw bodies posted to
//! `/notify/{key}`. Decoding happens in the producer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::any;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::UpnpError;

const NOTIFY_CHANNEL_CAPACITY: usize = 32;

/// Routing table from subscription key to producer.
#[derive(Debug, Clone, Default)]
pub struct CallbackRoutes {
    inner: Arc<Mutex<HashMap<String, mpsc::Sender<String>>>>,
}

impl CallbackRoutes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route bodies posted for `key` to the returned receiver, replacing
    /// any earlier registration.
    pub fn register(&self, key: impl Into<String>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), tx);
        rx
    }

    pub fn unregister(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn deliver(&self, key: &str, body: String) -> StatusCode {
        let mut routes = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = routes.get(key) else {
            return StatusCode::NOT_FOUND;
        };
        match sender.try_send(body) {
            Ok(()) => StatusCode::OK,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(key, "notification dropped, producer is behind");
                StatusCode::OK
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                routes.remove(key);
                StatusCode::NOT_FOUND
            }
        }
    }

    /// Build the axum [`Router`] serving `/notify/{key}`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/notify/{key}", any(notify))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }
}

async fn notify(
    State(routes): State<CallbackRoutes>,
    Path(key): Path<String>,
    method: Method,
    body: String,
) -> StatusCode {
    if method.as_str() != "NOTIFY" {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    routes.deliver(&key, body)
}

/// Serve `routes` on `addr` until `cancel` fires.
///
/// # Errors
///
/// Returns [`UpnpError::Server`] if the address cannot be bound or the
/// server fails.
pub async fn serve(
    routes: CallbackRoutes,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), UpnpError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(UpnpError::Server)?;
    tracing::info!(%addr, "notification server listening");
    axum::serve(listener, routes.router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(UpnpError::Server)
}
