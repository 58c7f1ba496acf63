//! Transport capability consumed by the connection pool.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TelnetError;

/// A bidirectional byte stream: a TCP socket in production, an in-memory
/// pipe in tests.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// An open, authenticated connection to a device.
pub type Connection = Box<dyn Transport>;

/// Creates ready-to-use connections for a pool and probes idle ones.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open and authenticate a new connection.
    fn create(&self) -> impl Future<Output = Result<Connection, TelnetError>> + Send;

    /// Keep-alive probe for an idle connection.
    fn ping(
        &self,
        connection: &mut Connection,
    ) -> impl Future<Output = Result<(), TelnetError>> + Send;
}

impl<T: ConnectionFactory> ConnectionFactory for std::sync::Arc<T> {
    fn create(&self) -> impl Future<Output = Result<Connection, TelnetError>> + Send {
        (**self).create()
    }

    fn ping(
        &self,
        connection: &mut Connection,
    ) -> impl Future<Output = Result<(), TelnetError>> + Send {
        (**self).ping(connection)
    }
}
