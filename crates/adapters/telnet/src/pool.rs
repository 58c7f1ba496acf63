//! Bounded pool of live connections to one device.
//!
//! A semaphore caps the number of connections checked out at once. Idle
//! connections are kept for reuse and probed by [`ConnectionPool::keep_alive`].
//! A checked-out connection goes back to the pool when dropped, or is
//! thrown away with [`PooledConnection::discard`] after an IO failure.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TelnetError;
use crate::transport::{Connection, ConnectionFactory};

pub struct ConnectionPool<F> {
    name: String,
    size: usize,
    factory: F,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

impl<F> ConnectionPool<F> {
    /// Number of idle connections ready for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Refuse new checkouts and drop every idle connection.
    pub fn close(&self) {
        self.permits.close();
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(pool = %self.name, "connection pool closed");
    }

    fn release(&self, connection: Connection) {
        if self.permits.is_closed() {
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection);
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create an empty pool; connections are opened lazily on checkout.
    pub fn new(name: impl Into<String>, size: usize, factory: F) -> Self {
        Self {
            name: name.into(),
            size,
            factory,
            permits: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Take a connection, opening one if none is idle. Waits while all
    /// `size` connections are checked out.
    ///
    /// # Errors
    ///
    /// Returns [`TelnetError::PoolClosed`] after [`close`](Self::close), or
    /// whatever the factory fails with.
    pub async fn checkout(self: &Arc<Self>) -> Result<PooledConnection<F>, TelnetError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TelnetError::PoolClosed)?;
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let connection = match idle {
            Some(connection) => connection,
            None => {
                tracing::debug!(pool = %self.name, "opening new connection");
                self.factory.create().await?
            }
        };
        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Ping every idle connection that is not checked out, dropping the
    /// ones that fail.
    pub async fn keep_alive(&self) {
        let count = self.idle_count();
        for _ in 0..count {
            let Ok(_permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let idle = self
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
            let Some(mut connection) = idle else {
                break;
            };
            match self.factory.ping(&mut connection).await {
                Ok(()) => {
                    self.idle
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(0, connection);
                }
                Err(err) => {
                    tracing::warn!(pool = %self.name, error = %err, "dropping dead connection");
                }
            }
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection<F> {
    connection: Option<Connection>,
    pool: Arc<ConnectionPool<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F> PooledConnection<F> {
    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        self.connection.take();
    }
}

impl<F> Deref for PooledConnection<F> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<F> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<F> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    /// Hands out prepared in-memory pipes; pings fail once `fail_pings` is set.
    #[derive(Default)]
    pub(crate) struct PipeFactory {
        pub(crate) pipes: Mutex<VecDeque<DuplexStream>>,
        pub(crate) created: AtomicUsize,
        pub(crate) pings: AtomicUsize,
        pub(crate) fail_pings: std::sync::atomic::AtomicBool,
    }

    impl PipeFactory {
        /// Queue a pipe and return the device side of it.
        pub(crate) fn expect_connection(&self) -> DuplexStream {
            let (client, server) = tokio::io::duplex(1024);
            self.pipes.lock().unwrap().push_back(client);
            server
        }
    }

    impl ConnectionFactory for PipeFactory {
        async fn create(&self) -> Result<Connection, TelnetError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let pipe = self.pipes.lock().unwrap().pop_front();
            match pipe {
                Some(pipe) => Ok(Box::new(pipe)),
                None => Err(TelnetError::Connect {
                    address: "pipe".to_string(),
                    source: std::io::ErrorKind::ConnectionRefused.into(),
                }),
            }
        }

        async fn ping(&self, connection: &mut Connection) -> Result<(), TelnetError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail_pings.load(Ordering::SeqCst) {
                return Err(TelnetError::Ping(std::io::ErrorKind::BrokenPipe.into()));
            }
            crate::session::ping(connection, Duration::from_secs(1)).await
        }
    }

    #[tokio::test]
    async fn should_reuse_released_connection() {
        let factory = PipeFactory::default();
        let _device = factory.expect_connection();
        let pool = Arc::new(ConnectionPool::new("test", 2, factory));

        drop(pool.checkout().await.unwrap());
        assert_eq!(pool.idle_count(), 1);
        drop(pool.checkout().await.unwrap());

        assert_eq!(pool.factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_not_reuse_discarded_connection() {
        let factory = PipeFactory::default();
        let _first = factory.expect_connection();
        let _second = factory.expect_connection();
        let pool = Arc::new(ConnectionPool::new("test", 1, factory));

        pool.checkout().await.unwrap().discard();
        assert_eq!(pool.idle_count(), 0);
        drop(pool.checkout().await.unwrap());

        assert_eq!(pool.factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_while_all_connections_are_checked_out() {
        let factory = PipeFactory::default();
        let _device = factory.expect_connection();
        let pool = Arc::new(ConnectionPool::new("test", 1, factory));

        let held = pool.checkout().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_secs(1), pool.checkout()).await;
        assert!(blocked.is_err());

        drop(held);
        assert!(pool.checkout().await.is_ok());
    }

    #[tokio::test]
    async fn should_ping_idle_connections() {
        let factory = PipeFactory::default();
        let mut device = factory.expect_connection();
        let pool = Arc::new(ConnectionPool::new("test", 2, factory));
        drop(pool.checkout().await.unwrap());

        pool.keep_alive().await;

        let mut buf = [0_u8; 7];
        tokio::io::AsyncReadExt::read_exact(&mut device, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"#PING\r\n");
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn should_drop_connection_when_ping_fails() {
        let factory = PipeFactory::default();
        let _device = factory.expect_connection();
        factory.fail_pings.store(true, Ordering::SeqCst);
        let pool = Arc::new(ConnectionPool::new("test", 2, factory));
        drop(pool.checkout().await.unwrap());

        pool.keep_alive().await;

        assert_eq!(pool.factory.pings.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn should_refuse_checkout_after_close() {
        let pool = Arc::new(ConnectionPool::new("test", 1, PipeFactory::default()));
        pool.close();
        assert!(matches!(
            pool.checkout().await,
            Err(TelnetError::PoolClosed)
        ));
    }
}
