//! Login handshake and keep-alive for telnet sessions.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::TelnetConfig;
use crate::error::TelnetError;
use crate::transport::{Connection, ConnectionFactory};

const PROMPT: u8 = b':';
const MAX_PROMPT_LEN: usize = 1024;
const PING_FRAME: &[u8] = b"#PING\r\n";

/// Login and password sent in answer to the device's prompts.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Two-step challenge/response: wait for the login prompt, send the login,
/// wait for the password prompt, send the password.
///
/// Each read and write is bounded by `timeout`. Nothing is retried here.
///
/// # Errors
///
/// Returns [`TelnetError::Auth`] naming the failing step, or
/// [`TelnetError::Timeout`] when the device stays silent.
pub async fn authenticate<T>(
    conn: &mut T,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), TelnetError>
where
    T: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    read_prompt(conn, timeout, "reading login prompt").await?;
    write_line(conn, &credentials.login, timeout, "writing login").await?;
    read_prompt(conn, timeout, "reading password prompt").await?;
    write_line(conn, &credentials.password, timeout, "writing password").await?;
    Ok(())
}

/// Write the keep-alive frame.
///
/// # Errors
///
/// Returns [`TelnetError::Ping`] if the write fails or times out.
pub async fn ping<T>(conn: &mut T, timeout: Duration) -> Result<(), TelnetError>
where
    T: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        conn.write_all(PING_FRAME).await?;
        conn.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result.map_err(TelnetError::Ping),
        Err(_) => Err(TelnetError::Ping(io::ErrorKind::TimedOut.into())),
    }
}

/// Read single bytes until the prompt delimiter, so nothing after the
/// prompt is consumed.
async fn read_prompt<T>(
    conn: &mut T,
    timeout: Duration,
    stage: &'static str,
) -> Result<(), TelnetError>
where
    T: AsyncRead + Unpin + ?Sized,
{
    let read = async {
        for _ in 0..MAX_PROMPT_LEN {
            if conn.read_u8().await? == PROMPT {
                return Ok(());
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no prompt within 1024 bytes",
        ))
    };
    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| TelnetError::Timeout { stage })?
        .map_err(|source| TelnetError::Auth { stage, source })
}

async fn write_line<T>(
    conn: &mut T,
    line: &str,
    timeout: Duration,
    stage: &'static str,
) -> Result<(), TelnetError>
where
    T: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        conn.write_all(line.as_bytes()).await?;
        conn.write_all(b"\r\n").await?;
        conn.flush().await
    };
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| TelnetError::Timeout { stage })?
        .map_err(|source| TelnetError::Auth { stage, source })
}

/// Opens authenticated TCP sessions to one device.
#[derive(Debug, Clone)]
pub struct TelnetConnector {
    address: String,
    credentials: Credentials,
    timeout: Duration,
}

impl TelnetConnector {
    #[must_use]
    pub fn new(address: impl Into<String>, config: &TelnetConfig) -> Self {
        Self {
            address: address.into(),
            credentials: Credentials {
                login: config.login.clone(),
                password: config.password.clone(),
            },
            timeout: config.io_timeout(),
        }
    }
}

impl ConnectionFactory for TelnetConnector {
    async fn create(&self) -> Result<Connection, TelnetError> {
        tracing::debug!(address = %self.address, "connecting");
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TelnetError::Timeout { stage: "connecting" })?
            .map_err(|source| TelnetError::Connect {
                address: self.address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        authenticate(&mut stream, &self.credentials, self.timeout).await?;
        tracing::debug!(address = %self.address, "authenticated");
        Ok(Box::new(stream))
    }

    async fn ping(&self, connection: &mut Connection) -> Result<(), TelnetError> {
        ping(connection, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    fn credentials() -> Credentials {
        Credentials {
            login: "lutron".to_string(),
            password: "integration".to_string(),
        }
    }

    #[tokio::test]
    async fn should_answer_both_prompts() {
        let (mut client, server) = tokio::io::duplex(256);
        let device = tokio::spawn(async move {
            let mut server = tokio::io::BufReader::new(server);
            server.get_mut().write_all(b"login: ").await.unwrap();
            let mut login = String::new();
            server.read_line(&mut login).await.unwrap();
            server.get_mut().write_all(b"password: ").await.unwrap();
            let mut password = String::new();
            server.read_line(&mut password).await.unwrap();
            (login, password)
        });

        authenticate(&mut client, &credentials(), Duration::from_secs(1))
            .await
            .unwrap();

        let (login, password) = device.await.unwrap();
        assert_eq!(login, "lutron\r\n");
        assert_eq!(password, "integration\r\n");
    }

    #[tokio::test]
    async fn should_fail_when_device_closes_before_password_prompt() {
        let (mut client, mut server) = tokio::io::duplex(256);
        server.write_all(b"login:").await.unwrap();
        drop(server);

        let err = authenticate(&mut client, &credentials(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TelnetError::Auth { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_when_device_stays_silent() {
        let (mut client, _server) = tokio::io::duplex(256);

        let err = authenticate(&mut client, &credentials(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TelnetError::Timeout { stage: "reading login prompt" }
        ));
    }

    #[tokio::test]
    async fn should_write_ping_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        ping(&mut client, Duration::from_secs(1)).await.unwrap();

        let mut buf = [0_u8; 7];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"#PING\r\n");
    }

    #[tokio::test]
    async fn should_fail_ping_on_closed_connection() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);
        let err = ping(&mut client, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TelnetError::Ping(_)));
    }
}
