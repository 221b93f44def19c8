//! Transports: the byte streams the engine drives.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::{Config, Security};
use crate::{Error, Result};

/// A bidirectional byte stream that can be upgraded to TLS in place.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Runs the TLS handshake over this stream and returns the encrypted one.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be upgraded or the handshake fails.
    fn start_tls(self, host: String) -> impl Future<Output = Result<Self>> + Send
    where
        Self: Sized;
}

/// Opens new transports for `connect` and reconnect.
pub trait Connector: Send + Sync + 'static {
    /// The stream type produced.
    type Stream: Transport;

    /// Opens a stream to the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the TLS handshake fails.
    fn connect(&self, config: &Config) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Transport for ImapStream {
    async fn start_tls(self, host: String) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let server_name = ServerName::try_from(host)?;
                let tls = tls_connector().connect(server_name, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::Protocol("stream is already TLS".to_string())),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// TLS connector trusting the webpki root set.
#[must_use]
pub fn tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Connects over TCP, with TLS from the start for [`Security::Implicit`].
///
/// STARTTLS sessions get a plaintext stream; the engine upgrades it after
/// the greeting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = ImapStream;

    async fn connect(&self, config: &Config) -> Result<ImapStream> {
        let open = async {
            let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
            match config.security {
                Security::Implicit => {
                    let server_name = ServerName::try_from(config.host.clone())?;
                    let tls = tls_connector().connect(server_name, tcp).await?;
                    Ok(ImapStream::Tls(Box::new(tls)))
                }
                Security::StartTls | Security::None => Ok(ImapStream::Plain(tcp)),
            }
        };
        tokio::time::timeout(config.connect_timeout, open)
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))?
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1")
            .security(Security::None)
            .port(port)
            .connect_timeout(Duration::from_secs(5))
            .build();
        let err = TcpConnector.connect(&config).await.err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_plain_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Config::builder("127.0.0.1")
            .security(Security::StartTls)
            .port(port)
            .build();
        let stream = TcpConnector.connect(&config).await.unwrap();
        assert!(!stream.is_tls());
    }
}
