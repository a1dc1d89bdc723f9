//! Transport dialer
//!
//! Opens the raw byte stream an IMAP session runs over. Loopback
//! endpoints get plain TCP, everything else implicit TLS verified
//! against the webpki root store. Dialing, including the TLS
//! handshake, is bounded by the connect timeout.

use crate::config::Endpoint;
use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

/// A connection that is either plaintext or TLS.
#[derive(Debug)]
pub enum ImapStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// A connection the server authenticated in its greeting.
    Preauth(Box<Preauthenticated>),
}

impl ImapStream {
    #[must_use]
    pub fn is_tls(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(_) => true,
            Self::Preauth(stream) => stream.inner.is_tls(),
        }
    }

    /// Wrap a connection greeted with `* PREAUTH`: the next command
    /// written is kept off the wire and answered with a tagged `OK`.
    #[must_use]
    pub fn preauthenticated(self) -> Self {
        Self::Preauth(Box::new(Preauthenticated {
            inner: self,
            pending: Pending::Swallowing(Vec::new()),
        }))
    }
}

/// See [`ImapStream::preauthenticated`].
#[derive(Debug)]
pub struct Preauthenticated {
    inner: ImapStream,
    pending: Pending,
}

#[derive(Debug)]
enum Pending {
    /// Collecting the command to answer locally.
    Swallowing(Vec<u8>),
    /// Reply not yet read by the client.
    Replying(Vec<u8>),
    Passthrough,
}

impl AsyncRead for Preauthenticated {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Pending::Replying(reply) = &mut this.pending {
            let n = reply.len().min(buf.remaining());
            buf.put_slice(&reply[..n]);
            reply.drain(..n);
            if reply.is_empty() {
                this.pending = Pending::Passthrough;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Preauthenticated {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Pending::Swallowing(command) = &mut this.pending {
            let taken = buf
                .iter()
                .position(|&b| b == b'\n')
                .map_or(buf.len(), |i| i + 1);
            command.extend_from_slice(&buf[..taken]);
            if command.ends_with(b"\n") {
                let tag = command.split(|&b| b == b' ').next().unwrap_or_default();
                let mut reply = tag.to_vec();
                reply.extend_from_slice(b" OK Preauthenticated\r\n");
                this.pending = Pending::Replying(reply);
            }
            return Poll::Ready(Ok(taken));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
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
            Self::Preauth(stream) => Pin::new(stream).poll_read(cx, buf),
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
            Self::Preauth(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
            Self::Preauth(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Preauth(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Open a connection to `endpoint`.
///
/// Every failure (refused, unreachable, handshake, timeout) comes back
/// as [`Error::Transport`], [`Error::Tls`] or [`Error::Timeout`]; the
/// reconnect supervisor treats all of them as retryable.
pub async fn dial(endpoint: &Endpoint, connect_timeout: Duration) -> Result<ImapStream> {
    tokio::time::timeout(connect_timeout, dial_inner(endpoint))
        .await
        .map_err(|_| Error::Timeout(connect_timeout))?
}

async fn dial_inner(endpoint: &Endpoint) -> Result<ImapStream> {
    debug!("Connecting to IMAP server at {}", endpoint);

    let tcp = TcpStream::connect((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| Error::Transport(format!("failed to dial {endpoint}: {e}")))?;

    if endpoint.is_loopback() {
        return Ok(ImapStream::Plain(tcp));
    }

    let connector = tls_connector()?;
    let server_name = ServerName::try_from(endpoint.host().to_string())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Cheap reachability check that does not touch any IMAP session.
pub async fn check_connection(endpoint: &Endpoint, connect_timeout: Duration) -> Result<()> {
    let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Error::Transport(format!("{endpoint} unreachable: {e}"))),
        Err(_) => Err(Error::Timeout(connect_timeout)),
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
