//! Shared I/O helpers for the fake IMAP server.
//!
//! Every write is flushed at once so a test that drops the connection
//! right after a response knows the client saw all of it.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Write a string to the stream and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    write_bytes(stream, line.as_bytes()).await
}

/// Write raw bytes to the stream and flush.
pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

/// In-memory stream used by the handler unit tests.
pub type Wire = BufReader<tokio::io::DuplexStream>;

/// Run `handler` against an in-memory stream and return what it wrote.
pub async fn capture<F>(handler: F) -> String
where
    F: AsyncFnOnce(&mut Wire),
{
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut stream = BufReader::new(server);

    handler(&mut stream).await;
    drop(stream);

    let mut buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
        .await
        .unwrap();
    String::from_utf8(buf).unwrap()
}
