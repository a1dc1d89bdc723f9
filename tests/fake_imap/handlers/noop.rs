//! NOOP command handler.
//!
//! The client sends one after every streamed response to prove the
//! connection survived it.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_noop<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    let resp = format!("{tag} OK NOOP completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{Wire, capture};

    #[tokio::test]
    async fn sends_ok() {
        let output = capture(async |s: &mut Wire| handle_noop("A1", s).await).await;
        assert_eq!(output, "A1 OK NOOP completed\r\n");
    }
}
