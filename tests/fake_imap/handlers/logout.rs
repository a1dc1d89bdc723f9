//! LOGOUT command handler: untagged BYE, then the tagged OK.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* BYE Logging out\r\n").await;
    let resp = format!("{tag} OK LOGOUT completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{Wire, capture};

    #[tokio::test]
    async fn sends_bye_then_ok() {
        let output = capture(async |s: &mut Wire| handle_logout("A0005", s).await).await;
        assert_eq!(output, "* BYE Logging out\r\nA0005 OK LOGOUT completed\r\n");
    }
}
