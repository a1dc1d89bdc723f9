//! LOGIN command handler.
//!
//! Accepts any credentials unless the test asked for a rejection.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGIN command. Returns whether the client is now
/// authenticated.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    reject: bool,
    stream: &mut BufReader<S>,
) -> bool {
    let resp = if reject {
        format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
    } else {
        format!("{tag} OK LOGIN completed\r\n")
    };
    write_line(stream, &resp).await.is_ok() && !reject
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{Wire, capture};

    #[tokio::test]
    async fn responds_with_ok() {
        let mut ok = false;
        let output = capture(async |s: &mut Wire| ok = handle_login("A0001", false, s).await).await;
        assert!(ok);
        assert_eq!(output, "A0001 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn rejects_when_asked() {
        let mut ok = true;
        let output = capture(async |s: &mut Wire| ok = handle_login("TAG42", true, s).await).await;
        assert!(!ok);
        assert!(output.starts_with("TAG42 NO "));
    }
}
