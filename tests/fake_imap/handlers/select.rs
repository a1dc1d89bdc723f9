//! SELECT and EXAMINE command handler.
//!
//! Opens a folder (read-only for EXAMINE) and reports its metadata:
//!
//! - `* N EXISTS` and `* N RECENT` counts,
//! - `UIDVALIDITY`, `UIDNEXT`, `PERMANENTFLAGS` response codes,
//! - `UNSEEN` with the sequence number of the first unseen message.
//!
//! Returns the selected folder name, or `None` if it does not exist.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// UIDVALIDITY reported for every folder.
pub const UID_VALIDITY: u32 = 7;

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    read_only: bool,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} NO Mailbox does not exist\r\n");
        let _ = write_line(stream, &resp).await;
        return None;
    };

    let uidnext = folder
        .emails
        .iter()
        .map(|e| e.uid)
        .max()
        .map_or(1, |max| max + 1);

    let mut lines = vec![
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.emails.len()),
        "* 0 RECENT\r\n".to_string(),
        format!("* OK [UIDVALIDITY {UID_VALIDITY}] UIDs valid\r\n"),
        format!("* OK [UIDNEXT {uidnext}] Predicted next UID\r\n"),
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)] Limited\r\n".to_string(),
    ];
    if let Some(pos) = folder.emails.iter().position(|e| !e.seen) {
        lines.push(format!("* OK [UNSEEN {}] First unseen\r\n", pos + 1));
    }
    lines.push(if read_only {
        format!("{tag} OK [READ-ONLY] EXAMINE completed\r\n")
    } else {
        format!("{tag} OK [READ-WRITE] SELECT completed\r\n")
    });

    for line in &lines {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{Wire, capture};
    use crate::fake_imap::mailbox::MailboxBuilder;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    #[tokio::test]
    async fn selects_existing_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, true, RAW)
            .email(10, false, RAW)
            .build();

        let mut selected = None;
        let output = capture(async |s: &mut Wire| {
            selected = handle_select("A1", "INBOX", false, &mailbox, s).await;
        })
        .await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(output.contains("* 2 EXISTS\r\n"));
        assert!(output.contains("[UIDVALIDITY 7]"));
        assert!(output.contains("[UIDNEXT 11]"));
        assert!(output.contains("[UNSEEN 2]"));
        assert!(output.ends_with("A1 OK [READ-WRITE] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn examine_is_read_only() {
        let mailbox = MailboxBuilder::new().folder("INBOX").email(1, true, RAW).build();

        let output = capture(async |s: &mut Wire| {
            let _ = handle_select("A2", "INBOX", true, &mailbox, s).await;
        })
        .await;

        assert!(output.contains("* 1 EXISTS\r\n"));
        assert!(output.ends_with("A2 OK [READ-ONLY] EXAMINE completed\r\n"));
    }

    #[tokio::test]
    async fn empty_folder_has_uidnext_1_and_no_unseen() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let output = capture(async |s: &mut Wire| {
            let _ = handle_select("A1", "INBOX", false, &mailbox, s).await;
        })
        .await;

        assert!(output.contains("* 0 EXISTS\r\n"));
        assert!(output.contains("[UIDNEXT 1]"));
        assert!(!output.contains("UNSEEN"));
    }

    #[tokio::test]
    async fn missing_folder_is_refused() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let mut selected = Some(String::new());
        let output = capture(async |s: &mut Wire| {
            selected = handle_select("A1", "Nope", true, &mailbox, s).await;
        })
        .await;

        assert!(selected.is_none());
        assert_eq!(output, "A1 NO Mailbox does not exist\r\n");
    }
}
