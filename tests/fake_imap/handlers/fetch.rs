//! FETCH and UID FETCH command handler.
//!
//! Message content goes out as **counted literals**:
//!
//! ```text
//! * <seq> FETCH (UID <uid> FLAGS (<flags>) RFC822.SIZE <n> BODY[] {<n>}
//! <exactly n bytes of raw RFC 2822 message>
//! )
//! ```
//!
//! When the client asked for `BODY.PEEK[HEADER]` only the header block
//! is sent, as `BODY[HEADER]`.
//!
//! Sets may use ranges and `*`; `*` means the largest sequence number
//! (or UID) in the folder. Matching messages are returned in sequence
//! order whatever order the set lists them in.

use crate::fake_imap::io::{write_bytes, write_line};
use crate::fake_imap::mailbox::{Folder, Mailbox};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub struct FetchRequest<'a> {
    pub tag: &'a str,
    pub set: &'a SequenceSet,
    /// `UID FETCH` rather than `FETCH`.
    pub uid: bool,
    pub header_only: bool,
    /// Close the connection right after the first message.
    pub cut_after_first: bool,
}

/// Handle FETCH. Returns `false` when the connection must be closed.
pub async fn handle_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    req: &FetchRequest<'_>,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) -> bool {
    let tag = req.tag;
    let Some(folder) = selected_folder.and_then(|name| mailbox.get_folder(name)) else {
        let resp = format!("{tag} BAD No mailbox selected\r\n");
        return write_line(stream, &resp).await.is_ok();
    };

    let ranges = resolve(req.set, folder, req.uid);
    let matching = folder.emails.iter().enumerate().filter(|(idx, email)| {
        let key = if req.uid { email.uid } else { seq_of(*idx) };
        ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&key))
    });

    for (idx, email) in matching {
        let (section, data) = if req.header_only {
            ("BODY[HEADER]", email.header())
        } else {
            ("BODY[]", &email.raw[..])
        };
        let head = format!(
            "* {seq} FETCH (UID {uid} FLAGS ({flags}) RFC822.SIZE {size} {section} {{{len}}}\r\n",
            seq = seq_of(idx),
            uid = email.uid,
            flags = email.flags(),
            size = email.raw.len(),
            len = data.len(),
        );
        if write_line(stream, &head).await.is_err()
            || write_bytes(stream, data).await.is_err()
            || write_line(stream, ")\r\n").await.is_err()
        {
            return false;
        }
        if req.cut_after_first {
            return false;
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    write_line(stream, &resp).await.is_ok()
}

fn seq_of(idx: usize) -> u32 {
    u32::try_from(idx + 1).expect("folder fits in u32")
}

/// Turn the set into inclusive `(low, high)` ranges over sequence
/// numbers or UIDs.
fn resolve(set: &SequenceSet, folder: &Folder, uid: bool) -> Vec<(u32, u32)> {
    let largest = if uid {
        folder.emails.iter().map(|e| e.uid).max().unwrap_or(0)
    } else {
        u32::try_from(folder.emails.len()).expect("folder fits in u32")
    };
    let value = |v: &SeqOrUid| match v {
        SeqOrUid::Value(n) => n.get(),
        SeqOrUid::Asterisk => largest,
    };

    set.0
        .as_ref()
        .iter()
        .map(|seq| match seq {
            Sequence::Single(v) => (value(v), value(v)),
            Sequence::Range(a, b) => {
                let (a, b) = (value(a), value(b));
                (a.min(b), a.max(b))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::{Wire, capture};
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    fn value(n: u32) -> SeqOrUid {
        SeqOrUid::Value(NonZeroU32::new(n).unwrap())
    }

    fn set(seqs: Vec<Sequence>) -> SequenceSet {
        SequenceSet(seqs.try_into().unwrap())
    }

    fn three() -> Mailbox {
        MailboxBuilder::new()
            .folder("INBOX")
            .email(10, true, RAW)
            .email(20, false, RAW)
            .email(30, false, RAW)
            .build()
    }

    async fn run(req: FetchRequest<'_>, mailbox: &Mailbox, selected: Option<&str>) -> String {
        capture(async |s: &mut Wire| {
            handle_fetch(&req, mailbox, selected, s).await;
        })
        .await
    }

    fn request<'a>(set: &'a SequenceSet, uid: bool) -> FetchRequest<'a> {
        FetchRequest {
            tag: "A1",
            set,
            uid,
            header_only: false,
            cut_after_first: false,
        }
    }

    #[tokio::test]
    async fn fetches_by_uid() {
        let mailbox = three();
        let uids = set(vec![Sequence::Single(value(20))]);

        let output = run(request(&uids, true), &mailbox, Some("INBOX")).await;

        let literal = format!("BODY[] {{{}}}\r\n", RAW.len());
        assert!(output.starts_with("* 2 FETCH (UID 20 FLAGS () RFC822.SIZE "));
        assert!(output.contains(&literal));
        assert!(output.contains("From: a@b.com"));
        assert!(output.ends_with("A1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn sequence_range_to_asterisk() {
        let mailbox = three();
        let seqs = set(vec![Sequence::Range(value(2), SeqOrUid::Asterisk)]);

        let output = run(request(&seqs, false), &mailbox, Some("INBOX")).await;

        assert!(!output.contains("* 1 FETCH"));
        assert!(output.contains("* 2 FETCH (UID 20"));
        assert!(output.contains("* 3 FETCH (UID 30"));
    }

    #[tokio::test]
    async fn header_only_sends_header_block() {
        let mailbox = three();
        let uids = set(vec![Sequence::Single(value(10))]);
        let req = FetchRequest {
            header_only: true,
            ..request(&uids, true)
        };

        let output = run(req, &mailbox, Some("INBOX")).await;

        assert!(output.contains("FLAGS (\\Seen)"));
        assert!(output.contains("BODY[HEADER] {32}\r\n"));
        assert!(!output.contains("Body"));
    }

    #[tokio::test]
    async fn cut_stops_after_first_message() {
        let mailbox = three();
        let seqs = set(vec![Sequence::Range(value(1), SeqOrUid::Asterisk)]);
        let req = FetchRequest {
            cut_after_first: true,
            ..request(&seqs, false)
        };

        let output = run(req, &mailbox, Some("INBOX")).await;

        assert!(output.contains("* 1 FETCH"));
        assert!(!output.contains("* 2 FETCH"));
        assert!(!output.contains("OK FETCH completed"));
    }

    #[tokio::test]
    async fn missing_uid_returns_only_ok() {
        let mailbox = three();
        let uids = set(vec![Sequence::Single(value(99))]);

        let output = run(request(&uids, true), &mailbox, Some("INBOX")).await;

        assert_eq!(output, "A1 OK FETCH completed\r\n");
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mailbox = three();
        let uids = set(vec![Sequence::Single(value(1))]);

        let output = run(request(&uids, true), &mailbox, None).await;

        assert_eq!(output, "A1 BAD No mailbox selected\r\n");
    }
}
