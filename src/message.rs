//! Message records and the ways to address them
//!
//! Messages are addressed either by sequence number (valid only
//! inside one session; a reconnect may renumber them) or by UID
//! (stable across sessions for a given UIDVALIDITY). [`IdSet`] renders
//! the IMAP sequence-set syntax for both.

use crate::error::{Error, Result};
use crate::flag::Flag;
use async_imap::types::Fetch;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How the numbers in an [`IdSet`] are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdKind {
    /// Transient message sequence numbers (`FETCH`).
    Sequence,
    /// Persistent unique identifiers (`UID FETCH`).
    Uid,
}

/// Inclusive range; `end == None` means `*` (the largest id in use).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdRange {
    start: u32,
    end: Option<u32>,
}

/// A set of message ids in IMAP sequence-set form.
///
/// # Examples
///
/// ```
/// use imap_export_client::IdSet;
///
/// let set = IdSet::from_ids([5, 1, 2, 3, 9]);
/// assert_eq!(set.to_string(), "1:3,5,9");
///
/// let tail: IdSet = "100:*".parse().unwrap();
/// assert_eq!(tail.to_string(), "100:*");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ranges: Vec<IdRange>,
}

impl IdSet {
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Every message in the mailbox (`1:*`).
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: vec![IdRange {
                start: 1,
                end: None,
            }],
        }
    }

    /// Build a set from individual ids. Zero is not a valid IMAP id
    /// and is dropped.
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut ids: Vec<u32> = ids.into_iter().filter(|&id| id != 0).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut ranges: Vec<IdRange> = Vec::new();
        for id in ids {
            match ranges.last_mut() {
                Some(IdRange {
                    end: Some(end), ..
                }) if end.checked_add(1) == Some(id) => *end = id,
                _ => ranges.push(IdRange {
                    start: id,
                    end: Some(id),
                }),
            }
        }
        Self { ranges }
    }

    /// Add the inclusive range `start..=end`.
    pub fn insert_range(&mut self, start: u32, end: u32) -> Result<()> {
        if start == 0 || end < start {
            return Err(Error::InvalidIdSet(format!("{start}:{end}")));
        }
        self.ranges.push(IdRange {
            start,
            end: Some(end),
        });
        Ok(())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of ids, or `None` when the set is open-ended (`n:*`).
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        self.ranges.iter().try_fold(0u64, |acc, r| {
            r.end.map(|end| acc + u64::from(end - r.start) + 1)
        })
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match range.end {
                Some(end) if end == range.start => write!(f, "{}", range.start)?,
                Some(end) => write!(f, "{}:{end}", range.start)?,
                None => write!(f, "{}:*", range.start)?,
            }
        }
        Ok(())
    }
}

fn parse_id(s: &str, whole: &str) -> Result<u32> {
    match s.parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::InvalidIdSet(whole.to_string())),
        Ok(id) => Ok(id),
    }
}

impl FromStr for IdSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::InvalidIdSet(s.to_string()));
        }

        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim) {
            let range = match part.split_once(':') {
                None if part == "*" => IdRange {
                    start: 1,
                    end: None,
                },
                None => {
                    let id = parse_id(part, s)?;
                    IdRange {
                        start: id,
                        end: Some(id),
                    }
                }
                Some((start, "*")) => IdRange {
                    start: parse_id(start, s)?,
                    end: None,
                },
                Some((start, end)) => {
                    let (a, b) = (parse_id(start, s)?, parse_id(end, s)?);
                    // IMAP allows reversed ranges; normalise them.
                    IdRange {
                        start: a.min(b),
                        end: Some(a.max(b)),
                    }
                }
            };
            ranges.push(range);
        }
        Ok(Self { ranges })
    }
}

/// A message data item to request in a FETCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchAttribute {
    Uid,
    Flags,
    InternalDate,
    Size,
    /// Header section only, without setting `\Seen`.
    Header,
    /// The full RFC 5322 message, without setting `\Seen`.
    Body,
}

impl FetchAttribute {
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Uid => "UID",
            Self::Flags => "FLAGS",
            Self::InternalDate => "INTERNALDATE",
            Self::Size => "RFC822.SIZE",
            Self::Header => "BODY.PEEK[HEADER]",
            Self::Body => "BODY.PEEK[]",
        }
    }
}

/// The set of items requested per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttributes {
    items: Vec<FetchAttribute>,
}

impl FetchAttributes {
    /// UID only; add more with [`with`](Self::with).
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: vec![FetchAttribute::Uid],
        }
    }

    /// Everything except message content.
    #[must_use]
    pub fn metadata() -> Self {
        Self::new()
            .with(FetchAttribute::Flags)
            .with(FetchAttribute::InternalDate)
            .with(FetchAttribute::Size)
    }

    /// Metadata plus the full message.
    #[must_use]
    pub fn full() -> Self {
        Self::metadata().with(FetchAttribute::Body)
    }

    #[must_use]
    pub fn with(mut self, item: FetchAttribute) -> Self {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
        self
    }

    #[must_use]
    pub fn contains(&self, item: FetchAttribute) -> bool {
        self.items.contains(&item)
    }

    /// The parenthesised list sent after the sequence set.
    #[must_use]
    pub fn to_query(&self) -> String {
        let names: Vec<&str> = self.items.iter().map(|i| i.as_imap_str()).collect();
        format!("({})", names.join(" "))
    }
}

impl Default for FetchAttributes {
    fn default() -> Self {
        Self::new()
    }
}

/// The requested parts of one message.
///
/// `header` and `body` are left out of serialized output; write them
/// to disk as-is instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub seq: u32,
    pub uid: Option<u32>,
    pub flags: Vec<Flag>,
    pub size: Option<u32>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    #[serde(skip)]
    pub header: Option<Vec<u8>>,
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

impl MessageRecord {
    /// The id this record is addressed by under `kind`.
    #[must_use]
    pub fn id(&self, kind: IdKind) -> Option<u32> {
        match kind {
            IdKind::Sequence => Some(self.seq),
            IdKind::Uid => self.uid,
        }
    }
}

impl From<&Fetch> for MessageRecord {
    fn from(fetch: &Fetch) -> Self {
        Self {
            seq: fetch.message,
            uid: fetch.uid,
            flags: fetch.flags().map(|f| Flag::from(&f)).collect(),
            size: fetch.size,
            internal_date: fetch.internal_date(),
            header: fetch.header().map(<[u8]>::to_vec),
            body: fetch.body().map(<[u8]>::to_vec),
        }
    }
}

impl From<Fetch> for MessageRecord {
    fn from(fetch: Fetch) -> Self {
        Self::from(&fetch)
    }
}
