//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use serde::{Serialize, Serializer};
use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use imap_export_client::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::from("$Forwarded");
/// assert_eq!(kw, Flag::Keyword("$Forwarded".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message arrived in this session (`\Recent`).
    Recent,
    /// Any other flag, kept verbatim.
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\recent" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

impl From<&async_imap::types::Flag<'_>> for Flag {
    fn from(flag: &async_imap::types::Flag<'_>) -> Self {
        use async_imap::types::Flag as Wire;
        match flag {
            Wire::Seen => Self::Seen,
            Wire::Answered => Self::Answered,
            Wire::Flagged => Self::Flagged,
            Wire::Deleted => Self::Deleted,
            Wire::Draft => Self::Draft,
            Wire::Recent => Self::Recent,
            Wire::MayCreate => Self::Keyword("\\*".to_string()),
            Wire::Custom(name) => Self::from(name.as_ref()),
        }
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_imap_str())
    }
}
