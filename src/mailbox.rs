//! Mailbox descriptors and status
//!
//! [`MailboxDescriptor`] is what enumeration yields for each mailbox;
//! [`MailboxStatus`] is what a SELECT reports. Neither refers back to
//! the session that produced it.

use crate::flag::Flag;
use async_imap::types::{Mailbox, Name, NameAttribute};
use serde::Serialize;

/// One mailbox as returned by `LIST "" "*"`.
///
/// # Examples
///
/// ```
/// use imap_export_client::MailboxDescriptor;
///
/// let mb = MailboxDescriptor::new("Archive/2024", Some("/"), vec!["\\Noselect".into()]);
/// assert!(!mb.is_selectable());
/// assert_eq!(mb.leaf_name(), "2024");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxDescriptor {
    pub name: String,
    pub delimiter: Option<String>,
    pub attributes: Vec<String>,
}

impl MailboxDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: Option<&str>, attributes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            delimiter: delimiter.map(str::to_string),
            attributes,
        }
    }

    /// `\Noselect` mailboxes exist only as hierarchy nodes.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.has_attribute("\\Noselect") && !self.has_attribute("\\NonExistent")
    }

    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// Last path component, split on the hierarchy delimiter.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        match self.delimiter.as_deref() {
            Some(delim) if !delim.is_empty() => {
                self.name.rsplit(delim).next().unwrap_or(&self.name)
            }
            _ => &self.name,
        }
    }
}

fn attribute_name(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::Extension(name) => name.to_string(),
        // RFC 6154 special-use markers: \All, \Sent, \Trash, ...
        other => format!("\\{other:?}"),
    }
}

impl From<&Name> for MailboxDescriptor {
    fn from(name: &Name) -> Self {
        Self::new(
            name.name(),
            name.delimiter(),
            name.attributes().iter().map(attribute_name).collect(),
        )
    }
}

impl From<Name> for MailboxDescriptor {
    fn from(name: Name) -> Self {
        Self::from(&name)
    }
}

/// State of a mailbox right after it was selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailboxStatus {
    pub name: String,
    pub exists: u32,
    pub recent: u32,
    /// Sequence number of the first unseen message, if reported.
    pub unseen: Option<u32>,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
    pub highest_modseq: Option<u64>,
    pub flags: Vec<Flag>,
    pub permanent_flags: Vec<Flag>,
}

impl MailboxStatus {
    pub(crate) fn from_wire(name: &str, mailbox: &Mailbox) -> Self {
        Self {
            name: name.to_string(),
            exists: mailbox.exists,
            recent: mailbox.recent,
            unseen: mailbox.unseen,
            uid_validity: mailbox.uid_validity,
            uid_next: mailbox.uid_next,
            highest_modseq: mailbox.highest_modseq,
            flags: mailbox.flags.iter().map(Flag::from).collect(),
            permanent_flags: mailbox.permanent_flags.iter().map(Flag::from).collect(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.exists == 0
    }
}
