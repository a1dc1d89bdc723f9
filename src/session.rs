//! Session handle
//!
//! One authenticated IMAP connection plus what we know about it. A
//! handle is never repaired: after a failure the provider throws it
//! away and builds a new one.

use crate::auth::Capabilities;
use crate::error::{Error, Result};
use crate::mailbox::{MailboxDescriptor, MailboxStatus};
use crate::message::{FetchAttributes, IdKind, IdSet, MessageRecord};
use crate::stream::drain;
use crate::transport::ImapStream;
use async_imap::Session;
use async_imap::types::Fetch;
use futures::{Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio_util::compat::Compat;
use tracing::debug;

/// An authenticated async-imap session over plain TCP or TLS.
pub type ImapSession = Session<Compat<ImapStream>>;

/// Where a provider's connection stands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    /// Dialed but not logged in yet; only observable while the
    /// authenticator runs.
    NotAuthenticated,
    Authenticated,
    Selected(String),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Selected(mailbox) => write!(f, "selected {mailbox}"),
        }
    }
}

pub struct SessionHandle {
    session: ImapSession,
    capabilities: Capabilities,
    selected: Option<String>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("capabilities", &self.capabilities)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub(crate) const fn new(session: ImapSession, capabilities: Capabilities) -> Self {
        Self {
            session,
            capabilities,
            selected: None,
        }
    }

    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub(crate) const fn session_mut(&mut self) -> &mut ImapSession {
        &mut self.session
    }

    pub fn state(&self) -> SessionState {
        self.selected
            .as_ref()
            .map_or(SessionState::Authenticated, |name| {
                SessionState::Selected(name.clone())
            })
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Re-query `CAPABILITY`; servers often advertise more after login.
    pub async fn refresh_capabilities(&mut self) -> Result<()> {
        let caps = self
            .session
            .capabilities()
            .await
            .map_err(|e| Error::Imap(format!("CAPABILITY failed: {e}")))?;
        self.capabilities = Capabilities::from(&caps);
        Ok(())
    }

    /// Stream every mailbox to `on_mailbox`.
    pub async fn list<F>(&mut self, on_mailbox: F) -> Result<usize>
    where
        F: FnMut(MailboxDescriptor),
    {
        let names = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| Error::Imap(format!("List mailboxes failed: {e}")))?;

        let names = names.map(|item| {
            item.map(MailboxDescriptor::from)
                .map_err(|e| Error::Imap(format!("List mailboxes failed: {e}")))
        });
        let delivered = drain(names, on_mailbox).await?;

        self.confirm_alive("LIST").await?;
        Ok(delivered)
    }

    /// Open `mailbox` read-only (`EXAMINE`), so exporting never
    /// changes `\Recent` or other server-side state.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        // The server deselects on a failed EXAMINE.
        self.selected = None;
        let status = self
            .session
            .examine(mailbox)
            .await
            .map_err(|e| Error::Imap(format!("Failed to select {mailbox}: {e}")))?;
        self.selected = Some(mailbox.to_string());
        Ok(MailboxStatus::from_wire(mailbox, &status))
    }

    /// Stream the requested messages of the selected mailbox to
    /// `on_message`.
    pub async fn fetch<F>(
        &mut self,
        ids: &IdSet,
        kind: IdKind,
        attributes: &FetchAttributes,
        on_message: F,
    ) -> Result<usize>
    where
        F: FnMut(MessageRecord),
    {
        if self.selected.is_none() {
            return Err(Error::Imap("FETCH without a selected mailbox".into()));
        }
        if ids.is_empty() {
            return Ok(0);
        }

        let set = ids.to_string();
        let query = attributes.to_query();
        // fetch and uid_fetch return distinct stream types.
        let delivered = match kind {
            IdKind::Sequence => {
                let messages = self
                    .session
                    .fetch(&set, &query)
                    .await
                    .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?;
                drain(records(messages), on_message).await?
            }
            IdKind::Uid => {
                let messages = self
                    .session
                    .uid_fetch(&set, &query)
                    .await
                    .map_err(|e| Error::Imap(format!("UID fetch failed: {e}")))?;
                drain(records(messages), on_message).await?
            }
        };

        self.confirm_alive("FETCH").await?;
        Ok(delivered)
    }

    /// async-imap ends a response stream on EOF just like on the tagged
    /// completion, so a dropped connection would look like a short but
    /// successful result. A NOOP round-trip tells the two apart.
    async fn confirm_alive(&mut self, command: &str) -> Result<()> {
        self.session.noop().await.map_err(|e| {
            Error::Transport(format!("connection lost during {command}: {e}"))
        })
    }

    pub async fn logout(mut self) -> Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| Error::Imap(format!("Logout failed: {e}")))
    }
}

fn records<S>(messages: S) -> impl Stream<Item = Result<MessageRecord>>
where
    S: Stream<Item = async_imap::error::Result<Fetch>>,
{
    messages.map(|item| {
        item.map(MessageRecord::from)
            .map_err(|e| Error::Imap(format!("Fetch error: {e}")))
    })
}

/// Outcome of the diagnostic probe run on a handle about to be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Failed(String),
    TimedOut,
}

/// Issue `CAPABILITY` on a doomed handle, giving up after `limit`.
///
/// The result is only logged; the handle is dropped either way.
pub async fn probe_liveness(mut handle: SessionHandle, limit: Duration) -> Liveness {
    let probe = async move {
        handle
            .session
            .capabilities()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    };

    match race_timeout(probe, limit).await {
        Some(Ok(())) => Liveness::Alive,
        Some(Err(e)) => Liveness::Failed(e),
        None => Liveness::TimedOut,
    }
}

/// Run `fut` on its own task and wait at most `limit` for it.
///
/// A broken session can block a command forever, so the work runs
/// apart from the caller and `None` is returned if it is still going
/// at the deadline. The losing task is aborted; whatever it owned is
/// dropped once tokio cancels it.
pub async fn race_timeout<F>(fut: F, limit: Duration) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut task = tokio::spawn(fut);
    tokio::select! {
        joined = &mut task => match joined {
            Ok(output) => Some(output),
            Err(e) => {
                debug!(error = %e, "Probe task failed");
                None
            }
        },
        () = tokio::time::sleep(limit) => {
            task.abort();
            None
        }
    }
}
