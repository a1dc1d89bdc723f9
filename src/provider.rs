//! IMAP provider
//!
//! The long-lived object callers hold. It owns the endpoint, the
//! credentials and at most one [`SessionHandle`], and runs every
//! operation under the retry wrapper so transient outages are absorbed
//! instead of reported.
//!
//! Operations on one provider are serialized by `&mut self`; there is
//! no internal locking.

use crate::auth;
use crate::config::{Credentials, Endpoint};
use crate::error::{Error, Result};
use crate::mailbox::{MailboxDescriptor, MailboxStatus};
use crate::message::{FetchAttributes, IdKind, IdSet, MessageRecord};
use crate::retry::{Reconnect, RetryPolicy, with_retry};
use crate::session::{SessionHandle, SessionState, probe_liveness};
use crate::transport;
use tracing::{debug, info};

/// Resilient IMAP client for one account on one server.
///
/// # Examples
///
/// ```no_run
/// use imap_export_client::{Credentials, Endpoint, FetchAttributes, IdKind, IdSet, Provider};
///
/// # async fn run() -> imap_export_client::Result<()> {
/// let endpoint = Endpoint::new("imap.example.com", 993);
/// let mut provider = Provider::new(endpoint, Credentials::new("me", "secret"));
/// provider.connect().await?;
///
/// for mailbox in provider.list_mailboxes().await? {
///     println!("{}", mailbox.name);
/// }
///
/// let messages = provider
///     .fetch_collect("INBOX", &IdSet::all(), IdKind::Uid, &FetchAttributes::full())
///     .await?;
/// println!("{} messages", messages.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Provider {
    endpoint: Endpoint,
    credentials: Credentials,
    policy: RetryPolicy,
    session: Option<SessionHandle>,
    last_selected: Option<String>,
    generation: u64,
}

impl Provider {
    /// Create a provider without connecting. The first operation (or
    /// [`connect`](Self::connect)) establishes the session, inside its
    /// first attempt.
    #[must_use]
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
            policy: RetryPolicy::default(),
            session: None,
            last_selected: None,
            generation: 0,
        }
    }

    /// Replace the retry and reconnect budgets.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Dial and authenticate once, without retrying.
    ///
    /// # Errors
    ///
    /// Returns the transport or authentication error of the attempt.
    pub async fn connect(&mut self) -> Result<()> {
        self.reauth().await
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Disconnected, SessionHandle::state)
    }

    /// The mailbox restored after a reconnect.
    #[must_use]
    pub fn last_selected(&self) -> Option<&str> {
        self.last_selected.as_deref()
    }

    /// Number of sessions installed so far. Sequence numbers obtained
    /// under an older generation must not be reused.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// List every mailbox on the server.
    ///
    /// Only the result of the successful attempt is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyRetries`] or [`Error::ReconnectTimeout`]
    /// once the retry budgets are spent.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<MailboxDescriptor>> {
        let policy = self.policy;
        with_retry(self, &policy, None, async |this: &mut Self| {
            let mut found = Vec::new();
            this.ready().await?.list(|m| found.push(m)).await?;
            Ok(found)
        })
        .await
    }

    /// Stream every mailbox to `on_mailbox` as it arrives.
    ///
    /// A retried attempt starts over, so `on_mailbox` may see a prefix
    /// of the list more than once; discard what it received when the
    /// attempt it belongs to fails.
    ///
    /// # Errors
    ///
    /// Same as [`list_mailboxes`](Self::list_mailboxes).
    pub async fn list_mailboxes_with<F>(&mut self, mut on_mailbox: F) -> Result<usize>
    where
        F: FnMut(MailboxDescriptor),
    {
        let policy = self.policy;
        with_retry(self, &policy, None, async |this: &mut Self| {
            this.ready().await?.list(&mut on_mailbox).await
        })
        .await
    }

    /// Select `mailbox` and remember it for reselection after reconnects.
    ///
    /// # Errors
    ///
    /// Same as [`list_mailboxes`](Self::list_mailboxes). A mailbox
    /// that does not exist is retried like any other failure.
    pub async fn select_mailbox(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let policy = self.policy;
        with_retry(self, &policy, None, async |this: &mut Self| {
            this.select_now(mailbox).await
        })
        .await
    }

    /// Fetch `ids` from `mailbox`, streaming each record to
    /// `on_message` in server order.
    ///
    /// The mailbox is selected first if the session is elsewhere, and
    /// again after every reconnect. As with
    /// [`list_mailboxes_with`](Self::list_mailboxes_with), deliveries
    /// from a failed attempt are stale.
    ///
    /// # Errors
    ///
    /// Same as [`list_mailboxes`](Self::list_mailboxes).
    pub async fn fetch<F>(
        &mut self,
        mailbox: &str,
        ids: &IdSet,
        kind: IdKind,
        attributes: &FetchAttributes,
        mut on_message: F,
    ) -> Result<usize>
    where
        F: FnMut(MessageRecord),
    {
        let policy = self.policy;
        with_retry(self, &policy, Some(mailbox), async |this: &mut Self| {
            this.ensure_selected(mailbox).await?;
            this.session_mut()?
                .fetch(ids, kind, attributes, &mut on_message)
                .await
        })
        .await
    }

    /// Like [`fetch`](Self::fetch), but returns the records of the
    /// successful attempt only.
    ///
    /// # Errors
    ///
    /// Same as [`list_mailboxes`](Self::list_mailboxes).
    pub async fn fetch_collect(
        &mut self,
        mailbox: &str,
        ids: &IdSet,
        kind: IdKind,
        attributes: &FetchAttributes,
    ) -> Result<Vec<MessageRecord>> {
        let policy = self.policy;
        with_retry(self, &policy, Some(mailbox), async |this: &mut Self| {
            this.ensure_selected(mailbox).await?;
            let mut records = Vec::new();
            this.session_mut()?
                .fetch(ids, kind, attributes, |m| records.push(m))
                .await?;
            Ok(records)
        })
        .await
    }

    /// Log out and drop the session. Not retried.
    ///
    /// # Errors
    ///
    /// Returns the LOGOUT failure; the session is gone either way.
    pub async fn logout(&mut self) -> Result<()> {
        match self.session.take() {
            Some(handle) => handle.logout().await,
            None => Ok(()),
        }
    }

    fn session_mut(&mut self) -> Result<&mut SessionHandle> {
        self.session.as_mut().ok_or(Error::Disconnected)
    }

    /// The current session, connecting first if there is none.
    async fn ready(&mut self) -> Result<&mut SessionHandle> {
        if self.session.is_none() {
            self.reauth().await?;
        }
        self.session_mut()
    }

    async fn select_now(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let status = self.ready().await?.select(mailbox).await?;
        self.last_selected = Some(mailbox.to_string());
        Ok(status)
    }

    async fn ensure_selected(&mut self, mailbox: &str) -> Result<()> {
        if self.ready().await?.selected() != Some(mailbox) {
            self.select_now(mailbox).await?;
        }
        Ok(())
    }
}

impl Reconnect for Provider {
    async fn check_connectivity(&mut self) -> Result<()> {
        transport::check_connection(&self.endpoint, self.policy.connect_timeout).await
    }

    async fn reauth(&mut self) -> Result<()> {
        // Never reuse the old handle: a session whose command failed
        // may be wedged. It is released once the new one is built,
        // whether that worked or not.
        let old = self.session.take();
        let connected =
            auth::connect(&self.endpoint, &self.credentials, self.policy.connect_timeout).await;

        if let Some(old) = old {
            let state = old.state();
            let liveness = probe_liveness(old, self.policy.probe_timeout).await;
            debug!(addr = %self.endpoint, %state, ?liveness, "Replaced session");
        }

        self.session = Some(connected?);
        self.generation += 1;
        info!(addr = %self.endpoint, generation = self.generation, "Session ready");
        Ok(())
    }

    async fn reselect(&mut self, mailbox: &str) -> Result<()> {
        self.select_now(mailbox).await.map(|_| ())
    }
}
