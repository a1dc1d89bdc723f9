//! Resilient IMAP client core
//!
//! A read-only IMAP client built for long mailbox exports and
//! migrations. A [`Provider`] holds one connection to one account and
//! runs every operation under a retry wrapper: when a command fails the
//! connection is rebuilt, the selected mailbox restored, and the
//! command started over, until [`RetryPolicy`] says to stop.
//!
//! Remote endpoints are reached over implicit TLS; loopback endpoints
//! (a local bridge, a test server) over plain TCP.
//!
//! Results come back as [`MailboxDescriptor`], [`MailboxStatus`] and
//! [`MessageRecord`] values. The streaming variants deliver them to a
//! callback as they arrive off the wire.

mod auth;
mod config;
mod error;
mod flag;
mod mailbox;
mod message;
mod provider;
mod retry;
mod session;
mod stream;
mod transport;

pub use auth::{CLIENT_NAME, CLIENT_VERSION, Capabilities};
pub use config::{Config, Credentials, Endpoint};
pub use error::{AuthError, Error, Result};
pub use flag::Flag;
pub use mailbox::{MailboxDescriptor, MailboxStatus};
pub use message::{FetchAttribute, FetchAttributes, IdKind, IdSet, MessageRecord};
pub use provider::Provider;
pub use retry::{
    CONNECT_TIMEOUT, MAX_ATTEMPTS, PROBE_TIMEOUT, RECONNECT_BACKOFF, RECONNECT_DEADLINE,
    RetryPolicy,
};
pub use session::SessionState;
pub use transport::check_connection;
