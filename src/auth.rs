//! Authenticator
//!
//! Turns a freshly dialed stream into an authenticated session:
//!
//! 1. read the greeting and query `CAPABILITY`;
//! 2. `AUTHENTICATE PLAIN` when the server advertises `AUTH=PLAIN`;
//! 3. otherwise `LOGIN` when the server claims `IMAP4rev1`;
//! 4. fail with [`AuthError::NoSupportedMechanism`] if neither applies;
//! 5. best effort, send `ID` when the server supports it.
//!
//! Steps 2 to 4 are skipped when the greeting is `* PREAUTH`.
//!
//! A failed mechanism is not followed by another one; the retry
//! wrapper decides whether to try again.
//!
//! async-imap only offers `CAPABILITY` on an authenticated session, so
//! the pre-auth exchange (greeting + capability) is done on the raw
//! stream before it is handed to `async_imap::Client`. That also keeps
//! the greeting out of the way of `AUTHENTICATE`, which would otherwise
//! read it in place of the `+` continuation.

use crate::config::{Credentials, Endpoint};
use crate::error::{AuthError, Error, Result};
use crate::session::{ImapSession, SessionHandle};
use crate::transport::{self, ImapStream};
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info, warn};

/// Name and version sent in the `ID` handshake.
pub const CLIENT_NAME: &str = "imap-export-client";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tag used for the raw pre-auth `CAPABILITY`; async-imap numbers its
/// own commands `A0001` and up.
const CAPABILITY_TAG: &str = "C0";

/// Server capabilities, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    atoms: HashSet<String>,
}

impl Capabilities {
    /// Parse the atoms following `CAPABILITY` in an untagged response
    /// or a `[CAPABILITY ...]` response code.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let atoms = line
            .split_whitespace()
            .map(|atom| atom.trim_matches(|c| c == '[' || c == ']'))
            .filter(|atom| !atom.is_empty() && !atom.eq_ignore_ascii_case("CAPABILITY"))
            .map(str::to_ascii_uppercase)
            .collect();
        Self { atoms }
    }

    #[must_use]
    pub fn has(&self, capability: &str) -> bool {
        self.atoms.contains(&capability.to_ascii_uppercase())
    }

    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.has(&format!("AUTH={mechanism}"))
    }

    #[must_use]
    pub fn is_imap4rev1(&self) -> bool {
        self.has("IMAP4rev1")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl From<&async_imap::types::Capabilities> for Capabilities {
    fn from(caps: &async_imap::types::Capabilities) -> Self {
        use async_imap::types::Capability;
        let atoms = caps
            .iter()
            .map(|cap| match cap {
                Capability::Imap4rev1 => "IMAP4REV1".to_string(),
                Capability::Auth(mech) => format!("AUTH={}", mech.to_ascii_uppercase()),
                Capability::Atom(atom) => atom.to_ascii_uppercase(),
            })
            .collect();
        Self { atoms }
    }
}

/// SASL PLAIN with an empty authorization identity.
struct PlainAuth<'a> {
    credentials: &'a Credentials,
}

impl async_imap::Authenticator for PlainAuth<'_> {
    type Response = Vec<u8>;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        plain_response(self.credentials)
    }
}

fn plain_response(credentials: &Credentials) -> Vec<u8> {
    format!("\0{}\0{}", credentials.username, credentials.secret).into_bytes()
}

/// Dial `endpoint` and authenticate, bounded by `connect_timeout` per
/// network phase.
pub async fn connect(
    endpoint: &Endpoint,
    credentials: &Credentials,
    connect_timeout: Duration,
) -> Result<SessionHandle> {
    info!(addr = %endpoint, "Connecting to server");
    let stream = transport::dial(endpoint, connect_timeout).await?;
    info!(addr = %endpoint, "Connected");
    authenticate(stream, credentials, connect_timeout).await
}

/// Run capability negotiation and authentication on `stream`.
pub async fn authenticate(
    stream: ImapStream,
    credentials: &Credentials,
    command_timeout: Duration,
) -> Result<SessionHandle> {
    let Negotiated {
        stream,
        capabilities,
        preauthenticated,
    } = tokio::time::timeout(command_timeout, negotiate(stream))
        .await
        .map_err(|_| AuthError::CapabilityQuery(format!("timed out after {command_timeout:?}")))??;
    debug!(capabilities = capabilities.len(), preauthenticated, "Server capability");

    let session: ImapSession = if preauthenticated {
        info!("Server preauthenticated the connection");
        adopt_preauthenticated(stream).await?
    } else {
        log_in(stream, &capabilities, credentials).await?
    };

    info!("Logged in");

    let mut handle = SessionHandle::new(session, capabilities);
    identify(&mut handle).await;
    Ok(handle)
}

async fn log_in(
    stream: ImapStream,
    capabilities: &Capabilities,
    credentials: &Credentials,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(stream.compat());

    let session = if capabilities.supports_auth("PLAIN") {
        debug!("Trying plain auth");
        client
            .authenticate("PLAIN", PlainAuth { credentials })
            .await
            .map_err(|(e, _)| AuthError::Mechanism {
                mechanism: "PLAIN",
                reason: e.to_string(),
            })?
    } else if capabilities.is_imap4rev1() {
        // IMAP4rev1 servers must implement LOGIN.
        debug!("Trying login");
        client
            .login(&credentials.username, &credentials.secret)
            .await
            .map_err(|(e, _)| AuthError::Login(e.to_string()))?
    } else {
        return Err(AuthError::NoSupportedMechanism.into());
    };
    Ok(session)
}

/// async-imap only hands out a `Session` after a login exchange. On a
/// preauthenticated connection that exchange is answered locally by
/// [`ImapStream::preauthenticated`] and never reaches the server.
async fn adopt_preauthenticated(stream: ImapStream) -> Result<ImapSession> {
    async_imap::Client::new(stream.preauthenticated().compat())
        .login("preauth", "")
        .await
        .map_err(|(e, _)| Error::from(AuthError::Login(e.to_string())))
}

/// The raw stream after the greeting and the capability query.
struct Negotiated {
    stream: ImapStream,
    capabilities: Capabilities,
    preauthenticated: bool,
}

/// Consume the greeting and run `CAPABILITY` on the raw stream.
async fn negotiate(stream: ImapStream) -> Result<Negotiated> {
    let mut reader = BufReader::new(stream);

    let greeting = read_line(&mut reader).await?;
    let upper = greeting.to_ascii_uppercase();
    if upper.starts_with("* BYE") || !upper.starts_with("* ") {
        return Err(AuthError::Greeting(greeting.trim().to_string()).into());
    }
    let preauthenticated = upper.starts_with("* PREAUTH");

    reader
        .get_mut()
        .write_all(format!("{CAPABILITY_TAG} CAPABILITY\r\n").as_bytes())
        .await?;
    reader.get_mut().flush().await?;

    let mut capabilities = None;
    loop {
        let line = read_line(&mut reader).await?;
        let trimmed = line.trim_end();
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "* CAPABILITY ") {
            capabilities = Some(Capabilities::parse(rest));
        } else if let Some(status) = trimmed.strip_prefix(&format!("{CAPABILITY_TAG} ")) {
            if !status.to_ascii_uppercase().starts_with("OK") {
                return Err(AuthError::CapabilityQuery(status.to_string()).into());
            }
            break;
        }
    }

    if !reader.buffer().is_empty() {
        return Err(AuthError::CapabilityQuery("unexpected data after CAPABILITY".into()).into());
    }

    let capabilities = capabilities
        .ok_or_else(|| AuthError::CapabilityQuery("no CAPABILITY response".into()))?;
    Ok(Negotiated {
        stream: reader.into_inner(),
        capabilities,
        preauthenticated,
    })
}

async fn read_line(reader: &mut BufReader<ImapStream>) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::Transport("connection closed by server".into()));
    }
    Ok(line)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Refresh capabilities after login and send `ID` if supported. Never
/// fails: problems are logged.
async fn identify(handle: &mut SessionHandle) {
    match handle.refresh_capabilities().await {
        Ok(()) => {}
        Err(e) => {
            warn!(error = %e, "Capability refresh after login failed");
            return;
        }
    }

    if !handle.capabilities().has("ID") {
        return;
    }

    let fields = [("name", Some(CLIENT_NAME)), ("version", Some(CLIENT_VERSION))];
    match handle.session_mut().id(fields).await {
        Ok(server_id) => debug!(?server_id, "Server info"),
        Err(e) => warn!(error = %e, "ID handshake failed"),
    }
}
