//! IMAP endpoint, credentials and environment configuration

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Where the mail server lives.
///
/// Loopback endpoints (local test servers, bridges) are dialed in
/// plaintext; every other host gets implicit TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    loopback: bool,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let loopback = is_loopback_host(&host);
        Self {
            host,
            port,
            loopback,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the dialer should skip TLS for this endpoint.
    #[must_use]
    pub const fn is_loopback(&self) -> bool {
        self.loopback
    }
}

fn is_loopback_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `host:port`, with IPv6 hosts in brackets (`[::1]:993`).
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("Missing port in '{s}'")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::Config(format!("Missing host in '{s}'")));
        }
        let port = port
            .parse()
            .map_err(|e| Error::Config(format!("Invalid port in '{s}': {e}")))?;
        Ok(Self::new(host, port))
    }
}

/// Username and secret used to authenticate.
///
/// The secret is never written to logs; `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Connection settings for a [`Provider`](crate::Provider)
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
}

impl Config {
    /// Load the configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_HOST`
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_PORT` (default: `993`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("IMAP_HOST").map_err(|_| Error::Config("IMAP_HOST not set".into()))?;
        let port = env::var("IMAP_PORT")
            .unwrap_or_else(|_| "993".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?;

        Ok(Self {
            endpoint: Endpoint::new(host, port),
            credentials: Credentials::new(
                env::var("IMAP_USERNAME")
                    .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
                env::var("IMAP_PASSWORD")
                    .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            ),
        })
    }
}
