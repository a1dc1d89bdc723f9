//! Error types for imap-export-client

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("No live IMAP session")]
    Disconnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid id set: {0}")]
    InvalidIdSet(String),

    #[error("Too many retries ({attempts} attempts): {source}")]
    TooManyRetries {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Reconnect gave up after {elapsed:?}: {source}")]
    ReconnectTimeout {
        elapsed: Duration,
        #[source]
        source: Box<Error>,
    },
}

/// Why a single authentication attempt failed.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("server refused the connection: {0}")]
    Greeting(String),

    #[error("capability query failed: {0}")]
    CapabilityQuery(String),

    #[error("{mechanism} authentication failed: {reason}")]
    Mechanism {
        mechanism: &'static str,
        reason: String,
    },

    #[error("login failed: {0}")]
    Login(String),

    #[error("server offers no supported authentication mechanism")]
    NoSupportedMechanism,
}

pub type Result<T> = std::result::Result<T, Error>;
