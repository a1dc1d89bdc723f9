//! Retry wrapper and reconnect supervisor
//!
//! Every remote operation runs under [`with_retry`]: on any failure
//! the connection is rebuilt by [`reconnect`] and the operation starts
//! over from scratch. Network loss, expired sessions and rejected
//! commands are all handled the same way; only the attempt ceiling
//! and the reconnect deadline turn them into errors for the caller.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bound on dialing plus each pre-auth network phase.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Attempts per operation before giving up.
pub const MAX_ATTEMPTS: u32 = 10;
/// How long one reconnect may keep trying.
pub const RECONNECT_DEADLINE: Duration = Duration::from_secs(30 * 60);
/// Pause between reconnect rounds.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(60);
/// Limit for the diagnostic probe on a session being replaced.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// The budgets that bound retrying and reconnecting.
///
/// [`RetryPolicy::default`] carries the crate constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub connect_timeout: Duration,
    pub max_attempts: u32,
    pub reconnect_deadline: Duration,
    pub reconnect_backoff: Duration,
    pub probe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
            reconnect_deadline: RECONNECT_DEADLINE,
            reconnect_backoff: RECONNECT_BACKOFF,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// The steps the reconnect supervisor drives.
pub(crate) trait Reconnect {
    /// Reachability check that does not use the current session.
    async fn check_connectivity(&mut self) -> Result<()>;

    /// Drop the current session and install a freshly authenticated one.
    async fn reauth(&mut self) -> Result<()>;

    /// Select `mailbox` on the current session.
    async fn reselect(&mut self, mailbox: &str) -> Result<()>;
}

/// Rebuild the connection until it works or `policy.reconnect_deadline`
/// has passed since the call.
///
/// Each round probes connectivity, re-authenticates, and reselects
/// `reselect` if given; any failing step ends the round. Between
/// rounds the supervisor sleeps for the backoff, clipped to the time
/// left before the deadline. Once a round fails past the deadline the
/// last error is returned wrapped in [`Error::ReconnectTimeout`].
pub(crate) async fn reconnect<R: Reconnect>(
    target: &mut R,
    policy: &RetryPolicy,
    reselect: Option<&str>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let err = match reconnect_round(target, reselect).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let elapsed = started.elapsed();
        if elapsed >= policy.reconnect_deadline {
            warn!(?elapsed, error = %err, "Giving up on reconnect");
            return Err(Error::ReconnectTimeout {
                elapsed,
                source: Box::new(err),
            });
        }

        let pause = policy
            .reconnect_backoff
            .min(policy.reconnect_deadline - elapsed);
        tokio::time::sleep(pause).await;
    }
}

async fn reconnect_round<R: Reconnect>(target: &mut R, reselect: Option<&str>) -> Result<()> {
    let probe = target.check_connectivity().await;
    debug!(error = ?probe.as_ref().err(), "Connection check");
    probe?;

    let reauth = target.reauth().await;
    debug!(error = ?reauth.as_ref().err(), "Reauth");
    reauth?;

    if let Some(mailbox) = reselect.filter(|m| !m.is_empty()) {
        let selected = target.reselect(mailbox).await;
        debug!(mailbox, error = ?selected.as_ref().err(), "Reselect");
        selected?;
    }
    Ok(())
}

/// Run `op` until it succeeds, reconnecting between attempts.
///
/// `op` must be safe to repeat: each call starts the work over, and
/// anything it delivered during a failed attempt is stale. After
/// `policy.max_attempts` failures the last one comes back wrapped in
/// [`Error::TooManyRetries`]. A failed reconnect ends the loop at once
/// with its own error.
pub(crate) async fn with_retry<R, T, F>(
    target: &mut R,
    policy: &RetryPolicy,
    reselect: Option<&str>,
    mut op: F,
) -> Result<T>
where
    R: Reconnect,
    F: AsyncFnMut(&mut R) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        let err = match op(&mut *target).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= policy.max_attempts {
            return Err(Error::TooManyRetries {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        warn!(attempt, error = %err, "IMAP call failed, trying reconnect");
        reconnect(target, policy, reselect).await?;
        attempt += 1;
    }
}
