//! Bounded polling primitive.
//!
//! The provider offers no push notification for capacity or health
//! transitions, so every wait is sleep-then-recheck. `poll_until`
//! bounds that wait: a fixed interval on the success path, exponential
//! backoff on provider failures, a per-phase deadline, and a
//! watch-channel shutdown signal checked at every poll point.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::warn;

use fleetcycle_core::{FleetError, FleetResult};

use crate::error::ReplaceError;

/// Timing parameters for one wait phase.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Interval between polls while the expected state has not been
    /// observed yet.
    pub interval: Duration,
    /// Deadline for the whole phase.
    pub max_wait: Duration,
    /// Ceiling for the failure backoff.
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_wait: Duration::from_secs(600),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Why a poll loop stopped without settling.
#[derive(Debug)]
pub enum PollError {
    /// The deadline expired before the expected state was observed.
    TimedOut {
        phase: &'static str,
        waited: Duration,
    },
    /// The shutdown signal fired.
    Cancelled,
    /// The provider returned a non-retryable error.
    Provider(FleetError),
}

impl From<PollError> for ReplaceError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::TimedOut { phase, waited } => ReplaceError::Timeout { phase, waited },
            PollError::Cancelled => ReplaceError::Cancelled,
            PollError::Provider(e) => ReplaceError::Provider(e),
        }
    }
}

/// Poll `op` until it settles, the phase deadline expires, or the
/// shutdown signal fires.
///
/// `op` returns `Ok(Some(value))` once the expected state is observed,
/// `Ok(None)` while it is not yet there (re-polled at the fixed
/// interval), or `Err` on a provider failure. Transient failures are
/// retried with a doubling backoff capped at `max_backoff` and reset
/// by the next clean poll; any other failure aborts the phase.
pub async fn poll_until<T, F>(
    policy: &PollPolicy,
    phase: &'static str,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> Result<T, PollError>
where
    F: AsyncFnMut() -> FleetResult<Option<T>>,
{
    let start = Instant::now();
    let mut backoff = policy.interval;

    loop {
        if *shutdown.borrow() {
            return Err(PollError::Cancelled);
        }

        let delay = match op().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                backoff = policy.interval;
                policy.interval
            }
            Err(e) if e.is_transient() => {
                warn!(phase, error = %e, "provider failure while polling, backing off");
                let delay = backoff;
                backoff = (backoff * 2).min(policy.max_backoff);
                delay
            }
            Err(e) => return Err(PollError::Provider(e)),
        };

        let waited = start.elapsed();
        if waited + delay >= policy.max_wait {
            return Err(PollError::TimedOut { phase, waited });
        }

        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown.changed() => {
                match changed {
                    Ok(()) if *shutdown.borrow() => return Err(PollError::Cancelled),
                    Ok(()) => {}
                    // Sender gone: no cancellation possible, sleep out
                    // the interval instead of spinning.
                    Err(_) => sleep(delay).await,
                }
            }
        }
    }
}
