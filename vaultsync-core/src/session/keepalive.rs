//! Keep-alive scheduling and bounded retry.

use crate::config::ClientConfig;
use crate::transport::TransportError;
use std::time::Duration;

/// Default number of consecutive keep-alive failures before the session is dropped.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// When to ping the server and how long to back off after failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlivePolicy {
    /// Delay between successful pings.
    pub interval: Duration,
    /// Consecutive failures tolerated before the session is considered lost.
    pub max_failures: u32,
    /// Linear backoff step: the n-th consecutive failure waits `n * step`.
    pub backoff_step: Duration,
}

impl Default for KeepAlivePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_failures: DEFAULT_MAX_FAILURES,
            backoff_step: Duration::from_secs(10),
        }
    }
}

impl KeepAlivePolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.keep_alive_interval_secs.max(1)),
            max_failures: config.keep_alive_max_failures.max(1),
            backoff_step: Duration::from_secs(config.keep_alive_backoff_secs),
        }
    }

    /// Policy for a session whose lifetime the server advertised.
    ///
    /// Pings at half the lifetime so one failed ping still leaves room for a
    /// retry before expiry. Falls back to the configured interval.
    pub fn for_lifetime(self, lifetime: Option<Duration>) -> Self {
        match lifetime {
            Some(lifetime) if !lifetime.is_zero() => Self {
                interval: (lifetime / 2).max(Duration::from_secs(1)),
                ..self
            },
            _ => self,
        }
    }

    /// Delay before the retry that follows the `failures`-th consecutive failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        self.backoff_step.saturating_mul(failures)
    }
}

/// What the keep-alive loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveStep {
    /// Ping succeeded; wait the regular interval.
    Continue(Duration),
    /// Ping failed; retry after the backoff.
    Retry(Duration),
    /// Too many consecutive failures; close the session locally.
    Expire,
    /// The server revoked the client.
    Deauthorize,
}

/// Counts consecutive keep-alive failures against a [`KeepAlivePolicy`].
#[derive(Debug)]
pub struct KeepAliveTracker {
    policy: KeepAlivePolicy,
    failures: u32,
}

impl KeepAliveTracker {
    pub fn new(policy: KeepAlivePolicy) -> Self {
        Self { policy, failures: 0 }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record(&mut self, result: &Result<(), TransportError>) -> KeepAliveStep {
        match result {
            Ok(()) => {
                self.failures = 0;
                KeepAliveStep::Continue(self.policy.interval)
            }
            Err(TransportError::Status(403)) => KeepAliveStep::Deauthorize,
            Err(_) => {
                self.failures += 1;
                if self.failures >= self.policy.max_failures {
                    KeepAliveStep::Expire
                } else {
                    KeepAliveStep::Retry(self.policy.backoff(self.failures))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> KeepAlivePolicy {
        KeepAlivePolicy {
            interval: Duration::from_secs(60),
            max_failures: 3,
            backoff_step: Duration::from_secs(5),
        }
    }

    #[test]
    fn lifetime_halves_interval() {
        let p = policy().for_lifetime(Some(Duration::from_secs(600)));
        assert_eq!(p.interval, Duration::from_secs(300));

        let p = policy().for_lifetime(None);
        assert_eq!(p.interval, Duration::from_secs(60));

        let p = policy().for_lifetime(Some(Duration::ZERO));
        assert_eq!(p.interval, Duration::from_secs(60));
    }

    #[test]
    fn backoff_is_linear() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(5));
        assert_eq!(p.backoff(2), Duration::from_secs(10));
    }

    #[test]
    fn three_failures_expire() {
        let mut tracker = KeepAliveTracker::new(policy());
        let timeout = Err(TransportError::Timeout("t".into()));

        assert_eq!(tracker.record(&timeout), KeepAliveStep::Retry(Duration::from_secs(5)));
        assert_eq!(tracker.record(&timeout), KeepAliveStep::Retry(Duration::from_secs(10)));
        assert_eq!(tracker.record(&timeout), KeepAliveStep::Expire);
    }

    #[test]
    fn success_resets_failures() {
        let mut tracker = KeepAliveTracker::new(policy());
        tracker.record(&Err(TransportError::Status(500)));
        tracker.record(&Err(TransportError::Status(500)));
        assert_eq!(tracker.failures(), 2);

        assert_eq!(tracker.record(&Ok(())), KeepAliveStep::Continue(Duration::from_secs(60)));
        assert_eq!(tracker.failures(), 0);
    }

    #[test]
    fn forbidden_deauthorizes_immediately() {
        let mut tracker = KeepAliveTracker::new(policy());
        assert_eq!(
            tracker.record(&Err(TransportError::Status(403))),
            KeepAliveStep::Deauthorize
        );
    }
}
