use crate::config::{BackoffKind, WatcherSpec};
use std::time::Duration;

/// Restart policy derived from a watcher spec
///
/// The policy is pure: it looks at the handle's restart counter and the
/// uptime of the run that just ended, and answers whether the counter
/// resets and whether another attempt is allowed (and after what delay).
/// All counter mutation stays in the supervisor loop.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Whether automatic restart is enabled
    pub enabled: bool,
    /// Restart attempt ceiling
    pub max_restarts: u32,
    /// Uptime at which a run counts as stable
    pub min_uptime: Duration,
    /// Delay before the first restart attempt
    pub initial_delay: Duration,
    /// Backoff strategy to use
    pub backoff: BackoffStrategy,
}

impl RestartPolicy {
    pub fn from_spec(spec: &WatcherSpec) -> Self {
        let backoff = match spec.backoff {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                max_delay: spec.max_backoff,
            },
        };

        Self {
            enabled: spec.autorestart,
            max_restarts: spec.max_restarts,
            min_uptime: spec.min_uptime,
            initial_delay: spec.restart_delay,
            backoff,
        }
    }

    /// Whether the run that just ended was stable enough to forgive the
    /// accumulated restart history
    ///
    /// This is what separates a crash loop from long stable operation
    /// punctuated by rare failures: a watcher that keeps running past
    /// `min_uptime` starts every crash evaluation with a clean slate.
    pub fn resets_counter(&self, uptime: Option<Duration>) -> bool {
        uptime.map(|u| u >= self.min_uptime).unwrap_or(false)
    }

    /// Delay before the next attempt, or `None` when the watcher must not
    /// be restarted (`restarts` is the counter value after any reset)
    pub fn next_attempt(&self, restarts: u32) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        if restarts >= self.max_restarts {
            return None;
        }
        Some(self.backoff.delay(self.initial_delay, restarts))
    }
}

/// Backoff strategy for restart delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between restarts
    Fixed,
    /// Exponential backoff with maximum delay
    Exponential { max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay for the attempt following `prior_restarts` earlier ones
    pub fn delay(&self, initial: Duration, prior_restarts: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed => initial,
            BackoffStrategy::Exponential { max_delay } => {
                // delay = initial * 2^prior_restarts, capped
                let factor = 2u32.saturating_pow(prior_restarts);
                initial.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}
