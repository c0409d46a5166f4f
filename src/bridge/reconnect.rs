//! Reconnection policy applied by `Bridge::run`.

use std::time::Duration;

/// What the bridge does after a failed connect or an end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Stop after the first session. Connect failures are returned.
    #[default]
    Never,
    /// Wait `delay` and dial again.
    Fixed {
        /// Pause between attempts.
        delay: Duration,
        /// Consecutive failed attempts tolerated; `None` retries forever.
        max_attempts: Option<u32>,
    },
}

impl ReconnectPolicy {
    /// Builds a policy from configuration values.
    ///
    /// A zero delay means [`ReconnectPolicy::Never`]; `max_attempts == 0`
    /// means unlimited.
    #[must_use]
    pub const fn from_settings(delay: Duration, max_attempts: u32) -> Self {
        if delay.is_zero() {
            return Self::Never;
        }
        let max_attempts = if max_attempts == 0 {
            None
        } else {
            Some(max_attempts)
        };
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Delay before the next attempt, given how many consecutive attempts
    /// have already failed. `None` means give up.
    #[must_use]
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Fixed {
                delay,
                max_attempts,
            } => match max_attempts {
                Some(max) if failures >= max => None,
                _ => Some(delay),
            },
        }
    }
}
