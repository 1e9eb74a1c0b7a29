/*!
 * Clock
 * Deadlines expressed on the monotonic time base
 */

use std::time::{Duration, Instant};

/// When a blocking service gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Poll: never suspend, fail with WouldBlock
    NonBlocking,
    /// Wait until granted, abandoned or interrupted
    Infinite,
    /// Wait until the given monotonic instant
    At(Instant),
}

impl Deadline {
    /// Relative deadline from now. A zero duration means poll.
    pub fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            Self::NonBlocking
        } else {
            Self::At(Instant::now() + timeout)
        }
    }

    /// Absolute deadline
    pub fn at(instant: Instant) -> Self {
        Self::At(instant)
    }

    /// `None` means wait forever
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::Infinite, Self::after)
    }

    #[inline]
    pub fn is_poll(&self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Self::At(at) => Some(*at),
            _ => None,
        }
    }

    pub fn has_elapsed(&self, now: Instant) -> bool {
        match self {
            Self::NonBlocking => true,
            Self::Infinite => false,
            Self::At(at) => now >= *at,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::Infinite
    }
}
