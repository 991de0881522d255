//! Optional deadline for outbound calls.

use std::future::Future;
use std::time::{Duration, Instant};

/// Invalid timeout duration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout duration must be non-zero and finite (got {0:?})")]
    InvalidDuration(Duration),
}

/// The wrapped future did not complete in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {elapsed:?} (limit: {timeout:?})")]
pub struct TimedOut {
    pub elapsed: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() || duration == Duration::MAX {
            return Err(TimeoutError::InvalidDuration(duration));
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Drive `future` to completion or give up after the configured duration.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, TimedOut>
    where
        F: Future,
    {
        let start = Instant::now();
        tokio::time::timeout(self.duration, future)
            .await
            .map_err(|_| TimedOut { elapsed: start.elapsed(), timeout: self.duration })
    }
}
